use tracing::debug;

use crate::bbox::BBox;
use crate::error::Error;
use crate::track_store::{FrameTracks, TrackRecord, TrackStore, BALL_ID};

/// Fills every frame without a ball box.
///
/// Gaps between two known boxes are blended linearly by frame index, frames
/// before the first sighting take the first known box and frames after the
/// last sighting hold the last known box. The output has exactly one entry,
/// keyed by [`BALL_ID`], in every frame.
pub fn interpolate_boxes(boxes: &[Option<BBox>]) -> Result<Vec<BBox>, Error> {
    let known: Vec<(usize, BBox)> = boxes
        .iter()
        .enumerate()
        .filter_map(|(idx, b)| b.map(|b| (idx, b)))
        .collect();

    let (first, last) = match (known.first(), known.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(Error::MissingBallData),
    };

    let mut out = Vec::with_capacity(boxes.len());
    let mut next = 0;

    for idx in 0..boxes.len() {
        if let Some(b) = boxes[idx] {
            out.push(b);
            continue;
        }

        if idx < first.0 {
            out.push(first.1);
            continue;
        }

        if idx > last.0 {
            out.push(last.1);
            continue;
        }

        while known[next + 1].0 < idx {
            next += 1;
        }

        let (a_idx, a) = known[next];
        let (b_idx, b) = known[next + 1];
        let factor = (idx - a_idx) as f32 / (b_idx - a_idx) as f32;

        out.push(a.lerp(&b, factor));
    }

    Ok(out)
}

impl TrackStore {
    /// Replaces the ball track with a gap-free, single identity sequence.
    pub fn interpolate_ball(&mut self) -> Result<(), Error> {
        let boxes: Vec<Option<BBox>> = (0..self.num_frames())
            .map(|frame| self.ball_box(frame).copied())
            .collect();

        let missing = boxes.iter().filter(|b| b.is_none()).count();
        let filled = interpolate_boxes(&boxes)?;
        debug!(frames = boxes.len(), missing, "ball trajectory interpolated");

        self.ball = filled
            .into_iter()
            .map(|bbox| {
                let mut frame = FrameTracks::new();
                frame.insert(BALL_ID, TrackRecord::new(bbox));
                frame
            })
            .collect();

        Ok(())
    }
}
