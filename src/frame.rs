use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::error::Error;
use crate::TrackId;

/// Identity to box maps for one frame, as handed over by the upstream detector and tracker.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameDetections {
    #[serde(default)]
    pub players: BTreeMap<TrackId, BBox>,
    #[serde(default)]
    pub referees: BTreeMap<TrackId, BBox>,
    /// At most one entry is expected, keyed by whatever id the tracker used.
    #[serde(default)]
    pub ball: BTreeMap<TrackId, BBox>,
}

impl FrameDetections {
    #[inline]
    pub fn len(&self) -> usize {
        self.players.len() + self.referees.len() + self.ball.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces per-frame detections for a decoded video.
pub trait DetectionSource {
    fn detect(&mut self, frames: &[crate::image::Frame]) -> Result<Vec<FrameDetections>, Error>;
}

/// Detections computed ahead of time are handed out as-is.
impl DetectionSource for Vec<FrameDetections> {
    fn detect(&mut self, _frames: &[crate::image::Frame]) -> Result<Vec<FrameDetections>, Error> {
        Ok(self.clone())
    }
}
