//! Camera ego-motion estimation.
//!
//! Background corners are picked inside the configured edge strips of the
//! first frame and followed through the clip with pyramidal optical flow.
//! The displacement of the most displaced corner is taken as the camera
//! drift of a frame when it exceeds `min_distance`; the corner set is then
//! re-detected on that frame.

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AdjustmentMode, CameraMotionConfig, DriftSelection};
use crate::error::Error;
use crate::features::GoodFeatures;
use crate::image::{dims, pyramid, to_gray, Frame, GrayImage};
use crate::optical_flow::{FlowPoint, FlowStatus, LucasKanade};
use crate::track_store::TrackStore;

/// Per-frame camera drift in pixels, `(0, 0)` where no reliable motion was seen.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct CameraMotion(Vec<na::Vector2<f32>>);

impl CameraMotion {
    pub fn zeros(frames: usize) -> Self {
        CameraMotion(vec![na::Vector2::zeros(); frames])
    }

    pub fn from_drift(drift: Vec<na::Vector2<f32>>) -> Self {
        CameraMotion(drift)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn get(&self, frame: usize) -> Option<&na::Vector2<f32>> {
        self.0.get(frame)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &na::Vector2<f32>> {
        self.0.iter()
    }

    /// Running sum of drift from frame 0 up to and including each frame.
    pub fn cumulative(&self) -> Vec<na::Vector2<f32>> {
        self.0
            .iter()
            .scan(na::Vector2::zeros(), |acc, d| {
                *acc += d;
                Some(*acc)
            })
            .collect()
    }

    /// Sets `position_adjusted = position - drift` on every record.
    ///
    /// Frames beyond the recorded drift keep their raw position.
    pub fn adjust_positions(&self, store: &mut TrackStore, mode: AdjustmentMode) {
        let drift = match mode {
            AdjustmentMode::PerFrame => self.0.clone(),
            AdjustmentMode::Cumulative => self.cumulative(),
        };

        store.for_each_record_mut(|_, frame, _, record| {
            if let Some(pos) = record.position {
                let d = drift.get(frame).copied().unwrap_or_else(na::Vector2::zeros);
                record.position_adjusted = Some(pos - d);
            }
        });
    }
}

pub struct CameraMotionEstimator {
    config: CameraMotionConfig,
    detector: GoodFeatures,
    flow: LucasKanade,
}

impl CameraMotionEstimator {
    pub fn new(config: CameraMotionConfig) -> Self {
        let detector = GoodFeatures::new(
            config.max_corners,
            config.quality_level,
            config.min_feature_distance,
            config.block_size,
        );
        let flow = LucasKanade::new(config.win_size, config.max_iterations, config.epsilon);

        Self {
            config,
            detector,
            flow,
        }
    }

    #[inline]
    pub fn config(&self) -> &CameraMotionConfig {
        &self.config
    }

    fn detect(&self, gray: &GrayImage) -> Vec<na::Point2<f32>> {
        self.detector.detect(gray, &self.config.mask_regions)
    }

    pub fn estimate(&self, frames: &[Frame]) -> Result<CameraMotion, Error> {
        let mut motion = vec![na::Vector2::zeros(); frames.len()];

        let first = match frames.first() {
            Some(f) => f,
            None => return Ok(CameraMotion(motion)),
        };
        let size = dims(first);

        let first_gray = to_gray(first.view());
        let mut features = self.detect(&first_gray);
        let mut prev_pyr = pyramid(&first_gray, self.config.max_level);

        if features.is_empty() {
            warn!("no trackable background features in the first frame");
        }

        let mut moving_frames = 0;

        for (frame_num, frame) in frames.iter().enumerate().skip(1) {
            if dims(frame) != size {
                return Err(Error::FrameSizeMismatch { frame: frame_num });
            }

            let gray = to_gray(frame.view());
            let pyr = pyramid(&gray, self.config.max_level);

            let flows = self.flow.track(&prev_pyr, &pyr, &features);
            let drift = self.select_drift(&flows);

            match drift {
                Some(d) if d.norm() > self.config.min_distance => {
                    motion[frame_num] = d;
                    moving_frames += 1;
                    features = self.detect(&gray);
                    debug!(
                        frame_num,
                        dx = d.x,
                        dy = d.y,
                        features = features.len(),
                        "camera moved"
                    );
                }
                _ => {
                    if features.is_empty() {
                        features = self.detect(&gray);
                    }
                }
            }

            prev_pyr = pyr;
        }

        info!(frames = frames.len(), moving_frames, "camera motion estimated");

        Ok(CameraMotion(motion))
    }

    /// Drift as `previous - current` feature position of the selected correspondence.
    pub fn select_drift(&self, flows: &[FlowPoint]) -> Option<na::Vector2<f32>> {
        let mut moves: Vec<na::Vector2<f32>> = flows
            .iter()
            .filter(|f| f.status == FlowStatus::Tracked)
            .map(|f| f.from - f.to)
            .collect();

        if moves.is_empty() {
            return None;
        }

        match self.config.drift_selection {
            DriftSelection::MaxDisplacement => {
                let mut best = moves[0];
                for m in &moves[1..] {
                    if m.norm() > best.norm() {
                        best = *m;
                    }
                }
                Some(best)
            }
            DriftSelection::MedianOfTopK { k } => {
                moves.sort_by(|a, b| {
                    b.norm()
                        .partial_cmp(&a.norm())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                moves.truncate(k.max(1));
                Some(moves[moves.len() / 2])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::config::PixelRect;
    use crate::frame::FrameDetections;
    use ndarray::Array3;

    /// Camera panned by `(pan_x, pan_y)` pixels relative to the origin.
    fn frame(h: usize, w: usize, pan_x: f32, pan_y: f32) -> Frame {
        Array3::from_shape_fn((h, w, 3), |(y, x, _)| {
            let x = x as f32 + pan_x;
            let y = y as f32 + pan_y;
            let v = 128.0
                + 50.0 * (x / 9.0).sin()
                + 50.0 * (y / 11.0).cos()
                + 20.0 * ((x + y) / 7.0).sin();
            v.clamp(0.0, 255.0).round() as u8
        })
    }

    fn config() -> CameraMotionConfig {
        CameraMotionConfig {
            mask_regions: vec![
                PixelRect {
                    left: 40,
                    top: 40,
                    right: 80,
                    bottom: 200,
                },
                PixelRect {
                    left: 240,
                    top: 40,
                    right: 280,
                    bottom: 200,
                },
            ],
            max_iterations: 20,
            epsilon: 0.01,
            ..Default::default()
        }
    }

    fn flow(from: (f32, f32), to: (f32, f32)) -> FlowPoint {
        FlowPoint {
            from: na::Point2::new(from.0, from.1),
            to: na::Point2::new(to.0, to.1),
            status: FlowStatus::Tracked,
        }
    }

    #[test]
    fn static_camera_has_zero_drift() {
        let f = frame(240, 320, 0.0, 0.0);
        let est = CameraMotionEstimator::new(config());
        let motion = est.estimate(&[f.clone(), f.clone(), f]).unwrap();

        assert_eq!(motion.len(), 3);
        for d in motion.iter() {
            assert_eq!(*d, na::Vector2::zeros());
        }
    }

    #[test]
    fn uniform_pan_is_recovered() {
        let frames = vec![frame(240, 320, 0.0, 0.0), frame(240, 320, 8.0, 0.0)];
        let est = CameraMotionEstimator::new(config());
        let motion = est.estimate(&frames).unwrap();

        let d = motion.get(1).unwrap();
        assert!((d.x - 8.0).abs() < 0.75, "dx = {}", d.x);
        assert!(d.y.abs() < 0.75, "dy = {}", d.y);
        assert_eq!(*motion.get(0).unwrap(), na::Vector2::zeros());
    }

    #[test]
    fn median_of_top_k_recovers_pan() {
        let frames = vec![frame(240, 320, 0.0, 0.0), frame(240, 320, 8.0, 0.0)];
        let est = CameraMotionEstimator::new(CameraMotionConfig {
            drift_selection: DriftSelection::MedianOfTopK { k: 5 },
            ..config()
        });
        let motion = est.estimate(&frames).unwrap();

        let d = motion.get(1).unwrap();
        assert!((d.x - 8.0).abs() < 0.75, "dx = {}", d.x);
        assert!(d.y.abs() < 0.75, "dy = {}", d.y);
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let frames = vec![frame(240, 320, 0.0, 0.0), frame(200, 320, 0.0, 0.0)];
        let est = CameraMotionEstimator::new(config());

        assert!(matches!(
            est.estimate(&frames),
            Err(Error::FrameSizeMismatch { frame: 1 })
        ));
    }

    #[test]
    fn small_jitter_is_ignored() {
        let frames = vec![frame(240, 320, 0.0, 0.0), frame(240, 320, 2.0, 0.0)];
        let est = CameraMotionEstimator::new(config());
        let motion = est.estimate(&frames).unwrap();

        assert_eq!(*motion.get(1).unwrap(), na::Vector2::zeros());
    }

    #[test]
    fn featureless_video_does_not_fail() {
        let frames = vec![Array3::<u8>::from_elem((100, 120, 3), 90); 4];
        let est = CameraMotionEstimator::new(config());
        let motion = est.estimate(&frames).unwrap();
        assert_eq!(motion, CameraMotion::zeros(4));
    }

    #[test]
    fn max_displacement_prefers_outlier() {
        let est = CameraMotionEstimator::new(config());
        let flows = vec![
            flow((10.0, 10.0), (4.0, 10.0)),
            flow((20.0, 10.0), (14.0, 10.0)),
            flow((30.0, 10.0), (10.0, 10.0)),
        ];

        assert_eq!(est.select_drift(&flows), Some(na::Vector2::new(20.0, 0.0)));
    }

    #[test]
    fn median_of_top_k_rejects_single_outlier() {
        let est = CameraMotionEstimator::new(CameraMotionConfig {
            drift_selection: DriftSelection::MedianOfTopK { k: 3 },
            ..config()
        });
        let flows = vec![
            flow((10.0, 10.0), (4.0, 10.0)),
            flow((20.0, 10.0), (14.0, 10.0)),
            flow((30.0, 10.0), (10.0, 10.0)),
            flow((40.0, 10.0), (34.5, 10.0)),
        ];

        assert_eq!(est.select_drift(&flows), Some(na::Vector2::new(6.0, 0.0)));
    }

    #[test]
    fn lost_features_are_not_candidates() {
        let est = CameraMotionEstimator::new(config());
        let mut lost = flow((0.0, 0.0), (50.0, 0.0));
        lost.status = FlowStatus::Lost;

        assert_eq!(est.select_drift(&[lost]), None);
    }

    #[test]
    fn adjusted_position_subtracts_drift() {
        let mut dets = vec![FrameDetections::default(); 3];
        for d in dets.iter_mut() {
            d.players.insert(3, BBox::ltrb(10.0, 10.0, 30.0, 50.0));
        }
        let mut store = TrackStore::from_detections(&dets);
        store.add_positions();

        let motion = CameraMotion::from_drift(vec![
            na::Vector2::zeros(),
            na::Vector2::new(6.0, -2.0),
            na::Vector2::new(6.0, 0.0),
        ]);

        motion.adjust_positions(&mut store, AdjustmentMode::PerFrame);
        assert_eq!(store.players[0][&3].position_adjusted, Some(na::Point2::new(20.0, 50.0)));
        assert_eq!(store.players[1][&3].position_adjusted, Some(na::Point2::new(14.0, 52.0)));
        assert_eq!(store.players[2][&3].position_adjusted, Some(na::Point2::new(14.0, 50.0)));

        motion.adjust_positions(&mut store, AdjustmentMode::Cumulative);
        assert_eq!(store.players[2][&3].position_adjusted, Some(na::Point2::new(8.0, 52.0)));

        CameraMotion::zeros(3).adjust_positions(&mut store, AdjustmentMode::PerFrame);
        for frame in &store.players {
            assert_eq!(frame[&3].position_adjusted, frame[&3].position);
        }
    }
}
