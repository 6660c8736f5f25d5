use std::collections::BTreeMap;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::KinematicsConfig;
use crate::track_store::{FrameTracks, TrackStore};
use crate::TrackId;

/// Lower bound on a window's elapsed time in seconds.
const MIN_ELAPSED: f32 = 1e-4;
const MPS_TO_KMH: f32 = 3.6;

/// Total field-plane distance in meters, per class and identity.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TotalDistances {
    pub players: BTreeMap<TrackId, f32>,
    #[serde(default)]
    pub referees: BTreeMap<TrackId, f32>,
}

/// Windowed speed and running distance from field-plane positions.
pub struct KinematicEstimator {
    config: KinematicsConfig,
}

impl KinematicEstimator {
    pub fn new(config: KinematicsConfig) -> Self {
        Self { config }
    }

    /// Annotates players (and referees when configured); returns the total distance per identity.
    pub fn annotate(&self, store: &mut TrackStore) -> TotalDistances {
        let mut totals = TotalDistances::default();

        self.annotate_frames(&mut store.players, &mut totals.players);
        if self.config.include_referees {
            self.annotate_frames(&mut store.referees, &mut totals.referees);
        }

        info!(
            players = totals.players.len(),
            referees = totals.referees.len(),
            "speed and distance estimated"
        );
        totals
    }

    fn annotate_frames(&self, frames: &mut [FrameTracks], totals: &mut BTreeMap<TrackId, f32>) {
        let n = frames.len();
        let window = self.config.window.max(1);

        for start in (0..n).step_by(window) {
            let end = (start + window).min(n);
            let last = end.min(n - 1);
            let elapsed = ((last - start) as f32 / self.config.frame_rate).max(MIN_ELAPSED);

            let mut measured = Vec::new();
            for (&id, record) in frames[start].iter() {
                let from = record.position_field;
                let to = frames[last].get(&id).and_then(|r| r.position_field);

                match (from, to) {
                    (Some(from), Some(to)) => {
                        let distance = na::distance(&from, &to);
                        let total = totals.entry(id).or_insert(0.0);
                        *total += distance;
                        measured.push((id, distance / elapsed * MPS_TO_KMH, *total));
                    }
                    _ => debug!(start, track_id = id, "window skipped, no field position"),
                }
            }

            for frame in frames[start..end].iter_mut() {
                for &(id, speed, distance) in &measured {
                    if let Some(record) = frame.get_mut(&id) {
                        record.speed = Some(speed);
                        record.distance = Some(distance);
                    }
                }
            }
        }
    }
}
