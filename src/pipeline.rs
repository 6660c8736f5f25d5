use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{Fingerprint, StubCache};
use crate::camera_motion::{CameraMotion, CameraMotionEstimator};
use crate::config::Config;
use crate::error::Error;
use crate::field::FieldProjector;
use crate::frame::DetectionSource;
use crate::image::Frame;
use crate::kinematics::{KinematicEstimator, TotalDistances};
use crate::possession::{PossessionResolver, PossessionTimeline};
use crate::team::{TeamAssigner, TeamColors};
use crate::track_store::TrackStore;

/// Decoded clip plus a stable name used to key its stubs.
#[derive(Debug, Clone)]
pub struct Video {
    pub identity: String,
    pub frames: Vec<Frame>,
}

impl Video {
    pub fn new<S: Into<String>>(identity: S, frames: Vec<Frame>) -> Self {
        Self {
            identity: identity.into(),
            frames,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Analysis {
    pub tracks: TrackStore,
    pub camera_motion: CameraMotion,
    pub team_colors: TeamColors,
    pub possession: PossessionTimeline,
    pub distances: TotalDistances,
}

pub struct Pipeline {
    config: Config,
    projector: FieldProjector,
    cache: Option<StubCache>,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let projector = FieldProjector::new(&config.field)?;
        let cache = StubCache::from_config(&config.cache);

        Ok(Self {
            config,
            projector,
            cache,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn cached<T, C, F>(&self, kind: &str, video: &Video, config: &C, compute: F) -> Result<T, Error>
    where
        T: serde::Serialize + DeserializeOwned,
        C: serde::Serialize,
        F: FnOnce() -> Result<T, Error>,
    {
        match &self.cache {
            Some(cache) => {
                let fp = Fingerprint::new(kind, &video.identity, config)?;
                cache.get_or_compute(&fp, compute)
            }
            None => compute(),
        }
    }

    pub fn run<S>(&self, video: &Video, source: &mut S) -> Result<Analysis, Error>
    where
        S: DetectionSource + ?Sized,
    {
        if video.is_empty() {
            return Err(Error::EmptyVideo);
        }

        let mut tracks: TrackStore = self.cached("tracks", video, &(), || {
            let detections = source.detect(&video.frames)?;
            if detections.len() != video.len() {
                return Err(Error::FrameCountMismatch {
                    frames: video.len(),
                    detections: detections.len(),
                });
            }

            Ok(TrackStore::from_detections(&detections))
        })?;

        if tracks.num_frames() != video.len() {
            return Err(Error::FrameCountMismatch {
                frames: video.len(),
                detections: tracks.num_frames(),
            });
        }

        info!(video = %video.identity, frames = video.len(), "tracks ready");

        tracks.interpolate_ball()?;
        tracks.add_positions();

        let estimator = CameraMotionEstimator::new(self.config.camera.clone());
        let camera_motion: CameraMotion =
            self.cached("camera_motion", video, &self.config.camera, || {
                estimator.estimate(&video.frames)
            })?;

        camera_motion.adjust_positions(&mut tracks, self.config.camera.adjustment);
        self.projector.annotate(&mut tracks);

        let distances =
            KinematicEstimator::new(self.config.kinematics.clone()).annotate(&mut tracks);
        let team_colors =
            TeamAssigner::new(self.config.team.clone()).annotate(&video.frames, &mut tracks)?;
        let possession =
            PossessionResolver::new(self.config.possession.clone()).resolve(&mut tracks);

        info!(video = %video.identity, "analysis complete");

        Ok(Analysis {
            tracks,
            camera_motion,
            team_colors,
            possession,
            distances,
        })
    }
}
