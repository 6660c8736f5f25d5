use thiserror::Error;

use crate::TrackId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no ball detected in any frame, interpolation has nothing to anchor on")]
    MissingBallData,

    #[error("no frame contains player detections")]
    NoPlayers,

    #[error("reference frame {frame} yields {found} jersey samples, need at least 2")]
    InsufficientTeamSamples { frame: usize, found: usize },

    #[error("no jersey color sample available for track {track_id}")]
    UnresolvableIdentity { track_id: TrackId },

    #[error("field calibration quadrilateral does not define an invertible homography")]
    DegenerateCalibration,

    #[error("got {frames} frames but {detections} detection maps")]
    FrameCountMismatch { frames: usize, detections: usize },

    #[error("frame {frame} resolution differs from the first frame")]
    FrameSizeMismatch { frame: usize },

    #[error("video contains no frames")]
    EmptyVideo,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    Opencv(#[from] opencv::Error),
}
