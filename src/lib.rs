pub mod bbox;
pub mod cache;
pub mod camera_motion;
pub mod config;
pub mod error;
pub mod features;
pub mod field;
pub mod frame;
pub mod image;
pub mod kinematics;
pub mod math;
pub mod optical_flow;
pub mod pipeline;
pub mod possession;
pub mod team;
pub mod track_store;

mod interpolate;

#[cfg(feature = "opencv")]
pub mod video;

pub use bbox::BBox;
pub use camera_motion::CameraMotion;
pub use config::Config;
pub use error::Error;
pub use frame::{DetectionSource, FrameDetections};
pub use image::Frame;
pub use interpolate::interpolate_boxes;
pub use kinematics::TotalDistances;
pub use pipeline::{Analysis, Pipeline, Video};
pub use possession::{Possession, PossessionTimeline};
pub use track_store::{EntityClass, TrackRecord, TrackStore};

/// Identity handed out by the upstream tracker.
pub type TrackId = u32;

/// `1` or `2`.
pub type TeamId = u8;

/// BGR color in `0.0..=255.0`.
pub type Color = [f32; 3];
