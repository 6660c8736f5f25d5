use std::collections::BTreeMap;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::frame::FrameDetections;
use crate::{Color, TeamId, TrackId};

/// Identity used for the single interpolated ball entry of every frame.
pub const BALL_ID: TrackId = 1;

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Player,
    Referee,
    Ball,
}

impl EntityClass {
    pub const ALL: [EntityClass; 3] = [
        EntityClass::Player,
        EntityClass::Referee,
        EntityClass::Ball,
    ];

    /// Ground contact point for people, geometric center for the ball.
    #[inline]
    pub fn anchor(&self, bbox: &BBox) -> na::Point2<f32> {
        match self {
            EntityClass::Ball => bbox.center(),
            EntityClass::Player | EntityClass::Referee => bbox.foot(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub bbox: BBox,
    #[serde(default)]
    pub position: Option<na::Point2<f32>>,
    #[serde(default)]
    pub position_adjusted: Option<na::Point2<f32>>,
    #[serde(default)]
    pub position_field: Option<na::Point2<f32>>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub team_color: Option<Color>,
    #[serde(default)]
    pub has_ball: bool,
    // km/h
    #[serde(default)]
    pub speed: Option<f32>,
    // meters, cumulative
    #[serde(default)]
    pub distance: Option<f32>,
}

impl TrackRecord {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            position: None,
            position_adjusted: None,
            position_field: None,
            team_id: None,
            team_color: None,
            has_ball: false,
            speed: None,
            distance: None,
        }
    }
}

pub type FrameTracks = BTreeMap<TrackId, TrackRecord>;

/// Per-class, per-frame identity maps shared by every stage of the pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrackStore {
    pub players: Vec<FrameTracks>,
    pub referees: Vec<FrameTracks>,
    pub ball: Vec<FrameTracks>,
}

impl TrackStore {
    pub fn from_detections(detections: &[FrameDetections]) -> Self {
        let convert = |map: &BTreeMap<TrackId, BBox>| -> FrameTracks {
            map.iter()
                .map(|(&id, bbox)| (id, TrackRecord::new(*bbox)))
                .collect()
        };

        Self {
            players: detections.iter().map(|d| convert(&d.players)).collect(),
            referees: detections.iter().map(|d| convert(&d.referees)).collect(),
            ball: detections.iter().map(|d| convert(&d.ball)).collect(),
        }
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.players.len().max(self.referees.len()).max(self.ball.len())
    }

    #[inline]
    pub fn class_mut(&mut self, class: EntityClass) -> &mut Vec<FrameTracks> {
        match class {
            EntityClass::Player => &mut self.players,
            EntityClass::Referee => &mut self.referees,
            EntityClass::Ball => &mut self.ball,
        }
    }

    /// Ball box of a frame, if any.
    #[inline]
    pub fn ball_box(&self, frame: usize) -> Option<&BBox> {
        self.ball.get(frame)?.values().next().map(|r| &r.bbox)
    }

    /// Sets `position` on every record: center for the ball, foot point for people.
    pub fn add_positions(&mut self) {
        for class in EntityClass::ALL {
            for frame in self.class_mut(class).iter_mut() {
                for record in frame.values_mut() {
                    record.position = Some(class.anchor(&record.bbox));
                }
            }
        }
    }

    /// Visits every record of every class with its frame index.
    pub fn for_each_record_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(EntityClass, usize, TrackId, &mut TrackRecord),
    {
        for class in EntityClass::ALL {
            for (frame_num, frame) in self.class_mut(class).iter_mut().enumerate() {
                for (&id, record) in frame.iter_mut() {
                    f(class, frame_num, id, record);
                }
            }
        }
    }
}
