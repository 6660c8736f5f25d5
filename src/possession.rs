use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bbox::BBox;
use crate::config::PossessionConfig;
use crate::track_store::{FrameTracks, TrackStore};
use crate::{TeamId, TrackId};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Possession {
    /// No team has had the ball yet.
    Undetermined,
    Team(TeamId),
}

impl Possession {
    #[inline]
    pub fn team(&self) -> Option<TeamId> {
        match self {
            Possession::Undetermined => None,
            Possession::Team(t) => Some(*t),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct PossessionTimeline(Vec<Possession>);

impl PossessionTimeline {
    #[inline]
    pub fn frames(&self) -> &[Possession] {
        &self.0
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
    pub fn get(&self, frame: usize) -> Option<Possession> {
        self.0.get(frame).copied()
    }

    /// Share of team 1 and team 2 among the determined frames `0..=upto`.
    pub fn team_share(&self, upto: usize) -> [f32; 2] {
        let mut counts = [0usize; 2];

        for p in self.0.iter().take(upto.saturating_add(1)) {
            match p.team() {
                Some(1) => counts[0] += 1,
                Some(2) => counts[1] += 1,
                _ => (),
            }
        }

        let total = counts[0] + counts[1];
        if total == 0 {
            return [0.0, 0.0];
        }

        [counts[0] as f32 / total as f32, counts[1] as f32 / total as f32]
    }
}

/// Distance from the ball center to the nearer bottom corner of a player box.
#[inline]
pub fn ball_distance(player: &BBox, ball: na::Point2<f32>) -> f32 {
    let left = na::distance(&player.bottom_left(), &ball);
    let right = na::distance(&player.bottom_right(), &ball);

    left.min(right)
}

pub struct PossessionResolver {
    config: PossessionConfig,
}

impl PossessionResolver {
    pub fn new(config: PossessionConfig) -> Self {
        Self { config }
    }

    /// Nearest player within range, lowest identity on ties.
    pub fn closest_player(&self, players: &FrameTracks, ball: &BBox) -> Option<TrackId> {
        let center = ball.center();
        let mut best: Option<(TrackId, f32)> = None;

        for (&id, player) in players.iter() {
            let d = ball_distance(&player.bbox, center);

            if d < self.config.max_player_ball_distance && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((id, d));
            }
        }

        best.map(|(id, _)| id)
    }

    /// Sets `has_ball` on the carrier of each frame and builds the team timeline.
    pub fn resolve(&self, store: &mut TrackStore) -> PossessionTimeline {
        let frames = store.num_frames();
        let mut timeline = Vec::with_capacity(frames);
        let mut current = Possession::Undetermined;

        for frame_num in 0..frames {
            let ball = store.ball_box(frame_num).copied();

            match (ball, store.players.get_mut(frame_num)) {
                (Some(ball), Some(players)) => {
                    if let Some(id) = self.closest_player(players, &ball) {
                        if let Some(player) = players.get_mut(&id) {
                            player.has_ball = true;

                            match player.team_id {
                                Some(team) => current = Possession::Team(team),
                                None => {
                                    debug!(frame_num, track_id = id, "ball carrier has no team")
                                }
                            }
                        }
                    }
                }
                (None, _) => debug!(frame_num, "no ball, possession carried forward"),
                _ => (),
            }

            timeline.push(current);
        }

        let timeline = PossessionTimeline(timeline);
        let [team1, team2] = timeline.team_share(frames.saturating_sub(1));
        info!(frames, team1, team2, "possession resolved");

        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_store::TrackRecord;

    fn player(x: f32, team: TeamId) -> TrackRecord {
        let mut r = TrackRecord::new(BBox::ltrb(x, 100.0, x + 20.0, 160.0));
        r.team_id = Some(team);
        r
    }

    fn ball_at(x: f32, y: f32) -> FrameTracks {
        let mut m = FrameTracks::new();
        m.insert(1, TrackRecord::new(BBox::ltrb(x - 4.0, y - 4.0, x + 4.0, y + 4.0)));
        m
    }

    fn store(balls: Vec<FrameTracks>) -> TrackStore {
        let mut players = FrameTracks::new();
        players.insert(3, player(0.0, 1));
        players.insert(8, player(400.0, 2));

        TrackStore {
            players: vec![players; balls.len()],
            referees: vec![FrameTracks::new(); balls.len()],
            ball: balls,
        }
    }

    #[test]
    fn distance_uses_nearer_foot_corner() {
        let bbox = BBox::ltrb(0.0, 0.0, 20.0, 40.0);
        assert_eq!(ball_distance(&bbox, na::Point2::new(25.0, 40.0)), 5.0);
        assert_eq!(ball_distance(&bbox, na::Point2::new(0.0, 43.0)), 3.0);
    }

    #[test]
    fn loose_ball_keeps_last_possession() {
        let mut store = store(vec![
            ball_at(700.0, 700.0),
            ball_at(10.0, 162.0),
            ball_at(200.0, 300.0),
            FrameTracks::new(),
            ball_at(410.0, 160.0),
            ball_at(200.0, 300.0),
        ]);

        let timeline = PossessionResolver::new(PossessionConfig::default()).resolve(&mut store);
        assert_eq!(
            timeline.frames(),
            &[
                Possession::Undetermined,
                Possession::Team(1),
                Possession::Team(1),
                Possession::Team(1),
                Possession::Team(2),
                Possession::Team(2),
            ]
        );

        assert!(store.players[1][&3].has_ball);
        assert!(!store.players[2][&3].has_ball);
        assert!(store.players[4][&8].has_ball);
        assert!(!store.players[4][&3].has_ball);
    }

    #[test]
    fn equal_distance_prefers_lowest_identity() {
        let mut players = FrameTracks::new();
        players.insert(12, player(40.0, 2));
        players.insert(5, player(0.0, 1));

        // ball centered between the right foot of 5 and the left foot of 12
        let ball = BBox::ltrb(26.0, 156.0, 34.0, 164.0);
        let resolver = PossessionResolver::new(PossessionConfig::default());
        assert_eq!(resolver.closest_player(&players, &ball), Some(5));
    }

    #[test]
    fn out_of_range_player_does_not_qualify() {
        let mut players = FrameTracks::new();
        players.insert(2, player(0.0, 1));

        let resolver = PossessionResolver::new(PossessionConfig::default());
        let far = BBox::ltrb(86.0, 156.0, 94.0, 164.0);
        let near = BBox::ltrb(56.0, 156.0, 64.0, 164.0);
        assert_eq!(resolver.closest_player(&players, &far), None);
        assert_eq!(resolver.closest_player(&players, &near), Some(2));
    }

    #[test]
    fn share_counts_determined_frames_only() {
        let timeline = PossessionTimeline(vec![
            Possession::Undetermined,
            Possession::Team(1),
            Possession::Team(1),
            Possession::Team(2),
        ]);

        assert_eq!(timeline.team_share(0), [0.0, 0.0]);
        assert_eq!(timeline.team_share(2), [1.0, 0.0]);
        assert_eq!(timeline.team_share(3), [2.0 / 3.0, 1.0 / 3.0]);
        assert_eq!(timeline.team_share(99), timeline.team_share(3));
    }
}
