//! Team identity from jersey colors.
//!
//! Two-step clustering: each player crop is split into jersey and background
//! with a 2-means over its upper half, then the jersey colors of the reference
//! frame are clustered into two teams. Identities are resolved once and the
//! answer is memoized for the rest of the run.

use std::collections::BTreeMap;

use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bbox::BBox;
use crate::config::TeamConfig;
use crate::error::Error;
use crate::image::{crop, Frame};
use crate::math::{Clustering, KMeans};
use crate::track_store::{FrameTracks, TrackStore};
use crate::{Color, TeamId, TrackId};

/// Cluster centers of the two teams, index 0 is team 1.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamColors {
    pub colors: [Color; 2],
}

impl TeamColors {
    #[inline]
    pub fn color(&self, team: TeamId) -> Option<Color> {
        match team {
            1 => Some(self.colors[0]),
            2 => Some(self.colors[1]),
            _ => None,
        }
    }
}

/// Dominant jersey color of the player inside `bbox`.
pub fn jersey_color(frame: &Frame, bbox: &BBox, kmeans: &KMeans) -> Option<Color> {
    let image = crop(frame, bbox)?;
    let top_half = image.slice(s![0..image.shape()[0] / 2, .., ..]);
    let (h, w) = (top_half.shape()[0], top_half.shape()[1]);

    if h == 0 || w == 0 {
        return None;
    }

    let pixels = Array2::from_shape_fn((h * w, 3), |(i, c)| top_half[[i / w, i % w, c]] as f32);
    let clustering = kmeans.fit(pixels.view())?;

    let label = |y: usize, x: usize| clustering.labels[y * w + x];
    let corners = [label(0, 0), label(0, w - 1), label(h - 1, 0), label(h - 1, w - 1)];
    let background_votes = corners.iter().filter(|&&l| l == 1).count();
    let background = if background_votes > 2 { 1 } else { 0 };
    let player = 1 - background;

    let center = clustering.centers.row(player);
    Some([center[0], center[1], center[2]])
}

#[derive(Debug, Clone)]
pub struct TeamModel {
    clustering: Clustering,
    pub colors: TeamColors,
}

impl TeamModel {
    #[inline]
    pub fn classify(&self, color: &Color) -> TeamId {
        self.clustering.predict(aview1(color)) as TeamId + 1
    }
}

pub struct TeamAssigner {
    config: TeamConfig,
    jersey: KMeans,
    model: Option<TeamModel>,
    resolved: BTreeMap<TrackId, TeamId>,
}

impl TeamAssigner {
    pub fn new(config: TeamConfig) -> Self {
        let jersey = KMeans::new(2, config.jersey_n_init, config.max_iterations, config.seed);

        Self {
            config,
            jersey,
            model: None,
            resolved: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn model(&self) -> Option<&TeamModel> {
        self.model.as_ref()
    }

    #[inline]
    pub fn resolved(&self) -> &BTreeMap<TrackId, TeamId> {
        &self.resolved
    }

    /// Learns the two team colors from the players of one frame.
    pub fn fit(
        &mut self,
        frame_num: usize,
        frame: &Frame,
        players: &FrameTracks,
    ) -> Result<&TeamModel, Error> {
        let colors: Vec<Color> = players
            .values()
            .filter_map(|p| jersey_color(frame, &p.bbox, &self.jersey))
            .collect();

        if colors.len() < 2 {
            return Err(Error::InsufficientTeamSamples {
                frame: frame_num,
                found: colors.len(),
            });
        }

        let data = Array2::from_shape_fn((colors.len(), 3), |(r, c)| colors[r][c]);
        let teams = KMeans::new(
            2,
            self.config.n_init,
            self.config.max_iterations,
            self.config.seed,
        );
        let clustering = teams.fit(data.view()).ok_or(Error::InsufficientTeamSamples {
            frame: frame_num,
            found: colors.len(),
        })?;

        let center = |i: usize| {
            let row = clustering.centers.row(i);
            [row[0], row[1], row[2]]
        };
        let colors = TeamColors {
            colors: [center(0), center(1)],
        };

        info!(frame_num, samples = data.nrows(), ?colors, "team colors learned");

        Ok(&*self.model.insert(TeamModel { clustering, colors }))
    }

    /// Team of `track_id`, classifying its jersey only on the first successful sighting.
    pub fn team_for(
        &mut self,
        frame: &Frame,
        bbox: &BBox,
        track_id: TrackId,
    ) -> Result<TeamId, Error> {
        if let Some(&team) = self.resolved.get(&track_id) {
            return Ok(team);
        }

        let team = match self.config.overrides.get(&track_id) {
            Some(&forced) => forced,
            None => {
                let model = self.model.as_ref().ok_or(Error::NoPlayers)?;
                let color = jersey_color(frame, bbox, &self.jersey)
                    .ok_or(Error::UnresolvableIdentity { track_id })?;
                model.classify(&color)
            }
        };

        debug!(track_id, team, "identity resolved");
        Ok(*self.resolved.entry(track_id).or_insert(team))
    }

    /// Fits on the first frame yielding two jersey samples, then labels every player sighting.
    pub fn annotate(
        &mut self,
        frames: &[Frame],
        store: &mut TrackStore,
    ) -> Result<TeamColors, Error> {
        if frames.len() != store.players.len() {
            return Err(Error::FrameCountMismatch {
                frames: frames.len(),
                detections: store.players.len(),
            });
        }

        let colors = self.fit_first_usable(frames, &store.players)?;
        let mut unresolved = 0usize;

        for (frame_num, players) in store.players.iter_mut().enumerate() {
            let frame = &frames[frame_num];

            for (&id, player) in players.iter_mut() {
                match self.team_for(frame, &player.bbox, id) {
                    Ok(team) => {
                        player.team_id = Some(team);
                        player.team_color = colors.color(team);
                    }
                    Err(Error::UnresolvableIdentity { .. }) => {
                        unresolved += 1;
                        debug!(frame_num, track_id = id, "no jersey sample, retry later");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if unresolved > 0 {
            warn!(unresolved, "player sightings left without a team");
        }

        info!(identities = self.resolved.len(), "team assignment done");
        Ok(colors)
    }

    fn fit_first_usable(
        &mut self,
        frames: &[Frame],
        players: &[FrameTracks],
    ) -> Result<TeamColors, Error> {
        let mut last_err = Error::NoPlayers;

        for (frame_num, candidates) in players.iter().enumerate() {
            if candidates.len() < 2 {
                continue;
            }

            match self.fit(frame_num, &frames[frame_num], candidates) {
                Ok(model) => return Ok(model.colors.clone()),
                Err(err @ Error::InsufficientTeamSamples { .. }) => {
                    debug!(frame_num, %err, "reference frame rejected");
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err)
    }
}
