//! Synthetic scenario generation.
//!
//! Builds processed-scenario records and matching prediction bundles from a
//! single 64-bit seed, so any failing run is reproducible by its seed.

use std::f64::consts::PI;

use mtrvis_core::{
    AgentState, AgentTrajectory, MapFeature, MapInfos, MapPoint, ObjectType, PredictedTrajectory,
    ScenarioRecord, TrackInfos,
};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::error::SimError;
use crate::scenarios::{ScenarioId, ScenarioShape};

/// Timeline step in seconds (10 Hz)
const DT: f64 = 0.1;

/// Configuration for scenario generation.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of agents per scenario
    pub num_agents: usize,

    /// Predicted candidates per agent of interest
    pub num_candidates: usize,

    /// Shared timeline length (91 = 1.1 s history + 8 s future)
    pub timeline_len: usize,

    /// Last observed timestep
    pub reference_timestep: usize,

    /// Spacing of consecutive map points in meters
    pub point_spacing: f64,

    /// Position noise standard deviation for agent states
    pub position_noise_std: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 6,
            num_candidates: 6,
            timeline_len: 91,
            reference_timestep: 10,
            point_spacing: 0.4,
            position_noise_std: 0.05,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.num_agents == 0 {
            return Err(SimError::config("num_agents must be at least 1"));
        }
        if self.timeline_len <= self.reference_timestep + 1 {
            return Err(SimError::config(format!(
                "timeline of {} steps leaves no future after timestep {}",
                self.timeline_len, self.reference_timestep
            )));
        }
        if self.point_spacing.is_nan() || self.point_spacing <= 0.0 {
            return Err(SimError::config("point_spacing must be positive"));
        }
        if self.position_noise_std.is_nan() || self.position_noise_std < 0.0 {
            return Err(SimError::config("position_noise_std must be non-negative"));
        }
        Ok(())
    }
}

/// A generated scenario with its predictions.
#[derive(Debug, Clone)]
pub struct SyntheticScenario {
    pub id: ScenarioId,
    pub seed: u64,
    pub record: ScenarioRecord,
    pub predictions: Vec<PredictedTrajectory>,
    /// Stride the map is meant to be segmented with
    pub sample_stride: usize,
}

/// Seeded generator of synthetic scenarios.
pub struct SyntheticScenarioBuilder {
    config: SimConfig,
    rng: ChaCha8Rng,
    noise: Normal<f64>,
}

impl SyntheticScenarioBuilder {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let noise = Normal::new(0.0, config.position_noise_std)
            .map_err(|e| SimError::config(e.to_string()))?;
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            noise,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Generates one scenario of kind `id`.
    pub fn build(&mut self, id: ScenarioId) -> SyntheticScenario {
        let shape = id.shape();
        let num_agents = shape.num_agents.unwrap_or(self.config.num_agents);

        let (map_infos, pieces) = self.build_map(&shape);

        let mut object_type = Vec::with_capacity(num_agents);
        let mut object_id = Vec::with_capacity(num_agents);
        let mut trajs = Vec::with_capacity(num_agents);
        for i in 0..num_agents {
            let kind = [ObjectType::Vehicle, ObjectType::Cyclist, ObjectType::Pedestrian][i % 3];
            let (start, heading) = pieces[i % pieces.len()];
            trajs.push(self.build_agent(kind, start, heading));
            object_type.push(kind);
            object_id.push(1000 + i as i64);
        }

        let tracks_to_predict: Vec<usize> = (0..num_agents.min(3)).collect();
        if shape.occluded_pivot {
            trajs[0].states[self.config.reference_timestep].valid = 0.0;
        }

        let scenario_id = format!("{}_{:016x}", id.name(), self.config.seed);
        let predictions = tracks_to_predict
            .iter()
            .map(|&i| {
                self.build_prediction(&scenario_id, i, object_id[i], object_type[i], &trajs[i])
            })
            .collect();

        debug!(
            "Generated {}: {} map points, {} agents",
            scenario_id,
            map_infos.all_polylines.len(),
            num_agents
        );

        SyntheticScenario {
            id,
            seed: self.config.seed,
            record: ScenarioRecord {
                scenario_id,
                timestamps_seconds: (0..self.config.timeline_len).map(|t| t as f64 * DT).collect(),
                current_time_index: self.config.reference_timestep,
                sdc_track_index: 0,
                track_infos: TrackInfos {
                    object_type,
                    object_id,
                    trajs,
                },
                map_infos,
                tracks_to_predict,
            },
            predictions,
            sample_stride: shape.sample_stride,
        }
    }

    /// Straight road pieces joined end to end by `gap`-long jumps, one
    /// solid yellow line beside the first piece and a small crosswalk.
    ///
    /// Returns the map and each piece's `(start, heading)`.
    fn build_map(&mut self, shape: &ScenarioShape) -> (MapInfos, Vec<(Vector2<f64>, f64)>) {
        let spacing = self.config.point_spacing;
        let mut map = MapInfos::default();
        let mut pieces = Vec::with_capacity(shape.road_pieces);
        let mut cursor = Vector2::new(
            self.rng.gen_range(-500.0..500.0),
            self.rng.gen_range(-500.0..500.0),
        );

        for k in 0..shape.road_pieces {
            let heading = self.rng.gen_range(-PI..PI);
            let dir = Vector2::new(heading.cos(), heading.sin());
            if k > 0 {
                let jump = self.rng.gen_range(-PI..PI);
                cursor += Vector2::new(jump.cos(), jump.sin()) * shape.gap;
            }
            let start = cursor;
            let first = map.all_polylines.len();
            for j in 0..shape.points_per_piece {
                let p = start + dir * (j as f64 * spacing);
                map.all_polylines.push(MapPoint {
                    dir_x: dir.x,
                    dir_y: dir.y,
                    type_tag: 1.0,
                    ..MapPoint::at(p.x, p.y)
                });
            }
            cursor = start + dir * ((shape.points_per_piece.max(1) - 1) as f64 * spacing);
            map.lane.push(MapFeature {
                id: k as i64,
                kind: "TYPE_SURFACE_STREET".to_string(),
                polyline_index: (first, map.all_polylines.len()),
            });
            pieces.push((start, heading));
        }

        let (start, heading) = pieces[0];
        let dir = Vector2::new(heading.cos(), heading.sin());
        let left = Vector2::new(-dir.y, dir.x);

        let first = map.all_polylines.len();
        for j in 0..shape.points_per_piece {
            let p = start + left * 3.5 + dir * (j as f64 * spacing);
            map.all_polylines.push(MapPoint {
                dir_x: dir.x,
                dir_y: dir.y,
                type_tag: 7.0,
                ..MapPoint::at(p.x, p.y)
            });
        }
        map.road_line.push(MapFeature {
            id: 100,
            kind: "TYPE_SOLID_SINGLE_YELLOW".to_string(),
            polyline_index: (first, map.all_polylines.len()),
        });

        let first = map.all_polylines.len();
        let corner = start - left * 8.0;
        for (a, b) in [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)] {
            let p = corner + dir * a + left * b;
            map.all_polylines.push(MapPoint {
                type_tag: 18.0,
                ..MapPoint::at(p.x, p.y)
            });
        }
        map.crosswalk.push(MapFeature {
            id: 200,
            kind: String::new(),
            polyline_index: (first, map.all_polylines.len()),
        });

        (map, pieces)
    }

    /// Noisy constant-velocity motion along a road piece.
    fn build_agent(&mut self, kind: ObjectType, road_start: Vector2<f64>, road_heading: f64) -> AgentTrajectory {
        let (length, width, height, max_speed) = match kind {
            ObjectType::Pedestrian => (0.6, 0.6, 1.8, 2.0),
            ObjectType::Cyclist => (1.8, 0.8, 1.7, 8.0),
            _ => (4.5, 2.0, 1.6, 15.0),
        };
        let heading = road_heading + self.rng.gen_range(-0.1..0.1);
        let speed = self.rng.gen_range(0.5..max_speed);
        let dir = Vector2::new(heading.cos(), heading.sin());
        let anchor = road_start + dir * self.rng.gen_range(0.0..20.0);
        let velocity = dir * speed;
        let reference = self.config.reference_timestep as f64;

        let states = (0..self.config.timeline_len)
            .map(|t| {
                let p = anchor + velocity * ((t as f64 - reference) * DT);
                AgentState {
                    center_x: p.x + self.noise.sample(&mut self.rng),
                    center_y: p.y + self.noise.sample(&mut self.rng),
                    center_z: 0.0,
                    length,
                    width,
                    height,
                    heading,
                    vel_x: velocity.x,
                    vel_y: velocity.y,
                    valid: 1.0,
                }
            })
            .collect();
        AgentTrajectory::new(states)
    }

    /// Candidates fanning out sideways from the ground-truth future.
    fn build_prediction(
        &mut self,
        scenario_id: &str,
        track_index: usize,
        object_id: i64,
        object_type: ObjectType,
        gt: &AgentTrajectory,
    ) -> PredictedTrajectory {
        let reference = self.config.reference_timestep;
        let future = (self.config.timeline_len - reference - 1) as f64;
        let n = self.config.num_candidates;

        let pred_trajs = (0..n)
            .map(|c| {
                let spread = (c as f64 - (n as f64 - 1.0) / 2.0) * 0.5;
                gt.states[reference + 1..]
                    .iter()
                    .enumerate()
                    .map(|(k, s)| {
                        let side = Vector2::new(-s.heading.sin(), s.heading.cos());
                        s.position() + side * (spread * (k + 1) as f64 / future)
                    })
                    .collect()
            })
            .collect();

        let raw: Vec<f64> = (0..n).map(|_| self.rng.gen_range(0.05..1.0)).collect();
        let total: f64 = raw.iter().sum();

        PredictedTrajectory {
            scenario_id: scenario_id.to_string(),
            object_id,
            object_type,
            track_index_to_predict: track_index,
            pred_trajs,
            pred_scores: raw.iter().map(|r| r / total).collect(),
            gt_trajs: gt.clone(),
        }
    }
}
