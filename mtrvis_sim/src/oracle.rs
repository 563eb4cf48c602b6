//! Invariant oracle.
//!
//! Knows what a correct result must look like without re-implementing the
//! geometry: coverage and shape of segmented batches, rigidity of the ego
//! frame, and monotonicity of the threshold envelope. Every check returns
//! the violations it found; an empty list means the check passed.

use std::f64::consts::{FRAC_PI_2, TAU};

use mtrvis_core::envelope::{speed_scale, HIGH_SPEED};
use mtrvis_core::{
    envelope, AgentTrajectory, EgoScene, Horizon, MapPoint, PolylineBatch, PredictedTrajectory,
    SegmenterConfig, ValidityMask,
};
use nalgebra::Vector2;

/// One failed invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Name of the failed check
    pub check: &'static str,
    pub detail: String,
}

impl Violation {
    fn new(check: &'static str, detail: impl Into<String>) -> Self {
        Self {
            check,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.check, self.detail)
    }
}

/// The oracle - checks results against geometric invariants.
#[derive(Debug, Clone, Copy)]
pub struct Oracle {
    /// Absolute tolerance for distances and coordinates (meters)
    pub tolerance: f64,
}

impl Default for Oracle {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

impl Oracle {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Checks a segmented batch against the points it was built from.
    pub fn check_segmentation(
        &self,
        points: &[MapPoint],
        config: &SegmenterConfig,
        batch: &PolylineBatch,
        mask: &ValidityMask,
    ) -> Vec<Violation> {
        let mut out = Vec::new();
        let sampled: Vec<MapPoint> = points
            .iter()
            .step_by(config.sample_stride)
            .copied()
            .collect();

        if mask.rows.len() != batch.chunks.len() {
            out.push(Violation::new(
                "chunk_bound",
                format!("{} mask rows for {} chunks", mask.rows.len(), batch.chunks.len()),
            ));
            return out;
        }

        if mask.total_real() != sampled.len() {
            out.push(Violation::new(
                "coverage",
                format!("{} real points for {} sampled", mask.total_real(), sampled.len()),
            ));
        }

        let mut cursor = 0;
        for (i, (chunk, row)) in batch.chunks.iter().zip(&mask.rows).enumerate() {
            if chunk.len() != config.max_chunk_len || row.len() != config.max_chunk_len {
                out.push(Violation::new(
                    "chunk_bound",
                    format!("chunk {} has {} slots, expected {}", i, chunk.len(), config.max_chunk_len),
                ));
                continue;
            }

            let real = row.iter().take_while(|&&v| v).count();
            if real == 0 || row[real..].iter().any(|&v| v) {
                out.push(Violation::new(
                    "chunk_bound",
                    format!("chunk {} mask is not a non-empty prefix", i),
                ));
            }
            if chunk[real..].iter().any(|p| *p != MapPoint::zero()) {
                out.push(Violation::new("padding", format!("chunk {} has non-zero padding", i)));
            }

            for (k, w) in chunk[..real].windows(2).enumerate() {
                let d = (w[1].position() - w[0].position()).norm();
                if d > config.break_distance {
                    out.push(Violation::new(
                        "break",
                        format!("chunk {} points {}-{} are {:.3} m apart", i, k, k + 1, d),
                    ));
                }
            }

            for p in &chunk[..real] {
                if sampled.get(cursor) != Some(p) {
                    out.push(Violation::new(
                        "order",
                        format!("chunk {} diverges from the input at sampled point {}", i, cursor),
                    ));
                    return out;
                }
                cursor += 1;
            }
        }

        out
    }

    /// Checks that the pivot sits at the origin facing +y.
    pub fn check_pivot(&self, ego: &EgoScene, reference_timestep: usize) -> Vec<Violation> {
        let Some(state) = ego
            .trajectories
            .get(ego.pivot)
            .and_then(|t| t.get(reference_timestep))
        else {
            return vec![Violation::new("pivot", format!("track {} missing", ego.pivot))];
        };

        let mut out = Vec::new();
        if state.position().norm() > self.tolerance {
            out.push(Violation::new(
                "pivot",
                format!("pivot at ({:.6}, {:.6}), expected origin", state.center_x, state.center_y),
            ));
        }
        let off = (state.heading - FRAC_PI_2).rem_euclid(TAU);
        if off.min(TAU - off) > self.tolerance {
            out.push(Violation::new(
                "pivot",
                format!("pivot heading {:.6}, expected π/2", state.heading),
            ));
        }
        out
    }

    /// Checks that distances between scene elements survive the transform.
    ///
    /// Every position is compared against the first map point (or the
    /// first agent position on a map-less scene) and its predecessor.
    pub fn check_rigidity(
        &self,
        map_points: &[MapPoint],
        trajectories: &[AgentTrajectory],
        predictions: &[PredictedTrajectory],
        ego: &EgoScene,
    ) -> (Vec<Violation>, f64) {
        let before = scene_positions(map_points, trajectories, predictions);
        let after = scene_positions(&ego.map_points, &ego.trajectories, &ego.predictions);
        if before.len() != after.len() {
            return (
                vec![Violation::new(
                    "rigidity",
                    format!("{} positions before, {} after", before.len(), after.len()),
                )],
                f64::INFINITY,
            );
        }

        let mut worst: f64 = 0.0;
        let mut out = Vec::new();
        for i in 1..before.len() {
            for j in [0, i - 1] {
                let d0 = (before[i] - before[j]).norm();
                let d1 = (after[i] - after[j]).norm();
                let err = (d0 - d1).abs();
                worst = worst.max(err);
                if err > self.tolerance * d0.max(1.0) {
                    out.push(Violation::new(
                        "rigidity",
                        format!("distance {}-{} changed from {:.6} to {:.6}", j, i, d0, d1),
                    ));
                }
            }
        }
        (out, worst)
    }

    /// Checks that the inverse frame restores the global scene.
    pub fn check_round_trip(
        &self,
        map_points: &[MapPoint],
        trajectories: &[AgentTrajectory],
        predictions: &[PredictedTrajectory],
        ego: &EgoScene,
    ) -> Vec<Violation> {
        let back = ego.frame.inverse();
        let mut out = Vec::new();

        let mut map = ego.map_points.clone();
        back.apply_to_map_points(&mut map);
        for (i, (a, b)) in map.iter().zip(map_points).enumerate() {
            if (a.position() - b.position()).norm() > self.tolerance
                || (a.direction() - b.direction()).norm() > self.tolerance
            {
                out.push(Violation::new("round_trip", format!("map point {} not restored", i)));
                break;
            }
        }

        let restore = |group: &'static str, local: &AgentTrajectory, global: &AgentTrajectory| {
            let mut t = local.clone();
            back.apply_to_trajectory(&mut t);
            t.states.iter().zip(&global.states).position(|(a, b)| {
                (a.position() - b.position()).norm() > self.tolerance
                    || (a.velocity() - b.velocity()).norm() > self.tolerance
                    || (a.heading - b.heading).abs() > self.tolerance
            })
            .map(|ts| Violation::new("round_trip", format!("{} state at t={} not restored", group, ts)))
        };

        for (local, global) in ego.trajectories.iter().zip(trajectories) {
            out.extend(restore("agent", local, global));
        }
        for (local, global) in ego.predictions.iter().zip(predictions) {
            out.extend(restore("ground truth", &local.gt_trajs, &global.gt_trajs));
        }
        out
    }

    /// Checks envelope bounds and monotonicity over a speed sweep.
    pub fn check_envelopes(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        for horizon in Horizon::all() {
            let (lat, lon) = horizon.base_thresholds();
            let mut prev = envelope(0.0, 0.0, horizon);
            for step in 0..=300 {
                let speed = step as f64 * (HIGH_SPEED + 4.0) / 300.0;
                let env = envelope(speed, 0.0, horizon);
                let scale = speed_scale(speed);

                if !(0.5..=1.0).contains(&scale) {
                    out.push(Violation::new("envelope", format!("scale {:.3} at {:.2} m/s", scale, speed)));
                }
                if env.lateral + 1e-12 < prev.lateral || env.longitudinal + 1e-12 < prev.longitudinal {
                    out.push(Violation::new(
                        "envelope",
                        format!("{} envelope shrinks at {:.2} m/s", horizon, speed),
                    ));
                }
                if env.lateral > lat + 1e-12 || env.longitudinal > lon + 1e-12 {
                    out.push(Violation::new(
                        "envelope",
                        format!("{} envelope above its base at {:.2} m/s", horizon, speed),
                    ));
                }
                prev = env;
            }
        }
        out
    }
}

fn scene_positions(
    map_points: &[MapPoint],
    trajectories: &[AgentTrajectory],
    predictions: &[PredictedTrajectory],
) -> Vec<Vector2<f64>> {
    map_points
        .iter()
        .map(MapPoint::position)
        .chain(trajectories.iter().flat_map(|t| t.states.iter().map(|s| s.position())))
        .chain(predictions.iter().flat_map(|p| p.pred_trajs.iter().flatten().copied()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtrvis_core::{segment, AgentState, SceneFrameTransformer};

    fn line(n: usize, spacing: f64) -> Vec<MapPoint> {
        (0..n).map(|i| MapPoint::at(i as f64 * spacing, 0.0)).collect()
    }

    #[test]
    fn test_clean_segmentation_passes() {
        let mut points = line(30, 0.5);
        points.extend((0..5).map(|i| MapPoint::at(100.0 + i as f64 * 0.5, 0.0)));
        let config = SegmenterConfig::default();
        let (batch, mask) = config.segment(&points).unwrap();
        assert!(Oracle::default()
            .check_segmentation(&points, &config, &batch, &mask)
            .is_empty());
    }

    #[test]
    fn test_tampered_batch_is_caught() {
        let points = line(10, 0.5);
        let config = SegmenterConfig::default();
        let (mut batch, mut mask) = segment(&points, 1, 1.0, 20).unwrap();
        batch.chunks[0][3] = MapPoint::at(50.0, 0.0);
        mask.rows[0][15] = true;

        let checks: Vec<&str> = Oracle::default()
            .check_segmentation(&points, &config, &batch, &mask)
            .iter()
            .map(|v| v.check)
            .collect();
        assert!(checks.contains(&"coverage"));
        assert!(checks.contains(&"break"));
        assert!(checks.contains(&"chunk_bound"));
    }

    #[test]
    fn test_transform_passes_frame_checks() {
        let map = line(8, 0.5);
        let traj = AgentTrajectory::new(
            (0..20)
                .map(|t| AgentState {
                    center_x: 3.0 + t as f64,
                    center_y: -2.0,
                    heading: 2.5,
                    vel_x: 1.0,
                    valid: 1.0,
                    ..AgentState::default()
                })
                .collect(),
        );
        let trajs = vec![traj];
        let ego = SceneFrameTransformer::default()
            .transform(&map, &trajs, &[], 0)
            .unwrap();

        let oracle = Oracle::default();
        assert!(oracle.check_pivot(&ego, 10).is_empty());
        let (violations, worst) = oracle.check_rigidity(&map, &trajs, &[], &ego);
        assert!(violations.is_empty());
        assert!(worst < 1e-9);
        assert!(oracle.check_round_trip(&map, &trajs, &[], &ego).is_empty());
    }

    #[test]
    fn test_envelopes_pass() {
        assert!(Oracle::default().check_envelopes().is_empty());
    }
}
