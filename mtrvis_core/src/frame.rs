//! Ego-centric scene frame.
//!
//! Re-expresses a whole scene (map, agent states, predictions) in the
//! local frame of one pivot agent: its position at the reference timestep
//! becomes the origin and its heading points along +y.
//!
//! The transform is rigid. Positions are translated then rotated by
//! `π/2 - pivot_heading`, direction and velocity vectors are only rotated,
//! and every heading gains `rotate_angle`. Ground-truth rows inside
//! predictions use the same layout as agent rows and get the same
//! treatment, so a frame followed by its `inverse()` restores every field.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Rotation2, Vector2};
use tracing::debug;

use crate::error::{Result, SceneError};
use crate::scene::{AgentState, AgentTrajectory, MapPoint, PredictedTrajectory};
use crate::segmenter::{PolylineBatch, ValidityMask};

/// Last history timestep of the 1.1 s observation window at 10 Hz
pub const DEFAULT_REFERENCE_TIMESTEP: usize = 10;

/// A rigid 2D frame: translate by `-origin`, then rotate by `rotate_angle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EgoFrame {
    /// Global position that maps to the local origin
    pub origin: Vector2<f64>,

    /// Counter-clockwise rotation applied after translation (radians)
    pub rotate_angle: f64,

    rotation: Rotation2<f64>,
}

impl EgoFrame {
    /// Creates a frame from an explicit origin and rotation.
    pub fn new(origin: Vector2<f64>, rotate_angle: f64) -> Self {
        Self {
            origin,
            rotate_angle,
            rotation: Rotation2::new(rotate_angle),
        }
    }

    /// Frame in which a pose at `position` with `heading` faces +y.
    pub fn from_pose(position: Vector2<f64>, heading: f64) -> Self {
        Self::new(position, FRAC_PI_2 - heading)
    }

    /// Frame anchored on `trajectories[pivot]` at `reference_timestep`.
    pub fn from_pivot(
        trajectories: &[AgentTrajectory],
        pivot: usize,
        reference_timestep: usize,
    ) -> Result<Self> {
        let traj = trajectories.get(pivot).ok_or(SceneError::PivotOutOfRange {
            track_index: pivot,
            num_agents: trajectories.len(),
        })?;

        match traj.get(reference_timestep) {
            Some(state) if state.is_valid() => Ok(Self::from_pose(state.position(), state.heading)),
            _ => Err(SceneError::InvalidPivotState {
                track_index: pivot,
                timestep: reference_timestep,
            }),
        }
    }

    /// The frame that maps local coordinates back to global ones.
    pub fn inverse(&self) -> Self {
        Self::new(-(self.rotation * self.origin), -self.rotate_angle)
    }

    pub fn to_local_point(&self, p: Vector2<f64>) -> Vector2<f64> {
        self.rotation * (p - self.origin)
    }

    pub fn to_local_direction(&self, v: Vector2<f64>) -> Vector2<f64> {
        self.rotation * v
    }

    pub fn to_local_heading(&self, heading: f64) -> f64 {
        heading + self.rotate_angle
    }

    pub fn apply_to_map_point(&self, p: &mut MapPoint) {
        let pos = self.to_local_point(p.position());
        let dir = self.to_local_direction(p.direction());
        p.x = pos.x;
        p.y = pos.y;
        p.dir_x = dir.x;
        p.dir_y = dir.y;
    }

    pub fn apply_to_map_points(&self, points: &mut [MapPoint]) {
        points.iter_mut().for_each(|p| self.apply_to_map_point(p));
    }

    /// Moves position, velocity and heading. Extents, z and validity stay.
    pub fn apply_to_state(&self, s: &mut AgentState) {
        let pos = self.to_local_point(s.position());
        let vel = self.to_local_direction(s.velocity());
        s.center_x = pos.x;
        s.center_y = pos.y;
        s.vel_x = vel.x;
        s.vel_y = vel.y;
        s.heading = self.to_local_heading(s.heading);
    }

    /// Every timestep is moved, valid or not.
    pub fn apply_to_trajectory(&self, traj: &mut AgentTrajectory) {
        traj.states.iter_mut().for_each(|s| self.apply_to_state(s));
    }

    pub fn apply_to_prediction(&self, pred: &mut PredictedTrajectory) {
        for candidate in &mut pred.pred_trajs {
            for p in candidate.iter_mut() {
                *p = self.to_local_point(*p);
            }
        }
        self.apply_to_trajectory(&mut pred.gt_trajs);
    }

    /// Moves the real points of a segmented batch. Padding stays zero.
    pub fn apply_to_batch(&self, batch: &mut PolylineBatch, mask: &ValidityMask) -> Result<()> {
        if mask.rows.len() != batch.chunks.len() {
            return Err(SceneError::shape(format!(
                "{} mask rows for {} chunks",
                mask.rows.len(),
                batch.chunks.len()
            )));
        }
        for (chunk, row) in batch.chunks.iter_mut().zip(&mask.rows) {
            for (p, &valid) in chunk.iter_mut().zip(row) {
                if valid {
                    self.apply_to_map_point(p);
                }
            }
        }
        Ok(())
    }
}

/// A scene expressed in a pivot agent's frame.
#[derive(Debug, Clone)]
pub struct EgoScene {
    pub frame: EgoFrame,
    pub pivot: usize,
    pub map_points: Vec<MapPoint>,
    pub trajectories: Vec<AgentTrajectory>,
    pub predictions: Vec<PredictedTrajectory>,
}

/// Moves whole scenes into a pivot agent's frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneFrameTransformer {
    /// Timestep whose pose anchors the frame (default: 10)
    pub reference_timestep: usize,
}

impl Default for SceneFrameTransformer {
    fn default() -> Self {
        Self {
            reference_timestep: DEFAULT_REFERENCE_TIMESTEP,
        }
    }
}

impl SceneFrameTransformer {
    pub fn new(reference_timestep: usize) -> Self {
        Self { reference_timestep }
    }

    /// Returns the scene in the pivot's frame. The inputs are left untouched.
    pub fn transform(
        &self,
        map_points: &[MapPoint],
        trajectories: &[AgentTrajectory],
        predictions: &[PredictedTrajectory],
        pivot: usize,
    ) -> Result<EgoScene> {
        // Check before paying for the copies
        self.check(trajectories, predictions, pivot)?;

        let mut map_points = map_points.to_vec();
        let mut trajectories = trajectories.to_vec();
        let mut predictions = predictions.to_vec();
        let frame =
            self.transform_in_place(&mut map_points, &mut trajectories, &mut predictions, pivot)?;

        Ok(EgoScene {
            frame,
            pivot,
            map_points,
            trajectories,
            predictions,
        })
    }

    /// Rotates all three groups in place.
    ///
    /// Every precondition is checked before the first write, so on error
    /// nothing has moved.
    pub fn transform_in_place(
        &self,
        map_points: &mut [MapPoint],
        trajectories: &mut [AgentTrajectory],
        predictions: &mut [PredictedTrajectory],
        pivot: usize,
    ) -> Result<EgoFrame> {
        let frame = self.check(trajectories, predictions, pivot)?;

        frame.apply_to_map_points(map_points);
        trajectories
            .iter_mut()
            .for_each(|t| frame.apply_to_trajectory(t));
        predictions
            .iter_mut()
            .for_each(|p| frame.apply_to_prediction(p));

        debug!(
            "Moved {} map points, {} agents, {} predictions into frame of track {} (angle {:.3} rad)",
            map_points.len(),
            trajectories.len(),
            predictions.len(),
            pivot,
            frame.rotate_angle
        );

        Ok(frame)
    }

    fn check(
        &self,
        trajectories: &[AgentTrajectory],
        predictions: &[PredictedTrajectory],
        pivot: usize,
    ) -> Result<EgoFrame> {
        let frame = EgoFrame::from_pivot(trajectories, pivot, self.reference_timestep)?;
        for pred in predictions {
            pred.validate()?;
        }
        Ok(frame)
    }
}

/// Free-function form of `SceneFrameTransformer::transform`.
pub fn transform_scene(
    map_points: &[MapPoint],
    trajectories: &[AgentTrajectory],
    predictions: &[PredictedTrajectory],
    pivot: usize,
    reference_timestep: usize,
) -> Result<EgoScene> {
    SceneFrameTransformer::new(reference_timestep).transform(
        map_points,
        trajectories,
        predictions,
        pivot,
    )
}
