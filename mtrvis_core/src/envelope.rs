//! Velocity-dependent uncertainty envelope around a future pose.
//!
//! The envelope is a rectangle centred on a pose: `longitudinal` meters
//! along the heading and `lateral` meters across it. Its size scales with
//! speed (factor 0.5 at walking pace up to 1.0 at 11 m/s) and with the
//! prediction horizon.

use std::ops::Range;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SceneError};
use crate::scene::AgentTrajectory;

/// Observed timesteps (1.1 s at 10 Hz)
pub const HISTORY_STEPS: usize = 11;

/// Timeline sampling rate
pub const STEPS_PER_SECOND: usize = 10;

/// Speed at or below which the envelope is at half size (m/s)
pub const LOW_SPEED: f64 = 1.4;

/// Speed at or above which the envelope is at full size (m/s)
pub const HIGH_SPEED: f64 = 11.0;

/// Supported prediction horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Horizon {
    Three,
    Five,
    Eight,
}

impl Horizon {
    pub fn all() -> [Horizon; 3] {
        [Horizon::Three, Horizon::Five, Horizon::Eight]
    }

    pub fn seconds(&self) -> u32 {
        match self {
            Horizon::Three => 3,
            Horizon::Five => 5,
            Horizon::Eight => 8,
        }
    }

    /// Full-scale `(lateral, longitudinal)` thresholds in meters.
    pub fn base_thresholds(&self) -> (f64, f64) {
        match self {
            Horizon::Three => (1.0, 2.0),
            Horizon::Five => (1.8, 3.6),
            Horizon::Eight => (3.0, 6.0),
        }
    }

    /// Timeline slice from the first history step to the horizon end.
    pub fn timestep_range(&self) -> Range<usize> {
        0..HISTORY_STEPS + self.seconds() as usize * STEPS_PER_SECOND
    }
}

impl Default for Horizon {
    fn default() -> Self {
        Horizon::Eight
    }
}

impl TryFrom<u32> for Horizon {
    type Error = SceneError;

    fn try_from(seconds: u32) -> Result<Self> {
        match seconds {
            3 => Ok(Horizon::Three),
            5 => Ok(Horizon::Five),
            8 => Ok(Horizon::Eight),
            other => Err(SceneError::UnsupportedHorizon(other)),
        }
    }
}

impl From<Horizon> for u32 {
    fn from(h: Horizon) -> Self {
        h.seconds()
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.seconds())
    }
}

/// Envelope size in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Extent across the heading
    pub lateral: f64,
    /// Extent along the heading
    pub longitudinal: f64,
}

impl Envelope {
    /// Corners of the envelope centred on a pose.
    pub fn corners(&self, center: Vector2<f64>, heading: f64) -> [Vector2<f64>; 4] {
        oriented_box_corners(center, self.longitudinal, self.lateral, heading)
    }
}

/// Scale factor in `[0.5, 1.0]`, linear in speed between the two bounds.
pub fn speed_scale(speed: f64) -> f64 {
    if speed <= LOW_SPEED {
        0.5
    } else if speed >= HIGH_SPEED {
        1.0
    } else {
        0.5 + 0.5 * (speed - LOW_SPEED) / (HIGH_SPEED - LOW_SPEED)
    }
}

/// Envelope for a pose moving at `(velocity_x, velocity_y)`.
pub fn envelope(velocity_x: f64, velocity_y: f64, horizon: Horizon) -> Envelope {
    envelope_at_speed(velocity_x.hypot(velocity_y), horizon)
}

fn envelope_at_speed(speed: f64, horizon: Horizon) -> Envelope {
    let a = speed_scale(speed);
    let (lateral, longitudinal) = horizon.base_thresholds();
    Envelope {
        lateral: lateral * a,
        longitudinal: longitudinal * a,
    }
}

/// Like `envelope`, for a horizon given in whole seconds.
pub fn envelope_for_seconds(velocity_x: f64, velocity_y: f64, seconds: u32) -> Result<Envelope> {
    Ok(envelope(velocity_x, velocity_y, Horizon::try_from(seconds)?))
}

/// An envelope placed on a pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvelopeBox {
    pub envelope: Envelope,
    pub center: Vector2<f64>,
    pub heading: f64,
    pub corners: [Vector2<f64>; 4],
}

/// Envelope around the state at the end of the horizon window.
///
/// `None` when the timeline is too short or the agent is unobserved there.
pub fn envelope_at_endpoint(traj: &AgentTrajectory, horizon: Horizon) -> Option<EnvelopeBox> {
    let idx = horizon.timestep_range().end - 1;
    let state = traj.get(idx).filter(|s| s.is_valid())?;
    let env = envelope_at_speed(state.speed(), horizon);
    let center = state.position();
    Some(EnvelopeBox {
        envelope: env,
        center,
        heading: state.heading,
        corners: env.corners(center, state.heading),
    })
}

/// Corners of a rectangle of size `along` x `across` centred on `center`,
/// with `along` aligned to `heading`.
///
/// Order: front-right, front-left, rear-left, rear-right.
pub fn oriented_box_corners(
    center: Vector2<f64>,
    along: f64,
    across: f64,
    heading: f64,
) -> [Vector2<f64>; 4] {
    let (sin, cos) = heading.sin_cos();
    let forward = Vector2::new(cos, sin) * (along / 2.0);
    let right = Vector2::new(sin, -cos) * (across / 2.0);
    [
        center + forward + right,
        center + forward - right,
        center - forward - right,
        center - forward + right,
    ]
}
