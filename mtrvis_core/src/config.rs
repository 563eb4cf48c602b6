//! View configuration.

use serde::{Deserialize, Serialize};

use crate::envelope::Horizon;
use crate::error::{Result, SceneError};
use crate::frame::DEFAULT_REFERENCE_TIMESTEP;
use crate::scene::ObjectType;
use crate::segmenter::SegmenterConfig;

/// Half-size of the square view around the pivot, per pivot category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextRange {
    pub vehicle: f64,
    pub cyclist: f64,
    pub pedestrian: f64,
}

impl Default for ContextRange {
    fn default() -> Self {
        Self {
            vehicle: 60.0,
            cyclist: 40.0,
            pedestrian: 30.0,
        }
    }
}

impl ContextRange {
    /// Range for a pivot of `object_type`; unknown types get the vehicle range.
    pub fn for_type(&self, object_type: ObjectType) -> f64 {
        match object_type {
            ObjectType::Cyclist => self.cyclist,
            ObjectType::Pedestrian => self.pedestrian,
            _ => self.vehicle,
        }
    }
}

/// Parameters of ego view construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Timestep whose pivot pose anchors the frame (default: 10)
    pub reference_timestep: usize,

    /// How far into the future paths are drawn (default: 8 s)
    pub horizon: Horizon,

    /// Crosswalk quadrilaterals above this area (m²) are dropped (default: 500)
    pub crosswalk_max_area: f64,

    pub context_range: ContextRange,

    pub segmenter: SegmenterConfig,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            reference_timestep: DEFAULT_REFERENCE_TIMESTEP,
            horizon: Horizon::Eight,
            crosswalk_max_area: 500.0,
            context_range: ContextRange::default(),
            segmenter: SegmenterConfig::default(),
        }
    }
}

impl ViewConfig {
    /// Parses a config from JSON; missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| SceneError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.segmenter.validate()?;
        if self.reference_timestep >= self.horizon.timestep_range().end {
            return Err(SceneError::config(format!(
                "reference timestep {} lies past the {} window",
                self.reference_timestep, self.horizon
            )));
        }
        let r = &self.context_range;
        if [r.vehicle, r.cyclist, r.pedestrian]
            .iter()
            .any(|&v| v.is_nan() || v <= 0.0)
        {
            return Err(SceneError::config("context ranges must be positive"));
        }
        Ok(())
    }
}
