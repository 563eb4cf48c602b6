//! Agent motion summary over the observation window.
//!
//! A per-scenario JSON digest of every agent's observed history in the
//! global frame, written next to the rendered views.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::scene::{ObjectType, ScenarioRecord};

/// Observed motion of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMotion {
    #[serde(rename = "Agent_ID")]
    pub agent_id: i64,
    #[serde(rename = "Agent_Type")]
    pub agent_type: ObjectType,
    #[serde(rename = "Agent_Position_X")]
    pub position_x: Vec<f64>,
    #[serde(rename = "Agent_Position_Y")]
    pub position_y: Vec<f64>,
    #[serde(rename = "Agent_Velocity_X")]
    pub velocity_x: Vec<f64>,
    #[serde(rename = "Agent_Velocity_Y")]
    pub velocity_y: Vec<f64>,
    #[serde(rename = "Agent_Heading_Angle")]
    pub heading: Vec<f64>,
    // Key spelling is part of the downstream format
    #[serde(rename = "Agent_Data_Is_Vaild")]
    pub valid: Vec<bool>,
}

/// Motion summary of every agent of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsMotionSummary {
    pub scenario_id: String,
    #[serde(rename = "agentsData")]
    pub agents_data: Vec<AgentMotion>,
}

impl AgentsMotionSummary {
    /// Summarises timesteps `0..=reference_timestep` of every agent.
    ///
    /// Timelines shorter than the window contribute what they have.
    pub fn from_record(record: &ScenarioRecord, reference_timestep: usize) -> Self {
        let infos = &record.track_infos;
        let agents_data = infos
            .trajs
            .iter()
            .enumerate()
            .map(|(i, traj)| {
                let window = &traj.states[..traj.len().min(reference_timestep + 1)];
                AgentMotion {
                    agent_id: infos.object_id.get(i).copied().unwrap_or_default(),
                    agent_type: infos.object_type.get(i).copied().unwrap_or_default(),
                    position_x: window.iter().map(|s| s.center_x).collect(),
                    position_y: window.iter().map(|s| s.center_y).collect(),
                    velocity_x: window.iter().map(|s| s.vel_x).collect(),
                    velocity_y: window.iter().map(|s| s.vel_y).collect(),
                    heading: window.iter().map(|s| s.heading).collect(),
                    valid: window.iter().map(|s| s.is_valid()).collect(),
                }
            })
            .collect();

        Self {
            scenario_id: record.scenario_id.clone(),
            agents_data,
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Writes `<dir>/<scenario_id>.json` and returns its path.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir.as_ref().join(format!("{}.json", self.scenario_id));
        let json = self.to_json_pretty()?;
        fs::write(&path, json)?;
        info!("Wrote motion summary of {} agents to {}", self.agents_data.len(), path.display());
        Ok(path)
    }
}
