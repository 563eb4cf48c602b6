//! JSON exporter for rendered scenarios.
//!
//! Writes every ego view of a run as one JSON document for an external
//! renderer, plus the agent motion summary next to it.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use mtrvis_core::{AgentsMotionSummary, EgoView};
use serde::Serialize;
use tracing::info;

use crate::error::SimError;
use crate::runner::RenderedScenario;

/// Complete export of one rendered scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ViewExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    pub scenario_id: String,

    /// Whether the oracle found nothing wrong
    pub passed: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,

    /// One view per rendered agent of interest
    pub views: Vec<EgoView>,
}

impl ViewExport {
    /// Creates an export from a rendered scenario.
    pub fn new(rendered: &RenderedScenario) -> Self {
        Self {
            scenario: rendered.scenario.id.name().to_string(),
            seed: rendered.scenario.seed,
            scenario_id: rendered.scenario.record.scenario_id.clone(),
            passed: rendered.violations.is_empty(),
            violations: rendered.violations.iter().map(ToString::to_string).collect(),
            views: rendered.views.clone(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path.as_ref())?;
        file.write_all(json.as_bytes())?;
        info!("Exported {} views to {}", self.views.len(), path.as_ref().display());
        Ok(())
    }
}

/// Writes the views to `path` and the motion summary into the same directory.
///
/// Returns the summary path.
pub fn export_rendered(
    rendered: &RenderedScenario,
    reference_timestep: usize,
    path: impl AsRef<Path>,
) -> Result<PathBuf, SimError> {
    let path = path.as_ref();
    ViewExport::new(rendered).write_to_file(path)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let summary = AgentsMotionSummary::from_record(&rendered.scenario.record, reference_timestep);
    Ok(summary.write_to_dir(dir)?)
}
