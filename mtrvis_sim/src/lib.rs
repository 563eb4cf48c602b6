//! MTR-Vis Deterministic Simulation Harness
//!
//! Drives `mtrvis_core` with synthetic scenarios and checks every stage
//! against geometric invariants.
//!
//! # Core Principle: One Seed
//!
//! All entropy (road layout, agent motion, sensor noise, candidate scores)
//! is derived from a single 64-bit seed, so any failure is reproduced by
//! re-running its seed.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐     ┌────────────────────────┐
//! │ SyntheticScenarioBuilder│───►│     ScenarioRunner      │
//! │  (ChaCha8 + Normal)     │    │  segment / transform /  │
//! └────────────────────────┘     │  build_all_views        │
//!                                └───────────┬────────────┘
//!                                            │
//!                                ┌───────────▼────────────┐
//!                                │         Oracle          │
//!                                │  coverage, rigidity,    │
//!                                │  envelope monotonicity  │
//!                                └────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mtrvis_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 6).run(ScenarioId::DisjointRoads);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use error::SimError;
pub use exporter::{export_rendered, ViewExport};
pub use oracle::{Oracle, Violation};
pub use runner::{RenderedScenario, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SyntheticScenario, SyntheticScenarioBuilder};
