//! MTR-Vis Core - Ego-centric scene geometry for motion-prediction results
//!
//! Turns one processed scenario plus model predictions into geometry that a
//! renderer can draw directly:
//! 1. **Segmentation**: flat map points into fixed-length, masked polyline chunks
//! 2. **Frame**: rigid transform of map, agents and predictions into a pivot agent's frame
//! 3. **Envelope**: speed- and horizon-dependent tolerance box around a future pose
//!
//! `view` assembles the three into one `EgoView` per agent of interest and
//! `summary` emits the observed motion of every agent as JSON.

pub mod config;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod scene;
pub mod segmenter;
pub mod summary;
pub mod view;

// Re-export key types for convenience
pub use config::{ContextRange, ViewConfig};
pub use envelope::{envelope, Envelope, Horizon};
pub use error::{Result, SceneError};
pub use frame::{transform_scene, EgoFrame, EgoScene, SceneFrameTransformer};
pub use scene::{
    AgentState, AgentTrajectory, MapFeature, MapInfos, MapPoint, ObjectType, PredictedTrajectory,
    ScenarioRecord, TrackInfos,
};
pub use segmenter::{segment, PolylineBatch, SegmenterConfig, ValidityMask};
pub use summary::AgentsMotionSummary;
pub use view::{build_all_views, build_ego_view, EgoView};
