//! Scenario data model.
//!
//! Mirrors the processed motion-prediction records: a flat array of map
//! points with categorised index ranges, per-agent state rows on a shared
//! timeline, and per-agent prediction bundles. Rows keep their array layout
//! on the wire (`[f64; 7]` map points, `[f64; 10]` agent states) so
//! upstream dumps deserialise without reshaping.

use nalgebra::Vector2;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{Result, SceneError};

// ============================================================================
// MAP
// ============================================================================

/// One raw map point `(x, y, z, dir_x, dir_y, dir_z, type_tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 7]", into = "[f64; 7]")]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub dir_x: f64,
    pub dir_y: f64,
    pub dir_z: f64,
    /// Global polyline type id
    pub type_tag: f64,
}

impl MapPoint {
    /// A padding point (all fields zero).
    pub fn zero() -> Self {
        Self::default()
    }

    /// Creates a point at `(x, y)` with no direction or type.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    pub fn from_row(row: [f64; 7]) -> Self {
        let [x, y, z, dir_x, dir_y, dir_z, type_tag] = row;
        Self {
            x,
            y,
            z,
            dir_x,
            dir_y,
            dir_z,
            type_tag,
        }
    }

    pub fn to_row(&self) -> [f64; 7] {
        [
            self.x,
            self.y,
            self.z,
            self.dir_x,
            self.dir_y,
            self.dir_z,
            self.type_tag,
        ]
    }

    /// Planar position.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Planar direction vector.
    pub fn direction(&self) -> Vector2<f64> {
        Vector2::new(self.dir_x, self.dir_y)
    }
}

impl From<[f64; 7]> for MapPoint {
    fn from(row: [f64; 7]) -> Self {
        Self::from_row(row)
    }
}

impl From<MapPoint> for [f64; 7] {
    fn from(p: MapPoint) -> Self {
        p.to_row()
    }
}

/// A map feature: a typed index range into `MapInfos::all_polylines`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    #[serde(default)]
    pub id: i64,

    /// Feature subtype, e.g. `TYPE_SURFACE_STREET` or `TYPE_SOLID_SINGLE_YELLOW`
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Half-open range `[start, end)` into the flat point array
    pub polyline_index: (usize, usize),
}

impl MapFeature {
    /// Number of points covered by this feature.
    pub fn len(&self) -> usize {
        self.polyline_index.1.saturating_sub(self.polyline_index.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slices this feature's points out of the flat array.
    pub fn points<'a>(&self, all_polylines: &'a [MapPoint]) -> Result<&'a [MapPoint]> {
        let (start, end) = self.polyline_index;
        if start > end || end > all_polylines.len() {
            return Err(SceneError::shape(format!(
                "feature {} range {}..{} outside {} map points",
                self.id,
                start,
                end,
                all_polylines.len()
            )));
        }
        Ok(&all_polylines[start..end])
    }
}

/// Categorised map geometry of one scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapInfos {
    #[serde(default)]
    pub lane: Vec<MapFeature>,
    #[serde(default)]
    pub road_edge: Vec<MapFeature>,
    #[serde(default)]
    pub crosswalk: Vec<MapFeature>,
    #[serde(default)]
    pub road_line: Vec<MapFeature>,
    #[serde(default)]
    pub stop_sign: Vec<MapFeature>,

    /// Every polyline point of the scenario, back to back
    pub all_polylines: Vec<MapPoint>,
}

impl MapInfos {
    /// All features of every category.
    pub fn features(&self) -> impl Iterator<Item = &MapFeature> {
        self.lane
            .iter()
            .chain(&self.road_edge)
            .chain(&self.crosswalk)
            .chain(&self.road_line)
            .chain(&self.stop_sign)
    }
}

// ============================================================================
// AGENTS
// ============================================================================

/// Agent category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[serde(rename = "TYPE_UNSET")]
    #[default]
    Unset,
    #[serde(rename = "TYPE_VEHICLE")]
    Vehicle,
    #[serde(rename = "TYPE_PEDESTRIAN")]
    Pedestrian,
    #[serde(rename = "TYPE_CYCLIST")]
    Cyclist,
    #[serde(rename = "TYPE_OTHER")]
    Other,
}

impl ObjectType {
    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Unset => "TYPE_UNSET",
            ObjectType::Vehicle => "TYPE_VEHICLE",
            ObjectType::Pedestrian => "TYPE_PEDESTRIAN",
            ObjectType::Cyclist => "TYPE_CYCLIST",
            ObjectType::Other => "TYPE_OTHER",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One timestep of one agent:
/// `[cx, cy, cz, dx, dy, dz, heading, vel_x, vel_y, valid]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 10]", into = "[f64; 10]")]
pub struct AgentState {
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    /// Box extent along the agent's x axis
    pub length: f64,
    /// Box extent along the agent's y axis
    pub width: f64,
    pub height: f64,
    /// Yaw in radians
    pub heading: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    /// 1.0 when observed, 0.0 otherwise
    pub valid: f64,
}

impl AgentState {
    pub fn from_row(row: [f64; 10]) -> Self {
        let [center_x, center_y, center_z, length, width, height, heading, vel_x, vel_y, valid] =
            row;
        Self {
            center_x,
            center_y,
            center_z,
            length,
            width,
            height,
            heading,
            vel_x,
            vel_y,
            valid,
        }
    }

    pub fn to_row(&self) -> [f64; 10] {
        [
            self.center_x,
            self.center_y,
            self.center_z,
            self.length,
            self.width,
            self.height,
            self.heading,
            self.vel_x,
            self.vel_y,
            self.valid,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.valid > 0.5
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.center_x, self.center_y)
    }

    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.vel_x, self.vel_y)
    }

    pub fn speed(&self) -> f64 {
        self.vel_x.hypot(self.vel_y)
    }
}

impl From<[f64; 10]> for AgentState {
    fn from(row: [f64; 10]) -> Self {
        Self::from_row(row)
    }
}

impl From<AgentState> for [f64; 10] {
    fn from(s: AgentState) -> Self {
        s.to_row()
    }
}

/// Per-agent states over the shared scenario timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentTrajectory {
    pub states: Vec<AgentState>,
}

impl AgentTrajectory {
    pub fn new(states: Vec<AgentState>) -> Self {
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, timestep: usize) -> Option<&AgentState> {
        self.states.get(timestep)
    }

    /// True when the agent is observed at `timestep`.
    pub fn is_valid_at(&self, timestep: usize) -> bool {
        self.get(timestep).is_some_and(AgentState::is_valid)
    }

    /// Positions of the valid states within `range`.
    pub fn valid_positions(&self, range: std::ops::Range<usize>) -> Vec<Vector2<f64>> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        self.states[start..end]
            .iter()
            .filter(|s| s.is_valid())
            .map(AgentState::position)
            .collect()
    }
}

/// Agent columns of a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackInfos {
    pub object_type: Vec<ObjectType>,
    pub object_id: Vec<i64>,
    pub trajs: Vec<AgentTrajectory>,
}

// ============================================================================
// SCENARIO
// ============================================================================

/// One processed scenario as handed over by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub scenario_id: String,
    #[serde(default)]
    pub timestamps_seconds: Vec<f64>,
    #[serde(default)]
    pub current_time_index: usize,
    #[serde(default)]
    pub sdc_track_index: usize,
    pub track_infos: TrackInfos,
    pub map_infos: MapInfos,
    /// Track indices designated for prediction
    pub tracks_to_predict: Vec<usize>,
}

impl ScenarioRecord {
    pub fn num_agents(&self) -> usize {
        self.track_infos.trajs.len()
    }

    /// Length of the shared timeline (0 for a scene without agents).
    pub fn timeline_len(&self) -> usize {
        self.track_infos.trajs.first().map_or(0, AgentTrajectory::len)
    }

    pub fn is_to_predict(&self, track_index: usize) -> bool {
        self.tracks_to_predict.contains(&track_index)
    }

    /// Checks the parallel arrays and index ranges of the record.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_agents();
        let infos = &self.track_infos;
        if infos.object_type.len() != n || infos.object_id.len() != n {
            return Err(SceneError::shape(format!(
                "{} trajectories, {} object types, {} object ids",
                n,
                infos.object_type.len(),
                infos.object_id.len()
            )));
        }

        let timeline = self.timeline_len();
        if let Some((i, t)) = infos
            .trajs
            .iter()
            .enumerate()
            .find(|(_, t)| t.len() != timeline)
        {
            return Err(SceneError::shape(format!(
                "trajectory {} has {} timesteps, expected {}",
                i,
                t.len(),
                timeline
            )));
        }

        if let Some(&bad) = self.tracks_to_predict.iter().find(|&&i| i >= n) {
            return Err(SceneError::shape(format!(
                "track to predict {} out of range ({} agents)",
                bad, n
            )));
        }

        for feature in self.map_infos.features() {
            feature.points(&self.map_infos.all_polylines)?;
        }

        Ok(())
    }
}

// ============================================================================
// PREDICTIONS
// ============================================================================

/// Model output for one agent of interest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictedTrajectory {
    #[serde(default)]
    pub scenario_id: String,
    pub object_id: i64,
    pub object_type: ObjectType,
    pub track_index_to_predict: usize,

    /// Candidates x future timesteps, planar positions. Rows may carry
    /// extra fields after `(x, y)`; only the first two are kept.
    #[serde(deserialize_with = "deserialize_candidate_rows")]
    pub pred_trajs: Vec<Vec<Vector2<f64>>>,

    /// One confidence per candidate
    pub pred_scores: Vec<f64>,

    /// Ground truth over history and future
    pub gt_trajs: AgentTrajectory,
}

impl PredictedTrajectory {
    pub fn num_candidates(&self) -> usize {
        self.pred_trajs.len()
    }

    /// Checks scores against candidates and candidate lengths against each other.
    pub fn validate(&self) -> Result<()> {
        if self.pred_scores.len() != self.num_candidates() {
            return Err(SceneError::shape(format!(
                "object {}: {} scores for {} candidates",
                self.object_id,
                self.pred_scores.len(),
                self.num_candidates()
            )));
        }
        if let Some(first) = self.pred_trajs.first() {
            if let Some(i) = self.pred_trajs.iter().position(|c| c.len() != first.len()) {
                return Err(SceneError::shape(format!(
                    "object {}: candidate {} has {} steps, expected {}",
                    self.object_id,
                    i,
                    self.pred_trajs[i].len(),
                    first.len()
                )));
            }
        }
        Ok(())
    }

    /// Candidate indices by descending score.
    pub fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.pred_scores.len()).collect();
        order.sort_by(|&a, &b| self.pred_scores[b].total_cmp(&self.pred_scores[a]));
        order
    }
}

/// Reads `[x, y, ..]` rows of at least two fields into planar points.
fn deserialize_candidate_rows<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<Vec<Vector2<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<Vec<f64>>> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|candidate| {
            candidate
                .into_iter()
                .map(|row| match row[..] {
                    [x, y, ..] => Ok(Vector2::new(x, y)),
                    _ => Err(de::Error::invalid_length(
                        row.len(),
                        &"at least 2 coordinate fields",
                    )),
                })
                .collect::<std::result::Result<Vec<_>, D::Error>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state(x: f64, y: f64, valid: bool) -> AgentState {
        AgentState {
            center_x: x,
            center_y: y,
            valid: if valid { 1.0 } else { 0.0 },
            ..AgentState::default()
        }
    }

    fn record() -> ScenarioRecord {
        ScenarioRecord {
            scenario_id: "abc".to_string(),
            track_infos: TrackInfos {
                object_type: vec![ObjectType::Vehicle, ObjectType::Cyclist],
                object_id: vec![7, 9],
                trajs: vec![
                    AgentTrajectory::new(vec![state(0.0, 0.0, true); 3]),
                    AgentTrajectory::new(vec![state(1.0, 1.0, false); 3]),
                ],
            },
            map_infos: MapInfos {
                lane: vec![MapFeature {
                    id: 1,
                    kind: "TYPE_SURFACE_STREET".to_string(),
                    polyline_index: (0, 2),
                }],
                all_polylines: vec![MapPoint::at(0.0, 0.0), MapPoint::at(1.0, 0.0)],
                ..MapInfos::default()
            },
            tracks_to_predict: vec![0],
            ..ScenarioRecord::default()
        }
    }

    #[test]
    fn test_agent_state_row_layout() {
        let row = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 0.5, 7.0, 8.0, 1.0];
        let s = AgentState::from_row(row);
        assert_eq!(s.heading, 0.5);
        assert_eq!(s.vel_y, 8.0);
        assert_eq!(s.velocity(), Vector2::new(7.0, 8.0));
        assert_relative_eq!(s.speed(), 113.0f64.sqrt(), epsilon = 1e-12);
        assert!(s.is_valid());
        assert_eq!(s.to_row(), row);
    }

    #[test]
    fn test_agent_state_json_is_a_row() {
        let s: AgentState = serde_json::from_str("[1,2,3,4,5,6,0.5,7,8,0]").unwrap();
        assert_eq!(s.center_y, 2.0);
        assert!(!s.is_valid());
    }

    #[test]
    fn test_object_type_names() {
        let t: ObjectType = serde_json::from_str("\"TYPE_PEDESTRIAN\"").unwrap();
        assert_eq!(t, ObjectType::Pedestrian);
        assert_eq!(ObjectType::Cyclist.to_string(), "TYPE_CYCLIST");
    }

    #[test]
    fn test_valid_record() {
        assert!(record().validate().is_ok());
    }

    #[test]
    fn test_mismatched_ids_rejected() {
        let mut r = record();
        r.track_infos.object_id.pop();
        assert!(matches!(r.validate(), Err(SceneError::ShapeMismatch(_))));
    }

    #[test]
    fn test_ragged_timeline_rejected() {
        let mut r = record();
        r.track_infos.trajs[1].states.pop();
        assert!(matches!(r.validate(), Err(SceneError::ShapeMismatch(_))));
    }

    #[test]
    fn test_map_range_out_of_bounds() {
        let mut r = record();
        r.map_infos.lane[0].polyline_index = (1, 5);
        assert!(matches!(r.validate(), Err(SceneError::ShapeMismatch(_))));
    }

    #[test]
    fn test_valid_positions_skip_invalid() {
        let traj = AgentTrajectory::new(vec![
            state(0.0, 0.0, true),
            state(1.0, 0.0, false),
            state(2.0, 0.0, true),
        ]);
        let pts = traj.valid_positions(0..10);
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[1].x, 2.0);
    }

    #[test]
    fn test_prediction_rows_keep_first_two_fields() {
        let json = r#"{
            "object_id": 3,
            "object_type": "TYPE_VEHICLE",
            "track_index_to_predict": 0,
            "pred_trajs": [[[1.0, 2.0, 0.5, 0.1], [3.0, 4.0, 0.5, 0.1]], [[5.0, 6.0], [7.0, 8.0]]],
            "pred_scores": [0.6, 0.4],
            "gt_trajs": []
        }"#;
        let pred: PredictedTrajectory = serde_json::from_str(json).unwrap();
        assert_eq!(pred.num_candidates(), 2);
        assert_eq!(pred.pred_trajs[0][1], Vector2::new(3.0, 4.0));
        assert_eq!(pred.pred_trajs[1][0], Vector2::new(5.0, 6.0));
        assert!(pred.validate().is_ok());

        let short = json.replace("[1.0, 2.0, 0.5, 0.1]", "[1.0]");
        let err = serde_json::from_str::<PredictedTrajectory>(&short).unwrap_err();
        assert!(err.to_string().contains("at least 2 coordinate fields"));
    }

    #[test]
    fn test_prediction_ranking_and_shapes() {
        let pred = PredictedTrajectory {
            pred_trajs: vec![vec![Vector2::zeros(); 4]; 3],
            pred_scores: vec![0.2, 0.5, 0.3],
            ..PredictedTrajectory::default()
        };
        assert!(pred.validate().is_ok());
        assert_eq!(pred.ranked(), vec![1, 2, 0]);

        let mut bad = pred.clone();
        bad.pred_scores.pop();
        assert!(bad.validate().is_err());
    }
}
