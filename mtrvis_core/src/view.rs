//! Ego view: everything a renderer needs, already in the pivot's frame.
//!
//! Produces geometry only (polylines, polygons, oriented boxes). Colours,
//! z-order and image composition belong to the renderer.

use geo::{Area, Coord, LineString, Polygon};
use nalgebra::Vector2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ViewConfig;
use crate::envelope::{envelope_at_endpoint, oriented_box_corners, EnvelopeBox};
use crate::error::Result;
use crate::frame::{EgoScene, SceneFrameTransformer};
use crate::scene::{MapFeature, MapPoint, ObjectType, PredictedTrajectory, ScenarioRecord};
use crate::segmenter::{PolylineBatch, ValidityMask};

const UNDEFINED_LANE: &str = "TYPE_UNDEFINED";
const SOLID_YELLOW_LINES: [&str; 2] = ["TYPE_SOLID_SINGLE_YELLOW", "TYPE_SOLID_DOUBLE_YELLOW"];

/// A lane centreline with a direction arrow on its last segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneShape {
    pub points: Vec<Vector2<f64>>,
    /// False for lanes typed `TYPE_UNDEFINED`
    pub defined: bool,
    /// `(base, tip)` of the arrow
    pub arrow: (Vector2<f64>, Vector2<f64>),
}

/// Oriented bounding box of an agent at the reference timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBox {
    pub track_index: usize,
    pub object_id: i64,
    pub object_type: ObjectType,
    pub center: Vector2<f64>,
    pub heading: f64,
    pub corners: [Vector2<f64>; 4],
    /// Agent is one of the tracks to predict
    pub of_interest: bool,
}

/// Observed positions of a context agent over the horizon window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundTruthPath {
    pub track_index: usize,
    pub points: Vec<Vector2<f64>>,
}

/// One predicted candidate, prefixed with the observed history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictedPath {
    pub track_index: usize,
    pub object_id: i64,
    /// Candidate index in the model output
    pub candidate: usize,
    /// Position in descending-score order (0 = most likely)
    pub rank: usize,
    pub score: f64,
    pub points: Vec<Vector2<f64>>,
}

impl PredictedPath {
    pub fn endpoint(&self) -> Option<Vector2<f64>> {
        self.points.last().copied()
    }
}

/// Scene geometry centred on one pivot agent.
#[derive(Debug, Clone, Serialize)]
pub struct EgoView {
    pub scenario_id: String,
    pub pivot: usize,
    /// Rotation that was applied to the global scene (radians)
    pub rotate_angle: f64,
    /// Half-size of the square view around the origin
    pub extent: f64,

    pub road_edges: Vec<Vec<Vector2<f64>>>,
    /// Closed rings (first point repeated at the end)
    pub crosswalks: Vec<Vec<Vector2<f64>>>,
    pub lanes: Vec<LaneShape>,
    pub road_lines: Vec<Vec<Vector2<f64>>>,

    /// Segmented map; `None` when the scenario has no map points
    pub polylines: Option<(PolylineBatch, ValidityMask)>,

    pub agents: Vec<AgentBox>,
    pub ground_truth_paths: Vec<GroundTruthPath>,
    pub predicted_paths: Vec<PredictedPath>,
    /// Envelope at the horizon end of every agent of interest
    pub envelopes: Vec<EnvelopeBox>,
}

impl EgoView {
    /// True if `p` falls inside the square view.
    pub fn contains(&self, p: Vector2<f64>) -> bool {
        p.x.abs() <= self.extent && p.y.abs() <= self.extent
    }
}

/// Area of a four-point ring; 0 for any other point count.
pub fn quadrilateral_area(points: &[Vector2<f64>]) -> f64 {
    if points.len() != 4 {
        return 0.0;
    }
    let ring: LineString<f64> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    Polygon::new(ring, vec![]).unsigned_area()
}

/// Builds the view of `record` centred on track `pivot`.
pub fn build_ego_view(
    record: &ScenarioRecord,
    predictions: &[PredictedTrajectory],
    pivot: usize,
    config: &ViewConfig,
) -> Result<EgoView> {
    config.validate()?;
    record.validate()?;
    view_for_pivot(record, predictions, pivot, config)
}

/// Builds one view per track to predict.
///
/// A pivot that is unobserved at the reference timestep is logged and
/// skipped; malformed records fail the whole call.
pub fn build_all_views(
    record: &ScenarioRecord,
    predictions: &[PredictedTrajectory],
    config: &ViewConfig,
) -> Result<Vec<EgoView>> {
    config.validate()?;
    record.validate()?;

    let mut views = Vec::with_capacity(record.tracks_to_predict.len());
    for &pivot in &record.tracks_to_predict {
        match view_for_pivot(record, predictions, pivot, config) {
            Ok(view) => views.push(view),
            Err(e) if e.is_pivot_local() => {
                warn!("Scenario {}: skipping pivot {}: {}", record.scenario_id, pivot, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(views)
}

fn view_for_pivot(
    record: &ScenarioRecord,
    predictions: &[PredictedTrajectory],
    pivot: usize,
    config: &ViewConfig,
) -> Result<EgoView> {
    let ego = SceneFrameTransformer::new(config.reference_timestep).transform(
        &record.map_infos.all_polylines,
        &record.track_infos.trajs,
        predictions,
        pivot,
    )?;

    let map = &record.map_infos;
    let road_edges = map_polylines(&map.road_edge, &ego.map_points, |_| true)?;
    let road_lines = map_polylines(&map.road_line, &ego.map_points, |f| {
        SOLID_YELLOW_LINES.contains(&f.kind.as_str())
    })?;
    let crosswalks = crosswalk_rings(&map.crosswalk, &ego.map_points, config.crosswalk_max_area)?;
    let lanes = lane_shapes(&map.lane, &ego.map_points)?;

    let polylines = if ego.map_points.is_empty() {
        None
    } else {
        Some(config.segmenter.segment(&ego.map_points)?)
    };

    let agents = agent_boxes(record, &ego, config.reference_timestep);
    let ground_truth_paths = ground_truth_paths(record, &ego, config);
    let predicted_paths = predicted_paths(&ego, config);
    let envelopes = ego
        .predictions
        .iter()
        .filter_map(|p| envelope_at_endpoint(&p.gt_trajs, config.horizon))
        .collect();

    let object_type = record.track_infos.object_type[pivot];
    let view = EgoView {
        scenario_id: record.scenario_id.clone(),
        pivot,
        rotate_angle: ego.frame.rotate_angle,
        extent: config.context_range.for_type(object_type),
        road_edges,
        crosswalks,
        lanes,
        road_lines,
        polylines,
        agents,
        ground_truth_paths,
        predicted_paths,
        envelopes,
    };

    debug!(
        "View {}#{}: {} agents, {} predicted paths, {} lanes",
        view.scenario_id,
        pivot,
        view.agents.len(),
        view.predicted_paths.len(),
        view.lanes.len()
    );

    Ok(view)
}

/// Features covering a single point carry no drawable shape.
fn drawable<'a>(
    features: &'a [MapFeature],
    points: &'a [MapPoint],
) -> impl Iterator<Item = Result<(&'a MapFeature, Vec<Vector2<f64>>)>> + 'a {
    features.iter().filter(|f| f.len() > 1).map(move |f| {
        let pts = f.points(points)?;
        Ok((f, pts.iter().map(MapPoint::position).collect()))
    })
}

fn map_polylines(
    features: &[MapFeature],
    points: &[MapPoint],
    keep: impl Fn(&MapFeature) -> bool,
) -> Result<Vec<Vec<Vector2<f64>>>> {
    let mut out = Vec::new();
    for item in drawable(features, points) {
        let (feature, line) = item?;
        if keep(feature) {
            out.push(line);
        }
    }
    Ok(out)
}

fn crosswalk_rings(
    features: &[MapFeature],
    points: &[MapPoint],
    max_area: f64,
) -> Result<Vec<Vec<Vector2<f64>>>> {
    let mut out = Vec::new();
    for item in drawable(features, points) {
        let (_, mut ring) = item?;
        if quadrilateral_area(&ring) > max_area {
            continue;
        }
        ring.push(ring[0]);
        out.push(ring);
    }
    Ok(out)
}

fn lane_shapes(features: &[MapFeature], points: &[MapPoint]) -> Result<Vec<LaneShape>> {
    let mut out = Vec::new();
    for item in drawable(features, points) {
        let (feature, line) = item?;
        let n = line.len();
        out.push(LaneShape {
            arrow: (line[n - 2], line[n - 1]),
            points: line,
            defined: feature.kind != UNDEFINED_LANE,
        });
    }
    Ok(out)
}

fn agent_boxes(record: &ScenarioRecord, ego: &EgoScene, reference_timestep: usize) -> Vec<AgentBox> {
    ego.trajectories
        .iter()
        .enumerate()
        .filter_map(|(i, traj)| {
            let s = traj.get(reference_timestep).filter(|s| s.is_valid())?;
            let center = s.position();
            Some(AgentBox {
                track_index: i,
                object_id: record.track_infos.object_id[i],
                object_type: record.track_infos.object_type[i],
                center,
                heading: s.heading,
                corners: oriented_box_corners(center, s.length, s.width, s.heading),
                of_interest: record.is_to_predict(i),
            })
        })
        .collect()
}

fn ground_truth_paths(
    record: &ScenarioRecord,
    ego: &EgoScene,
    config: &ViewConfig,
) -> Vec<GroundTruthPath> {
    ego.trajectories
        .iter()
        .enumerate()
        .filter(|(i, traj)| traj.is_valid_at(config.reference_timestep) && !record.is_to_predict(*i))
        .map(|(i, traj)| GroundTruthPath {
            track_index: i,
            points: traj.valid_positions(config.horizon.timestep_range()),
        })
        .collect()
}

fn predicted_paths(ego: &EgoScene, config: &ViewConfig) -> Vec<PredictedPath> {
    let window = config.horizon.timestep_range();
    let history = config.reference_timestep + 1;
    let mut out = Vec::new();

    for pred in &ego.predictions {
        let gt = &pred.gt_trajs;
        let observed: Vec<Vector2<f64>> = gt
            .states
            .iter()
            .take(history)
            .map(|s| s.position())
            .collect();

        for (rank, candidate) in pred.ranked().into_iter().enumerate() {
            let full = observed.iter().chain(&pred.pred_trajs[candidate]);
            let points = full
                .enumerate()
                .filter(|(t, _)| window.contains(t) && gt.is_valid_at(*t))
                .map(|(_, p)| *p)
                .collect();
            out.push(PredictedPath {
                track_index: pred.track_index_to_predict,
                object_id: pred.object_id,
                candidate,
                rank,
                score: pred.pred_scores[candidate],
                points,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Horizon;
    use crate::error::SceneError;
    use crate::scene::{AgentState, AgentTrajectory, MapInfos, TrackInfos};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    const STEPS: usize = 91;

    fn moving(y0: f64, heading: f64, valid_from: usize) -> AgentTrajectory {
        AgentTrajectory::new(
            (0..STEPS)
                .map(|t| AgentState {
                    center_x: t as f64,
                    center_y: y0,
                    length: 4.0,
                    width: 2.0,
                    heading,
                    vel_x: 10.0,
                    valid: if t >= valid_from { 1.0 } else { 0.0 },
                    ..AgentState::default()
                })
                .collect(),
        )
    }

    fn feature(kind: &str, start: usize, end: usize) -> MapFeature {
        MapFeature {
            id: start as i64,
            kind: kind.to_string(),
            polyline_index: (start, end),
        }
    }

    fn record() -> ScenarioRecord {
        let mut all = vec![
            MapPoint::at(0.0, -2.0),
            MapPoint::at(10.0, -2.0),
            MapPoint::at(20.0, -2.0),
        ];
        // Small crosswalk, huge crosswalk, lone point
        all.extend([(5.0, 5.0), (8.0, 5.0), (8.0, 8.0), (5.0, 8.0)].map(|(x, y)| MapPoint::at(x, y)));
        all.extend([(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)].map(|(x, y)| MapPoint::at(x, y)));
        all.push(MapPoint::at(50.0, 50.0));

        ScenarioRecord {
            scenario_id: "s1".to_string(),
            track_infos: TrackInfos {
                object_type: vec![ObjectType::Cyclist, ObjectType::Vehicle, ObjectType::Vehicle],
                object_id: vec![100, 101, 102],
                trajs: vec![moving(0.0, 0.0, 0), moving(3.0, 0.0, 0), moving(6.0, 0.0, 20)],
            },
            map_infos: MapInfos {
                lane: vec![
                    feature("TYPE_SURFACE_STREET", 0, 3),
                    feature(UNDEFINED_LANE, 0, 2),
                    feature("TYPE_SURFACE_STREET", 11, 12),
                ],
                road_edge: vec![feature("TYPE_ROAD_EDGE_BOUNDARY", 0, 3)],
                crosswalk: vec![feature("", 3, 7), feature("", 7, 11)],
                road_line: vec![
                    feature("TYPE_SOLID_DOUBLE_YELLOW", 0, 3),
                    feature("TYPE_BROKEN_SINGLE_WHITE", 0, 3),
                ],
                all_polylines: all,
                ..MapInfos::default()
            },
            tracks_to_predict: vec![0, 2],
            ..ScenarioRecord::default()
        }
    }

    fn prediction(record: &ScenarioRecord) -> PredictedTrajectory {
        let gt = record.track_infos.trajs[0].clone();
        let straight: Vec<Vector2<f64>> = (11..STEPS).map(|t| Vector2::new(t as f64, 0.0)).collect();
        let veer: Vec<Vector2<f64>> = (11..STEPS).map(|t| Vector2::new(t as f64, 1.0)).collect();
        PredictedTrajectory {
            scenario_id: "s1".to_string(),
            object_id: 100,
            object_type: ObjectType::Cyclist,
            track_index_to_predict: 0,
            pred_trajs: vec![veer, straight],
            pred_scores: vec![0.2, 0.8],
            gt_trajs: gt,
        }
    }

    #[test]
    fn test_quadrilateral_area() {
        let square = [
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(2.0, 3.0),
            Vector2::new(0.0, 3.0),
        ];
        assert_relative_eq!(quadrilateral_area(&square), 6.0);
        assert_eq!(quadrilateral_area(&square[..3]), 0.0);
    }

    #[test]
    fn test_map_layers() {
        let r = record();
        let view = build_ego_view(&r, &[], 0, &ViewConfig::default()).unwrap();

        assert_eq!(view.road_edges.len(), 1);
        // Only the solid yellow line survives
        assert_eq!(view.road_lines.len(), 1);
        // Large crosswalk dropped, kept one is closed
        assert_eq!(view.crosswalks.len(), 1);
        assert_eq!(view.crosswalks[0].len(), 5);
        assert_eq!(view.crosswalks[0][0], view.crosswalks[0][4]);
        // Single-point lane dropped
        assert_eq!(view.lanes.len(), 2);
        assert!(view.lanes[0].defined);
        assert!(!view.lanes[1].defined);
        assert!(view.polylines.is_some());
    }

    #[test]
    fn test_view_is_in_pivot_frame() {
        let r = record();
        let view = build_ego_view(&r, &[], 0, &ViewConfig::default()).unwrap();
        assert_relative_eq!(view.rotate_angle, FRAC_PI_2);
        // Cyclist pivot uses the cyclist range
        assert_eq!(view.extent, 40.0);

        let pivot_box = view.agents.iter().find(|a| a.track_index == 0).unwrap();
        assert_relative_eq!(pivot_box.center.norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(pivot_box.heading, FRAC_PI_2, epsilon = 1e-12);
        assert!(pivot_box.of_interest);

        // Lane arrow points the way traffic flows: up in the pivot frame
        let (base, tip) = view.lanes[0].arrow;
        assert!(tip.y > base.y);
    }

    #[test]
    fn test_context_range_bounds_the_view() {
        let r = record();
        let view = build_ego_view(&r, &[], 0, &ViewConfig::default()).unwrap();

        // Neighbour 3 m to the side of the pivot is in view
        let neighbour = view.agents.iter().find(|a| a.track_index == 1).unwrap();
        assert!(view.contains(neighbour.center));
        // Far map corner at (100, 100) lands at (-100, 90)
        assert!(!view.contains(Vector2::new(-100.0, 90.0)));
        assert!(view.contains(Vector2::new(40.0, -40.0)));
        assert!(!view.contains(Vector2::new(40.5, 0.0)));

        let narrow = ViewConfig {
            context_range: crate::config::ContextRange {
                cyclist: 2.0,
                ..Default::default()
            },
            ..ViewConfig::default()
        };
        let view = build_ego_view(&r, &[], 0, &narrow).unwrap();
        assert!(!view.contains(neighbour.center));
    }

    #[test]
    fn test_agents_and_context_paths() {
        let r = record();
        let view = build_ego_view(&r, &[], 0, &ViewConfig::default()).unwrap();

        // Track 2 is unobserved at timestep 10
        assert_eq!(view.agents.len(), 2);
        // Only track 1 is a context agent
        assert_eq!(view.ground_truth_paths.len(), 1);
        assert_eq!(view.ground_truth_paths[0].track_index, 1);
        assert_eq!(view.ground_truth_paths[0].points.len(), 91);

        let short = ViewConfig {
            horizon: Horizon::Three,
            ..ViewConfig::default()
        };
        let view = build_ego_view(&r, &[], 0, &short).unwrap();
        assert_eq!(view.ground_truth_paths[0].points.len(), 41);
    }

    #[test]
    fn test_predicted_paths_ranked_and_windowed() {
        let r = record();
        let preds = vec![prediction(&r)];
        let config = ViewConfig {
            horizon: Horizon::Five,
            ..ViewConfig::default()
        };
        let view = build_ego_view(&r, &preds, 0, &config).unwrap();

        assert_eq!(view.predicted_paths.len(), 2);
        let best = &view.predicted_paths[0];
        assert_eq!(best.rank, 0);
        assert_eq!(best.candidate, 1);
        assert_relative_eq!(best.score, 0.8);
        assert_eq!(best.points.len(), 61);

        // Straight candidate stays on the pivot's centreline (local x = 0)
        let end = best.endpoint().unwrap();
        assert_relative_eq!(end.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(end.y, 50.0, epsilon = 1e-9);

        assert_eq!(view.envelopes.len(), 1);
        // Pivot moves at 10 m/s
        let a = 0.5 + 0.5 * (10.0 - 1.4) / 9.6;
        assert_relative_eq!(view.envelopes[0].envelope.lateral, 1.8 * a, epsilon = 1e-9);
    }

    #[test]
    fn test_build_all_views_skips_unobserved_pivot() {
        let r = record();
        let views = build_all_views(&r, &[], &ViewConfig::default()).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].pivot, 0);
    }

    #[test]
    fn test_malformed_record_fails_all_views() {
        let mut r = record();
        r.track_infos.object_id.pop();
        assert!(matches!(
            build_all_views(&r, &[], &ViewConfig::default()),
            Err(SceneError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_original_record_untouched() {
        let r = record();
        let before = r.clone();
        build_all_views(&r, &[prediction(&r)], &ViewConfig::default()).unwrap();
        assert_eq!(r, before);
    }
}
