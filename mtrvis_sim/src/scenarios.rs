//! Synthetic scenario catalogue.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SYN-001: One straight road, a handful of agents
    StraightRoad,

    /// SYN-002: Several road pieces separated by gaps in the flat map array
    DisjointRoads,

    /// SYN-003: Many agents on two roads
    DenseTraffic,

    /// SYN-004: First agent of interest unobserved at the reference timestep
    OccludedPivot,

    /// SYN-005: One very long road, subsampled, forcing chunk windowing
    LongPolylines,
}

/// Shape parameters a scenario id expands to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioShape {
    /// Number of disjoint straight road pieces
    pub road_pieces: usize,

    /// Points per road piece
    pub points_per_piece: usize,

    /// Gap between consecutive pieces in meters
    pub gap: f64,

    /// Agent count (overrides the runner's default when set)
    pub num_agents: Option<usize>,

    /// Blank out the first pivot at the reference timestep
    pub occluded_pivot: bool,

    /// Map subsampling stride
    pub sample_stride: usize,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StraightRoad,
            ScenarioId::DisjointRoads,
            ScenarioId::DenseTraffic,
            ScenarioId::OccludedPivot,
            ScenarioId::LongPolylines,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StraightRoad => "straight_road",
            ScenarioId::DisjointRoads => "disjoint_roads",
            ScenarioId::DenseTraffic => "dense_traffic",
            ScenarioId::OccludedPivot => "occluded_pivot",
            ScenarioId::LongPolylines => "long_polylines",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StraightRoad => "One 60-point road, default agent count",
            ScenarioId::DisjointRoads => "Four road pieces 8 m apart, break detection",
            ScenarioId::DenseTraffic => "40 agents on two roads, rigidity under load",
            ScenarioId::OccludedPivot => "First pivot unobserved at t=10, must be skipped",
            ScenarioId::LongPolylines => "One 500-point road at stride 2, chunk windowing",
        }
    }

    /// Expands the id into generator parameters.
    pub fn shape(&self) -> ScenarioShape {
        let base = ScenarioShape {
            road_pieces: 1,
            points_per_piece: 60,
            gap: 8.0,
            num_agents: None,
            occluded_pivot: false,
            sample_stride: 1,
        };
        match self {
            ScenarioId::StraightRoad => base,
            ScenarioId::DisjointRoads => ScenarioShape {
                road_pieces: 4,
                ..base
            },
            ScenarioId::DenseTraffic => ScenarioShape {
                road_pieces: 2,
                num_agents: Some(40),
                ..base
            },
            ScenarioId::OccludedPivot => ScenarioShape {
                occluded_pivot: true,
                ..base
            },
            ScenarioId::LongPolylines => ScenarioShape {
                points_per_piece: 500,
                sample_stride: 2,
                ..base
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight_road" | "straightroad" | "syn-001" => Ok(ScenarioId::StraightRoad),
            "disjoint_roads" | "disjointroads" | "syn-002" => Ok(ScenarioId::DisjointRoads),
            "dense_traffic" | "densetraffic" | "syn-003" => Ok(ScenarioId::DenseTraffic),
            "occluded_pivot" | "occludedpivot" | "syn-004" => Ok(ScenarioId::OccludedPivot),
            "long_polylines" | "longpolylines" | "syn-005" => Ok(ScenarioId::LongPolylines),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
        }
        assert_eq!("SYN-004".parse::<ScenarioId>().unwrap(), ScenarioId::OccludedPivot);
        assert!("byzantine".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_only_occluded_pivot_blanks_a_pivot() {
        let occluded: Vec<ScenarioId> = ScenarioId::all()
            .into_iter()
            .filter(|id| id.shape().occluded_pivot)
            .collect();
        assert_eq!(occluded, vec![ScenarioId::OccludedPivot]);
    }
}
