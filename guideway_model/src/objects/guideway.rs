use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use geo::{LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::geometry;
use crate::osm;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuidewayID(pub usize);

impl fmt::Display for GuidewayID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Guideway #{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneID(pub usize);

impl fmt::Display for LaneID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lane #{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TravelMode {
    Vehicle,
    Pedestrian,
    Bicycle,
    Rail,
}

impl TravelMode {
    /// The one-letter code used in conflict zone severity codes.
    pub fn letter(self) -> char {
        match self {
            TravelMode::Vehicle => 'v',
            TravelMode::Pedestrian => 'p',
            TravelMode::Bicycle => 'b',
            TravelMode::Rail => 'r',
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Maneuver {
    Through,
    RightTurn,
    LeftTurn,
}

/// The upstream lane segment a guideway begins or ends at. Guideways refer to
/// lanes by ID only; the registry owns the records, so there are no cycles
/// between the two.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneID,
    /// Compass bearing of the lane in degrees [0, 360).
    pub bearing: f64,
    /// IDs of the path segments this lane belongs to, in path order. A
    /// guideway originating here inherits the last one.
    pub path_ids: Vec<usize>,
    /// Raw traffic control tags inherited from the map import
    /// (`traffic_signals=yes` and friends).
    pub meta: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LaneRegistry {
    lanes: BTreeMap<LaneID, Lane>,
}

impl LaneRegistry {
    pub fn new() -> LaneRegistry {
        LaneRegistry {
            lanes: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, lane: Lane) {
        self.lanes.insert(lane.id, lane);
    }

    pub fn get(&self, id: LaneID) -> Option<&Lane> {
        self.lanes.get(&id)
    }
}

/// An idealized directed travel corridor through one intersection, traced by a
/// left border, a right border, and a median centerline, all oriented
/// origin to destination. Crosswalks are pedestrian-mode guideways.
#[derive(Clone, Debug)]
pub struct Guideway {
    pub id: GuidewayID,
    pub mode: TravelMode,
    pub maneuver: Maneuver,
    pub left_border: LineString<f64>,
    pub right_border: LineString<f64>,
    /// Conflict zone distances are measured along this.
    pub median: LineString<f64>,
    /// Direct bearing in degrees, when known. Lookups fall back to the
    /// origin/destination lane.
    pub bearing: Option<f64>,
    pub origin_lane: Option<LaneID>,
    pub destination_lane: Option<LaneID>,
    /// Direct origin path id, when known. Falls back to the origin lane.
    pub path_id: Option<usize>,
    /// Direct traffic control tags. Falls back to the origin lane's meta.
    pub traffic_control: Option<BTreeMap<String, String>>,
    /// Labels of the border reductions applied so far, in order. Conflict
    /// zones snapshot this to detect staleness later.
    pub cut_history: Vec<String>,
    /// Set once conflict zone reduction has run: the corridor trimmed back to
    /// its conflicts.
    pub reduced_left_border: Option<LineString<f64>>,
    pub reduced_median: Option<LineString<f64>>,
    pub reduced_right_border: Option<LineString<f64>>,
}

impl Guideway {
    pub fn new(
        id: GuidewayID,
        mode: TravelMode,
        maneuver: Maneuver,
        left_border: LineString<f64>,
        median: LineString<f64>,
        right_border: LineString<f64>,
    ) -> Guideway {
        Guideway {
            id,
            mode,
            maneuver,
            left_border,
            right_border,
            median,
            bearing: None,
            origin_lane: None,
            destination_lane: None,
            path_id: None,
            traffic_control: None,
            cut_history: Vec::new(),
            reduced_left_border: None,
            reduced_median: None,
            reduced_right_border: None,
        }
    }

    pub fn origin_bearing(&self, lanes: &LaneRegistry) -> Option<f64> {
        self.bearing.or_else(|| {
            self.origin_lane
                .and_then(|l| lanes.get(l))
                .map(|l| l.bearing)
        })
    }

    pub fn destination_bearing(&self, lanes: &LaneRegistry) -> Option<f64> {
        self.bearing.or_else(|| {
            self.destination_lane
                .and_then(|l| lanes.get(l))
                .map(|l| l.bearing)
        })
    }

    /// The path segment this guideway comes from. Two guideways sharing one
    /// never conflict; they're consecutive pieces of the same path.
    pub fn origin_path_id(&self, lanes: &LaneRegistry) -> Option<usize> {
        self.path_id.or_else(|| {
            self.origin_lane
                .and_then(|l| lanes.get(l))
                .and_then(|l| l.path_ids.last().copied())
        })
    }

    /// Whether this guideway runs under a traffic signal, according to its own
    /// tags or its origin lane's. None when there's no record either way.
    pub fn has_traffic_signals(&self, lanes: &LaneRegistry) -> Option<bool> {
        let meta = match self.traffic_control.as_ref() {
            Some(meta) => meta,
            None => &self.origin_lane.and_then(|l| lanes.get(l))?.meta,
        };
        meta.get(osm::TRAFFIC_SIGNALS).map(|v| v == "yes")
    }

    /// The corridor's footprint region, for overlap tests against other
    /// guideways.
    pub fn corridor_footprint(&self) -> Result<MultiPolygon<f64>> {
        geometry::corridor_footprint(&self.left_border, &self.right_border)
    }
}
