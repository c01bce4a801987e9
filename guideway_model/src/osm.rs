//! Common OSM keys and IDs. Keys used in just one or two places don't really
//! need to be defined here.

use std::fmt;

use serde::{Deserialize, Serialize};

// These're normal OSM keys.
pub const TRAFFIC_SIGNALS: &str = "traffic_signals";
pub const RAILWAY: &str = "railway";
pub const TUNNEL: &str = "tunnel";
pub const SUBWAY: &str = "subway";
pub const LAYER: &str = "layer";

// Inserted by the rail splitter to plumb whether a track got cut at a street
// crossing to later stages.
pub const CUT: &str = "cut";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeID(pub i64);

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "https://www.openstreetmap.org/node/{}", self.0)
    }
}
