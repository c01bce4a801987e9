//! Guideway geometry and conflict analysis for street intersections.
//!
//! A guideway is one possible movement through an intersection (a vehicle
//! going straight, a pedestrian crossing, a turning bicycle), represented as
//! a corridor of left border, median, and right border polylines in lon/lat.
//! This crate finds where corridors overlap, classifies how dangerous each
//! overlap is, and trims corridor geometry back to the conflict zones.

#[macro_use]
extern crate log;

mod conflicts;
pub mod geometry;
mod objects;
pub mod osm;
mod railway;
mod turns;

pub use crate::conflicts::{
    classify, conflict_zone_between, conflict_zones_for, cut_borders_to_zone, find_all_conflicts,
    reduce_borders, severity_code, zone_matches_guideway, HistoryCheck, PolygonCache, ZoneSlot,
};
pub use crate::objects::conflict::ConflictZone;
pub use crate::objects::guideway::{
    Guideway, GuidewayID, Lane, LaneID, LaneRegistry, Maneuver, TravelMode,
};
pub use crate::railway::{remove_subways, split_railways, RailTrack};
pub use crate::turns::{construct_turn_arc, TurnDirection};
