//! Splits rail tracks at street crossings and filters out underground rail.
//!
//! Tracks that pass through an intersection get cut at the shared node, so
//! that the pieces enter or leave that crossing instead of running straight
//! through it. Subways and other underground rail never interact with surface
//! traffic and are dropped up front.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::osm;

/// One OSM railway way, reduced to the parts the splitter needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RailTrack {
    pub id: i64,
    /// Set on pieces produced by splitting; points back at the way the piece
    /// came from, even across repeated splits.
    pub original_id: Option<i64>,
    pub nodes: Vec<osm::NodeID>,
    pub tags: BTreeMap<String, String>,
}

impl RailTrack {
    pub fn new(id: i64, nodes: Vec<osm::NodeID>, tags: BTreeMap<String, String>) -> RailTrack {
        RailTrack {
            id,
            original_id: None,
            nodes,
            tags,
        }
    }

    pub fn tag_is(&self, key: &str, value: &str) -> bool {
        self.tags.get(key).map(|v| v == value).unwrap_or(false)
    }

    /// The OSM layer, treating a missing or malformed tag as ground level.
    pub fn layer(&self) -> i64 {
        self.tags
            .get(osm::LAYER)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    }

    pub fn is_underground(&self) -> bool {
        self.tag_is(osm::RAILWAY, "subway")
            || self.tag_is(osm::TUNNEL, "yes")
            || self.tag_is(osm::SUBWAY, "yes")
            || self.layer() < 0
    }
}

/// Drops subways, tunnels, and anything mapped below ground level.
pub fn remove_subways(tracks: Vec<RailTrack>) -> Vec<RailTrack> {
    tracks.into_iter().filter(|t| !t.is_underground()).collect()
}

/// Cuts each track that passes through one of `crossing_nodes` at the first
/// such node. One split per track; a piece that still passes through a later
/// crossing stays in one piece. A node only counts as a pass-through when
/// it's strictly interior to the track; tracks that merely start or end at a
/// crossing are left whole and tagged `cut=no`. Pieces come first in the
/// output, then the uncut tracks.
pub fn split_railways(
    tracks: Vec<RailTrack>,
    crossing_nodes: &BTreeSet<osm::NodeID>,
) -> Vec<RailTrack> {
    let mut pieces = Vec::new();
    let mut uncut = Vec::new();
    for mut track in tracks {
        match interior_crossing(&track, crossing_nodes) {
            Some(idx) => {
                let (before, after) = split_track_at(&track, idx);
                pieces.push(before);
                pieces.push(after);
            }
            None => {
                track.tags.insert(osm::CUT.to_string(), "no".to_string());
                uncut.push(track);
            }
        }
    }
    pieces.extend(uncut);
    pieces
}

fn interior_crossing(track: &RailTrack, crossing_nodes: &BTreeSet<osm::NodeID>) -> Option<usize> {
    if track.nodes.len() < 3 {
        return None;
    }
    (1..track.nodes.len() - 1).find(|i| crossing_nodes.contains(&track.nodes[*i]))
}

/// Cuts a track at node index `idx`, which both pieces share. Piece IDs are
/// derived from the parent's so that repeated splits stay unique, and both
/// pieces remember the way they were originally part of.
fn split_track_at(track: &RailTrack, idx: usize) -> (RailTrack, RailTrack) {
    let original_id = track.original_id.unwrap_or(track.id);
    let mut tags = track.tags.clone();
    tags.insert(osm::CUT.to_string(), "yes".to_string());

    let before = RailTrack {
        id: (track.id % 10_000) * 100 + 1,
        original_id: Some(original_id),
        nodes: track.nodes[..=idx].to_vec(),
        tags: tags.clone(),
    };
    let after = RailTrack {
        id: (track.id % 10_000) * 100 + 2,
        original_id: Some(original_id),
        nodes: track.nodes[idx..].to_vec(),
        tags,
    };
    (before, after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64) -> osm::NodeID {
        osm::NodeID(id)
    }

    fn track(id: i64, nodes: Vec<i64>) -> RailTrack {
        RailTrack::new(id, nodes.into_iter().map(node).collect(), BTreeMap::new())
    }

    #[test]
    fn splits_at_interior_crossing() {
        let crossings: BTreeSet<osm::NodeID> = [node(2)].into_iter().collect();
        let result = split_railways(vec![track(1234, vec![0, 1, 2, 3])], &crossings);

        assert_eq!(result.len(), 2);
        let before = result.iter().find(|t| t.nodes[0] == node(0)).unwrap();
        let after = result.iter().find(|t| t.nodes[0] == node(2)).unwrap();

        assert_eq!(before.nodes, vec![node(0), node(1), node(2)]);
        assert_eq!(after.nodes, vec![node(2), node(3)]);
        assert_eq!(before.id, 123_401);
        assert_eq!(after.id, 123_402);
        assert_eq!(before.original_id, Some(1234));
        assert_eq!(after.original_id, Some(1234));
        assert!(before.tag_is(osm::CUT, "yes"));
        assert!(after.tag_is(osm::CUT, "yes"));
    }

    #[test]
    fn endpoints_dont_trigger_splits() {
        let crossings: BTreeSet<osm::NodeID> = [node(0), node(3)].into_iter().collect();
        let result = split_railways(vec![track(1, vec![0, 1, 2, 3])], &crossings);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].nodes.len(), 4);
        assert!(result[0].original_id.is_none());
        assert!(result[0].tag_is(osm::CUT, "no"));
    }

    #[test]
    fn splits_once_at_the_first_crossing() {
        let crossings: BTreeSet<osm::NodeID> = [node(1), node(3)].into_iter().collect();
        let result = split_railways(vec![track(7, vec![0, 1, 2, 3, 4])], &crossings);

        // One split per track: the second piece still runs through node 3.
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].nodes, vec![node(0), node(1)]);
        assert_eq!(result[1].nodes, vec![node(1), node(2), node(3), node(4)]);
        assert_eq!(result[0].id, 701);
        assert_eq!(result[1].id, 702);
        assert_eq!(interior_crossing(&result[1], &crossings), Some(2));
    }

    #[test]
    fn pieces_come_before_uncut_tracks() {
        let crossings: BTreeSet<osm::NodeID> = [node(5)].into_iter().collect();
        let whole = track(1, vec![0, 1, 2]);
        let through = track(2, vec![4, 5, 6]);
        let result = split_railways(vec![whole, through], &crossings);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].id, 201);
        assert_eq!(result[1].id, 202);
        assert!(result[0].tag_is(osm::CUT, "yes"));
        assert!(result[1].tag_is(osm::CUT, "yes"));
        assert_eq!(result[2].id, 1);
        assert!(result[2].tag_is(osm::CUT, "no"));
    }

    #[test]
    fn removes_underground_rail() {
        let mut subway = track(1, vec![0, 1]);
        subway
            .tags
            .insert(osm::RAILWAY.to_string(), "subway".to_string());
        let mut tunnel = track(2, vec![0, 1]);
        tunnel
            .tags
            .insert(osm::TUNNEL.to_string(), "yes".to_string());
        let mut below = track(3, vec![0, 1]);
        below.tags.insert(osm::LAYER.to_string(), "-2".to_string());
        let mut weird_layer = track(4, vec![0, 1]);
        weird_layer
            .tags
            .insert(osm::LAYER.to_string(), "0;1".to_string());
        let surface = track(5, vec![0, 1]);

        let kept = remove_subways(vec![subway, tunnel, below, weird_layer, surface]);
        let ids: Vec<i64> = kept.iter().map(|t| t.id).collect();
        // A layer tag that doesn't parse counts as ground level.
        assert_eq!(ids, vec![4, 5]);
    }
}
