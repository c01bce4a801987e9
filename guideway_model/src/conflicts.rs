//! Pairwise conflict zones between the guideways of one intersection: where
//! the corridors overlap, how bad the conflict is, and how far along each
//! guideway it happens.

use std::collections::HashMap;

use geo::{BooleanOps, Intersects, LineString, MultiPolygon, Point};

use crate::geometry;
use crate::{ConflictZone, Guideway, GuidewayID, LaneRegistry, Maneuver, TravelMode};

/// Memoizes corridor footprint intersections within one intersection's
/// analysis. Keyed by the unordered guideway pair, so either evaluation order
/// hits the same entry. Callers must reuse one cache across all pair queries
/// of an analysis; separate intersections get separate caches.
#[derive(Default)]
pub struct PolygonCache {
    cached: HashMap<(GuidewayID, GuidewayID), Option<MultiPolygon<f64>>>,
}

impl PolygonCache {
    pub fn new() -> PolygonCache {
        PolygonCache {
            cached: HashMap::new(),
        }
    }

    /// How many unordered pairs have been computed so far.
    pub fn len(&self) -> usize {
        self.cached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }

    fn key(g1: GuidewayID, g2: GuidewayID) -> (GuidewayID, GuidewayID) {
        if g1 <= g2 {
            (g1, g2)
        } else {
            (g2, g1)
        }
    }

    /// The overlap of the two corridor footprints, or None when they don't
    /// touch. Computed at most once per unordered pair; "computed, no
    /// intersection" is cached too.
    pub fn corridor_intersection(
        &mut self,
        g1: &Guideway,
        g2: &Guideway,
    ) -> Option<MultiPolygon<f64>> {
        let key = PolygonCache::key(g1.id, g2.id);
        if let Some(region) = self.cached.get(&key) {
            return region.clone();
        }
        let region = PolygonCache::compute(g1, g2);
        self.cached.insert(key, region.clone());
        region
    }

    fn compute(g1: &Guideway, g2: &Guideway) -> Option<MultiPolygon<f64>> {
        let footprint1 = match g1.corridor_footprint() {
            Ok(fp) => fp,
            Err(err) => {
                warn!("Can't build a corridor footprint for {}: {}", g1.id, err);
                return None;
            }
        };
        let footprint2 = match g2.corridor_footprint() {
            Ok(fp) => fp,
            Err(err) => {
                warn!("Can't build a corridor footprint for {}: {}", g2.id, err);
                return None;
            }
        };
        if !footprint1.intersects(&footprint2) {
            return None;
        }
        let region = footprint1.intersection(&footprint2);
        if region.0.is_empty() {
            None
        } else {
            Some(region)
        }
    }
}

fn roughly_perpendicular(delta_degrees: f64) -> bool {
    (225.0 < delta_degrees && delta_degrees < 315.0)
        || (45.0 < delta_degrees && delta_degrees < 135.0)
}

/// Severity digit for a conflict between `g1` and `g2`, in 1-4. Right turns
/// yield informally, so they only rate a 1 unless they cross a pedestrian
/// path. Signalized guideways rate 2 or 3 depending on whether the two
/// movements run roughly perpendicular; without any signal record the default
/// is an unsignalized 3. Bearings that can't be resolved even through the lane
/// fallback also land on the default.
pub fn classify(g1: &Guideway, g2: &Guideway, lanes: &LaneRegistry) -> u8 {
    if g1.maneuver == Maneuver::RightTurn || g2.maneuver == Maneuver::RightTurn {
        if g1.mode == TravelMode::Pedestrian || g2.mode == TravelMode::Pedestrian {
            return 4;
        }
        return 1;
    }

    if g1.has_traffic_signals(lanes) == Some(true) {
        if g1.mode == TravelMode::Pedestrian || g2.mode == TravelMode::Pedestrian {
            if let (Some(b1), Some(b2)) = (
                g1.destination_bearing(lanes),
                g2.destination_bearing(lanes),
            ) {
                let delta = (b1 - b2 + 360.0) % 360.0;
                return if roughly_perpendicular(delta) { 3 } else { 2 };
            }
            return 3;
        }

        if let (Some(b1), Some(b2)) = (g1.origin_bearing(lanes), g2.origin_bearing(lanes)) {
            let delta = (b2 - b1 + 360.0) % 360.0;
            return if roughly_perpendicular(delta) { 2 } else { 3 };
        }
    }

    3
}

/// The full 3-character severity code: digit plus both mode letters, in
/// evaluation order.
pub fn severity_code(g1: &Guideway, g2: &Guideway, lanes: &LaneRegistry) -> String {
    format!(
        "{}{}{}",
        classify(g1, g2, lanes),
        g1.mode.letter(),
        g2.mode.letter()
    )
}

/// The conflict zone between one ordered pair of guideways, if any. No zone
/// for a guideway against itself, for guideways continuing the same path, for
/// two pedestrian guideways, or when the corridors or the median never meet.
/// `sequence` and `id` are left for the per-guideway ordering pass.
pub fn conflict_zone_between(
    g1: &Guideway,
    g2: &Guideway,
    lanes: &LaneRegistry,
    cache: &mut PolygonCache,
) -> Option<ConflictZone> {
    if g1.id == g2.id {
        return None;
    }
    if let (Some(p1), Some(p2)) = (g1.origin_path_id(lanes), g2.origin_path_id(lanes)) {
        if p1 == p2 {
            return None;
        }
    }
    if g1.mode == TravelMode::Pedestrian && g2.mode == TravelMode::Pedestrian {
        return None;
    }

    let region = cache.corridor_intersection(g1, g2)?;
    let distance = geometry::first_contact_distance(&g1.median, &region)?;

    let severity = classify(g1, g2, lanes);
    Some(ConflictZone {
        guideway1: g1.id,
        guideway2: g2.id,
        severity,
        code: format!("{}{}{}", severity, g1.mode.letter(), g2.mode.letter()),
        region,
        distance,
        cut_history1: g1.cut_history.clone(),
        cut_history2: g2.cut_history.clone(),
        sequence: 0,
        id: String::new(),
    })
}

/// All conflict zones for one guideway against a candidate set, ordered by
/// distance along the guideway's median, with `sequence` and `id` assigned.
pub fn conflict_zones_for(
    guideway: &Guideway,
    all_guideways: &[Guideway],
    lanes: &LaneRegistry,
    cache: &mut PolygonCache,
) -> Vec<ConflictZone> {
    let mut zones: Vec<ConflictZone> = all_guideways
        .iter()
        .filter_map(|g2| conflict_zone_between(guideway, g2, lanes, cache))
        .collect();
    zones.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
    for (i, zone) in zones.iter_mut().enumerate() {
        zone.sequence = i;
        zone.id = zone.compose_id();
    }
    zones
}

/// Trim a guideway's working geometry back to its farthest conflict: the
/// median stops where it first enters the last zone's region, and each border
/// stops at the along-border distance matching the median's new endpoint.
/// Results land in the `reduced_*` fields; with no zones, nothing changes.
/// Reduction always starts from the full borders, so re-running it with the
/// same zones is idempotent.
pub fn reduce_borders(guideway: &mut Guideway, zones: &[ConflictZone]) {
    let last = match zones.last() {
        Some(z) => z,
        None => {
            return;
        }
    };
    let (left, median, right) = match cut_to_region(guideway, &last.region) {
        Some(cut) => cut,
        None => {
            return;
        }
    };
    guideway.reduced_left_border = Some(left);
    guideway.reduced_median = Some(median);
    guideway.reduced_right_border = Some(right);
}

/// Cut a guideway's borders back to one particular zone, not necessarily its
/// farthest. The zone must involve the guideway; a mismatch is reported and
/// yields nothing, so batch callers can keep going.
pub fn cut_borders_to_zone(
    guideway: &Guideway,
    zone: &ConflictZone,
) -> Option<(LineString<f64>, LineString<f64>, LineString<f64>)> {
    if !zone.involves(guideway.id) {
        warn!(
            "Conflict zone ({}, {}) does not belong to {}",
            zone.guideway1, zone.guideway2, guideway.id
        );
        return None;
    }
    cut_to_region(guideway, &zone.region)
}

fn cut_to_region(
    guideway: &Guideway,
    region: &MultiPolygon<f64>,
) -> Option<(LineString<f64>, LineString<f64>, LineString<f64>)> {
    let median = geometry::cut_border_by_region(&guideway.median, region);
    let end = Point::from(*median.0.last()?);

    let left_dist = geometry::project_distance(&guideway.left_border, end);
    let left = geometry::cut_border_at_distance(&guideway.left_border, left_dist).0;
    let right_dist = geometry::project_distance(&guideway.right_border, end);
    let right = geometry::cut_border_at_distance(&guideway.right_border, right_dist).0;
    Some((left, median, right))
}

/// Analyze every guideway of an intersection with one shared cache. The
/// result is indexed parallel to `guideways`; each guideway with at least one
/// conflict also gets its reduced borders filled in.
pub fn find_all_conflicts(
    guideways: &mut [Guideway],
    lanes: &LaneRegistry,
    cache: &mut PolygonCache,
) -> Vec<Vec<ConflictZone>> {
    let mut result = Vec::with_capacity(guideways.len());
    for i in 0..guideways.len() {
        let zones = conflict_zones_for(&guideways[i], &*guideways, lanes, cache);
        reduce_borders(&mut guideways[i], &zones);
        result.push(zones);
    }
    result
}

/// Which of a zone's two participants a guideway is being checked as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ZoneSlot {
    First,
    Second,
}

/// How `zone_matches_guideway` compares the guideway's cut history with the
/// zone's snapshot. The entry-wise comparison this API shipped with was broken
/// (every entry got compared against one fixed value), so in practice only
/// the length check ever decided anything. `LengthOnly` preserves that
/// long-standing behavior for data produced under it; `Positional` is the
/// corrected entry-by-entry comparison.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HistoryCheck {
    LengthOnly,
    Positional,
}

/// True if the zone still describes this guideway: the id matches the given
/// slot and the guideway's current cut history is consistent with the snapshot
/// taken when the zone was built. A guideway cut again since then stops
/// matching, which is the point.
pub fn zone_matches_guideway(
    zone: &ConflictZone,
    guideway: &Guideway,
    slot: ZoneSlot,
    check: HistoryCheck,
) -> bool {
    let (zone_id, snapshot) = match slot {
        ZoneSlot::First => (zone.guideway1, &zone.cut_history1),
        ZoneSlot::Second => (zone.guideway2, &zone.cut_history2),
    };
    if guideway.id != zone_id || guideway.cut_history.len() != snapshot.len() {
        return false;
    }
    match check {
        HistoryCheck::LengthOnly => true,
        HistoryCheck::Positional => guideway
            .cut_history
            .iter()
            .zip(snapshot.iter())
            .all(|(current, snap)| current == snap),
    }
}

#[cfg(test)]
mod tests {
    use geo::LineString;

    use super::*;
    use crate::GuidewayID;

    // Corridors 0.0002 degrees wide around (0, 0), so footprint math stays in
    // a comfortably planar regime.
    fn eastbound(id: usize) -> Guideway {
        Guideway::new(
            GuidewayID(id),
            TravelMode::Vehicle,
            Maneuver::Through,
            LineString::from(vec![(-0.001, 0.0001), (0.001, 0.0001)]),
            LineString::from(vec![(-0.001, 0.0), (0.001, 0.0)]),
            LineString::from(vec![(-0.001, -0.0001), (0.001, -0.0001)]),
        )
    }

    fn northbound(id: usize, center_x: f64) -> Guideway {
        Guideway::new(
            GuidewayID(id),
            TravelMode::Vehicle,
            Maneuver::Through,
            LineString::from(vec![(center_x - 0.0001, -0.001), (center_x - 0.0001, 0.001)]),
            LineString::from(vec![(center_x, -0.001), (center_x, 0.001)]),
            LineString::from(vec![(center_x + 0.0001, -0.001), (center_x + 0.0001, 0.001)]),
        )
    }

    #[test]
    fn crossing_through_guideways_conflict() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let g1 = eastbound(1);
        let g2 = northbound(2, 0.0);

        let zones = conflict_zones_for(&g1, std::slice::from_ref(&g2), &lanes, &mut cache);
        assert_eq!(zones.len(), 1);
        let zone = &zones[0];
        // No signal metadata anywhere: unsignalized default.
        assert_eq!(zone.code, "3vv");
        assert_eq!(zone.severity, 3);
        assert_eq!(zone.sequence, 0);
        assert_eq!(zone.id, "1_2_0");
        // The median runs 0.002 degrees and first touches the overlap at
        // x = -0.0001.
        assert!((zone.distance - 0.45).abs() < 1e-6);
    }

    #[test]
    fn no_conflict_with_self_or_same_path() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let g1 = eastbound(1);
        assert!(conflict_zones_for(&g1, std::slice::from_ref(&g1), &lanes, &mut cache).is_empty());

        let mut a = eastbound(1);
        let mut b = northbound(2, 0.0);
        a.path_id = Some(5);
        b.path_id = Some(5);
        assert!(conflict_zone_between(&a, &b, &lanes, &mut cache).is_none());
    }

    #[test]
    fn no_pedestrian_pedestrian_conflicts() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let mut a = eastbound(1);
        let mut b = northbound(2, 0.0);
        a.mode = TravelMode::Pedestrian;
        b.mode = TravelMode::Pedestrian;
        assert!(conflict_zone_between(&a, &b, &lanes, &mut cache).is_none());
    }

    #[test]
    fn cache_computes_each_pair_once() {
        let mut cache = PolygonCache::new();
        let g1 = eastbound(1);
        let g2 = northbound(2, 0.0);

        let first = cache.corridor_intersection(&g1, &g2);
        assert!(first.is_some());
        assert_eq!(cache.len(), 1);

        // The reversed query hits the same entry.
        let second = cache.corridor_intersection(&g2, &g1);
        assert_eq!(cache.len(), 1);
        use geo::Area;
        assert!(
            (first.unwrap().unsigned_area() - second.unwrap().unsigned_area()).abs() < 1e-15
        );

        // "No intersection" is cached as well.
        let far = northbound(3, 0.5);
        assert!(cache.corridor_intersection(&g1, &far).is_none());
        assert_eq!(cache.len(), 2);
        assert!(cache.corridor_intersection(&far, &g1).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn right_turns_get_severity_1_or_4() {
        let lanes = LaneRegistry::new();
        let mut turning = eastbound(1);
        turning.maneuver = Maneuver::RightTurn;

        let vehicle = northbound(2, 0.0);
        assert_eq!(classify(&turning, &vehicle, &lanes), 1);

        let mut crosswalk = northbound(3, 0.0);
        crosswalk.mode = TravelMode::Pedestrian;
        assert_eq!(classify(&turning, &crosswalk, &lanes), 4);
        assert_eq!(severity_code(&turning, &crosswalk, &lanes), "4vp");
        // Symmetric: the right turn can be the second guideway.
        assert_eq!(classify(&crosswalk, &turning, &lanes), 4);
    }

    #[test]
    fn signalized_severity_depends_on_bearings() {
        let lanes = LaneRegistry::new();
        let mut g1 = eastbound(1);
        let mut signals = std::collections::BTreeMap::new();
        signals.insert("traffic_signals".to_string(), "yes".to_string());
        g1.traffic_control = Some(signals);
        g1.bearing = Some(90.0);

        // Perpendicular origins under a signal run in separate phases.
        let mut crossing = northbound(2, 0.0);
        crossing.bearing = Some(0.0);
        assert_eq!(classify(&g1, &crossing, &lanes), 2);

        // Opposing origins share a phase.
        let mut opposing = northbound(3, 0.0);
        opposing.bearing = Some(270.0);
        assert_eq!(classify(&g1, &opposing, &lanes), 3);

        // Against a pedestrian path, destination bearings decide, with the
        // ranges flipped.
        let mut crosswalk = northbound(4, 0.0);
        crosswalk.mode = TravelMode::Pedestrian;
        crosswalk.bearing = Some(0.0);
        assert_eq!(classify(&g1, &crosswalk, &lanes), 3);
        crosswalk.bearing = Some(270.0);
        assert_eq!(classify(&g1, &crosswalk, &lanes), 2);

        // A missing bearing falls back to the unsignalized default.
        let unknown = northbound(5, 0.0);
        assert_eq!(classify(&g1, &unknown, &lanes), 3);

        // Pure function: same inputs, same answer.
        assert_eq!(
            classify(&g1, &crossing, &lanes),
            classify(&g1, &crossing, &lanes)
        );
    }

    #[test]
    fn zones_are_ordered_and_reduce_borders() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let mut g1 = eastbound(1);
        // Two crossings, the second one farther along g1's median.
        let near = northbound(2, -0.0005);
        let far = northbound(3, 0.0005);
        let candidates = vec![far, near];

        let zones = conflict_zones_for(&g1, &candidates, &lanes, &mut cache);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].guideway2, GuidewayID(2));
        assert_eq!(zones[1].guideway2, GuidewayID(3));
        assert!(zones[0].distance < zones[1].distance);
        assert_eq!(zones[0].sequence, 0);
        assert_eq!(zones[1].sequence, 1);
        assert_eq!(zones[1].id, "1_3_1");

        reduce_borders(&mut g1, &zones);
        let median = g1.reduced_median.clone().unwrap();
        // The median now ends where it enters the farthest zone.
        let end = median.0.last().unwrap();
        assert!((end.x - 0.0004).abs() < 1e-9);
        assert!(end.y.abs() < 1e-9);
        let left = g1.reduced_left_border.clone().unwrap();
        assert!((left.0.last().unwrap().x - 0.0004).abs() < 1e-9);

        // Re-running with the same zones doesn't drift.
        reduce_borders(&mut g1, &zones);
        assert_eq!(g1.reduced_median, Some(median));
    }

    #[test]
    fn no_zones_leaves_borders_alone() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let mut g1 = eastbound(1);
        let zones = conflict_zones_for(&g1, &[], &lanes, &mut cache);
        assert!(zones.is_empty());
        reduce_borders(&mut g1, &zones);
        assert!(g1.reduced_median.is_none());
        assert!(g1.reduced_left_border.is_none());
        assert!(g1.reduced_right_border.is_none());
    }

    #[test]
    fn cut_borders_rejects_foreign_zones() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let g1 = eastbound(1);
        let g2 = northbound(2, 0.0);
        let zones = conflict_zones_for(&g1, std::slice::from_ref(&g2), &lanes, &mut cache);

        let stranger = eastbound(9);
        assert!(cut_borders_to_zone(&stranger, &zones[0]).is_none());

        // Either participant is fine.
        assert!(cut_borders_to_zone(&g1, &zones[0]).is_some());
        let (left, median, right) = cut_borders_to_zone(&g2, &zones[0]).unwrap();
        assert!(left.0.len() >= 2);
        assert!(median.0.len() >= 2);
        assert!(right.0.len() >= 2);
    }

    #[test]
    fn find_all_conflicts_shares_one_cache() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let mut guideways = vec![eastbound(1), northbound(2, 0.0)];

        let all = find_all_conflicts(&mut guideways, &lanes, &mut cache);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].len(), 1);
        assert_eq!(all[1].len(), 1);
        // One unordered pair, computed once despite both perspectives.
        assert_eq!(cache.len(), 1);
        assert!(guideways[0].reduced_median.is_some());
        assert!(guideways[1].reduced_median.is_some());
    }

    #[test]
    fn revalidation_checks_id_and_history() {
        let lanes = LaneRegistry::new();
        let mut cache = PolygonCache::new();
        let mut g1 = eastbound(1);
        g1.cut_history.push("crosswalk".to_string());
        let g2 = northbound(2, 0.0);
        let zones = conflict_zones_for(&g1, std::slice::from_ref(&g2), &lanes, &mut cache);
        let zone = &zones[0];

        assert!(zone_matches_guideway(
            zone,
            &g1,
            ZoneSlot::First,
            HistoryCheck::Positional
        ));
        // Wrong slot: g1 isn't the second participant.
        assert!(!zone_matches_guideway(
            zone,
            &g1,
            ZoneSlot::Second,
            HistoryCheck::Positional
        ));
        assert!(zone_matches_guideway(
            zone,
            &g2,
            ZoneSlot::Second,
            HistoryCheck::Positional
        ));

        // A later cut invalidates the zone in either mode.
        let mut mutated = g1.clone();
        mutated.cut_history.push("blind zone".to_string());
        assert!(!zone_matches_guideway(
            zone,
            &mutated,
            ZoneSlot::First,
            HistoryCheck::LengthOnly
        ));

        // Same length, different label: only the strict mode notices.
        let mut relabeled = g1.clone();
        relabeled.cut_history[0] = "median".to_string();
        assert!(zone_matches_guideway(
            zone,
            &relabeled,
            ZoneSlot::First,
            HistoryCheck::LengthOnly
        ));
        assert!(!zone_matches_guideway(
            zone,
            &relabeled,
            ZoneSlot::First,
            HistoryCheck::Positional
        ));
    }
}
