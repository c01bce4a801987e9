//! Turn geometry: a circular arc joining the end of an origin border to the
//! start of a destination border, G1-continuous at both ends.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Line, LineString, Point};

use crate::geometry;

/// How far to extend the terminal border segments when hunting for the
/// tangent crossing, in meters.
const TANGENT_EXTENSION_M: f64 = 300.0;

/// Turn angles closer than this (in degrees) to 0 or 180 make the arc radius
/// blow up or collapse.
const DEGENERATE_ANGLE_DEG: f64 = 0.5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TurnDirection {
    Left,
    Right,
}

impl TurnDirection {
    fn sign(self) -> f64 {
        match self {
            TurnDirection::Left => -1.0,
            TurnDirection::Right => 1.0,
        }
    }
}

/// Join the end of `origin_border` to the start of `destination_border` with
/// a circular arc sampled at `num_points + 1` coordinates.
///
/// The arc starts tangent to the origin border's final segment and lands
/// tangent to the destination border's first segment. When the two tangent
/// distances to their crossing differ, the longer side gets the difference as
/// a straight lead-in so both ends stay tangent. None when the terminal
/// tangents never cross or the turn angle is too degenerate for a radius.
pub fn construct_turn_arc(
    origin_border: &LineString<f64>,
    destination_border: &LineString<f64>,
    num_points: usize,
    direction: TurnDirection,
) -> Option<LineString<f64>> {
    if origin_border.0.len() < 2 || destination_border.0.len() < 2 || num_points == 0 {
        return None;
    }
    let sign = direction.sign();

    let (crossing, bearing_in, bearing_out) = tangent_crossing(origin_border, destination_border)?;
    let origin_end = Point::from(*origin_border.0.last().unwrap());
    let destination_start = Point::from(destination_border.0[0]);

    let to_origin = geometry::gps_dist_meters(crossing, origin_end);
    let to_destination = geometry::gps_dist_meters(crossing, destination_start);

    let angle = (sign * (bearing_out - bearing_in) + 360.0) % 360.0;
    if angle < DEGENERATE_ANGLE_DEG
        || angle > 360.0 - DEGENERATE_ANGLE_DEG
        || (angle - 180.0).abs() < DEGENERATE_ANGLE_DEG
    {
        return None;
    }

    // The shorter tangent sets where the arc begins; the longer side carries
    // the difference as a straight lead-in.
    let (start_dist, lead_in) = if to_origin < to_destination {
        (to_origin, 0.0)
    } else {
        (to_destination, to_origin - to_destination)
    };

    let radius = start_dist / (angle / 2.0).to_radians().tan();
    if !radius.is_finite() || radius.abs() < 1e-3 {
        return None;
    }

    // Advance along the initial tangent by arc length, then push each sample
    // sideways onto the circle through a bearing-and-distance shift.
    let lateral_bearing = bearing_in + sign * 90.0;
    let mut pts = Vec::with_capacity(num_points + 1);
    for i in 0..=num_points {
        let frac = (i as f64) / (num_points as f64);
        let along = lead_in + radius * (angle * frac).to_radians().sin();
        let base = advance_towards(origin_end, crossing, along);
        let lateral = 2.0 * radius * ((angle / 2.0 * frac).to_radians().sin()).powi(2);
        pts.push(geometry::project_away(base, lateral, lateral_bearing).into());
    }
    Some(LineString(pts))
}

/// Where the two borders' terminal tangents cross, plus the compass bearing
/// into the crossing (along the origin border) and out of it (along the
/// destination border).
fn tangent_crossing(
    origin_border: &LineString<f64>,
    destination_border: &LineString<f64>,
) -> Option<(Point<f64>, f64, f64)> {
    let n = origin_border.0.len();
    let origin_from = Point::from(origin_border.0[n - 2]);
    let origin_to = Point::from(origin_border.0[n - 1]);
    let dest_from = Point::from(destination_border.0[0]);
    let dest_to = Point::from(destination_border.0[1]);

    let (_, origin_ext) = geometry::extend_segment(origin_from, origin_to, TANGENT_EXTENSION_M, false);
    let (dest_ext, _) = geometry::extend_segment(dest_from, dest_to, TANGENT_EXTENSION_M, true);

    let crossing = match line_intersection(
        Line::new(origin_from, origin_ext),
        Line::new(dest_ext, dest_to),
    )? {
        LineIntersection::SinglePoint { intersection, .. } => Point::from(intersection),
        LineIntersection::Collinear { .. } => {
            return None;
        }
    };

    let bearing_in = geometry::compass_bearing(origin_to, crossing);
    // Leaving the crossing, travel continues towards the destination border's
    // start, unless the crossing already sits past it.
    let bearing_out = if geometry::gps_dist_meters(crossing, dest_from) < 0.01 {
        geometry::compass_bearing(dest_from, dest_to)
    } else {
        let ahead = (dest_from.x() - crossing.x()) * (dest_to.x() - dest_from.x())
            + (dest_from.y() - crossing.y()) * (dest_to.y() - dest_from.y());
        if ahead > 0.0 {
            geometry::compass_bearing(crossing, dest_from)
        } else {
            geometry::compass_bearing(crossing, dest_to)
        }
    };
    Some((crossing, bearing_in, bearing_out))
}

/// The point `dist_meters` along the ray from `from` through `towards`,
/// scaled in degree space the same way the borders themselves are.
fn advance_towards(from: Point<f64>, towards: Point<f64>, dist_meters: f64) -> Point<f64> {
    let current = geometry::gps_dist_meters(from, towards);
    if current < 0.01 {
        return from;
    }
    let scale = dist_meters / current;
    Point::new(
        from.x() + (towards.x() - from.x()) * scale,
        from.y() + (towards.y() - from.y()) * scale,
    )
}
