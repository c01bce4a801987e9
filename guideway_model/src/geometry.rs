//! Geometric glue shared by the conflict and turn code: corridor footprints,
//! border truncation, and great-circle helpers. Everything here works on raw
//! geo types in lon/lat degree space; distances returned in meters say so in
//! their names, all other distances are planar.

use anyhow::{bail, Result};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, BooleanOps, Contains, Coordinate, EuclideanLength, Line, LineLocatePoint, LineString,
    MultiPolygon, Point, Polygon,
};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Two coordinates closer than this (in degrees) are the same point.
const EPSILON_DEG: f64 = 1e-9;

/// Haversine distance between two lon/lat points, in meters.
pub fn gps_dist_meters(a: Point<f64>, b: Point<f64>) -> f64 {
    let lon1 = a.x().to_radians();
    let lon2 = b.x().to_radians();
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();

    let delta_lat = lat2 - lat1;
    let delta_lon = lon2 - lon1;

    let inner =
        (delta_lat / 2.0).sin().powi(2) + (delta_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    let c = 2.0 * inner.sqrt().atan2((1.0 - inner).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `a` to `b`, in degrees [0, 360).
pub fn compass_bearing(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let delta_lon = (b.x() - a.x()).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    (x.atan2(y).to_degrees() + 360.0) % 360.0
}

/// Great-circle destination: start at `pt` and travel `dist_meters` at
/// `bearing_degrees`. A negative distance travels the opposite way.
pub fn project_away(pt: Point<f64>, dist_meters: f64, bearing_degrees: f64) -> Point<f64> {
    let delta = dist_meters / EARTH_RADIUS_M;
    let theta = bearing_degrees.to_radians();
    let lat1 = pt.y().to_radians();
    let lon1 = pt.x().to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());
    Point::new(lon2.to_degrees(), lat2.to_degrees())
}

/// Rescale the segment from `start` to `end` so its great-circle length is
/// `length_meters`, keeping the start fixed (or the end, if `backward`).
/// Segments shorter than a centimeter have no usable direction and come back
/// unchanged.
pub fn extend_segment(
    start: Point<f64>,
    end: Point<f64>,
    length_meters: f64,
    backward: bool,
) -> (Point<f64>, Point<f64>) {
    let current = gps_dist_meters(start, end);
    if current < 0.01 {
        return (start, end);
    }
    let scale = length_meters / current;
    if backward {
        let new_start = Point::new(
            end.x() - (end.x() - start.x()) * scale,
            end.y() - (end.y() - start.y()) * scale,
        );
        (new_start, end)
    } else {
        let new_end = Point::new(
            start.x() + (end.x() - start.x()) * scale,
            start.y() + (end.y() - start.y()) * scale,
        );
        (start, new_end)
    }
}

/// The corridor footprint ring: the left border, then the right border walked
/// backwards. Borders with fewer than 2 points can't enclose anything; that's
/// a malformed guideway, which the caller was supposed to prevent.
pub fn corridor_polygon(left: &LineString<f64>, right: &LineString<f64>) -> Result<Polygon<f64>> {
    if left.0.len() < 2 || right.0.len() < 2 {
        bail!(
            "corridor borders need at least 2 points; got {} and {}",
            left.0.len(),
            right.0.len()
        );
    }
    let mut ring = left.0.clone();
    ring.extend(right.0.iter().rev().cloned());
    // Polygon::new closes the ring
    Ok(Polygon::new(LineString(ring), Vec::new()))
}

/// The corridor footprint as a valid region. A corridor whose borders cross
/// (U-ish turns pinch their own footprint) yields a self-intersecting ring;
/// that gets resolved into a proper multipolygon.
pub fn corridor_footprint(
    left: &LineString<f64>,
    right: &LineString<f64>,
) -> Result<MultiPolygon<f64>> {
    let polygon = corridor_polygon(left, right)?;
    if ring_is_simple(polygon.exterior()) {
        Ok(MultiPolygon(vec![polygon]))
    } else {
        Ok(resolve_self_intersections(polygon.exterior()))
    }
}

/// True if no two non-adjacent segments of the closed ring touch.
pub fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let lines: Vec<Line<f64>> = ring.lines().collect();
    let n = lines.len();
    for i in 0..n {
        for j in (i + 1)..n {
            // Adjacent segments always share a vertex; so do the first and
            // last segments of a closed ring.
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if line_intersection(lines[i], lines[j]).is_some() {
                return false;
            }
        }
    }
    true
}

/// Resolve a self-intersecting ring into a valid multipolygon: insert the
/// crossing points, peel off each simple loop, and union the loops. The planar
/// equivalent of a zero-width buffer.
pub fn resolve_self_intersections(ring: &LineString<f64>) -> MultiPolygon<f64> {
    let lines: Vec<Line<f64>> = ring.lines().collect();

    // Rebuild the ring with every crossing point present as a vertex.
    let mut cycle: Vec<Coordinate<f64>> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let mut cuts: Vec<(f64, Coordinate<f64>)> = Vec::new();
        for (j, other) in lines.iter().enumerate() {
            if i == j {
                continue;
            }
            if let Some(LineIntersection::SinglePoint {
                intersection,
                is_proper: true,
            }) = line_intersection(*line, *other)
            {
                cuts.push((segment_param(line, intersection), intersection));
            }
        }
        cuts.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        cycle.push(line.start);
        for (_, c) in cuts {
            cycle.push(c);
        }
    }

    // Walk the cycle; a revisited vertex closes a simple loop.
    let mut stack: Vec<Coordinate<f64>> = Vec::new();
    let mut loops: Vec<Vec<Coordinate<f64>>> = Vec::new();
    for c in cycle {
        if let Some(pos) = stack.iter().position(|p| same_coordinate(*p, c)) {
            if stack.len() - pos >= 3 {
                loops.push(stack[pos..].to_vec());
            }
            stack.truncate(pos + 1);
        } else {
            stack.push(c);
        }
    }
    if stack.len() >= 3 {
        loops.push(stack);
    }

    let polygons: Vec<Polygon<f64>> = loops
        .into_iter()
        .map(|l| Polygon::new(LineString(l), Vec::new()))
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();
    union_all(polygons)
}

/// Union a batch of polygons into one multipolygon.
pub fn union_all(mut list: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    if list.is_empty() {
        return MultiPolygon(Vec::new());
    }
    let mut result = MultiPolygon(vec![list.pop().unwrap()]);
    for p in list {
        result = result.union(&MultiPolygon(vec![p]));
    }
    result
}

fn same_coordinate(a: Coordinate<f64>, b: Coordinate<f64>) -> bool {
    (a.x - b.x).abs() < EPSILON_DEG && (a.y - b.y).abs() < EPSILON_DEG
}

/// Fraction of the way along `seg` at which `c` sits, assuming `c` is on the
/// segment's supporting line.
fn segment_param(seg: &Line<f64>, c: Coordinate<f64>) -> f64 {
    let dx = seg.end.x - seg.start.x;
    let dy = seg.end.y - seg.start.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return 0.0;
    }
    ((c.x - seg.start.x) * dx + (c.y - seg.start.y) * dy) / len2
}

/// Every point where `line` meets the boundary of `region`, ordered along
/// `line` as (segment index, fraction, point).
fn boundary_crossings(
    line: &LineString<f64>,
    region: &MultiPolygon<f64>,
) -> Vec<(usize, f64, Coordinate<f64>)> {
    let mut hits: Vec<(usize, f64, Coordinate<f64>)> = Vec::new();
    for (idx, seg) in line.lines().enumerate() {
        for polygon in &region.0 {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors().iter()) {
                for edge in ring.lines() {
                    match line_intersection(seg, edge) {
                        Some(LineIntersection::SinglePoint { intersection, .. }) => {
                            hits.push((idx, segment_param(&seg, intersection), intersection));
                        }
                        Some(LineIntersection::Collinear { intersection }) => {
                            hits.push((
                                idx,
                                segment_param(&seg, intersection.start),
                                intersection.start,
                            ));
                            hits.push((
                                idx,
                                segment_param(&seg, intersection.end),
                                intersection.end,
                            ));
                        }
                        None => {}
                    }
                }
            }
        }
    }
    hits.sort_by(|a, b| (a.0, a.1).partial_cmp(&(b.0, b.1)).unwrap());
    hits
}

/// Normalized position (0..1) along `line` of its first contact with
/// `region`: the nearest boundary crossing, or the line's own start when that
/// already lies inside. None when they never touch.
pub fn first_contact_distance(line: &LineString<f64>, region: &MultiPolygon<f64>) -> Option<f64> {
    let mut candidates: Vec<Point<f64>> = boundary_crossings(line, region)
        .into_iter()
        .map(|(_, _, c)| Point::from(c))
        .collect();
    if let Some(first) = line.0.first() {
        if region.contains(&Point::from(*first)) {
            candidates.push(Point::from(*first));
        }
    }

    let mut best: Option<f64> = None;
    for pt in candidates {
        if let Some(d) = line.line_locate_point(&pt) {
            best = Some(best.map_or(d, |b: f64| b.min(d)));
        }
    }
    best
}

/// Prefix of `border` up to its first entry into `region`. A border that never
/// crosses the region's boundary comes back whole.
pub fn cut_border_by_region(
    border: &LineString<f64>,
    region: &MultiPolygon<f64>,
) -> LineString<f64> {
    let hit = boundary_crossings(border, region)
        .into_iter()
        .find(|(idx, t, _)| *idx > 0 || *t > EPSILON_DEG);
    let (idx, _, c) = match hit {
        Some(hit) => hit,
        None => {
            return border.clone();
        }
    };

    let mut pts = border.0[..=idx].to_vec();
    if pts.last().map_or(true, |last| !same_coordinate(*last, c)) {
        pts.push(c);
    }
    if pts.len() < 2 {
        pts.push(c);
    }
    LineString(pts)
}

/// Cut `border` at a planar distance from its start, returning the head and,
/// when the cut lands strictly inside, the remainder. Distances outside
/// (0, length) leave the border whole.
pub fn cut_border_at_distance(
    border: &LineString<f64>,
    distance: f64,
) -> (LineString<f64>, Option<LineString<f64>>) {
    let total = border.euclidean_length();
    if distance <= 0.0 || distance >= total {
        return (border.clone(), None);
    }

    let mut so_far = 0.0;
    for (i, seg) in border.lines().enumerate() {
        let len = seg.euclidean_length();
        if so_far + len >= distance {
            let t = if len == 0.0 {
                0.0
            } else {
                (distance - so_far) / len
            };
            let cut = Coordinate {
                x: seg.start.x + (seg.end.x - seg.start.x) * t,
                y: seg.start.y + (seg.end.y - seg.start.y) * t,
            };
            let mut head = border.0[..=i].to_vec();
            head.push(cut);
            let mut tail = vec![cut];
            tail.extend(border.0[(i + 1)..].iter().cloned());
            return (LineString(head), Some(LineString(tail)));
        }
        so_far += len;
    }
    (border.clone(), None)
}

/// Planar distance along `border` of the point nearest to `pt`.
pub fn project_distance(border: &LineString<f64>, pt: Point<f64>) -> f64 {
    border.line_locate_point(&pt).unwrap_or(0.0) * border.euclidean_length()
}
