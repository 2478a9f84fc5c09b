//! Buffer operations
//!
//! Expands points, lines and polygons by a fixed distance. Lines are buffered
//! as the union of one round-capped "capsule" per segment; polygons are the
//! union of the polygon itself with capsules along every ring. Distances are
//! in the units of the input coordinates, so callers project geographic
//! input before buffering.

use geo::{Area, BooleanOps, LineString, MultiPolygon, Point, Polygon};
use geo_types::{Coord, Line};
use std::f64::consts::PI;

/// Parameters for buffer operations
#[derive(Debug, Clone)]
pub struct BufferParams {
    /// Buffer distance in coordinate units (metres once projected)
    pub distance: f64,
    /// Number of segments used to approximate a full circle
    pub segments: usize,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance: 100.0,
            segments: 32,
        }
    }
}

/// Create a circular buffer around a point.
pub fn buffer_points(point: &Point<f64>, params: &BufferParams) -> Polygon<f64> {
    let n = params.segments.max(4);
    let r = params.distance.abs();
    let cx = point.x();
    let cy = point.y();

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((cx + r * angle.cos(), cy + r * angle.sin()));
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Buffer a single segment: a rectangle of half-width `distance` capped by
/// two half circles. Counter-clockwise ring.
pub fn buffer_segment(line: &Line<f64>, params: &BufferParams) -> Polygon<f64> {
    let (p, q) = (line.start, line.end);
    let dx = q.x - p.x;
    let dy = q.y - p.y;
    if dx == 0.0 && dy == 0.0 {
        return buffer_points(&Point::from(p), params);
    }

    let r = params.distance.abs();
    let half = (params.segments.max(4) / 2).max(2);
    let theta = dy.atan2(dx);

    let arc = |center: Coord<f64>, start: f64| {
        (0..=half).map(move |i| {
            let a = start + PI * i as f64 / half as f64;
            (center.x + r * a.cos(), center.y + r * a.sin())
        })
    };

    // Around the end point from the right side to the left side, then back
    // around the start point.
    let mut coords: Vec<(f64, f64)> = arc(q, theta - PI / 2.0)
        .chain(arc(p, theta + PI / 2.0))
        .collect();
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// Buffer a line string as the union of its segment capsules.
pub fn buffer_linestring(line: &LineString<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    let mut parts: Vec<Polygon<f64>> = line.lines().map(|l| buffer_segment(&l, params)).collect();
    if parts.is_empty() {
        if let Some(&c) = line.0.first() {
            parts.push(buffer_points(&Point::from(c), params));
        }
    }
    union_all(parts)
}

/// Expand a polygon outwards by `params.distance`.
pub fn buffer_polygon(polygon: &Polygon<f64>, params: &BufferParams) -> MultiPolygon<f64> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    let mut parts = vec![polygon.clone()];
    for ring in rings {
        parts.extend(ring.lines().map(|l| buffer_segment(&l, params)));
    }
    union_all(parts)
}

/// Union a set of polygons, merging pairwise so intermediate results stay
/// small.
pub fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = polygons
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .map(|p| MultiPolygon::new(vec![p]))
        .collect();

    if layer.is_empty() {
        return MultiPolygon::new(vec![]);
    }

    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len().div_ceil(2));
        let mut iter = layer.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        layer = next;
    }

    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Largest part of a multipolygon by area.
pub fn largest_polygon(multi: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    multi
        .0
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}
