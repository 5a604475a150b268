//! Reference route polyline in a planar-metric projection.
//!
//! Provides the two route queries the rest of the pipeline is built on:
//! - [`Route::project_distance`]: nearest point on the route, as distance along it
//! - [`Route::point_at`]: the planar point at a given distance along the route
//!
//! Both are a linear scan over the segments. Stages are a few hundred
//! simplified vertices, so no spatial index is kept.

use geo::{Coord, Line, LineString};

use crate::error::{OptionExt, Result};
use crate::projection::{PlanarPoint, UtmZone};

/// Result of projecting a point onto the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteProjection {
    /// Distance along the route from its start (metres)
    pub distance: f64,
    /// Euclidean distance from the query point to the route (metres)
    pub offset: f64,
    /// Index of the segment the nearest point lies on
    pub segment: usize,
    /// Nearest point on the route
    pub foot: PlanarPoint,
}

/// An ordered polyline, first vertex at the stage start.
#[derive(Debug, Clone)]
pub struct Route {
    zone: UtmZone,
    line: LineString<f64>,
    /// Distance along the route at each vertex; `cumulative[0] == 0`
    cumulative: Vec<f64>,
}

impl Route {
    /// Build a route from planar points in traversal order.
    ///
    /// Fails with `InsufficientRoute` for fewer than two points.
    pub fn new(points: &[PlanarPoint]) -> Result<Self> {
        let first = points
            .first()
            .filter(|_| points.len() >= 2)
            .ok_or_insufficient_route(points.len())?;
        let zone = first.zone();
        let coords: Vec<Coord<f64>> = points.iter().map(|p| p.coord()).collect();
        Ok(Self::from_line(zone, LineString::new(coords)))
    }

    fn from_line(zone: UtmZone, line: LineString<f64>) -> Self {
        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for segment in line.lines() {
            total += segment_length(&segment);
            cumulative.push(total);
        }
        Self {
            zone,
            line,
            cumulative,
        }
    }

    pub fn zone(&self) -> UtmZone {
        self.zone
    }

    /// Total length in metres (sum of segment lengths).
    pub fn total_length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.line.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.0.is_empty()
    }

    /// The underlying polyline.
    pub fn line_string(&self) -> &LineString<f64> {
        &self.line
    }

    /// Vertices as planar points.
    pub fn points(&self) -> Vec<PlanarPoint> {
        self.line
            .coords()
            .map(|c| self.zone.planar(c.x, c.y))
            .collect()
    }

    /// Distance along the route of the point on it closest to `point`.
    pub fn project_distance(&self, point: &PlanarPoint) -> f64 {
        self.project(point).distance
    }

    /// Full projection of `point` onto the route.
    ///
    /// Each segment's perpendicular foot is clamped to the segment; the
    /// closest foot wins, earliest segment on ties.
    pub fn project(&self, point: &PlanarPoint) -> RouteProjection {
        debug_assert_eq!(point.zone(), self.zone);
        let p = point.coord();

        let mut best_offset = f64::INFINITY;
        let mut best_segment = 0;
        let mut best_along = 0.0;
        let mut best_foot = self.line.0[0];

        for (i, segment) in self.line.lines().enumerate() {
            let (foot, along) = closest_on_segment(&segment, p);
            let offset = (p.x - foot.x).hypot(p.y - foot.y);
            if offset < best_offset {
                best_offset = offset;
                best_segment = i;
                best_along = along;
                best_foot = foot;
            }
        }

        RouteProjection {
            distance: self.cumulative[best_segment] + best_along,
            offset: best_offset,
            segment: best_segment,
            foot: self.zone.planar(best_foot.x, best_foot.y),
        }
    }

    /// Planar point at `distance` along the route, clamped to the endpoints.
    pub fn point_at(&self, distance: f64) -> PlanarPoint {
        let coords = &self.line.0;
        let last = coords.len() - 1;

        if distance.is_nan() || distance <= 0.0 {
            return self.zone.planar(coords[0].x, coords[0].y);
        }
        if distance >= self.total_length() {
            return self.zone.planar(coords[last].x, coords[last].y);
        }

        // First vertex strictly beyond `distance`; the segment ends there
        let end = self.cumulative.partition_point(|&c| c <= distance).min(last);
        let start = end - 1;
        let seg_len = self.cumulative[end] - self.cumulative[start];
        let a = coords[start];
        let b = coords[end];
        if seg_len <= 0.0 {
            return self.zone.planar(a.x, a.y);
        }
        let t = (distance - self.cumulative[start]) / seg_len;
        self.zone
            .planar(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y))
    }
}

fn segment_length(segment: &Line<f64>) -> f64 {
    let d = segment.delta();
    d.x.hypot(d.y)
}

/// Closest point to `p` on `segment`, and its distance from the segment start.
fn closest_on_segment(segment: &Line<f64>, p: Coord<f64>) -> (Coord<f64>, f64) {
    let a = segment.start;
    let d = segment.delta();
    let len_sq = d.x * d.x + d.y * d.y;
    if len_sq == 0.0 {
        return (a, 0.0);
    }
    let t = (((p.x - a.x) * d.x + (p.y - a.y) * d.y) / len_sq).clamp(0.0, 1.0);
    let foot = Coord {
        x: a.x + t * d.x,
        y: a.y + t * d.y,
    };
    (foot, t * len_sq.sqrt())
}

/// Euclidean distance from `p` to the nearest point of `line`.
pub(crate) fn distance_to_line(line: &LineString<f64>, p: Coord<f64>) -> f64 {
    line.lines()
        .map(|segment| {
            let (foot, _) = closest_on_segment(&segment, p);
            (p.x - foot.x).hypot(p.y - foot.y)
        })
        .fold(f64::INFINITY, f64::min)
}
