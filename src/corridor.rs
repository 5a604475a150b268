//! Buffered corridor around a route, used to decide which samples are "on stage".
//!
//! The corridor is the set of points within `margin` metres of the route
//! polyline: the route offset on both sides with round caps. Membership is
//! tested exactly against that definition. [`Corridor::polygon`] is the same
//! region as a polygon (union of per-segment capsules) for rendering
//! collaborators.
//!
//! Near junctions the corridor also covers stretches of neighbouring roads;
//! samples there are kept.

use geo::{BooleanOps, BoundingRect, Coord, Intersects, LineString, MultiPolygon, Polygon, Rect};
use log::debug;
use once_cell::sync::OnceCell;
use std::f64::consts::PI;

use crate::route::{distance_to_line, Route};
use crate::TelemetrySample;

/// Tolerance for samples sitting exactly on the corridor edge (metres)
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Buffer polygon around a route. Read-only once built.
#[derive(Debug, Clone)]
pub struct Corridor {
    line: LineString<f64>,
    margin: f64,
    arc_segments: usize,
    envelope: Rect<f64>,
    /// Built on first call to `polygon()`; membership never needs it
    polygon: OnceCell<MultiPolygon<f64>>,
}

impl Corridor {
    /// Buffer `route` by `margin` metres on both sides, capping the ends.
    ///
    /// `arc_segments` is the number of edges per quarter circle used for the
    /// round caps of the polygon.
    pub fn new(route: &Route, margin: f64, arc_segments: u32) -> Self {
        let line = route.line_string().clone();
        let envelope = expanded_envelope(&line, margin);

        debug!(
            "[Corridor] Built {}m corridor around {} vertices",
            margin,
            line.0.len()
        );

        Self {
            line,
            margin,
            arc_segments: arc_segments.max(1) as usize,
            envelope,
            polygon: OnceCell::new(),
        }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// The corridor as a polygon in the route's planar coordinates.
    pub fn polygon(&self) -> &MultiPolygon<f64> {
        self.polygon.get_or_init(|| {
            let capsules: Vec<MultiPolygon<f64>> = self
                .line
                .lines()
                .map(|segment| {
                    MultiPolygon::new(vec![capsule(
                        segment.start,
                        segment.end,
                        self.margin,
                        self.arc_segments,
                    )])
                })
                .collect();
            let polygon = union_all(capsules);
            debug!(
                "[Corridor] Polygon built: {} parts from {} segments",
                polygon.0.len(),
                self.line.0.len().saturating_sub(1)
            );
            polygon
        })
    }

    /// True if `point` lies inside the corridor or on its boundary.
    pub fn contains(&self, point: Coord<f64>) -> bool {
        if !self.envelope.intersects(&point) {
            return false;
        }
        distance_to_line(&self.line, point) <= self.margin + BOUNDARY_EPSILON
    }

    /// Samples whose planar position is inside the corridor, in trace order.
    ///
    /// Samples that were never projected have no planar position and are dropped.
    pub fn filter(&self, trace: &[TelemetrySample]) -> Vec<TelemetrySample> {
        trace
            .iter()
            .filter(|s| s.planar.is_some_and(|p| self.contains(p.coord())))
            .copied()
            .collect()
    }
}

/// Bounding box of the line grown by `margin` on every side.
fn expanded_envelope(line: &LineString<f64>, margin: f64) -> Rect<f64> {
    let bounds = line.bounding_rect().unwrap_or_else(|| {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 })
    });
    Rect::new(
        Coord {
            x: bounds.min().x - margin,
            y: bounds.min().y - margin,
        },
        Coord {
            x: bounds.max().x + margin,
            y: bounds.max().y + margin,
        },
    )
}

/// Union of many polygons, merged pairwise so each round halves the count.
fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        let mut merged = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => merged.push(a.union(&b)),
                None => merged.push(a),
            }
        }
        parts = merged;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Stadium-shaped polygon around the segment a→b.
fn capsule(a: Coord<f64>, b: Coord<f64>, margin: f64, arc_segments: usize) -> Polygon<f64> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    // Heading of the segment; a degenerate segment becomes a circle
    let heading = if dx == 0.0 && dy == 0.0 {
        0.0
    } else {
        dy.atan2(dx)
    };

    let steps = 2 * arc_segments;
    let mut ring = Vec::with_capacity(2 * steps + 3);

    // Cap around b: from the left side (heading + 90°) clockwise to the right
    for i in 0..=steps {
        let angle = heading + PI / 2.0 - PI * i as f64 / steps as f64;
        ring.push(Coord {
            x: b.x + margin * angle.cos(),
            y: b.y + margin * angle.sin(),
        });
    }
    // Cap around a: from the right side (heading - 90°) clockwise to the left
    for i in 0..=steps {
        let angle = heading - PI / 2.0 - PI * i as f64 / steps as f64;
        ring.push(Coord {
            x: a.x + margin * angle.cos(),
            y: a.y + margin * angle.sin(),
        });
    }

    // Counter-clockwise exterior
    ring.reverse();
    Polygon::new(LineString::new(ring), Vec::new())
}
