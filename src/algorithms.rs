//! # Algorithm Toolbox
//!
//! Direct access to the geometric and numeric routines, for callers that
//! want to build their own pipeline instead of going through [`crate::Stage`].
//!
//! ## Projection
//!
//! - **Zone selection**: UTM zone and EPSG code for a point
//! - **Transverse Mercator**: forward and inverse Krüger series
//!
//! ## Route Geometry
//!
//! - **Point-to-route projection**: nearest point as distance along the route
//! - **Inverse query**: planar point at a distance along the route
//! - **Corridor membership**: buffered route as a filter
//!
//! ## Time and Interpolation
//!
//! - **Origin policies**: explicit, rounded start, false origin
//! - **Piecewise-linear models**: distance → time and time → distance
//!
//! # Example
//!
//! ```rust
//! use stage_splits::algorithms::{Hemisphere, Route, UtmZone};
//!
//! let zone = UtmZone::new(30, Hemisphere::North).unwrap();
//! let route = Route::new(&[
//!     zone.planar(0.0, 0.0),
//!     zone.planar(1000.0, 0.0),
//!     zone.planar(1000.0, 1000.0),
//! ])
//! .unwrap();
//!
//! let d = route.project_distance(&zone.planar(1010.0, 400.0));
//! assert!((d - 1400.0).abs() < 1e-9);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{GeoPoint, OutOfRange, TelemetrySample};

// =============================================================================
// Projection
// =============================================================================

pub use crate::projection::{Hemisphere, HemisphereRule, PlanarPoint, UtmZone};

/// UTM zone for a point, using the configured hemisphere rule.
pub fn zone_for(point: &GeoPoint, rule: HemisphereRule) -> UtmZone {
    UtmZone::for_point_with(point, rule)
}

// =============================================================================
// Route Geometry
// =============================================================================

/// Route polyline with projection and inverse queries.
pub use crate::route::{Route, RouteProjection};

/// Corridor around a route.
pub use crate::corridor::Corridor;

// =============================================================================
// Time and Interpolation
// =============================================================================

/// Origin policies and rebasing.
pub use crate::timeline::{rebase_origin, OriginPolicy, Timeline};

/// Distance ↔ time models and split placement.
pub use crate::interpolation::{notional_split_distances, DistanceTimeModel};
