//! # Stage Splits
//!
//! Distance-along-route and time interpolation for sparse rally stage GPS
//! telemetry.
//!
//! This library provides:
//! - UTM projection of GPS samples into a metric plane
//! - Point-to-route projection (distance along a stage) and its inverse
//! - Corridor filtering to keep only samples on the stage
//! - Time origin policies for traces without an official start signal
//! - Distance ↔ time interpolation for notional split points
//!
//! ## Features
//!
//! - **`parallel`** - Process many drivers' traces concurrently with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use stage_splits::{GeoPoint, OriginPolicy, RawRecord, Stage, StageConfig, Trace};
//!
//! // A short stage heading north-east
//! let route = vec![
//!     GeoPoint::new(-3.7000, 40.4000),
//!     GeoPoint::new(-3.6900, 40.4050),
//!     GeoPoint::new(-3.6800, 40.4100),
//! ];
//! let stage = Stage::from_geographic(&route, StageConfig::default()).unwrap();
//!
//! // Telemetry arrives newest first
//! let records = vec![
//!     RawRecord::new(-3.6800, 40.4100, 1_700_000_120_000),
//!     RawRecord::new(-3.6900, 40.4050, 1_700_000_060_000),
//!     RawRecord::new(-3.6999, 40.4001, 1_700_000_000_000),
//! ];
//! let trace = Trace::from_reverse_chronological("car-1", records).unwrap();
//!
//! let processed = stage.process(&trace, OriginPolicy::FalseOrigin, None).unwrap();
//! let model = processed.model(stage.config().out_of_range).unwrap();
//! let t = model.time_at_distance(500.0).unwrap();
//! assert!(t > 0.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, QueryAxis, Result, StageError};

// Geographic <-> planar conversion
pub mod projection;
pub use projection::{Hemisphere, HemisphereRule, PlanarPoint, UtmZone};

// Reference route polyline and point-to-route projection
pub mod route;
pub use route::{Route, RouteProjection};

// Buffered corridor around the route
pub mod corridor;
pub use corridor::Corridor;

// Time origin policies
pub mod timeline;
pub use timeline::{rebase_origin, OriginPolicy, Timeline};

// Distance <-> time interpolation
pub mod interpolation;
pub use interpolation::{notional_split_distances, DistanceTimeModel};

// Ingestion hand-off and per-trace pipeline
pub mod trace;
pub use trace::{DropStats, ProcessedTrace, RawRecord, Stage, Trace};
#[cfg(feature = "parallel")]
pub use trace::process_traces_parallel;
pub use trace::process_traces;

// Cross-driver split comparison
pub mod compare;
pub use compare::{rebase_traces, DriverSplits, SplitTable};

// Algorithm toolbox - standalone access to the geometric/numeric routines
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate (WGS84 degrees), longitude first.
///
/// # Example
/// ```
/// use stage_splits::GeoPoint;
/// let point = GeoPoint::new(-3.7038, 40.4168); // Madrid
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// Create a new geographic point.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// One GPS reading, progressively annotated as it moves through the pipeline.
///
/// Samples are values: each stage returns an annotated copy rather than
/// mutating in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub position: GeoPoint,
    /// Epoch timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Set once the sample has been projected into the stage's zone
    pub planar: Option<PlanarPoint>,
    /// Distance along the route in metres, set after route projection
    pub distance: Option<f64>,
    /// Seconds since the timeline origin, set after timeline assignment
    pub elapsed: Option<f64>,
}

impl TelemetrySample {
    pub fn new(position: GeoPoint, timestamp_ms: i64) -> Self {
        Self {
            position,
            timestamp_ms,
            planar: None,
            distance: None,
            elapsed: None,
        }
    }

    pub fn with_planar(self, planar: PlanarPoint) -> Self {
        Self {
            planar: Some(planar),
            ..self
        }
    }

    pub fn with_distance(self, distance: f64) -> Self {
        Self {
            distance: Some(distance),
            ..self
        }
    }

    pub fn with_elapsed(self, elapsed: f64) -> Self {
        Self {
            elapsed: Some(elapsed),
            ..self
        }
    }

    /// (distance, elapsed) once both annotations are present.
    pub fn distance_time(&self) -> Option<(f64, f64)> {
        Some((self.distance?, self.elapsed?))
    }
}

/// Behaviour of interpolation queries outside the sampled domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutOfRange {
    /// Report `StageError::OutOfRangeQuery`
    #[default]
    Fail,
    /// Return the value at the nearest edge of the domain
    Clamp,
}

/// Configuration for processing traces against a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Half-width of the corridor around the route (metres).
    /// Default: 100.0
    pub corridor_margin: f64,

    /// Segments per quarter circle when approximating the corridor's round
    /// caps as a polygon. Only affects `Corridor::polygon`.
    /// Default: 8
    pub arc_segments: u32,

    /// What interpolation queries do outside the sampled domain.
    /// Default: Fail
    pub out_of_range: OutOfRange,

    /// Spacing of notional split points along the route (metres).
    /// Default: 500.0
    pub split_interval: f64,

    /// Offset used to render origins in local time (seconds east of UTC).
    /// Default: 0
    pub utc_offset_seconds: i32,

    /// Hemisphere selection rule for the UTM zone.
    /// Default: Longitude (historical behaviour)
    pub hemisphere_rule: HemisphereRule,

    /// CRS of incoming geographic coordinates. Only WGS84 is supported.
    /// Default: "EPSG:4326"
    pub geographic_crs: String,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            corridor_margin: 100.0,
            arc_segments: 8,
            out_of_range: OutOfRange::Fail,
            split_interval: 500.0,
            utc_offset_seconds: 0,
            hemisphere_rule: HemisphereRule::Longitude,
            geographic_crs: "EPSG:4326".to_string(),
        }
    }
}

impl StageConfig {
    /// Load a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StageConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values make sense together.
    pub fn validate(&self) -> Result<()> {
        if !(self.corridor_margin.is_finite() && self.corridor_margin > 0.0) {
            return Err(StageError::InvalidConfig {
                message: format!("corridor_margin must be positive, got {}", self.corridor_margin),
            });
        }
        if !(self.split_interval.is_finite() && self.split_interval > 0.0) {
            return Err(StageError::InvalidConfig {
                message: format!("split_interval must be positive, got {}", self.split_interval),
            });
        }
        if self.arc_segments == 0 {
            return Err(StageError::InvalidConfig {
                message: "arc_segments must be at least 1".to_string(),
            });
        }
        if chrono::FixedOffset::east_opt(self.utc_offset_seconds).is_none() {
            return Err(StageError::InvalidConfig {
                message: format!("utc_offset_seconds out of range: {}", self.utc_offset_seconds),
            });
        }
        let crs = self.geographic_crs.to_ascii_uppercase();
        if crs != "EPSG:4326" && crs != "WGS84" {
            return Err(StageError::InvalidConfig {
                message: format!("unsupported geographic CRS '{}'", self.geographic_crs),
            });
        }
        Ok(())
    }

    /// The configured offset as a chrono timezone.
    pub fn utc_offset(&self) -> chrono::FixedOffset {
        use chrono::Offset;
        chrono::FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| chrono::Utc.fix())
    }
}

// ============================================================================
// Tests
// ============================================================================
