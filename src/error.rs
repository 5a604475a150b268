//! Unified error handling for the stage-splits library.
//!
//! Per-sample problems (missing coordinates, samples off the stage) are never
//! errors: they are dropped and counted. The variants here are the failures
//! that abort a whole construction call or a single query.

use std::fmt;

/// Unified error type for stage-splits operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StageError {
    /// A record could not be interpreted at all
    MalformedInput { message: String },
    /// Every record of a non-empty trace was malformed
    AllSamplesDropped { trace_id: String, total: usize },
    /// Route has fewer points than a polyline needs
    InsufficientRoute {
        point_count: usize,
        minimum_required: usize,
    },
    /// No samples left to build a timeline or model from
    EmptyTrace { trace_id: String },
    /// EXPLICIT origin policy used without an origin
    MissingOrigin,
    /// Query outside the sampled domain of an interpolation model
    OutOfRangeQuery {
        axis: QueryAxis,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Configuration error
    InvalidConfig { message: String },
    /// JSON encoding/decoding failed
    Serialization { message: String },
}

/// Which independent variable an out-of-range query was made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAxis {
    Distance,
    Time,
}

impl fmt::Display for QueryAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryAxis::Distance => write!(f, "distance"),
            QueryAxis::Time => write!(f, "time"),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::MalformedInput { message } => {
                write!(f, "Malformed input: {}", message)
            }
            StageError::AllSamplesDropped { trace_id, total } => {
                write!(
                    f,
                    "Trace '{}': all {} samples were malformed and dropped",
                    trace_id, total
                )
            }
            StageError::InsufficientRoute {
                point_count,
                minimum_required,
            } => {
                write!(
                    f,
                    "Route has {} points, minimum {} required",
                    point_count, minimum_required
                )
            }
            StageError::EmptyTrace { trace_id } => {
                write!(f, "Trace '{}' has no usable samples", trace_id)
            }
            StageError::MissingOrigin => {
                write!(f, "Explicit origin policy requires an origin timestamp")
            }
            StageError::OutOfRangeQuery {
                axis,
                value,
                min,
                max,
            } => {
                write!(
                    f,
                    "Query {} {} outside sampled range [{}, {}]",
                    axis, value, min, max
                )
            }
            StageError::InvalidConfig { message } => {
                write!(f, "Configuration error: {}", message)
            }
            StageError::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for StageError {}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for stage-splits operations.
pub type Result<T> = std::result::Result<T, StageError>;

/// Extension trait for converting Option to StageError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an empty trace error.
    fn ok_or_empty_trace(self, trace_id: &str) -> Result<T>;

    /// Convert Option to Result with an insufficient route error.
    fn ok_or_insufficient_route(self, point_count: usize) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_empty_trace(self, trace_id: &str) -> Result<T> {
        self.ok_or_else(|| StageError::EmptyTrace {
            trace_id: trace_id.to_string(),
        })
    }

    fn ok_or_insufficient_route(self, point_count: usize) -> Result<T> {
        self.ok_or(StageError::InsufficientRoute {
            point_count,
            minimum_required: 2,
        })
    }
}
