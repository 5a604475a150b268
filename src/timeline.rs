//! Time origin policies for traces with no authoritative start signal.
//!
//! A [`Timeline`] is an origin timestamp plus the policy that chose it.
//! Applying it to a sample gives elapsed seconds into the stage.
//!
//! ## Example
//! ```rust
//! use stage_splits::{GeoPoint, OriginPolicy, TelemetrySample, Timeline};
//!
//! // 2024-03-02 10:30:47 UTC
//! let first = TelemetrySample::new(GeoPoint::new(0.0, 0.0), 1_709_375_447_000);
//! let timeline = Timeline::assign(&[first], OriginPolicy::RoundedStart, None).unwrap();
//! assert_eq!(timeline.elapsed_seconds(&first), -13.0);
//! ```

use chrono::{DateTime, DurationRound, FixedOffset, TimeDelta, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StageError};
use crate::TelemetrySample;

const MS_PER_MINUTE: i64 = 60_000;

/// How a trace's time origin is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginPolicy {
    /// Origin supplied by the caller, e.g. from an official start record
    Explicit,
    /// First sample rounded to the nearest whole minute (cars start on the minute)
    RoundedStart,
    /// First sample taken verbatim; elapsed times are relative only
    FalseOrigin,
}

impl fmt::Display for OriginPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginPolicy::Explicit => write!(f, "explicit"),
            OriginPolicy::RoundedStart => write!(f, "rounded-start"),
            OriginPolicy::FalseOrigin => write!(f, "false-origin"),
        }
    }
}

/// A time origin and the policy that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Epoch milliseconds
    pub origin_ms: i64,
    pub policy: OriginPolicy,
}

impl Timeline {
    /// Choose an origin for `trace` (chronologically ordered, retained samples).
    ///
    /// `Explicit` needs `explicit_origin`; the other policies need a non-empty trace.
    pub fn assign(
        trace: &[TelemetrySample],
        policy: OriginPolicy,
        explicit_origin: Option<i64>,
    ) -> Result<Self> {
        let origin_ms = match policy {
            OriginPolicy::Explicit => explicit_origin.ok_or(StageError::MissingOrigin)?,
            OriginPolicy::RoundedStart => round_to_minute(first_timestamp(trace)?),
            OriginPolicy::FalseOrigin => first_timestamp(trace)?,
        };
        debug!(
            "[Timeline] {} origin at {} ({} samples)",
            policy,
            origin_ms,
            trace.len()
        );
        Ok(Self { origin_ms, policy })
    }

    /// Seconds from the origin to the sample. Negative if the sample precedes it.
    pub fn elapsed_seconds(&self, sample: &TelemetrySample) -> f64 {
        (sample.timestamp_ms - self.origin_ms) as f64 / 1000.0
    }

    /// Copies of `trace` annotated with elapsed seconds.
    pub fn apply(&self, trace: &[TelemetrySample]) -> Vec<TelemetrySample> {
        trace
            .iter()
            .map(|s| s.with_elapsed(self.elapsed_seconds(s)))
            .collect()
    }

    /// A relative timeline at a shared origin, for comparing false-origin traces.
    pub fn rebased(&self, origin_ms: i64) -> Self {
        Self {
            origin_ms,
            policy: OriginPolicy::FalseOrigin,
        }
    }

    /// The origin in UTC.
    pub fn origin_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.origin_ms)
    }

    /// The origin rendered in a local offset.
    pub fn origin_local(&self, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
        self.origin_utc().map(|t| t.with_timezone(&offset))
    }
}

/// The origin to rebase a set of false-origin timelines to: the latest one.
///
/// Samples recorded before the shared origin get negative elapsed times.
pub fn rebase_origin(timelines: &[Timeline]) -> Option<i64> {
    timelines.iter().map(|t| t.origin_ms).max()
}

fn first_timestamp(trace: &[TelemetrySample]) -> Result<i64> {
    trace
        .first()
        .map(|s| s.timestamp_ms)
        .ok_or_else(|| StageError::EmptyTrace {
            trace_id: String::new(),
        })
}

/// Round epoch milliseconds to the nearest minute, halves rounding up.
fn round_to_minute(ms: i64) -> i64 {
    DateTime::from_timestamp_millis(ms)
        .and_then(|t| t.duration_round(TimeDelta::minutes(1)).ok())
        .map(|t| t.timestamp_millis())
        .unwrap_or_else(|| (ms + MS_PER_MINUTE / 2).div_euclid(MS_PER_MINUTE) * MS_PER_MINUTE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use chrono::{TimeZone, Timelike};

    fn at(h: u32, m: u32, s: u32) -> TelemetrySample {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 2, h, m, s)
            .single()
            .unwrap()
            .timestamp_millis();
        TelemetrySample::new(GeoPoint::new(0.0, 0.0), ts)
    }

    #[test]
    fn test_rounded_start() {
        let trace = vec![at(10, 30, 47), at(10, 31, 5), at(10, 32, 0)];
        let timeline = Timeline::assign(&trace, OriginPolicy::RoundedStart, None).unwrap();

        let origin = timeline.origin_utc().unwrap();
        assert_eq!((origin.hour(), origin.minute(), origin.second()), (10, 31, 0));
        assert_eq!(timeline.elapsed_seconds(&trace[0]), -13.0);
        assert_eq!(timeline.elapsed_seconds(&trace[1]), 5.0);
        assert_eq!(timeline.elapsed_seconds(&trace[2]), 60.0);
    }

    #[test]
    fn test_rounded_start_rounds_to_nearest() {
        let trace = vec![at(10, 30, 12)];
        let timeline = Timeline::assign(&trace, OriginPolicy::RoundedStart, None).unwrap();
        assert_eq!(timeline.elapsed_seconds(&trace[0]), 12.0);
    }

    #[test]
    fn test_false_origin() {
        let trace = vec![at(10, 30, 47), at(10, 31, 17)];
        let timeline = Timeline::assign(&trace, OriginPolicy::FalseOrigin, None).unwrap();
        assert_eq!(timeline.origin_ms, trace[0].timestamp_ms);
        assert_eq!(timeline.elapsed_seconds(&trace[0]), 0.0);
        assert_eq!(timeline.elapsed_seconds(&trace[1]), 30.0);
    }

    #[test]
    fn test_explicit_origin() {
        let trace = vec![at(10, 30, 47)];
        let start = at(10, 30, 0).timestamp_ms;
        let timeline = Timeline::assign(&trace, OriginPolicy::Explicit, Some(start)).unwrap();
        assert_eq!(timeline.elapsed_seconds(&trace[0]), 47.0);

        // Explicit origins work even without samples
        assert!(Timeline::assign(&[], OriginPolicy::Explicit, Some(start)).is_ok());

        assert_eq!(
            Timeline::assign(&trace, OriginPolicy::Explicit, None),
            Err(StageError::MissingOrigin)
        );
    }

    #[test]
    fn test_empty_trace() {
        assert!(matches!(
            Timeline::assign(&[], OriginPolicy::RoundedStart, None),
            Err(StageError::EmptyTrace { .. })
        ));
        assert!(matches!(
            Timeline::assign(&[], OriginPolicy::FalseOrigin, None),
            Err(StageError::EmptyTrace { .. })
        ));
    }

    #[test]
    fn test_fractional_elapsed() {
        let mut sample = at(10, 30, 0);
        let timeline = Timeline {
            origin_ms: sample.timestamp_ms,
            policy: OriginPolicy::FalseOrigin,
        };
        sample.timestamp_ms += 1_250;
        assert_eq!(timeline.elapsed_seconds(&sample), 1.25);
    }

    #[test]
    fn test_apply_annotates_copies() {
        let trace = vec![at(10, 30, 0), at(10, 30, 30)];
        let timeline = Timeline::assign(&trace, OriginPolicy::FalseOrigin, None).unwrap();
        let annotated = timeline.apply(&trace);
        assert_eq!(annotated[1].elapsed, Some(30.0));
        assert_eq!(trace[1].elapsed, None);
    }

    #[test]
    fn test_rebase_to_latest_origin() {
        let a = Timeline::assign(&[at(10, 30, 5)], OriginPolicy::FalseOrigin, None).unwrap();
        let b = Timeline::assign(&[at(10, 30, 20)], OriginPolicy::FalseOrigin, None).unwrap();
        let origin = rebase_origin(&[a, b]).unwrap();
        assert_eq!(origin, b.origin_ms);

        let sample = at(10, 30, 50);
        assert_eq!(a.rebased(origin).elapsed_seconds(&sample), 30.0);
        assert_eq!(b.rebased(origin).elapsed_seconds(&sample), 30.0);

        // a's first sample predates the shared origin
        assert_eq!(a.rebased(origin).elapsed_seconds(&at(10, 30, 5)), -15.0);
        assert!(rebase_origin(&[]).is_none());
    }

    #[test]
    fn test_origin_local() {
        let timeline = Timeline::assign(&[at(10, 31, 0)], OriginPolicy::FalseOrigin, None).unwrap();
        let local = timeline
            .origin_local(FixedOffset::east_opt(3600).unwrap())
            .unwrap();
        assert_eq!(local.hour(), 11);
    }
}
