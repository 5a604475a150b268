//! Distance ↔ time interpolation for a single trace.
//!
//! A [`DistanceTimeModel`] holds two independent piecewise-linear functions
//! built from a trace's (distance, elapsed) pairs:
//! - distance → time, for "when did this car pass the 3 km mark?"
//! - time → distance, for "where was this car 90 s into the stage?"
//!
//! An anchor at (0 m, 0 s) stands for the stage start. Pairs are taken in
//! trace order and a pair is kept only if its distance is strictly greater
//! than the last kept one, so reversals and projection noise are dropped
//! (first occurrence wins). The inverse keeps, of those, the pairs with
//! strictly increasing time.
//!
//! Queries outside the sampled domain fail unless the model clamps.
//!
//! ## Example
//! ```rust
//! use stage_splits::{DistanceTimeModel, OutOfRange};
//!
//! let pairs = [(500.0, 50.0), (1000.0, 100.0), (1500.0, 160.0)];
//! let model = DistanceTimeModel::from_pairs(&pairs, OutOfRange::Fail).unwrap();
//! assert_eq!(model.time_at_distance(750.0).unwrap(), 75.0);
//! assert_eq!(model.distance_at_time(130.0).unwrap(), 1250.0);
//! assert!(model.time_at_distance(2000.0).is_err());
//! ```

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{QueryAxis, Result, StageError};
use crate::{OutOfRange, TelemetrySample};

/// Monotone piecewise-linear function over strictly increasing knots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PiecewiseLinear {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl PiecewiseLinear {
    fn min_x(&self) -> f64 {
        self.xs[0]
    }

    fn max_x(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }

    fn eval(&self, x: f64, out_of_range: OutOfRange, axis: QueryAxis) -> Result<f64> {
        let (min, max) = (self.min_x(), self.max_x());
        if x.is_nan() || x < min || x > max {
            return match out_of_range {
                OutOfRange::Clamp if x < min => Ok(self.ys[0]),
                OutOfRange::Clamp if x > max => Ok(self.ys[self.ys.len() - 1]),
                _ => Err(StageError::OutOfRangeQuery {
                    axis,
                    value: x,
                    min,
                    max,
                }),
            };
        }

        // First knot >= x
        let hi = self.xs.partition_point(|&k| k < x);
        if self.xs[hi] == x {
            return Ok(self.ys[hi]);
        }
        let lo = hi - 1;
        let t = (x - self.xs[lo]) / (self.xs[hi] - self.xs[lo]);
        Ok(self.ys[lo] + t * (self.ys[hi] - self.ys[lo]))
    }
}

/// Keep pairs whose key strictly increases, first occurrence winning.
fn strictly_increasing(pairs: impl IntoIterator<Item = (f64, f64)>) -> PiecewiseLinear {
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for (x, y) in pairs {
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        if xs.last().map_or(true, |&last| x > last) {
            xs.push(x);
            ys.push(y);
        }
    }
    PiecewiseLinear { xs, ys }
}

/// Distance → time and time → distance models for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceTimeModel {
    forward: PiecewiseLinear,
    inverse: PiecewiseLinear,
    out_of_range: OutOfRange,
    /// Input pairs dropped because distance did not increase
    discarded: usize,
}

impl DistanceTimeModel {
    /// Build from (distance, elapsed seconds) pairs in trace order.
    ///
    /// Fails with `EmptyTrace` if no pair lies beyond the start anchor.
    pub fn from_pairs(pairs: &[(f64, f64)], out_of_range: OutOfRange) -> Result<Self> {
        let anchored = std::iter::once((0.0, 0.0)).chain(pairs.iter().copied());
        let forward = strictly_increasing(anchored);
        if forward.xs.len() < 2 {
            return Err(StageError::EmptyTrace {
                trace_id: String::new(),
            });
        }

        // The anchor is not an input pair
        let discarded = pairs.len() + 1 - forward.xs.len();
        if discarded > 0 {
            warn!(
                "[Interpolation] Discarded {} of {} samples with non-increasing distance",
                discarded,
                pairs.len()
            );
        }

        let inverse = strictly_increasing(
            forward
                .xs
                .iter()
                .zip(&forward.ys)
                .map(|(&d, &t)| (t, d)),
        );

        debug!(
            "[Interpolation] Model over {:.0}m / {:.1}s from {} knots ({} inverse)",
            forward.max_x(),
            inverse.max_x(),
            forward.xs.len(),
            inverse.xs.len()
        );

        Ok(Self {
            forward,
            inverse,
            out_of_range,
            discarded,
        })
    }

    /// Build from samples carrying both distance and elapsed time.
    ///
    /// Samples missing either annotation are skipped.
    pub fn from_samples(samples: &[TelemetrySample], out_of_range: OutOfRange) -> Result<Self> {
        let pairs: Vec<(f64, f64)> = samples.iter().filter_map(|s| s.distance_time()).collect();
        Self::from_pairs(&pairs, out_of_range)
    }

    /// Same model with a different out-of-range behaviour.
    pub fn with_out_of_range(mut self, out_of_range: OutOfRange) -> Self {
        self.out_of_range = out_of_range;
        self
    }

    /// Elapsed seconds at distance `d` (metres).
    pub fn time_at_distance(&self, d: f64) -> Result<f64> {
        self.forward.eval(d, self.out_of_range, QueryAxis::Distance)
    }

    /// Distance (metres) at elapsed seconds `t`.
    pub fn distance_at_time(&self, t: f64) -> Result<f64> {
        self.inverse.eval(t, self.out_of_range, QueryAxis::Time)
    }

    /// `time_at_distance` for each query, in order.
    pub fn times_at(&self, distances: &[f64]) -> Vec<Result<f64>> {
        distances.iter().map(|&d| self.time_at_distance(d)).collect()
    }

    /// `distance_at_time` for each query, in order.
    pub fn distances_at(&self, times: &[f64]) -> Vec<Result<f64>> {
        times.iter().map(|&t| self.distance_at_time(t)).collect()
    }

    /// Furthest sampled distance.
    pub fn max_distance(&self) -> f64 {
        self.forward.max_x()
    }

    /// Sampled time domain of the inverse model.
    pub fn time_range(&self) -> (f64, f64) {
        (self.inverse.min_x(), self.inverse.max_x())
    }

    /// Knots of the distance → time model, anchor included.
    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.forward.xs.iter().copied().zip(self.forward.ys.iter().copied())
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn out_of_range(&self) -> OutOfRange {
        self.out_of_range
    }
}

/// Notional split points every `interval` metres, up to `total_length`.
///
/// The stage start (0) is not a split; the finish is included only when it
/// falls on a multiple of `interval`.
pub fn notional_split_distances(total_length: f64, interval: f64) -> Vec<f64> {
    if interval.is_nan() || total_length.is_nan() || interval <= 0.0 || total_length <= 0.0 {
        return Vec::new();
    }
    let count = (total_length / interval + 1e-9).floor() as usize;
    (1..=count).map(|i| i as f64 * interval).collect()
}
