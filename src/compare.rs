//! Cross-driver comparison at notional split points.
//!
//! Each driver's [`DistanceTimeModel`] is queried at the same distances along
//! the stage; the table then holds the fastest time at every split and each
//! driver's gap to it.
//!
//! Traces timed from false origins are not comparable as-is: rebase them to a
//! shared origin first with [`rebase_traces`].

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interpolation::DistanceTimeModel;
use crate::timeline::{rebase_origin, OriginPolicy, Timeline};
use crate::trace::ProcessedTrace;

/// One driver's row of a split table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSplits {
    pub driver: String,
    /// Elapsed seconds at each split; `None` where the split is outside the
    /// driver's sampled range
    pub times: Vec<Option<f64>>,
    /// Seconds behind the fastest driver at each split
    pub gaps: Vec<Option<f64>>,
}

/// Split times for several drivers at common distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTable {
    /// Split distances along the route (metres)
    pub distances: Vec<f64>,
    pub drivers: Vec<DriverSplits>,
    /// Fastest time at each split across all drivers
    pub fastest: Vec<Option<f64>>,
}

impl SplitTable {
    /// Query every model at every distance.
    pub fn build(models: &[(&str, &DistanceTimeModel)], distances: &[f64]) -> Self {
        let times: Vec<Vec<Option<f64>>> = models
            .iter()
            .map(|(_, model)| {
                model
                    .times_at(distances)
                    .into_iter()
                    .map(|r| r.ok())
                    .collect()
            })
            .collect();

        let fastest: Vec<Option<f64>> = (0..distances.len())
            .map(|i| {
                times
                    .iter()
                    .filter_map(|row| row[i])
                    .fold(None, |best: Option<f64>, t| {
                        Some(best.map_or(t, |b| b.min(t)))
                    })
            })
            .collect();

        let drivers = models
            .iter()
            .zip(times)
            .map(|((driver, _), times)| {
                let gaps = times
                    .iter()
                    .zip(&fastest)
                    .map(|(t, best)| Some((*t)? - (*best)?))
                    .collect();
                DriverSplits {
                    driver: driver.to_string(),
                    times,
                    gaps,
                }
            })
            .collect();

        info!(
            "[Compare] Split table: {} drivers x {} splits",
            models.len(),
            distances.len()
        );

        Self {
            distances: distances.to_vec(),
            drivers,
            fastest,
        }
    }

    /// Row for a driver, if present.
    pub fn driver(&self, driver: &str) -> Option<&DriverSplits> {
        self.drivers.iter().find(|d| d.driver == driver)
    }

    /// Export as JSON for tabular/plotting collaborators.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Rebase false-origin traces to the latest of their origins.
///
/// Traces with an explicit or rounded origin are already on a shared clock
/// and are returned unchanged.
pub fn rebase_traces(traces: Vec<ProcessedTrace>) -> Vec<ProcessedTrace> {
    let false_origins: Vec<Timeline> = traces
        .iter()
        .map(|t| t.timeline)
        .filter(|t| t.policy == OriginPolicy::FalseOrigin)
        .collect();

    let Some(origin) = rebase_origin(&false_origins) else {
        return traces;
    };

    info!(
        "[Compare] Rebasing {} false-origin traces to {}",
        false_origins.len(),
        origin
    );

    traces
        .into_iter()
        .map(|t| {
            if t.timeline.policy == OriginPolicy::FalseOrigin {
                t.rebased(origin)
            } else {
                t
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::DropStats;
    use crate::{GeoPoint, OutOfRange, TelemetrySample};

    fn model(pairs: &[(f64, f64)]) -> DistanceTimeModel {
        DistanceTimeModel::from_pairs(pairs, OutOfRange::Fail).unwrap()
    }

    #[test]
    fn test_split_table() {
        let a = model(&[(500.0, 50.0), (1000.0, 100.0), (1500.0, 160.0)]);
        let b = model(&[(500.0, 45.0), (1000.0, 104.0)]);
        let table = SplitTable::build(&[("a", &a), ("b", &b)], &[500.0, 1000.0, 1500.0]);

        assert_eq!(table.fastest, vec![Some(45.0), Some(100.0), Some(160.0)]);

        let row_a = table.driver("a").unwrap();
        assert_eq!(row_a.gaps, vec![Some(5.0), Some(0.0), Some(0.0)]);

        let row_b = table.driver("b").unwrap();
        assert_eq!(row_b.times, vec![Some(45.0), Some(104.0), None]);
        assert_eq!(row_b.gaps, vec![Some(0.0), Some(4.0), None]);

        assert!(table.driver("c").is_none());
    }

    #[test]
    fn test_split_table_json() {
        let a = model(&[(1000.0, 100.0)]);
        let table = SplitTable::build(&[("a", &a)], &[500.0, 2000.0]);
        let json = table.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["drivers"][0]["driver"], "a");
        assert_eq!(value["drivers"][0]["times"][0], 50.0);
        assert!(value["drivers"][0]["times"][1].is_null());
    }

    fn processed(id: &str, origin_ms: i64, policy: OriginPolicy) -> ProcessedTrace {
        let timeline = Timeline { origin_ms, policy };
        let samples = vec![TelemetrySample::new(GeoPoint::new(0.0, 0.0), 100_000).with_distance(10.0)];
        ProcessedTrace {
            id: id.to_string(),
            samples: timeline.apply(&samples),
            timeline,
            dropped: DropStats::default(),
        }
    }

    #[test]
    fn test_rebase_traces() {
        let traces = vec![
            processed("a", 40_000, OriginPolicy::FalseOrigin),
            processed("b", 70_000, OriginPolicy::FalseOrigin),
            processed("c", 10_000, OriginPolicy::Explicit),
        ];
        let rebased = rebase_traces(traces);
        assert_eq!(rebased[0].timeline.origin_ms, 70_000);
        assert_eq!(rebased[1].timeline.origin_ms, 70_000);
        assert_eq!(rebased[0].samples[0].elapsed, Some(30.0));
        assert_eq!(rebased[2].timeline.origin_ms, 10_000);
        assert_eq!(rebased[2].samples[0].elapsed, Some(90.0));
    }

    #[test]
    fn test_rebase_without_false_origins() {
        let traces = vec![processed("c", 10_000, OriginPolicy::RoundedStart)];
        let rebased = rebase_traces(traces);
        assert_eq!(rebased[0].timeline.origin_ms, 10_000);
    }
}
