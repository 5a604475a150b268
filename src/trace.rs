//! Telemetry traces and the per-stage processing pipeline.
//!
//! ## Pipeline
//! 1. [`Trace::from_reverse_chronological`]: reverse the source order, drop
//!    malformed records, sort by timestamp
//! 2. [`Stage::process`]: project to the stage's UTM zone, keep samples in the
//!    corridor, compute distance along the route, assign a timeline
//! 3. [`ProcessedTrace::model`]: build the distance ↔ time model
//!
//! A [`Stage`] is built once and is read-only afterwards, so any number of
//! traces can be processed against it at the same time.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::corridor::Corridor;
use crate::error::{OptionExt, Result, StageError};
use crate::interpolation::{notional_split_distances, DistanceTimeModel};
use crate::projection::{PlanarPoint, UtmZone};
use crate::route::Route;
use crate::timeline::{OriginPolicy, Timeline};
use crate::{GeoPoint, OutOfRange, StageConfig, TelemetrySample};

/// One record as delivered by the telemetry source.
///
/// Coordinates and timestamp may be absent; such records are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Epoch milliseconds
    pub timestamp_ms: Option<i64>,
}

impl RawRecord {
    pub fn new(longitude: f64, latitude: f64, timestamp_ms: i64) -> Self {
        Self {
            longitude: Some(longitude),
            latitude: Some(latitude),
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// A usable sample, or `None` if any field is missing or out of range.
    pub fn to_sample(&self) -> Option<TelemetrySample> {
        let position = GeoPoint::new(self.longitude?, self.latitude?);
        if !position.is_valid() {
            return None;
        }
        Some(TelemetrySample::new(position, self.timestamp_ms?))
    }
}

/// Counts of samples dropped at each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    /// Missing or invalid coordinates/timestamp
    pub malformed: usize,
    /// Outside the stage corridor
    pub outside_corridor: usize,
}

impl DropStats {
    pub fn total(&self) -> usize {
        self.malformed + self.outside_corridor
    }
}

/// A driver's samples in chronological order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    samples: Vec<TelemetrySample>,
    pub dropped: DropStats,
}

impl Trace {
    /// Build from source records delivered newest first.
    ///
    /// Fails with `EmptyTrace` when there are no records and with
    /// `AllSamplesDropped` when every record is malformed.
    pub fn from_reverse_chronological(id: &str, records: Vec<RawRecord>) -> Result<Self> {
        let mut records = records;
        records.reverse();
        Self::from_chronological(id, &records)
    }

    /// Build from records already in chronological order.
    pub fn from_chronological(id: &str, records: &[RawRecord]) -> Result<Self> {
        records.first().ok_or_empty_trace(id)?;

        let mut samples: Vec<TelemetrySample> =
            records.iter().filter_map(RawRecord::to_sample).collect();
        let malformed = records.len() - samples.len();

        if samples.is_empty() {
            warn!("[Trace] '{}': all {} records malformed", id, records.len());
            return Err(StageError::AllSamplesDropped {
                trace_id: id.to_string(),
                total: records.len(),
            });
        }
        if malformed > 0 {
            debug!("[Trace] '{}': dropped {} malformed records", id, malformed);
        }

        // Stable, so equal timestamps keep source order
        samples.sort_by_key(|s| s.timestamp_ms);

        Ok(Self {
            id: id.to_string(),
            samples,
            dropped: DropStats {
                malformed,
                outside_corridor: 0,
            },
        })
    }

    /// Build from samples already validated and ordered by the caller.
    pub fn from_samples(id: &str, samples: Vec<TelemetrySample>) -> Result<Self> {
        samples.first().ok_or_empty_trace(id)?;
        let mut samples = samples;
        samples.sort_by_key(|s| s.timestamp_ms);
        Ok(Self {
            id: id.to_string(),
            samples,
            dropped: DropStats::default(),
        })
    }

    pub fn samples(&self) -> &[TelemetrySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A trace after corridor filtering, route projection and timeline assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedTrace {
    pub id: String,
    /// Retained samples with planar position, distance and elapsed time set
    pub samples: Vec<TelemetrySample>,
    pub timeline: Timeline,
    pub dropped: DropStats,
}

impl ProcessedTrace {
    /// (distance, elapsed seconds) for every retained sample, in time order.
    pub fn pairs(&self) -> Vec<(f64, f64)> {
        self.samples.iter().filter_map(|s| s.distance_time()).collect()
    }

    /// Build the distance ↔ time model for this trace.
    pub fn model(&self, out_of_range: OutOfRange) -> Result<DistanceTimeModel> {
        DistanceTimeModel::from_pairs(&self.pairs(), out_of_range).map_err(|e| match e {
            StageError::EmptyTrace { .. } => StageError::EmptyTrace {
                trace_id: self.id.clone(),
            },
            other => other,
        })
    }

    /// Same samples measured from a different origin (relative timeline).
    pub fn rebased(&self, origin_ms: i64) -> Self {
        let timeline = self.timeline.rebased(origin_ms);
        Self {
            id: self.id.clone(),
            samples: timeline.apply(&self.samples),
            timeline,
            dropped: self.dropped,
        }
    }
}

/// A rally stage: route, corridor and processing configuration.
#[derive(Debug, Clone)]
pub struct Stage {
    route: Route,
    corridor: Corridor,
    config: StageConfig,
}

impl Stage {
    /// Build a stage from the route's geographic points in driving order.
    ///
    /// The UTM zone is chosen from the first point.
    pub fn from_geographic(points: &[GeoPoint], config: StageConfig) -> Result<Self> {
        config.validate()?;
        let first = points
            .first()
            .filter(|_| points.len() >= 2)
            .ok_or_insufficient_route(points.len())?;
        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(StageError::MalformedInput {
                message: format!("invalid route point {:?}", bad),
            });
        }

        let zone = UtmZone::for_point_with(first, config.hemisphere_rule);
        let planar: Vec<PlanarPoint> = points.iter().map(|p| zone.to_planar(p)).collect();
        Self::from_route(Route::new(&planar)?, config)
    }

    /// Build a stage from a route already in planar coordinates.
    pub fn from_route(route: Route, config: StageConfig) -> Result<Self> {
        config.validate()?;
        let corridor = Corridor::new(&route, config.corridor_margin, config.arc_segments);
        info!(
            "[Stage] {:.0}m route in {} with {}m corridor",
            route.total_length(),
            route.zone(),
            config.corridor_margin
        );
        Ok(Self {
            route,
            corridor,
            config,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn corridor(&self) -> &Corridor {
        &self.corridor
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn zone(&self) -> UtmZone {
        self.route.zone()
    }

    /// Run a trace through projection, corridor filter, route distance and timeline.
    ///
    /// Fails with `EmptyTrace` if no sample lies in the corridor (unless the
    /// policy is `Explicit`, which needs no samples to pick an origin).
    pub fn process(
        &self,
        trace: &Trace,
        policy: OriginPolicy,
        explicit_origin: Option<i64>,
    ) -> Result<ProcessedTrace> {
        let zone = self.zone();
        let projected: Vec<TelemetrySample> = trace
            .samples()
            .iter()
            .map(|s| s.with_planar(zone.to_planar(&s.position)))
            .collect();

        let on_stage = self.corridor.filter(&projected);
        let dropped = DropStats {
            malformed: trace.dropped.malformed,
            outside_corridor: projected.len() - on_stage.len(),
        };
        debug!(
            "[Stage] '{}': {} of {} samples in corridor",
            trace.id,
            on_stage.len(),
            projected.len()
        );

        let measured: Vec<TelemetrySample> = on_stage
            .iter()
            .filter_map(|s| {
                let planar = s.planar?;
                Some(s.with_distance(self.route.project_distance(&planar)))
            })
            .collect();

        let timeline = Timeline::assign(&measured, policy, explicit_origin).map_err(|e| match e {
            StageError::EmptyTrace { .. } => StageError::EmptyTrace {
                trace_id: trace.id.clone(),
            },
            other => other,
        })?;

        let samples = timeline.apply(&measured);
        info!(
            "[Stage] Processed '{}': {} samples kept, {} dropped, {} origin",
            trace.id,
            samples.len(),
            dropped.total(),
            timeline.policy
        );

        Ok(ProcessedTrace {
            id: trace.id.clone(),
            samples,
            timeline,
            dropped,
        })
    }

    /// Process a trace and build its model with the configured out-of-range behaviour.
    pub fn model_for(
        &self,
        trace: &Trace,
        policy: OriginPolicy,
        explicit_origin: Option<i64>,
    ) -> Result<(ProcessedTrace, DistanceTimeModel)> {
        let processed = self.process(trace, policy, explicit_origin)?;
        let model = processed.model(self.config.out_of_range)?;
        Ok((processed, model))
    }

    /// Notional split distances at the configured interval.
    pub fn split_distances(&self) -> Vec<f64> {
        notional_split_distances(self.route.total_length(), self.config.split_interval)
    }

    /// Geographic position at a distance along the route (clamped to the ends).
    pub fn geographic_point_at(&self, distance: f64) -> GeoPoint {
        self.zone().to_geographic(&self.route.point_at(distance))
    }
}

/// Process many traces against one stage, one result per trace, in order.
pub fn process_traces(
    stage: &Stage,
    traces: &[Trace],
    policy: OriginPolicy,
) -> Vec<Result<ProcessedTrace>> {
    traces
        .iter()
        .map(|t| stage.process(t, policy, None))
        .collect()
}

/// Parallel version of [`process_traces`].
///
/// The stage is shared read-only across rayon workers.
#[cfg(feature = "parallel")]
pub fn process_traces_parallel(
    stage: &Stage,
    traces: &[Trace],
    policy: OriginPolicy,
) -> Vec<Result<ProcessedTrace>> {
    traces
        .par_iter()
        .map(|t| stage.process(t, policy, None))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Hemisphere;

    fn zone() -> UtmZone {
        UtmZone::new(30, Hemisphere::South).unwrap()
    }

    /// Straight 1000m stage heading east from (440000, 4470000)
    fn stage() -> Stage {
        let z = zone();
        let route =
            Route::new(&[z.planar(440_000.0, 4_470_000.0), z.planar(441_000.0, 4_470_000.0)])
                .unwrap();
        Stage::from_route(route, StageConfig::default()).unwrap()
    }

    /// Record at planar offset (dx, dy) from the route start
    fn record(dx: f64, dy: f64, ts: i64) -> RawRecord {
        let p = zone().to_geographic(&zone().planar(440_000.0 + dx, 4_470_000.0 + dy));
        RawRecord::new(p.longitude, p.latitude, ts)
    }

    #[test]
    fn test_reverse_chronological_ingest() {
        let records = vec![record(20.0, 0.0, 3000), record(10.0, 0.0, 2000), record(0.0, 0.0, 1000)];
        let trace = Trace::from_reverse_chronological("car-1", records).unwrap();
        let ts: Vec<i64> = trace.samples().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_malformed_records_dropped() {
        let records = vec![
            record(20.0, 0.0, 3000),
            RawRecord {
                longitude: None,
                latitude: Some(40.0),
                timestamp_ms: Some(2500),
            },
            RawRecord {
                longitude: Some(-3.7),
                latitude: Some(40.4),
                timestamp_ms: None,
            },
            RawRecord::new(f64::NAN, 40.0, 2200),
            record(0.0, 0.0, 1000),
        ];
        let trace = Trace::from_reverse_chronological("car-1", records).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.dropped.malformed, 3);
    }

    #[test]
    fn test_all_malformed() {
        let records = vec![RawRecord {
            longitude: None,
            latitude: None,
            timestamp_ms: Some(1),
        }];
        assert!(matches!(
            Trace::from_reverse_chronological("car-1", records),
            Err(StageError::AllSamplesDropped { total: 1, .. })
        ));
        assert!(matches!(
            Trace::from_reverse_chronological("car-1", vec![]),
            Err(StageError::EmptyTrace { .. })
        ));
    }

    #[test]
    fn test_process_corridor_and_distance() {
        let stage = stage();
        let records = vec![
            record(900.0, 10.0, 61_000),
            record(600.0, 150.0, 50_000), // off stage
            record(500.0, 50.0, 41_000),
            record(0.0, 0.0, 1_000),
        ];
        let trace = Trace::from_reverse_chronological("car-1", records).unwrap();
        let processed = stage.process(&trace, OriginPolicy::FalseOrigin, None).unwrap();

        assert_eq!(processed.samples.len(), 3);
        assert_eq!(processed.dropped.outside_corridor, 1);

        let pairs = processed.pairs();
        assert!(pairs[0].0.abs() < 1e-3 && pairs[0].1 == 0.0);
        assert!((pairs[1].0 - 500.0).abs() < 1e-3 && pairs[1].1 == 40.0);
        assert!((pairs[2].0 - 900.0).abs() < 1e-3 && pairs[2].1 == 60.0);

        let model = processed.model(OutOfRange::Fail).unwrap();
        assert!((model.time_at_distance(700.0).unwrap() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_process_nothing_on_stage() {
        let stage = stage();
        let trace =
            Trace::from_reverse_chronological("car-9", vec![record(500.0, 400.0, 1000)]).unwrap();
        let err = stage.process(&trace, OriginPolicy::RoundedStart, None).unwrap_err();
        assert_eq!(
            err,
            StageError::EmptyTrace {
                trace_id: "car-9".to_string()
            }
        );
    }

    #[test]
    fn test_rebased_trace() {
        let stage = stage();
        let trace = Trace::from_reverse_chronological(
            "car-1",
            vec![record(500.0, 0.0, 31_000), record(0.0, 0.0, 1_000)],
        )
        .unwrap();
        let processed = stage.process(&trace, OriginPolicy::FalseOrigin, None).unwrap();
        let rebased = processed.rebased(11_000);
        assert_eq!(rebased.timeline.policy, OriginPolicy::FalseOrigin);
        assert_eq!(rebased.samples[0].elapsed, Some(-10.0));
        assert_eq!(rebased.samples[1].elapsed, Some(20.0));
    }

    #[test]
    fn test_split_distances_and_geographic_point() {
        let stage = stage();
        assert_eq!(stage.split_distances(), vec![500.0, 1000.0]);

        let p = stage.geographic_point_at(250.0);
        let planar = stage.zone().to_planar(&p);
        assert!((planar.x - 440_250.0).abs() < 1e-4);
        assert!((planar.y - 4_470_000.0).abs() < 1e-4);
    }

    #[test]
    fn test_stage_rejects_short_route() {
        assert!(matches!(
            Stage::from_geographic(&[GeoPoint::new(-3.7, 40.4)], StageConfig::default()),
            Err(StageError::InsufficientRoute { .. })
        ));
    }

    #[test]
    fn test_process_traces_in_order() {
        let stage = stage();
        let traces = vec![
            Trace::from_reverse_chronological(
                "a",
                vec![record(400.0, 0.0, 40_000), record(0.0, 0.0, 0)],
            )
            .unwrap(),
            Trace::from_reverse_chronological("b", vec![record(0.0, 900.0, 0)]).unwrap(),
        ];
        let results = process_traces(&stage, &traces, OriginPolicy::FalseOrigin);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().id, "a");
        assert!(results[1].is_err());
    }
}
