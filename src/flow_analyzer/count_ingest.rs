// Vehicle count intake: validation, the latest-count snapshot used for
// adaptive decisions, and forwarding to the durable count sink.

use crate::control_system::allocation_policies::validate_counts;
use crate::error::ControlError;
use crate::flow_analyzer::vision::VisionAnalyzer;
use crate::monitoring::count_sink::CountSink;
use crate::shared_data::{CountBatch, Direction, DirectionCounts, VehicleCountObservation};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Last count seen per direction. Overwritten by every observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficCountSnapshot {
    latest: BTreeMap<Direction, u32>,
}

impl TrafficCountSnapshot {
    pub fn get(&self, direction: Direction) -> Option<u32> {
        self.latest.get(&direction).copied()
    }

    pub fn record(&mut self, direction: Direction, count: u32) {
        self.latest.insert(direction, count);
    }

    pub fn record_all(&mut self, counts: &DirectionCounts) {
        for (direction, count) in counts.iter() {
            self.record(direction, count);
        }
    }

    /// The snapshot as a batch; directions never observed are simply absent.
    pub fn to_batch(&self) -> CountBatch {
        self.latest
            .iter()
            .map(|(&d, &c)| (d, i64::from(c)))
            .collect()
    }
}

/// A validated batch after it has been handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBatch {
    pub counts: DirectionCounts,
    /// One `SinkWriteFailed` per direction whose row could not be stored.
    pub sink_errors: Vec<ControlError>,
}

/// Converts a boundary map keyed by direction names into a typed batch.
pub fn parse_count_batch(raw: &HashMap<String, i64>) -> Result<CountBatch, ControlError> {
    let mut batch = CountBatch::new();
    for (name, &count) in raw {
        let direction: Direction = name.parse()?;
        if batch.insert(direction, count).is_some() {
            return Err(ControlError::InvalidObservation(format!(
                "direction {direction} given more than once"
            )));
        }
    }
    Ok(batch)
}

pub struct CountIngest {
    sink: Arc<dyn CountSink>,
    latest: Mutex<TrafficCountSnapshot>,
}

impl CountIngest {
    pub fn new(sink: Arc<dyn CountSink>) -> Self {
        Self {
            sink,
            latest: Mutex::new(TrafficCountSnapshot::default()),
        }
    }

    pub fn validate(&self, batch: &CountBatch) -> Result<DirectionCounts, ControlError> {
        validate_counts(batch)
    }

    /// Appends one row per direction to the sink. A failing row is reported,
    /// never fatal, and does not stop the remaining rows.
    pub fn persist(&self, counts: DirectionCounts, observed_at: NaiveDateTime) -> IngestedBatch {
        let mut sink_errors = Vec::new();
        for (direction, count) in counts.iter() {
            let observation = VehicleCountObservation {
                direction,
                count,
                observed_at,
            };
            if let Err(e) = self.sink.append(&observation) {
                log::warn!("Failed to store count {} for {}: {}", count, direction, e);
                sink_errors.push(ControlError::SinkWriteFailed {
                    direction,
                    reason: e.to_string(),
                });
            }
        }

        IngestedBatch {
            counts,
            sink_errors,
        }
    }

    /// Makes `counts` the latest snapshot, once the batch has been acted on.
    pub fn remember(&self, counts: &DirectionCounts) {
        self.latest.lock().record_all(counts);
    }

    /// Stores one direction's count without making any signal decision.
    pub fn record_observation(&self, direction: Direction, count: u32) {
        self.latest.lock().record(direction, count);
        log::info!("Recorded {} vehicles approaching from {}", count, direction);
    }

    /// Runs `analyzer` over an image of one approach and records the result.
    pub fn analyze_and_record(
        &self,
        analyzer: &dyn VisionAnalyzer,
        image: &[u8],
        direction: Direction,
    ) -> Result<u32, ControlError> {
        let count = analyzer.count_vehicles(image, direction)?;
        self.record_observation(direction, count);
        Ok(count)
    }

    pub fn latest(&self) -> TrafficCountSnapshot {
        self.latest.lock().clone()
    }

    /// The latest snapshot as a complete batch, or which directions are still unobserved.
    pub fn latest_batch(&self) -> Result<CountBatch, ControlError> {
        let batch = self.latest.lock().to_batch();
        let missing: Vec<&str> = Direction::ALL
            .iter()
            .filter(|d| !batch.contains_key(*d))
            .map(|d| d.as_str())
            .collect();
        if missing.is_empty() {
            Ok(batch)
        } else {
            Err(ControlError::InvalidObservation(format!(
                "no count observed yet for {}",
                missing.join(", ")
            )))
        }
    }

    pub fn total_observed(&self) -> Result<u64, ControlError> {
        self.sink
            .sum_all()
            .map_err(|e| ControlError::SinkQueryFailed(e.to_string()))
    }
}
