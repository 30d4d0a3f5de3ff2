// Durable history of vehicle counts. The controller only appends and asks
// for the grand total; anything richer belongs to the storage side.

use crate::error::SinkError;
use crate::shared_data::{format_observed_at, Direction, VehicleCountObservation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub trait CountSink: Send + Sync {
    /// Records one direction's count. Each call succeeds or fails on its own.
    fn append(&self, observation: &VehicleCountObservation) -> Result<(), SinkError>;

    /// Sum of every count ever appended.
    fn sum_all(&self) -> Result<u64, SinkError>;
}

/// One CSV row of the count log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    pub timestamp: String,
    pub direction: Direction,
    pub count: u32,
}

impl From<&VehicleCountObservation> for CountRecord {
    fn from(observation: &VehicleCountObservation) -> Self {
        Self {
            timestamp: format_observed_at(&observation.observed_at),
            direction: observation.direction,
            count: observation.count,
        }
    }
}

// Appends a record to a CSV file, writing the header only when the file is
// missing or empty.
pub fn log_to_csv<T: Serialize>(path: &Path, record: &T) -> Result<(), SinkError> {
    let has_content = std::fs::metadata(path)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(!has_content)
        .from_writer(file);
    wtr.serialize(record)?;
    wtr.flush()?;
    Ok(())
}

/// Append-only CSV count log.
#[derive(Debug)]
pub struct CsvCountSink {
    path: PathBuf,
    // Serializes appends so header detection and row writes don't interleave.
    write_lock: Mutex<()>,
}

impl CsvCountSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<Vec<CountRecord>, SinkError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let _guard = self.write_lock.lock();
        let mut rdr = csv::Reader::from_reader(File::open(&self.path)?);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }
}

impl CountSink for CsvCountSink {
    fn append(&self, observation: &VehicleCountObservation) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock();
        log_to_csv(&self.path, &CountRecord::from(observation))
    }

    fn sum_all(&self) -> Result<u64, SinkError> {
        Ok(self
            .records()?
            .iter()
            .map(|record| u64::from(record.count))
            .sum())
    }
}

/// In-process count history, for tests and the demo controller.
#[derive(Debug, Default)]
pub struct MemoryCountSink {
    records: Mutex<Vec<VehicleCountObservation>>,
}

impl MemoryCountSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<VehicleCountObservation> {
        self.records.lock().clone()
    }
}

impl CountSink for MemoryCountSink {
    fn append(&self, observation: &VehicleCountObservation) -> Result<(), SinkError> {
        self.records.lock().push(observation.clone());
        Ok(())
    }

    fn sum_all(&self) -> Result<u64, SinkError> {
        Ok(self
            .records
            .lock()
            .iter()
            .map(|o| u64::from(o.count))
            .sum())
    }
}
