use crate::flow_analyzer::vision::DetectionError;
use crate::shared_data::{ControlMode, Direction};

/// Errors reported by the signal controller. Every variant except
/// `SinkWriteFailed` means the command was rejected and no state changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid direction: {0:?}")]
    InvalidDirection(String),

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Emergency override is active; {command} rejected until resume")]
    ModeLocked { command: &'static str },

    #[error("{command} is not allowed while in {from} mode")]
    IllegalTransition {
        from: ControlMode,
        command: &'static str,
    },

    #[error("Allocation produced an incomplete update, missing {missing:?}")]
    InvalidStateUpdate { missing: Vec<Direction> },

    #[error("Count sink write failed for {direction}: {reason}")]
    SinkWriteFailed { direction: Direction, reason: String },

    #[error("Count sink query failed: {0}")]
    SinkQueryFailed(String),

    #[error("Invalid timestamp {0}")]
    InvalidTimestamp(String),

    #[error("Vehicle detection failed: {0}")]
    Detection(#[from] DetectionError),
}

/// Failures of the durable count sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink rejected record: {0}")]
    Rejected(String),
}

/// Failures while broadcasting a state change.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Signal update publisher has stopped")]
    PublisherStopped,
}
