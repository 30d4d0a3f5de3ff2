//! Signal controller for a single four-way intersection.
//!
//! [`TrafficLightController`] owns the intersection state and accepts
//! operator commands (timer, manual, emergency) and vehicle count batches
//! (adaptive control), deciding which approach gets green and how long the
//! others wait.

pub mod config;
pub mod control_system;
pub mod error;
pub mod flow_analyzer;
pub mod global_variables;
pub mod monitoring;
pub mod shared_data;

pub use config::ControllerConfig;
pub use control_system::traffic_light_controller::{
    ControlRequest, ControlResponse, SubmitOutcome, TrafficLightController,
};
pub use error::{ControlError, SinkError};
pub use shared_data::{
    ControlMode, CountBatch, Direction, DirectionState, SignalColor, SignalSnapshot,
};
