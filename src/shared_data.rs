// src/shared_data.rs

use crate::error::ControlError;
use crate::global_variables::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// One of the four approaches to the intersection.
/// Declaration order is the fixed cyclic order used for round-robin distance
/// and for adaptive tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Position in the cyclic order [north, south, east, west].
    pub fn index(self) -> usize {
        self as usize
    }

    /// The direction that follows this one in the round-robin cycle.
    pub fn next(self) -> Direction {
        Direction::ALL[(self.index() + 1) % Direction::ALL.len()]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Direction::North),
            "south" => Ok(Direction::South),
            "east" => Ok(Direction::East),
            "west" => Ok(Direction::West),
            _ => Err(ControlError::InvalidDirection(s.to_string())),
        }
    }
}

/// Signal shown to one approach. The controller never produces amber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalColor {
    Red,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionState {
    pub color: SignalColor,
    /// Seconds this approach is told to wait before it gets green.
    pub wait_seconds: u32,
}

impl DirectionState {
    pub const IDLE: DirectionState = DirectionState {
        color: SignalColor::Red,
        wait_seconds: 0,
    };

    pub fn green() -> Self {
        Self {
            color: SignalColor::Green,
            wait_seconds: 0,
        }
    }

    pub fn red(wait_seconds: u32) -> Self {
        Self {
            color: SignalColor::Red,
            wait_seconds,
        }
    }
}

/// The control strategy currently governing grants. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Idle,
    TimedCycle,
    ManualOverride,
    EmergencyOverride,
    AdaptiveControl,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ControlMode::Idle => "idle",
            ControlMode::TimedCycle => "timed_cycle",
            ControlMode::ManualOverride => "manual_override",
            ControlMode::EmergencyOverride => "emergency_override",
            ControlMode::AdaptiveControl => "adaptive_control",
        };
        f.write_str(name)
    }
}

/// A full per-direction assignment, as produced by an allocation policy.
pub type Grant = BTreeMap<Direction, DirectionState>;

/// Raw per-direction counts as they arrive at the boundary. Counts are signed
/// so that a negative value can be reported instead of silently wrapping.
pub type CountBatch = BTreeMap<Direction, i64>;

/// Validated vehicle counts, one per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectionCounts([u32; 4]);

impl DirectionCounts {
    pub fn new(north: u32, south: u32, east: u32, west: u32) -> Self {
        Self([north, south, east, west])
    }

    pub fn get(&self, direction: Direction) -> u32 {
        self.0[direction.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, u32)> + '_ {
        Direction::ALL.iter().map(move |&d| (d, self.get(d)))
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }
}

/// A single direction's count at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCountObservation {
    pub direction: Direction,
    pub count: u32,
    pub observed_at: NaiveDateTime,
}

/// Consistent view of the intersection at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub mode: ControlMode,
    pub directions: Grant,
}

impl SignalSnapshot {
    /// All four directions red with no wait, mode Idle.
    pub fn idle() -> Self {
        Self {
            mode: ControlMode::Idle,
            directions: Direction::ALL
                .iter()
                .map(|&d| (d, DirectionState::IDLE))
                .collect(),
        }
    }

    pub fn state_of(&self, direction: Direction) -> Option<DirectionState> {
        self.directions.get(&direction).copied()
    }

    pub fn green_directions(&self) -> Vec<Direction> {
        self.directions
            .iter()
            .filter(|(_, state)| state.color == SignalColor::Green)
            .map(|(&d, _)| d)
            .collect()
    }

    /// The direction holding right-of-way, if exactly one does.
    pub fn green_direction(&self) -> Option<Direction> {
        match self.green_directions().as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn to_report(&self) -> SignalReport {
        SignalReport {
            mode: self.mode,
            signal_status: self
                .directions
                .iter()
                .map(|(&d, state)| (d, state.color))
                .collect(),
            wait_times: self
                .directions
                .iter()
                .map(|(&d, state)| (d, state.wait_seconds))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_report())
    }
}

impl Default for SignalSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Wire shape of a snapshot: signal colors and wait times keyed by direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalReport {
    pub mode: ControlMode,
    pub signal_status: BTreeMap<Direction, SignalColor>,
    pub wait_times: BTreeMap<Direction, u32>,
}

/// A broadcast of an accepted state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalUpdate {
    /// Monotonic per-controller sequence number, assigned while the change is applied.
    pub sequence: u64,
    pub timestamp: u64,
    pub report: SignalReport,
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Parses an observation timestamp in the boundary format `%Y-%m-%d %H:%M:%S`.
pub fn parse_observed_at(raw: &str) -> Result<NaiveDateTime, ControlError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| ControlError::InvalidTimestamp(format!("{raw:?}: {e}")))
}

pub fn format_observed_at(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
