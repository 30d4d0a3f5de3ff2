// Grant computations for each control mode. All functions are pure: they
// take the requested intent and return a full per-direction assignment.

use crate::error::ControlError;
use crate::shared_data::{CountBatch, Direction, DirectionCounts, DirectionState, Grant};

/// Seconds per round-robin turn.
pub const CYCLE_TURN_SECS: u32 = 30;
/// Flat wait for every non-selected direction under manual override.
pub const MANUAL_WAIT_SECS: u32 = 30;
/// Flat wait for every stopped direction under emergency override.
pub const EMERGENCY_WAIT_SECS: u32 = 60;
/// Seconds of wait per vehicle of count gap to the adaptive winner.
pub const ADAPTIVE_SECS_PER_VEHICLE: u64 = 10;
pub const ADAPTIVE_MIN_WAIT_SECS: u64 = 30;
pub const ADAPTIVE_MAX_WAIT_SECS: u64 = 60;

// Green/0 for `winner`, red with `wait_for(d)` for everyone else.
fn grant_with<F>(winner: Direction, wait_for: F) -> Grant
where
    F: Fn(Direction) -> u32,
{
    Direction::ALL
        .iter()
        .map(|&d| {
            let state = if d == winner {
                DirectionState::green()
            } else {
                DirectionState::red(wait_for(d))
            };
            (d, state)
        })
        .collect()
}

/// Green for `current`; every other direction waits one turn per position it
/// sits behind `current` in the cycle [north, south, east, west].
pub fn round_robin_cycle(current: Direction) -> Grant {
    let len = Direction::ALL.len();
    grant_with(current, |d| {
        let positions_away = (d.index() + len - current.index()) % len;
        positions_away as u32 * CYCLE_TURN_SECS
    })
}

pub fn manual_grant(selected: Direction) -> Grant {
    grant_with(selected, |_| MANUAL_WAIT_SECS)
}

pub fn emergency_grant(allowed: Direction) -> Grant {
    grant_with(allowed, |_| EMERGENCY_WAIT_SECS)
}

/// All directions red with no wait.
pub fn idle_reset() -> Grant {
    Direction::ALL
        .iter()
        .map(|&d| (d, DirectionState::IDLE))
        .collect()
}

/// Checks that a batch names every direction with a non-negative count.
pub fn validate_counts(batch: &CountBatch) -> Result<DirectionCounts, ControlError> {
    let mut counts = [0u32; 4];
    for direction in Direction::ALL {
        let raw = batch.get(&direction).copied().ok_or_else(|| {
            ControlError::InvalidObservation(format!("missing count for {direction}"))
        })?;
        counts[direction.index()] = u32::try_from(raw).map_err(|_| {
            ControlError::InvalidObservation(format!(
                "count for {direction} must be a non-negative 32-bit integer, got {raw}"
            ))
        })?;
    }
    Ok(DirectionCounts::new(counts[0], counts[1], counts[2], counts[3]))
}

/// The busiest direction; ties go to the earliest in [north, south, east, west].
pub fn busiest_direction(counts: &DirectionCounts) -> Direction {
    Direction::ALL
        .iter()
        .copied()
        .fold(Direction::North, |best, d| {
            if counts.get(d) > counts.get(best) {
                d
            } else {
                best
            }
        })
}

/// Density-weighted grant over already validated counts.
pub fn adaptive_grant_for(counts: &DirectionCounts) -> Grant {
    let winner = busiest_direction(counts);
    let winner_count = u64::from(counts.get(winner));
    grant_with(winner, |d| {
        let gap = winner_count - u64::from(counts.get(d));
        (gap * ADAPTIVE_SECS_PER_VEHICLE).clamp(ADAPTIVE_MIN_WAIT_SECS, ADAPTIVE_MAX_WAIT_SECS) as u32
    })
}

pub fn adaptive_grant(batch: &CountBatch) -> Result<Grant, ControlError> {
    let counts = validate_counts(batch)?;
    Ok(adaptive_grant_for(&counts))
}
