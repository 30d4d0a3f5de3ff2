// Mode state machine. Decides whether a command is legal from the current
// mode and which grant it produces; never touches shared state itself.

use crate::control_system::allocation_policies::{
    adaptive_grant_for, emergency_grant, idle_reset, manual_grant, round_robin_cycle,
};
use crate::error::ControlError;
use crate::shared_data::{ControlMode, Direction, DirectionCounts, Grant, SignalSnapshot};

/// A state-changing operator or sensor command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartTimer,
    StopTimer,
    AdvanceTo(Direction),
    /// Advance to whichever approach follows the current green.
    AdvanceNext,
    ManualSet(Direction),
    EmergencyStop(Direction),
    ResumeFromEmergency,
    SubmitCounts(DirectionCounts),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartTimer => "start_timer",
            Command::StopTimer => "stop_timer",
            Command::AdvanceTo(_) => "advance_to",
            Command::AdvanceNext => "advance_next",
            Command::ManualSet(_) => "manual_set",
            Command::EmergencyStop(_) => "emergency_stop",
            Command::ResumeFromEmergency => "resume_from_emergency",
            Command::SubmitCounts(_) => "submit_counts",
        }
    }
}

/// The outcome of a legal command: the mode to enter and the full grant to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub mode: ControlMode,
    pub grant: Grant,
}

/// Mode reached by `command` from `current`, or why it is rejected.
pub fn next_mode(current: ControlMode, command: &Command) -> Result<ControlMode, ControlError> {
    use ControlMode::*;

    match (current, command) {
        // Highest priority interrupt, legal from anywhere.
        (_, Command::EmergencyStop(_)) => Ok(EmergencyOverride),
        (EmergencyOverride, Command::ResumeFromEmergency) => Ok(Idle),
        (EmergencyOverride, other) => Err(ControlError::ModeLocked {
            command: other.name(),
        }),
        (from, Command::ResumeFromEmergency) => Err(ControlError::IllegalTransition {
            from,
            command: Command::ResumeFromEmergency.name(),
        }),
        (_, Command::StartTimer) => Ok(TimedCycle),
        (_, Command::StopTimer) => Ok(Idle),
        (TimedCycle, Command::AdvanceTo(_) | Command::AdvanceNext) => Ok(TimedCycle),
        (from, cmd @ (Command::AdvanceTo(_) | Command::AdvanceNext)) => {
            Err(ControlError::IllegalTransition {
                from,
                command: cmd.name(),
            })
        }
        (_, Command::ManualSet(_)) => Ok(ManualOverride),
        (_, Command::SubmitCounts(_)) => Ok(AdaptiveControl),
    }
}

/// Validates `command` against `current` and computes the resulting state.
pub fn plan_transition(
    current: &SignalSnapshot,
    command: &Command,
) -> Result<Transition, ControlError> {
    let mode = next_mode(current.mode, command)?;
    let grant = match command {
        // Arming the timer keeps whatever is showing until the first advance.
        Command::StartTimer => current.directions.clone(),
        Command::StopTimer | Command::ResumeFromEmergency => idle_reset(),
        Command::AdvanceTo(direction) => round_robin_cycle(*direction),
        // A freshly armed timer has no green yet and starts from north.
        Command::AdvanceNext => round_robin_cycle(
            current
                .green_direction()
                .map(Direction::next)
                .unwrap_or(Direction::North),
        ),
        Command::ManualSet(direction) => manual_grant(*direction),
        Command::EmergencyStop(direction) => emergency_grant(*direction),
        Command::SubmitCounts(counts) => adaptive_grant_for(counts),
    };
    Ok(Transition { mode, grant })
}
