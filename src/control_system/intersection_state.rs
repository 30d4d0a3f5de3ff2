use crate::error::ControlError;
use crate::shared_data::{ControlMode, Direction, Grant, SignalSnapshot};
use parking_lot::RwLock;

/// The authoritative signal state of one intersection.
///
/// Readers take a shared lock and clone a consistent snapshot; `apply`
/// replaces colors, waits and mode together under the write lock, so no
/// reader ever sees a mix of pre- and post-update values.
#[derive(Debug, Default)]
pub struct IntersectionState {
    inner: RwLock<SignalSnapshot>,
}

impl IntersectionState {
    /// All directions red/0, mode Idle.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> SignalSnapshot {
        self.inner.read().clone()
    }

    pub fn mode(&self) -> ControlMode {
        self.inner.read().mode
    }

    /// Replaces the whole state. An update that omits any direction is a
    /// contract violation and leaves the current state untouched.
    pub fn apply(&self, update: Grant, mode: ControlMode) -> Result<SignalSnapshot, ControlError> {
        let missing: Vec<Direction> = Direction::ALL
            .iter()
            .copied()
            .filter(|d| !update.contains_key(d))
            .collect();
        if !missing.is_empty() {
            log::error!(
                "Rejected incomplete state update for mode {}: missing {:?}",
                mode,
                missing
            );
            return Err(ControlError::InvalidStateUpdate { missing });
        }

        let next = SignalSnapshot {
            mode,
            directions: update,
        };
        let mut guard = self.inner.write();
        *guard = next.clone();
        Ok(next)
    }
}
