// The timed cycle does not tick by itself; this driver plays the external
// clock, advancing to the next approach once per period while the timer runs.

use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::shared_data::{ControlMode, SignalSnapshot};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Advances the cycle by one approach if the timer is running.
/// Returns the new state, or `None` when the tick was skipped.
pub fn advance_once(controller: &TrafficLightController) -> Option<SignalSnapshot> {
    if controller.get_state().mode != ControlMode::TimedCycle {
        return None;
    }
    match controller.advance_next() {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            // Mode changed between the check and the advance.
            log::debug!("Cycle tick skipped: {}", e);
            None
        }
    }
}

/// Ticks every `period`. Each advance runs on the blocking pool since
/// broadcasting the change may do synchronous I/O.
pub async fn run_cycle_driver(controller: Arc<TrafficLightController>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let ctrl = Arc::clone(&controller);
        match tokio::task::spawn_blocking(move || advance_once(&ctrl)).await {
            Ok(Some(snapshot)) => {
                log::info!("Cycle advanced to {:?}", snapshot.green_direction())
            }
            Ok(None) => {}
            Err(e) => log::error!("Cycle tick task failed: {}", e),
        }
    }
}
