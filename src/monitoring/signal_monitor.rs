use crate::global_variables::QUEUE_SIGNAL_UPDATES;
use crate::monitoring::count_sink::log_to_csv;
use crate::shared_data::{Direction, SignalColor, SignalUpdate};
use amiquip::{
    Connection, ConsumerMessage, ConsumerOptions, QueueDeclareOptions, Result as AmiquipResult,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Flat CSV row for one signal update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalUpdateRecord {
    pub sequence: u64,
    pub timestamp: u64,
    pub mode: String,
    /// Empty when every approach is red.
    pub green_direction: String,
    pub north_wait: u32,
    pub south_wait: u32,
    pub east_wait: u32,
    pub west_wait: u32,
}

impl From<&SignalUpdate> for SignalUpdateRecord {
    fn from(update: &SignalUpdate) -> Self {
        let report = &update.report;
        let wait = |d: Direction| report.wait_times.get(&d).copied().unwrap_or(0);
        let green_direction = report
            .signal_status
            .iter()
            .filter(|(_, color)| **color == SignalColor::Green)
            .map(|(d, _)| d.as_str())
            .collect::<Vec<_>>()
            .join("|");
        Self {
            sequence: update.sequence,
            timestamp: update.timestamp,
            mode: report.mode.to_string(),
            green_direction,
            north_wait: wait(Direction::North),
            south_wait: wait(Direction::South),
            east_wait: wait(Direction::East),
            west_wait: wait(Direction::West),
        }
    }
}

pub fn log_signal_update(path: &Path, update: &SignalUpdate) {
    if let Err(e) = log_to_csv(path, &SignalUpdateRecord::from(update)) {
        eprintln!("Error logging signal update: {}", e);
    }
}

// Listens to the "signal_updates" queue and logs each incoming record.
pub async fn listen_signal_updates(url: String, log_path: PathBuf) -> AmiquipResult<()> {
    let joined = tokio::task::spawn_blocking(move || -> AmiquipResult<()> {
        let mut connection = Connection::insecure_open(&url)?;
        let channel = connection.open_channel(None)?;
        let queue = channel.queue_declare(QUEUE_SIGNAL_UPDATES, QueueDeclareOptions::default())?;
        let consumer = queue.consume(ConsumerOptions::default())?;
        log::info!("Listening for signal updates on '{}'", QUEUE_SIGNAL_UPDATES);
        for message in consumer.receiver() {
            match message {
                ConsumerMessage::Delivery(delivery) => {
                    match serde_json::from_slice::<SignalUpdate>(&delivery.body) {
                        Ok(update) => {
                            println!(
                                "[Monitor] #{} {} green={:?}",
                                update.sequence,
                                update.report.mode,
                                SignalUpdateRecord::from(&update).green_direction
                            );
                            log_signal_update(&log_path, &update);
                        }
                        Err(e) => log::warn!("Dropping malformed signal update: {}", e),
                    }
                    consumer.ack(delivery)?;
                }
                other => {
                    println!("Signal update consumer ended: {:?}", other);
                    break;
                }
            }
        }
        connection.close()
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => {
            log::error!("Signal update listener task failed: {}", e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_system::allocation_policies::round_robin_cycle;
    use crate::shared_data::{ControlMode, SignalSnapshot};

    #[test]
    fn record_flattens_report() {
        let snapshot = SignalSnapshot {
            mode: ControlMode::TimedCycle,
            directions: round_robin_cycle(Direction::South),
        };
        let update = SignalUpdate {
            sequence: 9,
            timestamp: 1_700_000_123,
            report: snapshot.to_report(),
        };
        let record = SignalUpdateRecord::from(&update);
        assert_eq!(record.mode, "timed_cycle");
        assert_eq!(record.green_direction, "south");
        assert_eq!(
            (record.north_wait, record.south_wait, record.east_wait, record.west_wait),
            (90, 0, 30, 60)
        );
    }

    #[test]
    fn idle_record_has_no_green() {
        let update = SignalUpdate {
            sequence: 1,
            timestamp: 0,
            report: SignalSnapshot::idle().to_report(),
        };
        assert_eq!(SignalUpdateRecord::from(&update).green_direction, "");
    }
}
