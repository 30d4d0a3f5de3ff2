// Operator console for a single controller: one command per line, results
// printed as JSON.

use crate::control_system::traffic_light_controller::{ControlRequest, TrafficLightController};
use crate::error::ControlError;
use crate::flow_analyzer::vision::VisionAnalyzer;
use crate::shared_data::{Direction, SignalSnapshot};
use chrono::Local;
use std::collections::HashMap;
use std::io::{stdin, stdout, BufRead, Write};
use std::sync::Arc;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Request(ControlRequest),
    /// Run the vision analyzer on a frame of one approach.
    Observe(Direction),
    /// Submit the latest observed counts.
    SubmitLatest,
    Help,
    Exit,
}

pub const HELP: &str = "\
Commands:
  start                          start the timed cycle
  stop                           stop the timer, all red
  advance <dir>                  advance the cycle to <dir>
  manual <dir>                   manual green for <dir>
  emergency <dir>                emergency green for <dir>
  resume                         clear the emergency override
  counts <n> <s> <e> <w> [time]  submit a count batch (time: YYYY-MM-DD HH:MM:SS)
  observe <dir>                  count vehicles on <dir> with the analyzer
  submit                         submit the latest observed counts
  state                          show current signals
  total                          total vehicles recorded
  help | exit";

fn direction_arg(args: &[&str]) -> Result<Direction, ControlError> {
    match args {
        [name] => name.parse(),
        _ => Err(ControlError::InvalidDirection(args.join(" "))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminParseError {
    #[error("Unknown command {0:?}, type 'help' for a list")]
    UnknownCommand(String),

    #[error(transparent)]
    Invalid(#[from] ControlError),
}

pub fn parse_admin_command(line: &str) -> Result<AdminCommand, AdminParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(AdminCommand::Help);
    };

    let request = match verb.to_ascii_lowercase().as_str() {
        "start" => ControlRequest::StartTimer,
        "stop" => ControlRequest::StopTimer,
        "advance" => ControlRequest::AdvanceTo {
            direction: direction_arg(args)?.to_string(),
        },
        "manual" => ControlRequest::ManualSet {
            direction: direction_arg(args)?.to_string(),
        },
        "emergency" => ControlRequest::EmergencyStop {
            direction: direction_arg(args)?.to_string(),
        },
        "resume" => ControlRequest::ResumeFromEmergency,
        "state" => ControlRequest::GetState,
        "total" => ControlRequest::GetTotalVehicles,
        "counts" => {
            if args.len() < 4 {
                return Err(ControlError::InvalidObservation(
                    "expected four counts: north south east west".to_string(),
                )
                .into());
            }
            let mut vehicle_counts = HashMap::new();
            for (direction, raw) in Direction::ALL.iter().zip(&args[..4]) {
                let count = raw.parse::<i64>().map_err(|_| {
                    ControlError::InvalidObservation(format!(
                        "count for {direction} is not an integer: {raw:?}"
                    ))
                })?;
                vehicle_counts.insert(direction.to_string(), count);
            }
            let timestamp = (args.len() > 4).then(|| args[4..].join(" "));
            ControlRequest::SubmitCounts {
                vehicle_counts,
                timestamp,
            }
        }
        "observe" => return Ok(AdminCommand::Observe(direction_arg(args)?)),
        "submit" => return Ok(AdminCommand::SubmitLatest),
        "help" => return Ok(AdminCommand::Help),
        "exit" | "quit" => return Ok(AdminCommand::Exit),
        other => return Err(AdminParseError::UnknownCommand(other.to_string())),
    };
    Ok(AdminCommand::Request(request))
}

fn print_snapshot(snapshot: &SignalSnapshot) {
    match snapshot.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error encoding state: {}", e),
    }
}

/// Executes one console command. Returns `false` when the console should exit.
pub fn run_admin_command(
    controller: &TrafficLightController,
    analyzer: &dyn VisionAnalyzer,
    command: AdminCommand,
) -> bool {
    match command {
        AdminCommand::Request(request) => match controller.handle(request) {
            Ok(response) => match serde_json::to_string(&response) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error encoding response: {}", e),
            },
            Err(e) => eprintln!("Error: {}", e),
        },
        AdminCommand::Observe(direction) => {
            // Frames come from the camera collaborator; the console sends a placeholder.
            match controller.analyze_and_record(analyzer, b"frame", direction) {
                Ok(count) => println!("{} vehicles approaching from {}", count, direction),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        AdminCommand::SubmitLatest => {
            match controller.submit_latest(Local::now().naive_local()) {
                Ok(outcome) => {
                    print_snapshot(&outcome.snapshot);
                    for failure in outcome.sink_errors {
                        eprintln!("Warning: {}", failure);
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        AdminCommand::Help => println!("{}", HELP),
        AdminCommand::Exit => {
            println!("Exiting CLI.");
            return false;
        }
    }
    true
}

pub async fn run_cli(controller: Arc<TrafficLightController>, analyzer: Arc<dyn VisionAnalyzer>) {
    let result = tokio::task::spawn_blocking(move || {
        println!("\nTraffic Light Controller Admin CLI");
        println!("{}", HELP);
        let stdin = stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            if let Err(e) = stdout().flush() {
                eprintln!("Error flushing stdout: {}", e);
            }
            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    eprintln!("Error reading input: {}", e);
                    break;
                }
                None => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_admin_command(&line) {
                Ok(command) => {
                    if !run_admin_command(&controller, analyzer.as_ref(), command) {
                        break;
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    })
    .await;

    if let Err(e) = result {
        log::error!("Admin CLI task failed: {}", e);
    }
}
