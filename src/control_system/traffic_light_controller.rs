use crate::control_system::intersection_state::IntersectionState;
use crate::control_system::mode_controller::{plan_transition, Command};
use crate::error::ControlError;
use crate::flow_analyzer::count_ingest::{parse_count_batch, CountIngest, TrafficCountSnapshot};
use crate::flow_analyzer::vision::VisionAnalyzer;
use crate::monitoring::count_sink::CountSink;
use crate::monitoring::signal_broadcast::StateBroadcaster;
use crate::shared_data::{
    current_timestamp, parse_observed_at, ControlMode, CountBatch, Direction, SignalReport,
    SignalSnapshot, SignalUpdate,
};
use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a count submission: the decision plus any rows the sink refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub snapshot: SignalSnapshot,
    pub sink_errors: Vec<ControlError>,
}

/// A request as it arrives from the outer RPC/CLI layer, with directions
/// still in their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlRequest {
    StartTimer,
    StopTimer,
    AdvanceTo {
        direction: String,
    },
    ManualSet {
        direction: String,
    },
    EmergencyStop {
        direction: String,
    },
    ResumeFromEmergency,
    SubmitCounts {
        vehicle_counts: HashMap<String, i64>,
        /// `%Y-%m-%d %H:%M:%S`; the local clock is used when absent.
        #[serde(default)]
        timestamp: Option<String>,
    },
    GetState,
    GetTotalVehicles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Counts {
        #[serde(flatten)]
        report: SignalReport,
        sink_failures: Vec<String>,
    },
    State(SignalReport),
    TotalVehicles {
        total_vehicles: u64,
    },
}

/// One intersection's signal controller.
///
/// Every state-changing command runs its mode check, grant computation and
/// apply while holding `command_lock`, so decisions never race with a
/// concurrent transition. Queries only take the state's read lock.
pub struct TrafficLightController {
    state: IntersectionState,
    command_lock: Mutex<()>,
    // Only advanced while `command_lock` is held.
    sequence: AtomicU64,
    ingest: CountIngest,
    broadcaster: Option<Arc<dyn StateBroadcaster>>,
}

impl TrafficLightController {
    pub fn new(sink: Arc<dyn CountSink>) -> Self {
        Self {
            state: IntersectionState::new(),
            command_lock: Mutex::new(()),
            sequence: AtomicU64::new(0),
            ingest: CountIngest::new(sink),
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn StateBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    // Runs one command as a single critical section, then broadcasts outside it.
    fn execute(&self, command: Command) -> Result<SignalSnapshot, ControlError> {
        let (snapshot, sequence) = {
            let _guard = self.command_lock.lock();
            let current = self.state.read();
            let transition = match plan_transition(&current, &command) {
                Ok(transition) => transition,
                Err(e) => {
                    log::warn!("Rejected {} in {} mode: {}", command.name(), current.mode, e);
                    return Err(e);
                }
            };
            let snapshot = self.state.apply(transition.grant, transition.mode)?;
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            (snapshot, sequence)
        };

        log::info!(
            "{} -> mode {}, green {:?}",
            command.name(),
            snapshot.mode,
            snapshot.green_direction()
        );
        self.broadcast(&snapshot, sequence);
        Ok(snapshot)
    }

    fn broadcast(&self, snapshot: &SignalSnapshot, sequence: u64) {
        if let Some(broadcaster) = &self.broadcaster {
            let update = SignalUpdate {
                sequence,
                timestamp: current_timestamp(),
                report: snapshot.to_report(),
            };
            if let Err(e) = broadcaster.publish(&update) {
                log::error!("Failed to broadcast signal update {}: {}", sequence, e);
            }
        }
    }

    /// Arms the round-robin cycle. Signals are left as they are until the
    /// first advance.
    pub fn start_timer(&self) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::StartTimer)
    }

    /// Returns to Idle with every approach red/0.
    pub fn stop_timer(&self) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::StopTimer)
    }

    pub fn advance_to(&self, direction: Direction) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::AdvanceTo(direction))
    }

    /// Advances the running cycle to the approach after the current green,
    /// resolved under the command lock.
    pub fn advance_next(&self) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::AdvanceNext)
    }

    pub fn manual_set(&self, direction: Direction) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::ManualSet(direction))
    }

    pub fn emergency_stop(&self, direction: Direction) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::EmergencyStop(direction))
    }

    pub fn resume_from_emergency(&self) -> Result<SignalSnapshot, ControlError> {
        self.execute(Command::ResumeFromEmergency)
    }

    /// Validates a batch, stores it, then switches to adaptive control.
    ///
    /// Sink writes happen before the command lock is taken so storage latency
    /// never blocks other commands; sink failures are returned alongside the
    /// decision instead of failing it.
    pub fn submit_counts(
        &self,
        batch: &CountBatch,
        observed_at: NaiveDateTime,
    ) -> Result<SubmitOutcome, ControlError> {
        let counts = self.ingest.validate(batch)?;
        if self.state.mode() == ControlMode::EmergencyOverride {
            let err = ControlError::ModeLocked {
                command: Command::SubmitCounts(counts).name(),
            };
            log::warn!("Rejected count batch: {}", err);
            return Err(err);
        }

        let ingested = self.ingest.persist(counts, observed_at);
        let snapshot = self.execute(Command::SubmitCounts(ingested.counts))?;
        self.ingest.remember(&ingested.counts);
        Ok(SubmitOutcome {
            snapshot,
            sink_errors: ingested.sink_errors,
        })
    }

    /// Submits the latest per-direction observations as one batch.
    pub fn submit_latest(&self, observed_at: NaiveDateTime) -> Result<SubmitOutcome, ControlError> {
        let batch = self.ingest.latest_batch()?;
        self.submit_counts(&batch, observed_at)
    }

    pub fn record_observation(&self, direction: Direction, count: u32) {
        self.ingest.record_observation(direction, count);
    }

    pub fn analyze_and_record(
        &self,
        analyzer: &dyn VisionAnalyzer,
        image: &[u8],
        direction: Direction,
    ) -> Result<u32, ControlError> {
        self.ingest.analyze_and_record(analyzer, image, direction)
    }

    pub fn latest_counts(&self) -> TrafficCountSnapshot {
        self.ingest.latest()
    }

    pub fn get_state(&self) -> SignalSnapshot {
        self.state.read()
    }

    pub fn get_total_vehicles_observed(&self) -> Result<u64, ControlError> {
        self.ingest.total_observed()
    }

    /// Dispatches a boundary request and shapes the reply.
    pub fn handle(&self, request: ControlRequest) -> Result<ControlResponse, ControlError> {
        let snapshot = match request {
            ControlRequest::StartTimer => self.start_timer()?,
            ControlRequest::StopTimer => self.stop_timer()?,
            ControlRequest::AdvanceTo { direction } => self.advance_to(direction.parse()?)?,
            ControlRequest::ManualSet { direction } => self.manual_set(direction.parse()?)?,
            ControlRequest::EmergencyStop { direction } => {
                self.emergency_stop(direction.parse()?)?
            }
            ControlRequest::ResumeFromEmergency => self.resume_from_emergency()?,
            ControlRequest::SubmitCounts {
                vehicle_counts,
                timestamp,
            } => {
                let batch = parse_count_batch(&vehicle_counts)?;
                let observed_at = match timestamp {
                    Some(raw) => parse_observed_at(&raw)?,
                    None => Local::now().naive_local(),
                };
                let outcome = self.submit_counts(&batch, observed_at)?;
                return Ok(ControlResponse::Counts {
                    report: outcome.snapshot.to_report(),
                    sink_failures: outcome.sink_errors.iter().map(|e| e.to_string()).collect(),
                });
            }
            ControlRequest::GetState => self.get_state(),
            ControlRequest::GetTotalVehicles => {
                return Ok(ControlResponse::TotalVehicles {
                    total_vehicles: self.get_total_vehicles_observed()?,
                });
            }
        };
        Ok(ControlResponse::State(snapshot.to_report()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::monitoring::count_sink::MemoryCountSink;
    use crate::monitoring::signal_broadcast::ChannelBroadcaster;
    use crate::shared_data::{DirectionState, SignalColor, VehicleCountObservation};
    use std::sync::{OnceLock, Weak};
    use Direction::*;

    struct RefusingSink;

    impl CountSink for RefusingSink {
        fn append(&self, _: &VehicleCountObservation) -> Result<(), SinkError> {
            Err(SinkError::Rejected("read-only".into()))
        }

        fn sum_all(&self) -> Result<u64, SinkError> {
            Err(SinkError::Rejected("offline".into()))
        }
    }

    /// Declares an emergency on its controller while the first row is written,
    /// landing between the pre-lock mode check and the decision.
    struct EmergencyOnAppend {
        controller: OnceLock<Weak<TrafficLightController>>,
        inner: MemoryCountSink,
    }

    impl CountSink for EmergencyOnAppend {
        fn append(&self, observation: &VehicleCountObservation) -> Result<(), SinkError> {
            if let Some(ctrl) = self.controller.get().and_then(Weak::upgrade) {
                if ctrl.get_state().mode != ControlMode::EmergencyOverride {
                    ctrl.emergency_stop(East).unwrap();
                }
            }
            self.inner.append(observation)
        }

        fn sum_all(&self) -> Result<u64, SinkError> {
            self.inner.sum_all()
        }
    }

    fn controller() -> (TrafficLightController, Arc<MemoryCountSink>) {
        let sink = Arc::new(MemoryCountSink::new());
        (TrafficLightController::new(sink.clone()), sink)
    }

    fn batch(n: i64, s: i64, e: i64, w: i64) -> CountBatch {
        [(North, n), (South, s), (East, e), (West, w)]
            .into_iter()
            .collect()
    }

    fn at() -> NaiveDateTime {
        parse_observed_at("2024-02-02 12:00:00").unwrap()
    }

    #[test]
    fn start_timer_changes_mode_only() {
        let (ctrl, _) = controller();
        let snapshot = ctrl.start_timer().unwrap();
        assert_eq!(snapshot.mode, ControlMode::TimedCycle);
        assert_eq!(snapshot.directions, SignalSnapshot::idle().directions);
    }

    #[test]
    fn timed_cycle_recomputes_waits_on_each_advance() {
        let (ctrl, _) = controller();
        ctrl.start_timer().unwrap();
        let south = ctrl.advance_to(South).unwrap();
        assert_eq!(south.state_of(North), Some(DirectionState::red(90)));

        let east = ctrl.advance_to(East).unwrap();
        assert_eq!(east.mode, ControlMode::TimedCycle);
        assert_eq!(east.state_of(East), Some(DirectionState::green()));
        assert_eq!(east.state_of(West), Some(DirectionState::red(30)));
        assert_eq!(east.state_of(North), Some(DirectionState::red(60)));
        assert_eq!(east.state_of(South), Some(DirectionState::red(90)));
    }

    #[test]
    fn stop_timer_is_idempotent() {
        let (ctrl, _) = controller();
        ctrl.start_timer().unwrap();
        ctrl.advance_to(West).unwrap();
        let first = ctrl.stop_timer().unwrap();
        let second = ctrl.stop_timer().unwrap();
        assert_eq!(first, SignalSnapshot::idle());
        assert_eq!(second, first);
    }

    #[test]
    fn emergency_locks_out_other_commands_until_resume() {
        let (ctrl, sink) = controller();
        ctrl.manual_set(North).unwrap();
        let locked = ctrl.emergency_stop(West).unwrap();
        assert_eq!(locked.mode, ControlMode::EmergencyOverride);

        assert!(matches!(ctrl.start_timer(), Err(ControlError::ModeLocked { .. })));
        assert!(matches!(ctrl.stop_timer(), Err(ControlError::ModeLocked { .. })));
        assert!(matches!(ctrl.manual_set(East), Err(ControlError::ModeLocked { .. })));
        assert!(matches!(
            ctrl.submit_counts(&batch(1, 2, 3, 4), at()),
            Err(ControlError::ModeLocked { .. })
        ));
        assert!(sink.records().is_empty(), "locked batch must not reach the sink");
        assert_eq!(ctrl.get_state(), locked);

        // emergency can be redirected while active
        let redirected = ctrl.emergency_stop(South).unwrap();
        assert_eq!(redirected.green_direction(), Some(South));

        let resumed = ctrl.resume_from_emergency().unwrap();
        assert_eq!(resumed, SignalSnapshot::idle());
        assert!(ctrl.manual_set(East).is_ok());
    }

    #[test]
    fn invalid_batch_changes_nothing() {
        let (ctrl, sink) = controller();
        ctrl.manual_set(South).unwrap();
        let before = ctrl.get_state();
        let err = ctrl.submit_counts(&batch(1, -1, 0, 0), at()).unwrap_err();
        assert!(matches!(err, ControlError::InvalidObservation(_)));
        assert_eq!(ctrl.get_state(), before);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn submit_counts_grants_busiest_direction_and_records_history() {
        let (ctrl, sink) = controller();
        let outcome = ctrl.submit_counts(&batch(10, 10, 5, 0), at()).unwrap();
        assert!(outcome.sink_errors.is_empty());
        assert_eq!(outcome.snapshot.mode, ControlMode::AdaptiveControl);
        assert_eq!(outcome.snapshot.green_direction(), Some(North));
        assert_eq!(outcome.snapshot.state_of(East), Some(DirectionState::red(50)));
        assert_eq!(sink.records().len(), 4);
        assert_eq!(ctrl.get_total_vehicles_observed().unwrap(), 25);
    }

    #[test]
    fn sink_failures_do_not_roll_back_the_decision() {
        let ctrl = TrafficLightController::new(Arc::new(RefusingSink));
        let outcome = ctrl.submit_counts(&batch(0, 9, 0, 0), at()).unwrap();
        assert_eq!(outcome.sink_errors.len(), 4);
        assert_eq!(ctrl.get_state().green_direction(), Some(South));
        assert!(matches!(
            ctrl.get_total_vehicles_observed(),
            Err(ControlError::SinkQueryFailed(_))
        ));
    }

    #[test]
    fn batch_overtaken_by_emergency_does_not_become_latest() {
        let sink = Arc::new(EmergencyOnAppend {
            controller: OnceLock::new(),
            inner: MemoryCountSink::new(),
        });
        let ctrl = Arc::new(TrafficLightController::new(sink.clone()));
        sink.controller.set(Arc::downgrade(&ctrl)).unwrap();

        let err = ctrl.submit_counts(&batch(4, 9, 1, 2), at()).unwrap_err();
        assert!(matches!(err, ControlError::ModeLocked { .. }));
        assert_eq!(ctrl.get_state().green_direction(), Some(East));
        assert_eq!(ctrl.latest_counts(), TrafficCountSnapshot::default());
    }

    #[test]
    fn accepted_batch_becomes_latest() {
        let (ctrl, _) = controller();
        ctrl.submit_counts(&batch(4, 9, 1, 2), at()).unwrap();
        assert_eq!(ctrl.latest_counts().get(South), Some(9));
    }

    #[test]
    fn advance_next_steps_from_the_current_green() {
        let (ctrl, _) = controller();
        assert!(matches!(
            ctrl.advance_next(),
            Err(ControlError::IllegalTransition { .. })
        ));
        ctrl.start_timer().unwrap();
        assert_eq!(ctrl.advance_next().unwrap().green_direction(), Some(North));
        ctrl.advance_to(West).unwrap();
        assert_eq!(ctrl.advance_next().unwrap().green_direction(), Some(North));
    }

    #[test]
    fn submit_latest_uses_recorded_observations() {
        let (ctrl, _) = controller();
        ctrl.record_observation(North, 1);
        assert!(matches!(
            ctrl.submit_latest(at()),
            Err(ControlError::InvalidObservation(_))
        ));
        ctrl.record_observation(South, 2);
        ctrl.record_observation(East, 12);
        ctrl.record_observation(West, 3);
        let outcome = ctrl.submit_latest(at()).unwrap();
        assert_eq!(outcome.snapshot.green_direction(), Some(East));
    }

    #[test]
    fn accepted_commands_are_broadcast_in_order() {
        let broadcaster = Arc::new(ChannelBroadcaster::new(8));
        let mut rx = broadcaster.subscribe();
        let ctrl = TrafficLightController::new(Arc::new(MemoryCountSink::new()))
            .with_broadcaster(broadcaster);

        ctrl.manual_set(West).unwrap();
        assert!(ctrl.advance_to(North).is_err());
        ctrl.emergency_stop(North).unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!(first.report.signal_status[&West], SignalColor::Green);
        assert_eq!(second.report.mode, ControlMode::EmergencyOverride);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn handle_parses_directions_and_timestamps() {
        let (ctrl, _) = controller();
        assert_eq!(
            ctrl.handle(ControlRequest::ManualSet {
                direction: "sideways".into()
            }),
            Err(ControlError::InvalidDirection("sideways".into()))
        );

        let request: ControlRequest = serde_json::from_str(
            r#"{"action":"submit_counts",
                "vehicle_counts":{"north":2,"south":8,"east":1,"west":0},
                "timestamp":"2024-02-02 12:00:00"}"#,
        )
        .unwrap();
        match ctrl.handle(request).unwrap() {
            ControlResponse::Counts {
                report,
                sink_failures,
            } => {
                assert_eq!(report.signal_status[&South], SignalColor::Green);
                assert_eq!(report.wait_times[&North], 60);
                assert!(sink_failures.is_empty());
            }
            other => panic!("unexpected response {other:?}"),
        }

        assert_eq!(
            ctrl.handle(ControlRequest::GetTotalVehicles).unwrap(),
            ControlResponse::TotalVehicles { total_vehicles: 11 }
        );

        let bad_time = ControlRequest::SubmitCounts {
            vehicle_counts: [("north", 1), ("south", 1), ("east", 1), ("west", 1)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            timestamp: Some("02/02/2024".into()),
        };
        assert!(matches!(
            ctrl.handle(bad_time),
            Err(ControlError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn responses_serialize_like_the_dashboard_expects() {
        let (ctrl, _) = controller();
        let response = ctrl
            .handle(ControlRequest::EmergencyStop {
                direction: "west".into(),
            })
            .unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["mode"], "emergency_override");
        assert_eq!(value["signal_status"]["west"], "green");
        assert_eq!(value["wait_times"]["north"], 60);
    }
}
