//! Connection state machine (C9): table-driven transitions with per-state
//! timeout and retry, driven by [`StateMachine::process_event`] and
//! [`StateMachine::update`].
//!
//! The transition table below has 50 rows, transcribed row-by-row against
//! `state_machine.c`'s static `state_transitions[]` table.

use crate::clock::{elapsed, Clock};
use crate::error::{ErrorCode, ErrorSink, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    ElmInit,
    ProtocolDetect,
    VehicleHandshake,
    Idle,
    ReadingPids,
    ReadingDtcs,
    ClearingDtcs,
    ReadingFreezeFrame,
    ReadingVehicleInfo,
    Error,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    None,
    ConnectRequest,
    Connected,
    Timeout,
    DisconnectRequest,
    ElmInitComplete,
    ElmInitFailed,
    ProtocolDetected,
    ProtocolFailed,
    HandshakeComplete,
    HandshakeFailed,
    ReadPidsRequest,
    ReadDtcsRequest,
    ClearDtcsRequest,
    ReadFreezeFrameRequest,
    ReadVehicleInfoRequest,
    OperationComplete,
    OperationFailed,
    Error,
    RecoveryComplete,
    RecoveryFailed,
}

struct Transition {
    from: State,
    event: Event,
    to: State,
}

macro_rules! t {
    ($from:ident, $event:ident, $to:ident) => {
        Transition { from: State::$from, event: Event::$event, to: State::$to }
    };
}

/// Transcribed row-for-row from the reference `state_transitions[]` table.
static TRANSITIONS: &[Transition] = &[
    t!(Disconnected, ConnectRequest, Connecting),
    t!(Connecting, Connected, ElmInit),
    t!(Connecting, Timeout, Error),
    t!(Connecting, Error, Error),
    t!(Connecting, DisconnectRequest, Disconnected),
    t!(ElmInit, ElmInitComplete, ProtocolDetect),
    t!(ElmInit, ElmInitFailed, Recovery),
    t!(ElmInit, Timeout, Recovery),
    t!(ElmInit, DisconnectRequest, Disconnected),
    t!(ProtocolDetect, ProtocolDetected, VehicleHandshake),
    t!(ProtocolDetect, ProtocolFailed, Recovery),
    t!(ProtocolDetect, Timeout, Recovery),
    t!(ProtocolDetect, DisconnectRequest, Disconnected),
    t!(VehicleHandshake, HandshakeComplete, Idle),
    t!(VehicleHandshake, HandshakeFailed, Recovery),
    t!(VehicleHandshake, Timeout, Recovery),
    t!(VehicleHandshake, DisconnectRequest, Disconnected),
    t!(Idle, ReadPidsRequest, ReadingPids),
    t!(Idle, ReadDtcsRequest, ReadingDtcs),
    t!(Idle, ClearDtcsRequest, ClearingDtcs),
    t!(Idle, ReadFreezeFrameRequest, ReadingFreezeFrame),
    t!(Idle, ReadVehicleInfoRequest, ReadingVehicleInfo),
    t!(Idle, DisconnectRequest, Disconnected),
    t!(Idle, Error, Error),
    t!(ReadingPids, OperationComplete, Idle),
    t!(ReadingPids, OperationFailed, Recovery),
    t!(ReadingPids, Timeout, Recovery),
    t!(ReadingPids, DisconnectRequest, Disconnected),
    t!(ReadingDtcs, OperationComplete, Idle),
    t!(ReadingDtcs, OperationFailed, Recovery),
    t!(ReadingDtcs, Timeout, Recovery),
    t!(ReadingDtcs, DisconnectRequest, Disconnected),
    t!(ClearingDtcs, OperationComplete, Idle),
    t!(ClearingDtcs, OperationFailed, Recovery),
    t!(ClearingDtcs, Timeout, Recovery),
    t!(ClearingDtcs, DisconnectRequest, Disconnected),
    t!(ReadingFreezeFrame, OperationComplete, Idle),
    t!(ReadingFreezeFrame, OperationFailed, Recovery),
    t!(ReadingFreezeFrame, Timeout, Recovery),
    t!(ReadingFreezeFrame, DisconnectRequest, Disconnected),
    t!(ReadingVehicleInfo, OperationComplete, Idle),
    t!(ReadingVehicleInfo, OperationFailed, Recovery),
    t!(ReadingVehicleInfo, Timeout, Recovery),
    t!(ReadingVehicleInfo, DisconnectRequest, Disconnected),
    t!(Error, RecoveryComplete, Idle),
    t!(Error, DisconnectRequest, Disconnected),
    t!(Recovery, RecoveryComplete, ElmInit),
    t!(Recovery, RecoveryFailed, Error),
    t!(Recovery, Timeout, Error),
    t!(Recovery, DisconnectRequest, Disconnected),
];

fn find_next_state(from: State, event: Event) -> Option<State> {
    TRANSITIONS
        .iter()
        .find(|row| row.from == from && row.event == event)
        .map(|row| row.to)
}

/// Per-state timeout and retry budget, plus optional entry/exit hooks. The
/// hooks are boxed for the same reason the scheduler boxes task functions:
/// each of the 13 states can carry a differently-shaped closure.
pub struct StateConfig {
    pub timeout_ms: u32,
    pub max_retries: u8,
    pub on_entry: Option<Box<dyn FnMut(State)>>,
    pub on_exit: Option<Box<dyn FnMut(State)>>,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig { timeout_ms: 0, max_retries: 0, on_entry: None, on_exit: None }
    }
}

/// Indexed by `State as usize`; all 13 states must be present.
pub type StateConfigTable = [StateConfig; 13];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMachineError {
    InvalidTransition,
}

pub struct StateMachine<Clk, Cb> {
    current: State,
    previous: State,
    retry_count: u8,
    state_entry_time_ms: u32,
    clock: Clk,
    transition_callback: Option<Cb>,
    configs: StateConfigTable,
}

impl<Clk, Cb> StateMachine<Clk, Cb>
where
    Clk: Clock,
    Cb: FnMut(State, State, Event),
{
    pub fn new(clock: Clk, transition_callback: Option<Cb>, configs: StateConfigTable) -> Self {
        let now = clock.now_ms();
        StateMachine {
            current: State::Disconnected,
            previous: State::Disconnected,
            retry_count: 0,
            state_entry_time_ms: now,
            clock,
            transition_callback,
            configs,
        }
    }

    #[must_use]
    pub fn current_state(&self) -> State {
        self.current
    }

    #[must_use]
    pub fn previous_state(&self) -> State {
        self.previous
    }

    #[must_use]
    pub fn is_in_state(&self, state: State) -> bool {
        self.current == state
    }

    #[must_use]
    pub fn can_transition(&self, event: Event) -> bool {
        find_next_state(self.current, event).is_some()
    }

    /// on_exit(old) -> swap -> reset retries -> restamp entry time ->
    /// transition_callback(from, to, event) -> on_entry(new). Order matters.
    fn execute_transition(&mut self, from: State, event: Event, to: State) {
        if let Some(mut hook) = self.configs[from as usize].on_exit.take() {
            hook(from);
            self.configs[from as usize].on_exit = Some(hook);
        }
        self.previous = from;
        self.current = to;
        self.retry_count = 0;
        self.state_entry_time_ms = self.clock.now_ms();
        if let Some(cb) = &mut self.transition_callback {
            cb(from, to, event);
        }
        if let Some(mut hook) = self.configs[to as usize].on_entry.take() {
            hook(to);
            self.configs[to as usize].on_entry = Some(hook);
        }
    }

    /// `Event::None` is always a no-op and never consults the table. An
    /// event with no matching row reports `StateInvalidTransition` and
    /// leaves the current state untouched.
    pub fn process_event(
        &mut self,
        event: Event,
        error_sink: &mut impl ErrorSink,
    ) -> Result<(), StateMachineError> {
        if event == Event::None {
            return Ok(());
        }
        match find_next_state(self.current, event) {
            Some(to) => {
                self.execute_transition(self.current, event, to);
                Ok(())
            }
            None => {
                error_sink.report(ErrorCode::StateInvalidTransition, Severity::Warning);
                Err(StateMachineError::InvalidTransition)
            }
        }
    }

    #[must_use]
    pub fn time_in_state(&self) -> u32 {
        elapsed(self.clock.now_ms(), self.state_entry_time_ms)
    }

    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        let timeout = self.configs[self.current as usize].timeout_ms;
        timeout != 0 && self.time_in_state() >= timeout
    }

    /// On timeout: if retries remain, bump the retry count and restamp the
    /// entry time (a soft reset of the timeout window, not a real
    /// transition); otherwise feed `Event::Timeout` through the table.
    pub fn update(&mut self, error_sink: &mut impl ErrorSink) -> Result<(), StateMachineError> {
        if !self.is_timed_out() {
            return Ok(());
        }
        let max_retries = self.configs[self.current as usize].max_retries;
        if self.retry_count < max_retries {
            self.retry_count += 1;
            self.state_entry_time_ms = self.clock.now_ms();
            Ok(())
        } else {
            self.process_event(Event::Timeout, error_sink)
        }
    }

    /// Forces the full transition pipeline back to `Disconnected`, running
    /// on_exit/on_entry/callback even though `DisconnectRequest` isn't
    /// looked up from the table here.
    pub fn reset(&mut self) {
        let from = self.current;
        self.execute_transition(from, Event::DisconnectRequest, State::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::NullErrorSink;

    fn empty_configs() -> StateConfigTable {
        Default::default()
    }

    fn configs_with_timeout(state: State, timeout_ms: u32, max_retries: u8) -> StateConfigTable {
        let mut configs: StateConfigTable = Default::default();
        configs[state as usize].timeout_ms = timeout_ms;
        configs[state as usize].max_retries = max_retries;
        configs
    }

    fn machine_at(now: u32, configs: StateConfigTable) -> StateMachine<FixedClock, fn(State, State, Event)> {
        StateMachine::new(FixedClock(now), None, configs)
    }

    #[test]
    fn starts_disconnected() {
        let sm = machine_at(0, empty_configs());
        assert_eq!(sm.current_state(), State::Disconnected);
        assert_eq!(sm.previous_state(), State::Disconnected);
    }

    #[test]
    fn none_event_is_always_a_no_op() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        sm.process_event(Event::None, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Disconnected);
    }

    #[test]
    fn unmatched_event_reports_and_leaves_state_untouched() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        let result = sm.process_event(Event::OperationComplete, &mut sink);
        assert_eq!(result, Err(StateMachineError::InvalidTransition));
        assert_eq!(sm.current_state(), State::Disconnected);
    }

    #[test]
    fn full_happy_path_to_idle() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        sm.process_event(Event::ConnectRequest, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Connecting);
        sm.process_event(Event::Connected, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::ElmInit);
        sm.process_event(Event::ElmInitComplete, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::ProtocolDetect);
        sm.process_event(Event::ProtocolDetected, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::VehicleHandshake);
        sm.process_event(Event::HandshakeComplete, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Idle);
    }

    #[test]
    fn timeout_then_recovery_then_back_to_idle() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        sm.process_event(Event::ConnectRequest, &mut sink).unwrap();
        sm.process_event(Event::Timeout, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Error);
        // Error -> Idle requires RecoveryComplete per the table.
        sm.process_event(Event::RecoveryComplete, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Idle);
    }

    #[test]
    fn recovery_timeout_goes_to_error_not_elm_init() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        sm.process_event(Event::ConnectRequest, &mut sink).unwrap();
        sm.process_event(Event::Connected, &mut sink).unwrap();
        sm.process_event(Event::ElmInitFailed, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Recovery);
        sm.process_event(Event::Timeout, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Error);
    }

    #[test]
    fn update_retries_before_giving_up_to_timeout_event() {
        // Entry time is stamped at construction, then ConnectRequest moves
        // to Connecting and restamps it again at the same clock reading.
        let configs = configs_with_timeout(State::Connecting, 1_000, 2);
        let mut sm = machine_at(1_500, configs);
        let mut sink = NullErrorSink;
        sm.process_event(Event::ConnectRequest, &mut sink).unwrap();
        sm.state_entry_time_ms = 0; // simulate 1_500ms having passed in Connecting
        assert!(sm.is_timed_out());
        sm.update(&mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Connecting, "retry should not transition yet");
        assert!(!sm.is_timed_out(), "entry time should have been restamped");
    }

    #[test]
    fn reset_runs_full_transition_pipeline() {
        let mut sm = machine_at(0, empty_configs());
        let mut sink = NullErrorSink;
        sm.process_event(Event::ConnectRequest, &mut sink).unwrap();
        assert_eq!(sm.current_state(), State::Connecting);
        sm.reset();
        assert_eq!(sm.current_state(), State::Disconnected);
        assert_eq!(sm.previous_state(), State::Connecting);
    }

    #[test]
    fn can_transition_reflects_the_table_without_mutating() {
        let sm = machine_at(0, empty_configs());
        assert!(sm.can_transition(Event::ConnectRequest));
        assert!(!sm.can_transition(Event::OperationComplete));
        assert_eq!(sm.current_state(), State::Disconnected);
    }

    #[test]
    fn transition_table_has_fifty_rows() {
        assert_eq!(TRANSITIONS.len(), 50);
    }
}
