//! Transport- and platform-independent core of an OBD-II diagnostic client:
//! a table-driven connection state machine, a cooperative task scheduler, a
//! PID registry/decoder, a PID read scheduler, a plausibility sanity
//! checker, a generic transport adapter, and readiness/vehicle-info
//! tracking.
//!
//! This crate has no dependency on any transport, UI, or platform SDK.
//! Callers inject a [`clock::Clock`] and (optionally) an [`error::ErrorSink`]
//! or callbacks; everything here runs on a single thread with no heap
//! allocation at steady state.

pub mod clock;
pub mod config;
pub mod error;
pub mod frame;
pub mod pid;
pub mod readiness;
pub mod ring;
pub mod sanity;
pub mod scheduler;
pub mod state_machine;
pub mod transport;
pub mod vehicle_info;

pub use clock::{Clock, FixedClock};
pub use error::{ErrorCode, ErrorSink, LogErrorSink, NullErrorSink, Severity};
pub use frame::Frame;
pub use ring::RingBuffer;
pub use state_machine::{Event, State, StateMachine};
