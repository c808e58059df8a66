//! Error taxonomy and the injected error-reporting sink (C2).
//!
//! Every fallible entry point in this crate returns a `Result<T, E>` where
//! `E` is a small, component-specific enum carrying only the cases that
//! component can actually produce. Recoverable conditions additionally get
//! reported, at a severity, to an injected [`ErrorSink`] — the capability-
//! interface equivalent of the original's `ErrorHandler_t*` function pointer.

use std::fmt;

/// Named error conditions reported to an [`ErrorSink`]. Distinct from the
/// `Result<T, E>` returned to the immediate caller: a single call can both
/// return `Err(..)` to its caller *and* report one of these to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    StateInvalidTransition,
    SanityOutOfRange,
    SanitySensorStuck,
    SchedulerQueueFull,
    SchedulerTaskNotFound,
    CommBufferOverflow,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::StateInvalidTransition => "STATE_INVALID_TRANSITION",
            ErrorCode::SanityOutOfRange => "SANITY_OUT_OF_RANGE",
            ErrorCode::SanitySensorStuck => "SANITY_SENSOR_STUCK",
            ErrorCode::SchedulerQueueFull => "SCHEDULER_QUEUE_FULL",
            ErrorCode::SchedulerTaskNotFound => "SCHEDULER_TASK_NOT_FOUND",
            ErrorCode::CommBufferOverflow => "COMM_BUFFER_OVERFLOW",
        };
        f.write_str(s)
    }
}

/// Severity attached to a reported [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Capability interface for the injected error sink. A plain closure works
/// via the blanket impl below, so callers rarely need to name this trait.
pub trait ErrorSink {
    fn report(&mut self, code: ErrorCode, severity: Severity);
}

impl<F> ErrorSink for F
where
    F: FnMut(ErrorCode, Severity),
{
    fn report(&mut self, code: ErrorCode, severity: Severity) {
        self(code, severity)
    }
}

/// Discards every report. Useful where no integrator sink is wired up yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullErrorSink;

impl ErrorSink for NullErrorSink {
    fn report(&mut self, _code: ErrorCode, _severity: Severity) {}
}

/// Routes reports through the `log` crate at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&mut self, code: ErrorCode, severity: Severity) {
        match severity {
            Severity::Info => log::info!("{code}"),
            Severity::Warning => log::warn!("{code}"),
            Severity::Error => log::error!("{code}"),
        }
    }
}
