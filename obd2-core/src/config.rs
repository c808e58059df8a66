//! Tunable configuration for the scheduler, state machine, PID manager and
//! sanity checker. Grounded on the teacher firmware's `Config`/`Obd2Config`
//! pattern: serde-derived tunables with per-field `#[serde(default = ...)]`
//! and a `validate()` that clamps out-of-range values and warns rather than
//! rejecting outright.
//!
//! None of these structs carry callbacks, clocks or trait objects — those
//! are wired up by the caller at construction time, not deserialized.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::scheduler::MIN_INTERVAL_MS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u32,
}

const fn default_min_interval_ms() -> u32 {
    MIN_INTERVAL_MS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { min_interval_ms: default_min_interval_ms() }
    }
}

impl SchedulerConfig {
    pub fn validate(&mut self) {
        if self.min_interval_ms < MIN_INTERVAL_MS {
            warn!(
                "clamping scheduler.min_interval_ms from {} to {}",
                self.min_interval_ms, MIN_INTERVAL_MS
            );
            self.min_interval_ms = MIN_INTERVAL_MS;
        }
    }
}

/// Default timeout and retry budget applied to every state in the
/// connection state machine's config table. Per-state overrides are still
/// set up by the caller after building the default table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineConfig {
    #[serde(default = "default_state_timeout_ms")]
    pub default_timeout_ms: u32,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u8,
}

const fn default_state_timeout_ms() -> u32 {
    5000
}

const fn default_max_retries() -> u8 {
    3
}

const MAX_STATE_TIMEOUT_MS: u32 = 60_000;
const MAX_RETRIES: u8 = 10;

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            default_timeout_ms: default_state_timeout_ms(),
            default_max_retries: default_max_retries(),
        }
    }
}

impl StateMachineConfig {
    pub fn validate(&mut self) {
        if self.default_timeout_ms == 0 || self.default_timeout_ms > MAX_STATE_TIMEOUT_MS {
            warn!(
                "clamping state_machine.default_timeout_ms from {} to {}",
                self.default_timeout_ms, MAX_STATE_TIMEOUT_MS
            );
            self.default_timeout_ms = MAX_STATE_TIMEOUT_MS;
        }
        if self.default_max_retries > MAX_RETRIES {
            warn!(
                "clamping state_machine.default_max_retries from {} to {}",
                self.default_max_retries, MAX_RETRIES
            );
            self.default_max_retries = MAX_RETRIES;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidManagerConfig {
    /// Poll rate applied to newly-seen PIDs with no published default rate.
    #[serde(default = "default_unknown_pid_rate_ms")]
    pub unknown_pid_default_rate_ms: u16,
}

const fn default_unknown_pid_rate_ms() -> u16 {
    1000
}

const MIN_PID_RATE_MS: u16 = 10;

impl Default for PidManagerConfig {
    fn default() -> Self {
        PidManagerConfig { unknown_pid_default_rate_ms: default_unknown_pid_rate_ms() }
    }
}

impl PidManagerConfig {
    pub fn validate(&mut self) {
        if self.unknown_pid_default_rate_ms != 0 && self.unknown_pid_default_rate_ms < MIN_PID_RATE_MS
        {
            warn!(
                "clamping pid_manager.unknown_pid_default_rate_ms from {} to {}",
                self.unknown_pid_default_rate_ms, MIN_PID_RATE_MS
            );
            self.unknown_pid_default_rate_ms = MIN_PID_RATE_MS;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanityCheckConfig {
    /// Reproduce the off-by-one "previous value" defect from the reference
    /// implementation. Defaults to `false` (corrected behavior).
    #[serde(default)]
    pub previous_value_bug_compat: bool,
}

impl Default for SanityCheckConfig {
    fn default() -> Self {
        SanityCheckConfig { previous_value_bug_compat: false }
    }
}

impl SanityCheckConfig {
    pub fn validate(&mut self) {
        // Both values are valid by construction; nothing to clamp, but kept
        // for symmetry with the other `*Config::validate()` methods.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_clamps_below_the_minimum() {
        let mut cfg = SchedulerConfig { min_interval_ms: 1 };
        cfg.validate();
        assert_eq!(cfg.min_interval_ms, MIN_INTERVAL_MS);
    }

    #[test]
    fn state_machine_config_clamps_zero_and_oversized_timeout() {
        let mut cfg = StateMachineConfig { default_timeout_ms: 0, default_max_retries: 200 };
        cfg.validate();
        assert_eq!(cfg.default_timeout_ms, MAX_STATE_TIMEOUT_MS);
        assert_eq!(cfg.default_max_retries, MAX_RETRIES);
    }

    #[test]
    fn pid_manager_config_clamps_nonzero_sub_minimum_rate() {
        let mut cfg = PidManagerConfig { unknown_pid_default_rate_ms: 1 };
        cfg.validate();
        assert_eq!(cfg.unknown_pid_default_rate_ms, MIN_PID_RATE_MS);
    }

    #[test]
    fn pid_manager_config_leaves_zero_alone() {
        let mut cfg = PidManagerConfig { unknown_pid_default_rate_ms: 0 };
        cfg.validate();
        assert_eq!(cfg.unknown_pid_default_rate_ms, 0);
    }

    #[test]
    fn defaults_round_trip_through_validate_unchanged() {
        let mut cfg = SchedulerConfig::default();
        cfg.validate();
        assert_eq!(cfg.min_interval_ms, MIN_INTERVAL_MS);
    }
}
