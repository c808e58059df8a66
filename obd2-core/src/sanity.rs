//! Sanity validator (C7): range / stuck / rate-of-change checks against a
//! short per-PID history, configured by a static rule table transcribed
//! from the reference `sanity_rules[]` table.

use crate::clock::Clock;
use crate::error::{ErrorCode, ErrorSink, Severity};
use smallvec::SmallVec;

pub const HISTORY_SIZE: usize = 8;
pub const STUCK_THRESHOLD: u8 = 5;
const MAX_HISTORIES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityResult {
    Ok,
    OutOfRange,
    SensorStuck,
    InvalidData,
    RateOfChange,
}

/// One row of the static per-PID rule table.
#[derive(Debug, Clone, Copy)]
pub struct SanityRule {
    pub pid: u8,
    pub min: f32,
    pub max: f32,
    pub max_rate_of_change: f32,
    pub check_stuck: bool,
    pub check_range: bool,
    pub check_rate: bool,
}

/// Transcribed bit-exactly from the reference `sanity_rules[]` table.
pub static SANITY_RULES: &[SanityRule] = &[
    SanityRule { pid: 0x04, min: 0.0, max: 100.0, max_rate_of_change: 50.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x05, min: -40.0, max: 215.0, max_rate_of_change: 10.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x06, min: -100.0, max: 99.2, max_rate_of_change: 20.0, check_stuck: false, check_range: true, check_rate: false },
    SanityRule { pid: 0x07, min: -100.0, max: 99.2, max_rate_of_change: 10.0, check_stuck: false, check_range: true, check_rate: false },
    SanityRule { pid: 0x0B, min: 0.0, max: 255.0, max_rate_of_change: 50.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x0C, min: 0.0, max: 16383.75, max_rate_of_change: 2000.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x0D, min: 0.0, max: 255.0, max_rate_of_change: 30.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x0E, min: -64.0, max: 63.5, max_rate_of_change: 20.0, check_stuck: false, check_range: true, check_rate: true },
    SanityRule { pid: 0x0F, min: -40.0, max: 215.0, max_rate_of_change: 5.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x10, min: 0.0, max: 655.35, max_rate_of_change: 100.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x11, min: 0.0, max: 100.0, max_rate_of_change: 50.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x2F, min: 0.0, max: 100.0, max_rate_of_change: 5.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x33, min: 70.0, max: 110.0, max_rate_of_change: 2.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x42, min: 0.0, max: 65.535, max_rate_of_change: 5.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x46, min: -40.0, max: 215.0, max_rate_of_change: 2.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x5C, min: -40.0, max: 210.0, max_rate_of_change: 5.0, check_stuck: true, check_range: true, check_rate: true },
    SanityRule { pid: 0x5E, min: 0.0, max: 3276.75, max_rate_of_change: 50.0, check_stuck: true, check_range: true, check_rate: true },
];

#[must_use]
pub fn find_rule(pid: u8) -> Option<&'static SanityRule> {
    SANITY_RULES.iter().find(|r| r.pid == pid)
}

#[derive(Debug, Clone, Copy)]
struct History {
    pid: u8,
    samples: [f32; HISTORY_SIZE],
    next_idx: usize,
    count: usize,
    stuck_count: u8,
    last_check_ms: u32,
}

impl History {
    fn new(pid: u8) -> Self {
        History {
            pid,
            samples: [0.0; HISTORY_SIZE],
            next_idx: 0,
            count: 0,
            stuck_count: 0,
            last_check_ms: 0,
        }
    }

    fn push(&mut self, value: f32) {
        self.samples[self.next_idx] = value;
        self.next_idx = (self.next_idx + 1) % HISTORY_SIZE;
        if self.count < HISTORY_SIZE {
            self.count += 1;
        }
    }

    /// The reference implementation steps back from `next_idx` twice
    /// instead of once. `buggy` selects that behavior bit-for-bit; the
    /// default (`buggy = false`) is the intended "most recently appended
    /// sample" semantics.
    fn previous_value(&self, buggy: bool) -> f32 {
        let step_back = |idx: usize| if idx == 0 { HISTORY_SIZE - 1 } else { idx - 1 };
        let one_back = step_back(self.next_idx);
        if !buggy {
            return if self.count >= 1 { self.samples[one_back] } else { 0.0 };
        }
        if self.count < 2 {
            return 0.0;
        }
        self.samples[step_back(one_back)]
    }

    fn clear(&mut self) {
        self.next_idx = 0;
        self.count = 0;
        self.stuck_count = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityError {
    NotReady,
}

pub struct SanityCheck<C, Clk> {
    histories: SmallVec<[History; MAX_HISTORIES]>,
    total_checks: u32,
    total_failures: u32,
    clock: Clk,
    error_sink: Option<C>,
    previous_value_bug_compat: bool,
}

impl<C, Clk> SanityCheck<C, Clk>
where
    C: ErrorSink,
    Clk: Clock,
{
    /// `previous_value_bug_compat` toggles the two-steps-back defect in
    /// `previous_value` for callers that need to reproduce it exactly.
    pub fn new(clock: Clk, error_sink: Option<C>, previous_value_bug_compat: bool) -> Self {
        SanityCheck {
            histories: SmallVec::new(),
            total_checks: 0,
            total_failures: 0,
            clock,
            error_sink,
            previous_value_bug_compat,
        }
    }

    fn find_or_create_history(&mut self, pid: u8) -> Option<&mut History> {
        if self.histories.iter().any(|h| h.pid == pid) {
            return self.histories.iter_mut().find(|h| h.pid == pid);
        }
        if self.histories.len() >= MAX_HISTORIES {
            return None;
        }
        self.histories.push(History::new(pid));
        self.histories.last_mut()
    }

    #[must_use]
    pub fn validate_range(pid: u8, value: f32) -> SanityResult {
        match find_rule(pid) {
            Some(rule) if rule.check_range && (value < rule.min || value > rule.max) => {
                SanityResult::OutOfRange
            }
            _ => SanityResult::Ok,
        }
    }

    pub fn validate_stuck(&mut self, pid: u8, value: f32) -> SanityResult {
        let Some(rule) = find_rule(pid) else {
            return SanityResult::Ok;
        };
        if !rule.check_stuck {
            return SanityResult::Ok;
        }
        let buggy = self.previous_value_bug_compat;
        let Some(hist) = self.find_or_create_history(pid) else {
            return SanityResult::Ok;
        };
        if hist.count > 0 {
            let prev = hist.previous_value(buggy);
            if (value - prev).abs() < 0.001 {
                hist.stuck_count += 1;
                if hist.stuck_count >= STUCK_THRESHOLD {
                    return SanityResult::SensorStuck;
                }
            } else {
                hist.stuck_count = 0;
            }
        }
        SanityResult::Ok
    }

    pub fn validate_rate_of_change(&mut self, pid: u8, value: f32) -> SanityResult {
        let Some(rule) = find_rule(pid) else {
            return SanityResult::Ok;
        };
        if !rule.check_rate {
            return SanityResult::Ok;
        }
        let buggy = self.previous_value_bug_compat;
        let max_rate = rule.max_rate_of_change;
        let Some(hist) = self.find_or_create_history(pid) else {
            return SanityResult::Ok;
        };
        if hist.count > 0 {
            let prev = hist.previous_value(buggy);
            if (value - prev).abs() > max_rate {
                return SanityResult::RateOfChange;
            }
        }
        SanityResult::Ok
    }

    /// Range -> stuck -> rate-of-change, short-circuiting on the first
    /// failure. Only full success appends to history.
    pub fn validate_pid(&mut self, pid: u8, eng_value: f32, valid: bool) -> SanityResult {
        if !valid {
            return SanityResult::InvalidData;
        }
        self.total_checks += 1;

        let range = Self::validate_range(pid, eng_value);
        if range != SanityResult::Ok {
            self.total_failures += 1;
            if let Some(sink) = &mut self.error_sink {
                sink.report(ErrorCode::SanityOutOfRange, Severity::Warning);
            }
            return range;
        }

        let stuck = self.validate_stuck(pid, eng_value);
        if stuck != SanityResult::Ok {
            self.total_failures += 1;
            if let Some(sink) = &mut self.error_sink {
                sink.report(ErrorCode::SanitySensorStuck, Severity::Warning);
            }
            return stuck;
        }

        let rate = self.validate_rate_of_change(pid, eng_value);
        if rate != SanityResult::Ok {
            // Rate-of-change failures are not reported to the error sink.
            self.total_failures += 1;
            return rate;
        }

        let now = self.clock.now_ms();
        if let Some(hist) = self.find_or_create_history(pid) {
            hist.push(eng_value);
            hist.last_check_ms = now;
        }
        SanityResult::Ok
    }

    pub fn clear_history(&mut self, pid: u8) {
        if let Some(hist) = self.histories.iter_mut().find(|h| h.pid == pid) {
            hist.clear();
        }
    }

    pub fn clear_all_history(&mut self) {
        for hist in &mut self.histories {
            hist.clear();
        }
    }

    #[must_use]
    pub fn is_configured(pid: u8) -> bool {
        find_rule(pid).is_some()
    }

    #[must_use]
    pub fn total_checks(&self) -> u32 {
        self.total_checks
    }

    #[must_use]
    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::NullErrorSink;

    fn checker(buggy: bool) -> SanityCheck<NullErrorSink, FixedClock> {
        SanityCheck::new(FixedClock(0), Some(NullErrorSink), buggy)
    }

    #[test]
    fn range_check_flags_out_of_range_values() {
        assert_eq!(SanityCheck::<NullErrorSink, FixedClock>::validate_range(0x0C, 20000.0), SanityResult::OutOfRange);
        assert_eq!(SanityCheck::<NullErrorSink, FixedClock>::validate_range(0x0C, 1726.0), SanityResult::Ok);
    }

    #[test]
    fn pid_without_a_rule_is_always_valid() {
        assert!(!SanityCheck::<NullErrorSink, FixedClock>::is_configured(0x99));
        assert_eq!(SanityCheck::<NullErrorSink, FixedClock>::validate_range(0x99, 1e9), SanityResult::Ok);
    }

    #[test]
    fn stuck_fires_only_after_exactly_the_threshold() {
        let mut sc = checker(false);
        // Seed one sample, then repeat the same value.
        assert_eq!(sc.validate_pid(0x0C, 1000.0, true), SanityResult::Ok);
        for i in 0..(STUCK_THRESHOLD - 1) {
            let r = sc.validate_pid(0x0C, 1000.0, true);
            assert_eq!(r, SanityResult::Ok, "should not fire early at iteration {i}");
        }
        assert_eq!(sc.validate_pid(0x0C, 1000.0, true), SanityResult::SensorStuck);
    }

    #[test]
    fn rate_of_change_does_not_report_to_error_sink() {
        let mut reported = Vec::new();
        let mut sc = SanityCheck::new(
            FixedClock(0),
            Some(|code, sev| reported.push((code, sev))),
            false,
        );
        sc.validate_pid(0x0C, 100.0, true);
        // jump by more than max_rate_of_change (2000) for RPM
        let r = sc.validate_pid(0x0C, 99999.0, true);
        assert_eq!(r, SanityResult::RateOfChange);
        assert!(reported.is_empty());
    }

    #[test]
    fn range_and_stuck_do_report_to_error_sink() {
        let mut reported = Vec::new();
        let mut sc = SanityCheck::new(
            FixedClock(0),
            Some(|code, sev| reported.push((code, sev))),
            false,
        );
        sc.validate_pid(0x0C, -5.0, true);
        assert_eq!(reported, vec![(ErrorCode::SanityOutOfRange, Severity::Warning)]);
    }

    #[test]
    fn buggy_previous_value_skips_the_most_recent_sample() {
        let mut sc = checker(true);
        // Fill with distinct values then check that previous_value reads
        // two positions back, not one.
        sc.validate_pid(0x2F, 10.0, true); // fuel level, check_stuck=true, max_rate=5
        sc.validate_pid(0x2F, 11.0, true);
        // Using the buggy path, "previous" compares against 10.0 (two back),
        // not 11.0 (one back) -- a jump of 2.0 from 11->13 should compare
        // against 10.0 for rate-of-change (diff 3.0, within max_rate 5.0).
        let r = sc.validate_pid(0x2F, 13.0, true);
        assert_eq!(r, SanityResult::Ok);
    }

    #[test]
    fn invalid_input_short_circuits_before_counting() {
        let mut sc = checker(false);
        assert_eq!(sc.validate_pid(0x0C, 0.0, false), SanityResult::InvalidData);
        assert_eq!(sc.total_checks(), 0);
    }

    #[test]
    fn clear_history_resets_stuck_counter() {
        let mut sc = checker(false);
        sc.validate_pid(0x0C, 1000.0, true);
        sc.validate_pid(0x0C, 1000.0, true);
        sc.clear_history(0x0C);
        // After clearing, a fresh stuck run must start from zero again.
        for _ in 0..(STUCK_THRESHOLD - 1) {
            assert_eq!(sc.validate_pid(0x0C, 1000.0, true), SanityResult::Ok);
        }
    }
}
