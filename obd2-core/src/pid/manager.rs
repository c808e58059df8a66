//! PID manager (C6): owns the supported-PID bitmap and the per-session
//! entry table, and is the thing the scheduler ultimately asks "what's due".

use super::registry::{convert_raw_to_eng, find_definition, PidValue};
use crate::clock::Clock;
use crate::frame::{Frame, MODE_01_LIVE_DATA};
use smallvec::SmallVec;

/// Hard cap on simultaneously-tracked PIDs.
pub const MAX_ENTRIES: usize = 64;

/// Rate to assign a newly-enabled entry for a PID with no table definition.
const UNKNOWN_PID_DEFAULT_RATE_MS: u16 = 1000;

/// Per-discovered-PID bookkeeping. Owned exclusively by [`PidManager`].
#[derive(Debug, Clone, Copy)]
pub struct PidEntry {
    pub pid: u8,
    pub supported: bool,
    pub enabled: bool,
    pub rate_ms: u16,
    pub last_read_ms: u32,
    pub value: PidValue,
}

impl PidEntry {
    fn new(pid: u8) -> Self {
        PidEntry {
            pid,
            supported: false,
            enabled: false,
            rate_ms: UNKNOWN_PID_DEFAULT_RATE_MS,
            last_read_ms: 0,
            value: PidValue::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidManagerError {
    BufferFull,
    NoData,
    InvalidParam,
}

/// Owns the 256-bit supported-PID bitmap and up to [`MAX_ENTRIES`] entries.
pub struct PidManager<C, Cb> {
    supported_pids: [u8; 32],
    entries: SmallVec<[PidEntry; MAX_ENTRIES]>,
    clock: C,
    value_callback: Option<Cb>,
}

impl<C, Cb> PidManager<C, Cb>
where
    C: Clock,
    Cb: FnMut(u8, &PidValue),
{
    pub fn new(clock: C, value_callback: Option<Cb>) -> Self {
        PidManager {
            supported_pids: [0u8; 32],
            entries: SmallVec::new(),
            clock,
            value_callback,
        }
    }

    fn find_entry_mut(&mut self, pid: u8) -> Option<&mut PidEntry> {
        self.entries.iter_mut().find(|e| e.pid == pid)
    }

    fn find_entry(&self, pid: u8) -> Option<&PidEntry> {
        self.entries.iter().find(|e| e.pid == pid)
    }

    fn find_or_create_entry(&mut self, pid: u8) -> Option<&mut PidEntry> {
        if self.entries.iter().any(|e| e.pid == pid) {
            return self.find_entry_mut(pid);
        }
        if self.entries.len() >= MAX_ENTRIES {
            return None;
        }
        self.entries.push(PidEntry::new(pid));
        self.entries.last_mut()
    }

    /// Updates 32 bits of the supported bitmap from a 4-byte "supported
    /// [start_pid+1 .. start_pid+32]" response: the response is MSB-first on
    /// the wire, the bitmap is stored LSB-first per byte.
    pub fn set_supported(
        &mut self,
        response_bytes: [u8; 4],
        start_pid: u8,
    ) -> Result<(), PidManagerError> {
        for byte_idx in 0u8..4 {
            for bit_idx in 0u8..8 {
                let pid = start_pid
                    .wrapping_add(byte_idx * 8)
                    .wrapping_add(bit_idx)
                    .wrapping_add(1);
                let supported = (response_bytes[byte_idx as usize] >> (7 - bit_idx)) & 0x01 != 0;
                let byte_pos = (pid / 8) as usize;
                let bit_pos = pid % 8;

                if byte_pos >= 32 {
                    continue;
                }
                if supported {
                    self.supported_pids[byte_pos] |= 1 << bit_pos;
                    if let Some(entry) = self.find_or_create_entry(pid) {
                        entry.supported = true;
                        let rate = find_definition(pid)
                            .map_or(UNKNOWN_PID_DEFAULT_RATE_MS, |d| d.default_rate_ms);
                        entry.rate_ms = rate;
                    }
                    // Entry-table exhaustion for a newly-seen PID is silently
                    // skipped, preserving partial progress on the bits
                    // already written.
                } else {
                    self.supported_pids[byte_pos] &= !(1 << bit_pos);
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_supported(&self, pid: u8) -> bool {
        let byte_pos = (pid / 8) as usize;
        let bit_pos = pid % 8;
        byte_pos < 32 && (self.supported_pids[byte_pos] >> bit_pos) & 0x01 != 0
    }

    pub fn enable(&mut self, pid: u8, rate_ms: u16) -> Result<(), PidManagerError> {
        let entry = self
            .find_or_create_entry(pid)
            .ok_or(PidManagerError::BufferFull)?;
        entry.enabled = true;
        entry.rate_ms = rate_ms;
        Ok(())
    }

    /// Idempotent: disabling an already-disabled or never-seen PID is OK.
    pub fn disable(&mut self, pid: u8) {
        if let Some(entry) = self.find_entry_mut(pid) {
            entry.enabled = false;
        }
    }

    pub fn set_rate(&mut self, pid: u8, rate_ms: u16) -> Result<(), PidManagerError> {
        let entry = self
            .find_entry_mut(pid)
            .ok_or(PidManagerError::NoData)?;
        entry.rate_ms = rate_ms;
        Ok(())
    }

    /// Accepts only mode-0x01 (live data) frames; any other mode is a
    /// silent no-op returning `Ok(())`.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<(), PidManagerError> {
        if !frame.valid {
            return Err(PidManagerError::InvalidParam);
        }
        if frame.mode != MODE_01_LIVE_DATA {
            return Ok(());
        }

        let now = self.clock.now_ms();
        let entry = self
            .find_or_create_entry(frame.pid)
            .ok_or(PidManagerError::BufferFull)?;

        let Ok(mut value) = convert_raw_to_eng(frame.pid, frame.data()) else {
            return Ok(());
        };
        value.timestamp_ms = now;
        entry.last_read_ms = now;
        entry.value = value;

        if let Some(cb) = &mut self.value_callback {
            cb(frame.pid, &value);
        }
        Ok(())
    }

    pub fn get_value(&self, pid: u8) -> Result<PidValue, PidManagerError> {
        self.find_entry(pid)
            .map(|e| e.value)
            .ok_or(PidManagerError::NoData)
    }

    /// The scheduling decision: among entries that are enabled, supported,
    /// with `rate_ms > 0`, and overdue by the wrap-safe elapsed comparison,
    /// picks the lowest-priority-number entry, tie-broken by largest
    /// overdue amount. An unsupported PID is never selectable here, even if
    /// enabled.
    pub fn next_pid_to_read(&self) -> Option<u8> {
        let now = self.clock.now_ms();
        let mut best: Option<(u8, super::registry::PidPriority, u32)> = None;

        for entry in &self.entries {
            if !entry.enabled || entry.rate_ms == 0 || !entry.supported {
                continue;
            }
            let elapsed = crate::clock::elapsed(now, entry.last_read_ms);
            if elapsed < u32::from(entry.rate_ms) {
                continue;
            }
            let priority = find_definition(entry.pid)
                .map_or(super::registry::PidPriority::Low, |d| d.priority);
            let overdue = elapsed - u32::from(entry.rate_ms);

            let better = match best {
                None => true,
                Some((_, best_priority, best_overdue)) => {
                    priority < best_priority || (priority == best_priority && overdue > best_overdue)
                }
            };
            if better {
                best = Some((entry.pid, priority, overdue));
            }
        }

        best.map(|(pid, _, _)| pid)
    }

    #[must_use]
    pub fn supported_count(&self) -> usize {
        self.entries.iter().filter(|e| e.supported).count()
    }

    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.entries.iter().filter(|e| e.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn manager_at(now: u32) -> PidManager<FixedClock, fn(u8, &PidValue)> {
        PidManager::new(FixedClock(now), None)
    }

    #[test]
    fn set_supported_matches_the_published_bitmap_scenario() {
        let mut pm = manager_at(0);
        pm.set_supported([0xBE, 0x1F, 0xA8, 0x13], 0x00).unwrap();
        let expected_supported = [
            0x01, 0x03, 0x04, 0x05, 0x06, 0x07, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x13, 0x15,
            0x1C, 0x1F, 0x20,
        ];
        for pid in expected_supported {
            assert!(pm.is_supported(pid), "expected pid {pid:#04x} supported");
        }
        // Spot-check a pid that must NOT be set.
        assert!(!pm.is_supported(0x02));
    }

    #[test]
    fn disable_is_idempotent_and_enable_restores_rate() {
        let mut pm = manager_at(0);
        pm.disable(0x0C); // never seen, must not panic
        pm.enable(0x0C, 250).unwrap();
        pm.disable(0x0C);
        pm.disable(0x0C);
        pm.enable(0x0C, 777).unwrap();
        assert_eq!(pm.find_entry(0x0C).unwrap().rate_ms, 777);
        assert!(pm.find_entry(0x0C).unwrap().enabled);
    }

    #[test]
    fn process_frame_ignores_non_live_data_modes() {
        let mut pm = manager_at(1000);
        let frame = Frame::new(0x03, 0x0C, &[0x1A, 0xF8], true);
        pm.process_frame(&frame).unwrap();
        assert_eq!(pm.get_value(0x0C), Err(PidManagerError::NoData));
    }

    #[test]
    fn process_frame_decodes_stamps_and_stores() {
        let mut pm = manager_at(5000);
        let frame = Frame::new(0x01, 0x0C, &[0x1A, 0xF8], true);
        pm.process_frame(&frame).unwrap();
        let v = pm.get_value(0x0C).unwrap();
        assert!((v.eng_value - 1726.0).abs() < 1e-3);
        assert_eq!(v.timestamp_ms, 5000);
    }

    #[test]
    fn next_pid_to_read_requires_supported() {
        let mut pm = manager_at(10_000);
        pm.enable(0x0C, 100).unwrap(); // enabled but never marked supported
        assert_eq!(pm.next_pid_to_read(), None);
    }

    #[test]
    fn next_pid_to_read_picks_highest_priority_then_most_overdue() {
        // entries start with last_read_ms=0, so at now=10_000 everything
        // enabled-and-supported with rate <= 10_000 is overdue.
        let mut pm = manager_at(10_000);
        pm.set_supported([0xFF, 0xFF, 0xFF, 0xFF], 0x00).unwrap(); // supports 0x01..0x20
        pm.enable(0x04, 100).unwrap(); // HIGH priority
        pm.enable(0x05, 100).unwrap(); // MEDIUM priority
        pm.enable(0x07, 100).unwrap(); // LOW priority

        assert_eq!(pm.next_pid_to_read(), Some(0x04));

        // Once HIGH is satisfied, tie-break among remaining by overdue amount.
        pm.disable(0x04);
        assert_eq!(pm.next_pid_to_read(), Some(0x05));
    }

    #[test]
    fn next_pid_to_read_returns_none_when_all_in_interval() {
        let mut pm = manager_at(50);
        pm.set_supported([0xFF, 0, 0, 0], 0x00).unwrap();
        pm.enable(0x04, 10_000).unwrap();
        assert_eq!(pm.next_pid_to_read(), None);
    }

    #[test]
    fn buffer_full_when_entry_table_is_exhausted() {
        let mut pm = manager_at(0);
        for pid in 0u8..MAX_ENTRIES as u8 {
            pm.enable(pid, 100).unwrap();
        }
        assert_eq!(
            pm.enable(200, 100),
            Err(PidManagerError::BufferFull)
        );
    }
}
