//! Transport adapter (C10): the generic connection-state/RX-ring/TX-staging
//! shell around a Bluetooth (or any other byte-oriented serial) link.
//!
//! The concrete radio driver is an out-of-scope collaborator — this module
//! only owns the RX ring buffer, the flat TX staging buffer, the
//! connection-state enum, and the event fan-out, exactly as
//! `bluetooth_if.c`'s `BluetoothInterface_t` does. The platform layer is
//! expected to call [`TransportAdapter::on_data_received`] with inbound
//! bytes and to drain [`TransportAdapter::take_staged_tx`] to actually put
//! bytes on the wire.

use crate::error::{ErrorCode, ErrorSink, Severity};
use crate::ring::RingBuffer;

pub const RX_BUFFER_SIZE: usize = 512;
pub const TX_BUFFER_SIZE: usize = 256;
pub const DEVICE_NAME_MAX: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disabled,
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Enabled,
    Disabled,
    DeviceFound,
    Connected,
    Disconnected,
    DataReceived,
    WriteComplete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotReady,
    Busy,
    BufferFull,
    InvalidParam,
}

/// A scanned or connected peer device. `name`/`uuid` are owned fixed-size
/// buffers rather than `String` — this crate allocates nothing at steady
/// state.
#[derive(Debug, Clone, Copy)]
pub struct Device {
    name: [u8; DEVICE_NAME_MAX],
    name_len: u8,
    pub rssi: i8,
    pub is_elm327: bool,
}

impl Device {
    #[must_use]
    pub fn new(name: &[u8], rssi: i8, is_elm327: bool) -> Self {
        let mut buf = [0u8; DEVICE_NAME_MAX];
        let len = name.len().min(DEVICE_NAME_MAX);
        buf[..len].copy_from_slice(&name[..len]);
        Device { name: buf, name_len: len as u8, rssi, is_elm327 }
    }

    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }
}

/// Owns the RX ring buffer, TX staging area, and connection state. No
/// allocation after construction.
pub struct TransportAdapter<Cb> {
    state: TransportState,
    connected_device: Option<Device>,
    rx: RingBuffer<RX_BUFFER_SIZE>,
    tx_buffer: [u8; TX_BUFFER_SIZE],
    tx_pending: usize,
    event_callback: Option<Cb>,
}

impl<Cb> TransportAdapter<Cb>
where
    Cb: FnMut(TransportEvent),
{
    #[must_use]
    pub fn new(event_callback: Option<Cb>) -> Self {
        TransportAdapter {
            state: TransportState::Disconnected,
            connected_device: None,
            rx: RingBuffer::new(),
            tx_buffer: [0u8; TX_BUFFER_SIZE],
            tx_pending: 0,
            event_callback,
        }
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    #[must_use]
    pub fn connected_device(&self) -> Option<&Device> {
        self.connected_device.as_ref()
    }

    #[must_use]
    pub fn available_bytes(&self) -> usize {
        self.rx.len()
    }

    fn fire(&mut self, event: TransportEvent) {
        if let Some(cb) = &mut self.event_callback {
            cb(event);
        }
    }

    pub fn start_scan(&mut self) -> Result<(), TransportError> {
        if self.state == TransportState::Connected {
            return Err(TransportError::Busy);
        }
        self.state = TransportState::Scanning;
        Ok(())
    }

    pub fn stop_scan(&mut self) {
        if self.state == TransportState::Scanning {
            self.state = TransportState::Disconnected;
        }
    }

    pub fn connect(&mut self, device: Device) -> Result<(), TransportError> {
        if self.state == TransportState::Connected {
            return Err(TransportError::Busy);
        }
        self.state = TransportState::Connecting;
        self.connected_device = Some(device);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.state = TransportState::Disconnected;
        self.connected_device = None;
        self.rx.clear();
        self.fire(TransportEvent::Disconnected);
    }

    /// Stages `data` for the platform layer to actually write. Rejects
    /// unless currently connected, or if `data` is longer than
    /// [`TX_BUFFER_SIZE`].
    pub fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.state != TransportState::Connected {
            return Err(TransportError::NotReady);
        }
        if data.len() > TX_BUFFER_SIZE {
            return Err(TransportError::BufferFull);
        }
        self.tx_buffer[..data.len()].copy_from_slice(data);
        self.tx_pending = data.len();
        Ok(())
    }

    /// Hands the platform layer whatever is currently staged for TX and
    /// clears the staging area. The platform layer is responsible for
    /// firing [`TransportEvent::WriteComplete`] back in once the bytes are
    /// actually on the wire (via the event callback it was constructed
    /// with, or by calling [`Self::notify_write_complete`]).
    pub fn take_staged_tx(&mut self) -> &[u8] {
        let n = self.tx_pending;
        self.tx_pending = 0;
        &self.tx_buffer[..n]
    }

    pub fn notify_write_complete(&mut self) {
        self.fire(TransportEvent::WriteComplete);
    }

    /// Drains up to `out.len()` bytes from the RX ring buffer, returning the
    /// number actually copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.rx.pop_slice(out)
    }

    /// Inbound push from the platform layer. Overflow reports
    /// `COMM_BUFFER_OVERFLOW` and returns `BufferFull`; bytes already pushed
    /// before the overflowing byte stay in the buffer.
    pub fn on_data_received(
        &mut self,
        data: &[u8],
        error_sink: &mut impl ErrorSink,
    ) -> Result<(), TransportError> {
        let written = self.rx.push_slice(data);
        if written < data.len() {
            error_sink.report(ErrorCode::CommBufferOverflow, Severity::Warning);
            return Err(TransportError::BufferFull);
        }
        self.fire(TransportEvent::DataReceived);
        Ok(())
    }

    /// Any `Connected -> X` transition flushes the RX buffer, matching
    /// `Bluetooth_OnStateChanged`'s behavior.
    pub fn on_state_changed(&mut self, new_state: TransportState) {
        let old_state = self.state;
        self.state = new_state;

        if new_state == TransportState::Connected {
            self.fire(TransportEvent::Connected);
        } else if old_state == TransportState::Connected {
            self.connected_device = None;
            self.rx.clear();
            self.fire(TransportEvent::Disconnected);
        }
    }

    pub fn on_device_found(&mut self) {
        self.fire(TransportEvent::DeviceFound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NullErrorSink;

    fn adapter() -> TransportAdapter<fn(TransportEvent)> {
        TransportAdapter::new(None)
    }

    #[test]
    fn write_rejected_unless_connected() {
        let mut t = adapter();
        assert_eq!(t.write(b"ATZ\r"), Err(TransportError::NotReady));
        t.on_state_changed(TransportState::Connected);
        assert!(t.write(b"ATZ\r").is_ok());
    }

    #[test]
    fn write_rejects_oversized_payload() {
        let mut t = adapter();
        t.on_state_changed(TransportState::Connected);
        let big = vec![0u8; TX_BUFFER_SIZE + 1];
        assert_eq!(t.write(&big), Err(TransportError::BufferFull));
    }

    #[test]
    fn on_data_received_reports_overflow_and_keeps_partial_progress() {
        let mut t = adapter();
        let mut sink = NullErrorSink;
        let exact = vec![1u8; RX_BUFFER_SIZE];
        assert!(t.on_data_received(&exact, &mut sink).is_ok());
        let overflow = t.on_data_received(&[2, 3], &mut sink);
        assert_eq!(overflow, Err(TransportError::BufferFull));
        assert_eq!(t.available_bytes(), RX_BUFFER_SIZE);
    }

    #[test]
    fn connected_to_disconnected_flushes_rx() {
        let mut t = adapter();
        let mut sink = NullErrorSink;
        t.on_state_changed(TransportState::Connected);
        t.on_data_received(&[1, 2, 3], &mut sink).unwrap();
        assert_eq!(t.available_bytes(), 3);
        t.on_state_changed(TransportState::Disconnected);
        assert_eq!(t.available_bytes(), 0);
    }

    #[test]
    fn take_staged_tx_drains_and_clears() {
        let mut t = adapter();
        t.on_state_changed(TransportState::Connected);
        t.write(b"010C\r").unwrap();
        assert_eq!(t.take_staged_tx(), b"010C\r");
        assert_eq!(t.take_staged_tx(), b"");
    }

    #[test]
    fn start_scan_rejected_while_connected() {
        let mut t = adapter();
        t.on_state_changed(TransportState::Connected);
        assert_eq!(t.start_scan(), Err(TransportError::Busy));
    }
}
