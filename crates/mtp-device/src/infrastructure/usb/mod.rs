//! USB transport abstraction for the MTP engine.
//!
//! The engine never talks to libusb (or any other host stack) directly.  It
//! drives a [`UsbTransport`], which performs exactly one USB operation per
//! call: open or close the handle, claim or release an interface, reset the
//! device, or run one bulk transfer on one endpoint with a timeout.  The
//! transport knows nothing about MTP containers.
//!
//! # Testability
//!
//! Production code supplies a transport backed by the platform USB stack.
//! Tests use [`mock::SimulatedDevice`], which replays scripted packets and
//! records every write, or the `mockall`-generated `MockUsbTransport` for
//! expectation-style unit tests.

use std::time::Duration;

use thiserror::Error;

pub mod mock;

/// Error returned by a single USB operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transfer did not complete within its timeout.
    #[error("USB transfer timed out")]
    Timeout,

    /// The endpoint halted the transfer.
    #[error("USB endpoint stalled")]
    Stall,

    /// The device was unplugged or is otherwise gone.
    #[error("USB device not present")]
    NoDevice,

    /// The interface or endpoint is held by another driver or process.
    #[error("USB resource busy")]
    Busy,

    /// The operating system refused access to the device.
    #[error("USB access denied")]
    Access,

    /// Any other host-stack failure, carrying its description.
    #[error("USB I/O error: {0}")]
    Io(String),

    /// An operation that needs an open handle was called without one.
    #[error("USB device handle is not open")]
    NotOpen,
}

/// Host-side USB primitives the engine is built on.
///
/// All bulk operations block for at most `timeout`.  Endpoint addresses are
/// the raw `bEndpointAddress` values, so IN endpoints have bit 7 set.
#[cfg_attr(test, mockall::automock)]
pub trait UsbTransport {
    /// Opens a handle to the device.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Closes the device handle.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Claims `interface` for exclusive use.
    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Releases a previously claimed interface.
    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Issues a USB port reset.
    fn reset(&mut self) -> Result<(), TransportError>;

    /// Writes `data` to `endpoint` as one bulk transfer.
    ///
    /// Returns the number of bytes the host stack accepted.  An empty `data`
    /// sends a zero-length packet.
    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Reads one bulk transfer from `endpoint` into `buf`.
    ///
    /// Returns the number of bytes received.  A result shorter than
    /// `buf.len()` means the device ended the transfer with a short packet.
    fn bulk_read(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// `wMaxPacketSize` of `endpoint`.
    fn max_packet_size(&self, endpoint: u8) -> usize;

    /// Reads string descriptor `index` in ASCII.
    fn string_descriptor_ascii(&mut self, index: u8) -> Result<String, TransportError>;
}

/// Direction bit of a `bEndpointAddress`.
pub const ENDPOINT_IN: u8 = 0x80;

/// `"recv"` for IN endpoints and `"send"` for OUT endpoints.
pub fn direction_label(endpoint: u8) -> &'static str {
    if endpoint & ENDPOINT_IN != 0 {
        "recv"
    } else {
        "send"
    }
}
