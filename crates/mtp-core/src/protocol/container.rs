//! MTP container types and well-known codes.
//!
//! Every USB bulk packet exchanged with an MTP device starts with the same
//! 12-byte header.  The header says how long the packet is, which phase of a
//! transaction it belongs to (command, data, response, or event), which
//! operation or response code it carries, and which transaction it belongs to.
//!
//! # Containers vs. packets (for beginners)
//!
//! A [`Container`] is the *logical* unit: "run operation 0x1002 with
//! parameter 7".  A packet is what actually travels over the wire.  A command
//! or response container always fits in one packet; a data phase may span
//! many packets, terminated by a short packet.

use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the container header that prefixes every packet, in bytes.
pub const HEADER_SIZE: usize = 12;

/// Maximum number of 32-bit parameters in a command or response container.
pub const MAX_PARAMS: usize = 5;

/// Length value used in a DATA header when the payload does not fit in 32 bits.
///
/// The receiver then relies on the short-packet terminator instead of the
/// declared length.
pub const UNKNOWN_DATA_LENGTH: u32 = 0xFFFF_FFFF;

/// Operation codes the transaction core itself needs.
pub mod operation {
    /// GetDeviceInfo: returns the DeviceInfo dataset; valid outside a session.
    pub const GET_DEVICE_INFO: u16 = 0x1001;
    /// OpenSession: parameter 1 is the host-chosen session ID.
    pub const OPEN_SESSION: u16 = 0x1002;
    /// CloseSession: no parameters.
    pub const CLOSE_SESSION: u16 = 0x1003;
}

/// Response codes the transaction core itself needs.
pub mod response {
    pub const OK: u16 = 0x2001;
    pub const GENERAL_ERROR: u16 = 0x2002;
    pub const SESSION_NOT_OPEN: u16 = 0x2003;
    pub const SESSION_ALREADY_OPEN: u16 = 0x201E;
}

// ── Container type ────────────────────────────────────────────────────────────

/// The `type` field of a packet header.
///
/// Numeric values are fixed by the PTP/MTP-over-USB wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerType {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl TryFrom<u16> for ContainerType {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            1 => Ok(ContainerType::Command),
            2 => Ok(ContainerType::Data),
            3 => Ok(ContainerType::Response),
            4 => Ok(ContainerType::Event),
            other => Err(other),
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerType::Command => "COMMAND",
            ContainerType::Data => "DATA",
            ContainerType::Response => "RESPONSE",
            ContainerType::Event => "EVENT",
        };
        write!(f, "{name}")
    }
}

// ── Packet header ─────────────────────────────────────────────────────────────

/// The 12-byte header at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Total container length in bytes, including this header.
    pub length: u32,
    /// Which transaction phase this packet belongs to.
    pub container_type: ContainerType,
    /// Operation code (command/data) or response code (response).
    pub code: u16,
    /// Transaction the packet belongs to.
    pub transaction_id: u32,
}

impl PacketHeader {
    /// Number of bytes the header declares after itself.
    ///
    /// Returns `None` when `length` is smaller than the header, which no
    /// well-formed container can claim.
    pub fn payload_len(&self) -> Option<usize> {
        (self.length as usize).checked_sub(HEADER_SIZE)
    }
}

// ── Logical container ─────────────────────────────────────────────────────────

/// A logical request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// Operation code for requests, response code for responses.
    pub code: u16,
    /// Assigned from the session counter for requests; echoed by the device.
    pub transaction_id: u32,
    /// Zero before a session exists.
    pub session_id: u32,
    /// Up to [`MAX_PARAMS`] parameter words, in order.
    pub params: Vec<u32>,
}

impl Container {
    /// Creates a request for `code` with no parameters.
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Creates a request for `code` with the given parameters.
    pub fn with_params(code: u16, params: impl Into<Vec<u32>>) -> Self {
        Self {
            code,
            params: params.into(),
            ..Self::default()
        }
    }

    /// `true` when this container is a response carrying [`response::OK`].
    pub fn is_ok(&self) -> bool {
        self.code == response::OK
    }

    /// Splits a decoded response into success or a device-response error.
    ///
    /// The populated container is kept in both arms so callers can inspect
    /// response parameters even when the device refused the operation.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseCodeError`] when the code is anything other than OK.
    pub fn into_ok(self) -> Result<Container, ResponseCodeError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ResponseCodeError { response: self })
        }
    }
}

/// A device answered with a non-OK response code.
///
/// This is an ordinary protocol outcome, not a fault of the transport or the
/// packet stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCodeError {
    /// The full response, including any parameters the device sent.
    pub response: Container,
}

impl fmt::Display for ResponseCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device returned response code {:#06x}", self.response.code)
    }
}

impl std::error::Error for ResponseCodeError {}

impl ResponseCodeError {
    /// The raw response code, for lookup in the MTP response-code table.
    pub fn code(&self) -> u16 {
        self.response.code
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
