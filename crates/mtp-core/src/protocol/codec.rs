//! Binary codec for MTP-over-USB containers.
//!
//! Wire format of every packet header:
//! ```text
//! [length:4][type:2][code:2][transaction_id:4]
//! ```
//! Total header size: 12 bytes.  All multi-byte integers are little-endian.
//! COMMAND and RESPONSE containers append 0–5 `u32` parameters; DATA
//! containers append raw payload bytes.
//!
//! Fields are serialized one at a time with `to_le_bytes`/`from_le_bytes`, so
//! the byte layout above holds regardless of how Rust lays out the structs.

use thiserror::Error;

use crate::protocol::container::{
    Container, ContainerType, PacketHeader, HEADER_SIZE, MAX_PARAMS, UNKNOWN_DATA_LENGTH,
};

/// Errors that can occur while encoding or decoding containers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The type field is not one of COMMAND, DATA, RESPONSE, EVENT.
    #[error("unknown container type: {0}")]
    UnknownContainerType(u16),

    /// The packet is well-formed but of the wrong phase.
    #[error("got container type {actual}, want {expected}")]
    UnexpectedContainerType {
        expected: ContainerType,
        actual: ContainerType,
    },

    /// More than [`MAX_PARAMS`] parameters were supplied for encoding.
    #[error("too many parameters: {0} (at most 5)")]
    TooManyParameters(usize),

    /// The length field is smaller than the header itself.
    #[error("declared container length {0} is smaller than the 12-byte header")]
    InvalidLength(u32),

    /// The header declares more payload than was actually received.
    #[error("header specified {declared:#x} bytes, but have {available:#x}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Serializes a packet header into its 12-byte wire form.
pub fn encode_header(header: &PacketHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&header.length.to_le_bytes());
    buf[4..6].copy_from_slice(&(header.container_type as u16).to_le_bytes());
    buf[6..8].copy_from_slice(&header.code.to_le_bytes());
    buf[8..12].copy_from_slice(&header.transaction_id.to_le_bytes());
    buf
}

/// Decodes the header at the start of `packet`.
///
/// Returns the header and the bytes that follow it in the packet, so the
/// caller can treat them as parameters or data payload.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for packets shorter than the
/// header and [`ProtocolError::UnknownContainerType`] for an unrecognised
/// type field.
pub fn decode_header(packet: &[u8]) -> Result<(PacketHeader, &[u8]), ProtocolError> {
    if packet.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: packet.len(),
        });
    }

    let raw_type = read_u16(packet, 4);
    let container_type =
        ContainerType::try_from(raw_type).map_err(ProtocolError::UnknownContainerType)?;

    let header = PacketHeader {
        length: read_u32(packet, 0),
        container_type,
        code: read_u16(packet, 6),
        transaction_id: read_u32(packet, 8),
    };
    Ok((header, &packet[HEADER_SIZE..]))
}

// ── Command / response containers ─────────────────────────────────────────────

/// Encodes a request as a COMMAND packet.
///
/// The header length is `12 + 4 * params.len()` and the parameters follow in
/// order.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyParameters`] when more than five
/// parameters are present.
///
/// # Examples
///
/// ```rust
/// use mtp_core::protocol::{encode_command, Container};
///
/// let mut req = Container::with_params(0x1002, vec![0x55]);
/// req.transaction_id = 0;
/// let bytes = encode_command(&req).unwrap();
/// assert_eq!(bytes.len(), 16);
/// assert_eq!(&bytes[0..4], &16u32.to_le_bytes());
/// ```
pub fn encode_command(container: &Container) -> Result<Vec<u8>, ProtocolError> {
    encode_container(ContainerType::Command, container)
}

/// Encodes a container carrying parameters as a RESPONSE packet.
///
/// The host never sends responses; this exists for device simulators and
/// tests that need to produce what a device would put on the wire.
///
/// # Errors
///
/// Returns [`ProtocolError::TooManyParameters`] when more than five
/// parameters are present.
pub fn encode_response(container: &Container) -> Result<Vec<u8>, ProtocolError> {
    encode_container(ContainerType::Response, container)
}

fn encode_container(
    container_type: ContainerType,
    container: &Container,
) -> Result<Vec<u8>, ProtocolError> {
    if container.params.len() > MAX_PARAMS {
        return Err(ProtocolError::TooManyParameters(container.params.len()));
    }

    let length = HEADER_SIZE + 4 * container.params.len();
    let header = PacketHeader {
        length: length as u32,
        container_type,
        code: container.code,
        transaction_id: container.transaction_id,
    };

    let mut buf = Vec::with_capacity(length);
    buf.extend_from_slice(&encode_header(&header));
    for param in &container.params {
        buf.extend_from_slice(&param.to_le_bytes());
    }
    Ok(buf)
}

/// Decodes a RESPONSE container from its header and the bytes after it.
///
/// The parameter count is derived from the declared length.  A non-OK
/// response code still decodes successfully; use [`Container::into_ok`] to
/// turn it into a device-response error.
///
/// # Errors
///
/// - [`ProtocolError::UnexpectedContainerType`] when `header` is not a RESPONSE.
/// - [`ProtocolError::InvalidLength`] when the length is below the header size.
/// - [`ProtocolError::PayloadLengthMismatch`] when the header declares more
///   bytes than `payload` holds.
pub fn decode_response(header: &PacketHeader, payload: &[u8]) -> Result<Container, ProtocolError> {
    if header.container_type != ContainerType::Response {
        return Err(ProtocolError::UnexpectedContainerType {
            expected: ContainerType::Response,
            actual: header.container_type,
        });
    }

    let declared = header
        .payload_len()
        .ok_or(ProtocolError::InvalidLength(header.length))?;
    if declared > payload.len() {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared,
            available: payload.len(),
        });
    }

    let params = payload[..declared]
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect();

    Ok(Container {
        code: header.code,
        transaction_id: header.transaction_id,
        session_id: 0,
        params,
    })
}

// ── Data containers ───────────────────────────────────────────────────────────

/// Builds the header that opens a DATA phase of `payload_len` bytes.
///
/// When `12 + payload_len` does not fit in 32 bits the length field is
/// [`UNKNOWN_DATA_LENGTH`] and the receiver relies on the short-packet
/// terminator.
pub fn encode_data_header(code: u16, transaction_id: u32, payload_len: u64) -> [u8; HEADER_SIZE] {
    let total = payload_len.saturating_add(HEADER_SIZE as u64);
    let length = u32::try_from(total).unwrap_or(UNKNOWN_DATA_LENGTH);
    encode_header(&PacketHeader {
        length,
        container_type: ContainerType::Data,
        code,
        transaction_id,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
