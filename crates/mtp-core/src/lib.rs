//! # mtp-core
//!
//! Shared library for MTP Direct containing the MTP-over-USB wire format,
//! the container codec, and the per-session transaction counter.
//!
//! It has zero dependencies on USB libraries, threads, or the file system;
//! everything here is a pure function of its inputs.
//!
//! # Architecture overview (for beginners)
//!
//! MTP (Media Transfer Protocol) lets a host drive a camera or phone over
//! USB.  The host sends a *command*, optionally streams a *data* phase in
//! either direction, and the device finishes with a *response*.  Each of
//! those travels as one or more USB bulk packets that start with a 12-byte
//! header.
//!
//! - **`protocol::container`** – the logical [`Container`] and the wire-level
//!   [`PacketHeader`], plus the handful of operation and response codes the
//!   engine itself needs.
//!
//! - **`protocol::codec`** – explicit little-endian encoding and decoding of
//!   headers, commands, responses, and data-phase headers.
//!
//! - **`protocol::transaction_id`** – the counter that hands out one
//!   transaction ID per request inside a session.
//!
//! - **`protocol::dataset`** – the PTP string reader used to find the
//!   vendor-extension description in a DeviceInfo dataset.
//!
//! The transaction engine that drives a real device lives in `mtp-device`.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `mtp_core::Container` instead of `mtp_core::protocol::container::Container`.
pub use protocol::codec::{decode_header, decode_response, encode_command, ProtocolError};
pub use protocol::container::{
    Container, ContainerType, PacketHeader, ResponseCodeError, HEADER_SIZE, MAX_PARAMS,
};
pub use protocol::transaction_id::TransactionCounter;
