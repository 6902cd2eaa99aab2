//! Transaction engine: one request, an optional data phase, one response.
//!
//! # How a transaction travels over USB (for beginners)
//!
//! ```text
//! Host                                     Device
//! ────                                     ──────
//! COMMAND  (12-byte header + params)  ──►
//! DATA     (header + payload, chunked) ──►          only for data-out
//!                                      ◄──  DATA     only for data-in
//!                                      ◄──  RESPONSE (header + params)
//! ```
//!
//! Nothing in the byte stream marks where a container ends except the USB
//! *short packet*: a packet smaller than the endpoint's max packet size.  When
//! a container happens to end exactly on a packet boundary, a zero-length
//! packet (ZLP) is sent instead.  Both directions honour that rule here.
//!
//! # The XHCI quirk
//!
//! After a data phase that ends on a packet boundary the host expects a ZLP.
//! Some controller and driver combinations swallow it and deliver the
//! RESPONSE on that read instead.  [`TransactionEngine::bulk_read`] therefore
//! hands back whatever the extra read returned, and [`TransactionEngine::run`]
//! decodes it as the response when it is non-empty.

use std::io::{self, Read, Write};

use mtp_core::protocol::{decode_header, decode_response, encode_command, encode_data_header};
use mtp_core::{Container, ContainerType, HEADER_SIZE};
use tracing::{debug, trace, warn};

use crate::application::error::{DesyncReason, TransactionError};
use crate::application::session::Session;
use crate::infrastructure::diagnostics::trace_transfer;
use crate::infrastructure::storage::config::DeviceConfig;
use crate::infrastructure::usb::{TransportError, UsbTransport};

/// The optional data phase of a transaction.
///
/// A transaction either sends data, receives data, or has no data phase; the
/// enum makes supplying both a source and a sink unrepresentable.
pub enum DataPhase<'a> {
    /// No data phase is expected in either direction.
    None,
    /// Send exactly `size` bytes read from `source` after the command.
    Send { source: &'a mut dyn Read, size: u64 },
    /// Write any incoming data phase to the sink.
    Receive(&'a mut dyn Write),
}

/// Bulk endpoint addresses of an MTP interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Endpoints {
    /// Bulk OUT.
    pub send: u8,
    /// Bulk IN.
    pub fetch: u8,
    /// Interrupt IN, reserved for MTP events.
    pub event: u8,
}

// ── Payload sink ──────────────────────────────────────────────────────────────

/// Destination for incoming DATA payload.
///
/// A sink that fails is dropped and the rest of the phase is discarded, so the
/// response is still read in step with the device.
pub(crate) struct PayloadWriter<'a> {
    sink: Option<&'a mut dyn Write>,
    attached: bool,
    written: u64,
    error: Option<io::Error>,
}

impl<'a> PayloadWriter<'a> {
    pub(crate) fn new(sink: Option<&'a mut dyn Write>) -> Self {
        Self {
            attached: sink.is_some(),
            sink,
            written: 0,
            error: None,
        }
    }

    /// Whether the caller supplied a sink for this transaction.
    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        self.written += bytes.len() as u64;
        let failed = match self.sink.as_mut() {
            Some(sink) => sink.write_all(bytes).err(),
            None => None,
        };
        if let Some(err) = failed {
            warn!(target: "mtp::mtp", "data sink failed, discarding remaining data: {err}");
            self.sink = None;
            self.error = Some(err);
        }
    }

    /// Total payload bytes received, including discarded ones.
    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Runs transactions over a borrowed transport.
///
/// The engine itself holds no state between transactions; the session that
/// numbers requests and the handle that owns the transport live in
/// [`DeviceConnection`](crate::application::connection::DeviceConnection).
pub(crate) struct TransactionEngine<'a, T: UsbTransport + ?Sized> {
    transport: &'a mut T,
    endpoints: Endpoints,
    config: &'a DeviceConfig,
}

impl<'a, T: UsbTransport + ?Sized> TransactionEngine<'a, T> {
    pub(crate) fn new(
        transport: &'a mut T,
        endpoints: Endpoints,
        config: &'a DeviceConfig,
    ) -> Self {
        Self {
            transport,
            endpoints,
            config,
        }
    }

    /// Runs one complete transaction and returns the device's response.
    ///
    /// With a `session`, the request is stamped with the session ID and the
    /// next transaction ID (advancing the counter whatever happens next), and
    /// the response must echo that transaction ID.  Without one, the request
    /// goes out with IDs of 0 and the response is not correlated.
    ///
    /// # Errors
    ///
    /// See [`TransactionError`].  This method never closes anything; the
    /// caller decides what a fatal error means for the connection.
    pub(crate) fn run(
        &mut self,
        session: Option<&mut Session>,
        mut request: Container,
        data: DataPhase<'_>,
    ) -> Result<Container, TransactionError> {
        let operation = request.code;
        let correlate = session.is_some();
        if let Some(session) = session {
            session.stamp(&mut request);
        }

        if self.config.debug.mtp {
            debug!(
                target: "mtp::mtp",
                "request {operation:#06x} tid={:#x} {:?}",
                request.transaction_id,
                request.params
            );
        }

        self.send_request(&request)?;

        let mut sink = match data {
            DataPhase::None => PayloadWriter::new(None),
            DataPhase::Send { source, size } => {
                self.send_data(&request, source, size)?;
                PayloadWriter::new(None)
            }
            DataPhase::Receive(sink) => PayloadWriter::new(Some(sink)),
        };

        let packet_size = self.packet_size(self.endpoints.fetch);
        let mut buf = vec![0u8; packet_size];
        let mut len = self
            .fetch_packet(&mut buf)
            .map_err(TransactionError::transport(operation))?;
        let (header, _) =
            decode_header(&buf[..len]).map_err(|e| TransactionError::desync(operation, e))?;

        let mut unexpected_data = false;
        if header.container_type == ContainerType::Data {
            if !sink.is_attached() {
                unexpected_data = true;
                if self.config.debug.mtp {
                    debug!(
                        target: "mtp::mtp",
                        "discarding unexpected data {:#x} bytes",
                        header.length
                    );
                }
            }
            if self.config.debug.mtp {
                debug!(target: "mtp::mtp", "data {:#x} bytes", header.length);
            }

            sink.write(&buf[HEADER_SIZE..len]);

            let mut final_len = 0;
            if len == packet_size {
                final_len = self
                    .bulk_read(&mut sink, &mut buf)
                    .map_err(TransactionError::transport(operation))?;
            }

            len = if final_len > 0 {
                if self.config.debug.mtp {
                    debug!(target: "mtp::mtp", "reusing final packet as response");
                }
                final_len
            } else {
                self.fetch_packet(&mut buf)
                    .map_err(TransactionError::transport(operation))?
            };

            if self.config.debug.mtp {
                trace!(
                    target: "mtp::mtp",
                    "data phase carried {:#x} payload bytes",
                    sink.written()
                );
            }
        }

        let decoded = decode_header(&buf[..len]).and_then(|(h, rest)| decode_response(&h, rest));
        if unexpected_data {
            return Err(TransactionError::desync(
                operation,
                DesyncReason::UnexpectedData,
            ));
        }
        let mut response = decoded.map_err(|e| TransactionError::desync(operation, e))?;

        if self.config.debug.mtp {
            debug!(
                target: "mtp::mtp",
                "response {:#06x} {:?}",
                response.code,
                response.params
            );
        }

        if correlate && response.transaction_id != request.transaction_id {
            return Err(TransactionError::desync(
                operation,
                DesyncReason::TransactionIdMismatch {
                    expected: request.transaction_id,
                    got: response.transaction_id,
                },
            ));
        }
        response.session_id = request.session_id;

        if let Some(source) = sink.take_error() {
            return Err(TransactionError::DataSink { operation, source });
        }

        response.into_ok().map_err(|e| TransactionError::Device {
            operation,
            code: e.code(),
            response: e.response,
        })
    }

    // ── Outbound ──────────────────────────────────────────────────────────────

    fn send_request(&mut self, request: &Container) -> Result<(), TransactionError> {
        let operation = request.code;
        let bytes = encode_command(request)
            .map_err(|source| TransactionError::Encode { operation, source })?;
        if let Err(err) = self.write_packet(&bytes) {
            if self.config.debug.mtp {
                debug!(target: "mtp::mtp", "sending request failed: {err}");
            }
            return Err(TransactionError::Transport {
                operation,
                source: err,
            });
        }
        Ok(())
    }

    /// Sends the DATA container for a data-out phase.
    ///
    /// Unless `separate_header` is configured, the header shares the first
    /// packet with the start of the payload.  A zero-length packet follows
    /// when the payload is a whole number of packets or the final transfer
    /// filled a packet, so the device never waits for more.
    pub(crate) fn send_data(
        &mut self,
        request: &Container,
        source: &mut dyn Read,
        size: u64,
    ) -> Result<(), TransactionError> {
        let operation = request.code;
        let packet_size = self.packet_size(self.endpoints.send);
        let source_failed =
            move |source: io::Error| TransactionError::DataSource { operation, source };

        let mut first = encode_data_header(operation, request.transaction_id, size).to_vec();
        let mut remaining = size;
        if !self.config.transfer.separate_header {
            let take = (packet_size.saturating_sub(HEADER_SIZE) as u64).min(remaining) as usize;
            first.resize(HEADER_SIZE + take, 0);
            source
                .read_exact(&mut first[HEADER_SIZE..])
                .map_err(source_failed)?;
            remaining -= take as u64;
        }
        let mut last = self
            .write_packet(&first)
            .map_err(TransactionError::transport(operation))?;

        let mut chunk = vec![0u8; packet_size];
        while remaining > 0 {
            let take = (packet_size as u64).min(remaining) as usize;
            source.read_exact(&mut chunk[..take]).map_err(source_failed)?;
            last = self
                .write_packet(&chunk[..take])
                .map_err(TransactionError::transport(operation))?;
            remaining -= take as u64;
        }

        if size % packet_size as u64 == 0 || last % packet_size == 0 {
            self.write_packet(&[])
                .map_err(TransactionError::transport(operation))?;
        }
        Ok(())
    }

    fn write_packet(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        trace_transfer(self.config.debug, self.endpoints.send, data);
        self.transport
            .bulk_write(self.endpoints.send, data, self.config.transfer.timeout())
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Reads one packet from the fetch endpoint into `buf`.
    fn fetch_packet(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = self
            .transport
            .bulk_read(self.endpoints.fetch, buf, self.config.transfer.timeout())?;
        if n > 0 {
            trace_transfer(self.config.debug, self.endpoints.fetch, &buf[..n]);
        }
        Ok(n)
    }

    /// Reads packets into `sink` until a short packet ends the transfer.
    ///
    /// `scratch` must be exactly one max packet long.  When the bytes read
    /// add up to a whole number of packets, one more read collects the
    /// terminating zero-length packet.  Its length is returned, and a
    /// non-zero result means the device sent its RESPONSE there instead; the
    /// bytes are left at the start of `scratch`.
    pub(crate) fn bulk_read(
        &mut self,
        sink: &mut PayloadWriter<'_>,
        scratch: &mut [u8],
    ) -> Result<usize, TransportError> {
        let packet_size = scratch.len();
        let mut total: u64 = 0;
        loop {
            let n = self.fetch_packet(scratch)?;
            sink.write(&scratch[..n]);
            total += n as u64;
            if self.config.debug.mtp {
                trace!(target: "mtp::mtp", "bulk read {n:#x} bytes");
            }
            if n < packet_size {
                break;
            }
        }

        if total % packet_size as u64 != 0 {
            return Ok(0);
        }
        let extra = self.fetch_packet(scratch)?;
        if self.config.debug.mtp {
            debug!(target: "mtp::mtp", "expected null packet, read {extra} bytes");
        }
        Ok(extra)
    }

    /// Max packet size of `endpoint`; never zero.
    fn packet_size(&self, endpoint: u8) -> usize {
        self.transport.max_packet_size(endpoint).max(1)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
