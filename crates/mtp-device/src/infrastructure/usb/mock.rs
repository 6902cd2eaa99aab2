//! Scripted USB transport for tests.
//!
//! [`SimulatedDevice`] plays the device side of the bulk pipes without any
//! hardware: tests queue the packets the device will return, run the engine,
//! then inspect every transfer the host made.
//!
//! Reads are served strictly in script order.  Once the script is exhausted a
//! read times out, which is how a real device behaves when the host waits for
//! a packet that never comes.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use mtp_core::protocol::container::operation;
use mtp_core::protocol::dataset::write_ptp_string;
use mtp_core::protocol::{decode_header, encode_data_header, encode_response, Container};
use mtp_core::{ContainerType, HEADER_SIZE};

use super::{TransportError, UsbTransport};

/// Bulk OUT endpoint used by [`SimulatedDevice::default`].
pub const SIM_SEND_ENDPOINT: u8 = 0x01;
/// Bulk IN endpoint used by [`SimulatedDevice::default`].
pub const SIM_FETCH_ENDPOINT: u8 = 0x81;
/// Interrupt IN endpoint used by [`SimulatedDevice::default`].
pub const SIM_EVENT_ENDPOINT: u8 = 0x82;

/// A non-transfer operation the host performed, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbCall {
    Open,
    Close,
    Claim(u8),
    Release(u8),
    Reset,
}

/// One bulk write as the host issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub endpoint: u8,
    pub data: Vec<u8>,
}

/// A scripted MTP device behind the [`UsbTransport`] trait.
#[derive(Debug)]
pub struct SimulatedDevice {
    packet_size: usize,
    open: bool,
    reads: VecDeque<Result<Vec<u8>, TransportError>>,
    write_faults: VecDeque<Option<TransportError>>,
    open_faults: VecDeque<TransportError>,
    claim_fault: Option<TransportError>,
    release_fault: Option<TransportError>,
    strings: HashMap<u8, String>,
    writes: Vec<Transfer>,
    calls: Vec<UsbCall>,
    reads_served: usize,
}

impl SimulatedDevice {
    /// Creates a device whose bulk endpoints use `packet_size`.
    pub fn new(packet_size: usize) -> Self {
        Self {
            packet_size,
            open: false,
            reads: VecDeque::new(),
            write_faults: VecDeque::new(),
            open_faults: VecDeque::new(),
            claim_fault: None,
            release_fault: None,
            strings: HashMap::new(),
            writes: Vec::new(),
            calls: Vec::new(),
            reads_served: 0,
        }
    }

    // ── Script builders ───────────────────────────────────────────────────────

    /// Sets the ASCII string descriptor returned for `index`.
    pub fn with_string(mut self, index: u8, value: &str) -> Self {
        self.strings.insert(index, value.to_string());
        self
    }

    /// Queues raw bytes as the next bulk IN packet.
    pub fn push_packet(&mut self, bytes: impl Into<Vec<u8>>) {
        self.reads.push_back(Ok(bytes.into()));
    }

    /// Queues a zero-length packet.
    pub fn push_zlp(&mut self) {
        self.reads.push_back(Ok(Vec::new()));
    }

    /// Queues a failing bulk IN transfer.
    pub fn push_read_error(&mut self, err: TransportError) {
        self.reads.push_back(Err(err));
    }

    /// Queues a RESPONSE container as a single packet.
    pub fn push_response(&mut self, code: u16, transaction_id: u32, params: &[u32]) {
        let rep = Container {
            code,
            transaction_id,
            session_id: 0,
            params: params.to_vec(),
        };
        match encode_response(&rep) {
            Ok(bytes) => self.push_packet(bytes),
            Err(err) => panic!("scripted response does not encode: {err}"),
        }
    }

    /// Queues a DATA container carrying `payload`, split into packets the way
    /// a device does: full packets, then a short one.  When the container
    /// ends exactly on a packet boundary a zero-length packet terminates it.
    pub fn push_data(&mut self, code: u16, transaction_id: u32, payload: &[u8]) {
        let mut container =
            encode_data_header(code, transaction_id, payload.len() as u64).to_vec();
        container.extend_from_slice(payload);
        for chunk in container.chunks(self.packet_size) {
            self.push_packet(chunk.to_vec());
        }
        if container.len() % self.packet_size == 0 {
            self.push_zlp();
        }
    }

    /// Queues a GetDeviceInfo DATA phase whose dataset ends after the
    /// vendor-extension description.
    pub fn push_device_info(&mut self, transaction_id: u32, extension: &str) {
        let mut info = Vec::new();
        info.extend_from_slice(&100u16.to_le_bytes()); // StandardVersion
        info.extend_from_slice(&6u32.to_le_bytes()); // VendorExtensionID
        info.extend_from_slice(&100u16.to_le_bytes()); // VendorExtensionVersion
        write_ptp_string(&mut info, extension);
        self.push_data(operation::GET_DEVICE_INFO, transaction_id, &info);
    }

    /// Makes the next bulk writes succeed or fail in order; writes past the
    /// queued entries succeed.
    pub fn push_write_result(&mut self, fault: Option<TransportError>) {
        self.write_faults.push_back(fault);
    }

    /// Makes the next call to `open` fail with `err`.
    pub fn fail_next_open(&mut self, err: TransportError) {
        self.open_faults.push_back(err);
    }

    /// Makes the next `claim_interface` fail with `err`.
    pub fn fail_claim(&mut self, err: TransportError) {
        self.claim_fault = Some(err);
    }

    /// Makes the next `release_interface` fail with `err`.
    pub fn fail_release(&mut self, err: TransportError) {
        self.release_fault = Some(err);
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// Every bulk write, in order.
    pub fn writes(&self) -> &[Transfer] {
        &self.writes
    }

    /// Every non-transfer call, in order.
    pub fn calls(&self) -> &[UsbCall] {
        &self.calls
    }

    /// COMMAND containers the host sent, decoded.
    pub fn sent_commands(&self) -> Vec<Container> {
        self.writes
            .iter()
            .filter_map(|t| {
                let (header, rest) = decode_header(&t.data).ok()?;
                if header.container_type != ContainerType::Command {
                    return None;
                }
                let declared = header.payload_len()?.min(rest.len());
                Some(Container {
                    code: header.code,
                    transaction_id: header.transaction_id,
                    session_id: 0,
                    params: rest[..declared]
                        .chunks_exact(4)
                        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
                        .collect(),
                })
            })
            .collect()
    }

    /// Number of scripted reads not yet consumed.
    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }

    /// Number of bulk reads the host performed.
    pub fn reads_served(&self) -> usize {
        self.reads_served
    }

    /// Whether the host currently holds an open handle.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Forgets recorded writes and calls, keeping the script.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.calls.clear();
        self.reads_served = 0;
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new(512)
    }
}

impl UsbTransport for SimulatedDevice {
    fn open(&mut self) -> Result<(), TransportError> {
        self.calls.push(UsbCall::Open);
        if let Some(err) = self.open_faults.pop_front() {
            return Err(err);
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.calls.push(UsbCall::Close);
        self.open = false;
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.calls.push(UsbCall::Claim(interface));
        match self.claim_fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.calls.push(UsbCall::Release(interface));
        match self.release_fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.calls.push(UsbCall::Reset);
        Ok(())
    }

    fn bulk_write(
        &mut self,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.writes.push(Transfer {
            endpoint,
            data: data.to_vec(),
        });
        match self.write_faults.pop_front().flatten() {
            Some(err) => Err(err),
            None => Ok(data.len()),
        }
    }

    fn bulk_read(
        &mut self,
        _endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.reads_served += 1;
        let packet = self.reads.pop_front().unwrap_or(Err(TransportError::Timeout))?;
        if packet.len() > buf.len() {
            return Err(TransportError::Io(format!(
                "overflow: {} byte packet into {} byte buffer",
                packet.len(),
                buf.len()
            )));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn max_packet_size(&self, _endpoint: u8) -> usize {
        self.packet_size
    }

    fn string_descriptor_ascii(&mut self, index: u8) -> Result<String, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.strings
            .get(&index)
            .cloned()
            .ok_or_else(|| TransportError::Io(format!("no string descriptor {index}")))
    }
}
