//! Device connection: handle lifecycle, teardown, and the public
//! transaction entry points.
//!
//! A [`DeviceConnection`] owns everything needed to talk to one device: the
//! transport, the description of the claimed interface, the configuration,
//! and at most one [`Session`].  All methods take `&mut self`, so a
//! connection runs one transaction at a time.
//!
//! # Teardown
//!
//! [`DeviceConnection::run_transaction`] closes the connection whenever a
//! transaction fails fatally (see
//! [`TransactionError::is_fatal`](crate::application::error::TransactionError::is_fatal)).
//! After that the caller must [`open`](DeviceConnection::open) or
//! [`configure`](DeviceConnection::configure) again.

use mtp_core::protocol::container::operation;
use mtp_core::protocol::dataset::vendor_extension_desc;
use mtp_core::Container;
use tracing::{debug, error, warn};

use crate::application::error::{OpenError, TransactionError};
use crate::application::session::Session;
use crate::application::transaction::{DataPhase, Endpoints, TransactionEngine};
use crate::infrastructure::storage::config::DeviceConfig;
use crate::infrastructure::usb::{TransportError, UsbTransport};

/// What the descriptor parser found out about the MTP interface.
///
/// String indices of 0 mean the descriptor has no such string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtpInterface {
    pub interface_number: u8,
    pub interface_string_index: u8,
    pub endpoints: Endpoints,
    pub manufacturer_index: u8,
    pub product_index: u8,
    pub serial_number_index: u8,
}

/// Manufacturer, product and serial number strings of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceId {
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

/// A connection to one MTP device.
pub struct DeviceConnection<T: UsbTransport> {
    transport: T,
    interface: MtpInterface,
    config: DeviceConfig,
    open: bool,
    claimed: bool,
    pub(crate) session: Option<Session>,
}

impl<T: UsbTransport> DeviceConnection<T> {
    /// Creates a closed connection.
    pub fn new(transport: T, interface: MtpInterface, config: DeviceConfig) -> Self {
        Self {
            transport,
            interface,
            config,
            open: false,
            claimed: false,
            session: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn interface(&self) -> &MtpInterface {
        &self.interface
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Opens the device handle, claims the MTP interface, and checks that the
    /// device really speaks MTP.
    ///
    /// The check reads the interface string, which must contain `"MTP"`.
    /// Interfaces without a string are accepted when the DeviceInfo vendor
    /// extension mentions Microsoft's MTP extension.  Any failure after the
    /// handle was opened closes it again.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError::AlreadyOpen`] for an open connection, otherwise
    /// the [`OpenError`] of the step that failed.
    pub fn open(&mut self) -> Result<(), OpenError> {
        if self.open {
            return Err(OpenError::AlreadyOpen);
        }

        let opened = self.transport.open();
        if self.config.debug.usb {
            debug!(target: "mtp::usb", "open, err: {opened:?}");
        }
        opened?;
        self.open = true;

        if let Err(err) = self.claim() {
            self.close_quietly();
            return Err(err.into());
        }
        if let Err(err) = self.verify_mtp_interface() {
            self.close_quietly();
            return Err(err);
        }
        Ok(())
    }

    fn claim(&mut self) -> Result<(), TransportError> {
        let number = self.interface.interface_number;
        let claimed = self.transport.claim_interface(number);
        if self.config.debug.usb {
            debug!(target: "mtp::usb", "claimInterface {number:#x}, err: {claimed:?}");
        }
        claimed?;
        self.claimed = true;
        Ok(())
    }

    fn verify_mtp_interface(&mut self) -> Result<(), OpenError> {
        let index = self.interface.interface_string_index;
        if index == 0 {
            // Some Windows phones leave the interface unnamed.
            let mut info = Vec::new();
            self.execute_in(
                None,
                Container::new(operation::GET_DEVICE_INFO),
                DataPhase::Receive(&mut info),
            )
            .map_err(OpenError::DeviceInfo)?;

            let extension = vendor_extension_desc(&info).unwrap_or_default();
            if !extension.to_ascii_lowercase().contains("microsoft") {
                return Err(OpenError::NoMtpExtension { extension });
            }
            return Ok(());
        }

        let name = self.transport.string_descriptor_ascii(index)?;
        if !name.contains("MTP") {
            return Err(OpenError::NotMtpInterface { interface: name });
        }
        Ok(())
    }

    /// Closes the session (if any), releases the interface, and closes the
    /// handle.  Closing a closed connection is a no-op.
    ///
    /// A CloseSession the device does not acknowledge is followed by a USB
    /// reset.  Reset and release are best effort; their failures are logged.
    ///
    /// # Errors
    ///
    /// Returns the transport's error from closing the handle.  The connection
    /// counts as closed either way.
    pub fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Ok(());
        }

        if let Some(mut session) = self.session.take() {
            let result = self.execute_in(
                Some(&mut session),
                Container::new(operation::CLOSE_SESSION),
                DataPhase::None,
            );
            if let Err(err) = result {
                let reset = self.transport.reset();
                if self.config.debug.usb {
                    debug!(
                        target: "mtp::usb",
                        "closeSession failed ({err}); reset, err: {reset:?}"
                    );
                }
                if let Err(reset_err) = reset {
                    warn!(target: "mtp::usb", "reset after failed closeSession: {reset_err}");
                }
            }
        }

        if self.claimed {
            let number = self.interface.interface_number;
            let released = self.transport.release_interface(number);
            if self.config.debug.usb {
                debug!(target: "mtp::usb", "releaseInterface {number:#x}, err: {released:?}");
            }
            if let Err(err) = released {
                warn!(target: "mtp::usb", "releasing interface {number:#x} failed: {err}");
            }
            self.claimed = false;
        }

        let closed = self.transport.close();
        self.open = false;
        if self.config.debug.usb {
            debug!(target: "mtp::usb", "close, err: {closed:?}");
        }
        closed
    }

    fn close_quietly(&mut self) {
        if let Err(err) = self.close() {
            warn!(target: "mtp::usb", "close failed: {err}");
        }
    }

    /// Reads the manufacturer, product and serial number strings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotOpen`] on a closed connection, or the
    /// error of the first descriptor read that failed.
    pub fn id(&mut self) -> Result<DeviceId, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        Ok(DeviceId {
            manufacturer: self.read_string(self.interface.manufacturer_index)?,
            product: self.read_string(self.interface.product_index)?,
            serial_number: self.read_string(self.interface.serial_number_index)?,
        })
    }

    fn read_string(&mut self, index: u8) -> Result<String, TransportError> {
        if index == 0 {
            return Ok(String::new());
        }
        self.transport.string_descriptor_ascii(index).map_err(|err| {
            if self.config.debug.usb {
                debug!(target: "mtp::usb", "getStringDescriptorASCII {index}, err: {err}");
            }
            err
        })
    }

    // ── Transactions ──────────────────────────────────────────────────────────

    /// Runs one transaction in the current session and returns the response.
    ///
    /// The request's session and transaction IDs are filled in here; callers
    /// set only the code and parameters.  Without an open session the request
    /// is sent with IDs of 0, as GetDeviceInfo allows.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError`].  Fatal errors close the connection before
    /// they are returned.
    pub fn run_transaction(
        &mut self,
        request: Container,
        data: DataPhase<'_>,
    ) -> Result<Container, TransactionError> {
        if !self.open {
            return Err(TransactionError::NotOpen {
                operation: request.code,
            });
        }
        let mut session = self.session.take();
        let result = self.execute_in(session.as_mut(), request, data);
        self.session = session;
        self.teardown_on_fatal(result)
    }

    /// Runs `code` with no parameters and no data phase.
    ///
    /// # Errors
    ///
    /// Same as [`run_transaction`](Self::run_transaction).
    pub fn run_simple(&mut self, code: u16) -> Result<Container, TransactionError> {
        self.run_transaction(Container::new(code), DataPhase::None)
    }

    /// Runs a transaction without teardown.
    pub(crate) fn execute_in(
        &mut self,
        session: Option<&mut Session>,
        request: Container,
        data: DataPhase<'_>,
    ) -> Result<Container, TransactionError> {
        TransactionEngine::new(&mut self.transport, self.interface.endpoints, &self.config)
            .run(session, request, data)
    }

    /// Closes the connection if `result` is a fatal error, then passes it on.
    pub(crate) fn teardown_on_fatal<R>(
        &mut self,
        result: Result<R, TransactionError>,
    ) -> Result<R, TransactionError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!(target: "mtp::mtp", "fatal error {err}; closing connection");
                self.close_quietly();
            }
        }
        result
    }
}

impl<T: UsbTransport> Drop for DeviceConnection<T> {
    fn drop(&mut self) {
        self.close_quietly();
    }
}
