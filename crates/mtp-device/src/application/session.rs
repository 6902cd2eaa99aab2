//! MTP sessions: opening, closing, and the self-healing `configure`.
//!
//! # Sessions (for beginners)
//!
//! Most MTP operations are only valid inside a session.  The host picks a
//! session ID and sends it as the single parameter of OpenSession; from then
//! on every request carries that session ID and a fresh transaction ID.  The
//! OpenSession request itself has transaction ID 0, because the session and
//! its counter do not exist yet.
//!
//! Devices are not always cooperative.  A phone may still hold a session
//! from a host process that crashed, or a camera may need a bus reset before
//! it talks again.  [`DeviceConnection::configure`] walks through those cases:
//!
//! ```text
//! open (if needed) ─► OpenSession ─► Ok
//!                          │
//!                          ├─ SessionAlreadyOpen ─► CloseSession ─► OpenSession
//!                          │
//!                          └─ other failure ─► reset ─► close ─► backoff
//!                                              ─► open ─► OpenSession
//! ```

use mtp_core::protocol::container::{operation, response};
use mtp_core::{Container, TransactionCounter};
use tracing::{debug, warn};

use crate::application::connection::DeviceConnection;
use crate::application::error::{ConfigureError, TransactionError};
use crate::application::transaction::DataPhase;
use crate::infrastructure::usb::UsbTransport;

/// An open MTP session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: u32,
    transactions: TransactionCounter,
}

impl Session {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            transactions: TransactionCounter::new(),
        }
    }

    /// The session ID sent with OpenSession.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The transaction ID the next request will carry.
    pub fn next_transaction_id(&self) -> u32 {
        self.transactions.current()
    }

    /// Stamps `request` with this session and consumes one transaction ID.
    pub(crate) fn stamp(&mut self, request: &mut Container) {
        request.session_id = self.id;
        request.transaction_id = self.transactions.next_id();
    }
}

/// Picks a random session ID that is odd, so never 0, and below 0x80000000,
/// so never 0xFFFFFFFF.
pub(crate) fn new_session_id() -> u32 {
    (rand::random::<u32>() >> 1) | 1
}

impl<T: UsbTransport> DeviceConnection<T> {
    /// Opens a session with a fresh random session ID.
    ///
    /// Any session the connection still tracks is forgotten first.  Fatal
    /// errors tear the connection down, like every other transaction.
    ///
    /// # Errors
    ///
    /// Returns the [`TransactionError`] of the OpenSession transaction, e.g.
    /// a `Device` error carrying `SessionAlreadyOpen` (0x201E).
    pub fn open_session(&mut self) -> Result<(), TransactionError> {
        let result = self.open_session_raw();
        self.teardown_on_fatal(result)
    }

    /// Runs OpenSession without teardown, leaving the handle open so
    /// `configure` can reset the device through it.
    pub(crate) fn open_session_raw(&mut self) -> Result<(), TransactionError> {
        if !self.is_open() {
            return Err(TransactionError::NotOpen {
                operation: operation::OPEN_SESSION,
            });
        }
        if let Some(stale) = self.session.take() {
            if self.config().debug.mtp {
                debug!(
                    target: "mtp::mtp",
                    "forgetting session {:#x} before reopening",
                    stale.id()
                );
            }
        }

        let id = new_session_id();
        let request = Container::with_params(operation::OPEN_SESSION, vec![id]);
        self.execute_in(None, request, DataPhase::None)?;

        if self.config().debug.mtp {
            debug!(target: "mtp::mtp", "session {id:#x} open");
        }
        self.session = Some(Session::new(id));
        Ok(())
    }

    /// Closes the current session.
    ///
    /// Without a tracked session the request goes out with transaction ID 0,
    /// which most devices accept; `configure` relies on that to clear a
    /// session left behind by another host process.  The session is dropped
    /// whatever the outcome, and fatal errors tear the connection down.
    ///
    /// # Errors
    ///
    /// Returns the [`TransactionError`] of the CloseSession transaction.
    pub fn close_session(&mut self) -> Result<(), TransactionError> {
        if !self.is_open() {
            return Err(TransactionError::NotOpen {
                operation: operation::CLOSE_SESSION,
            });
        }
        let mut session = self.session.take();
        let result = self.execute_in(
            session.as_mut(),
            Container::new(operation::CLOSE_SESSION),
            DataPhase::None,
        );
        self.teardown_on_fatal(result).map(|_| ())
    }

    /// Opens the device and a session, recovering from stale sessions and
    /// wedged devices.
    ///
    /// Returns immediately when a session is already active.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError`]; [`ConfigureError::stage`] tells whether
    /// opening the device or opening the session gave up.
    pub fn configure(&mut self) -> Result<(), ConfigureError> {
        if self.is_open() && self.session().is_some() {
            return Ok(());
        }
        if !self.is_open() {
            self.open().map_err(ConfigureError::Open)?;
        }

        let mut result = self.open_session_raw();
        if result.as_ref().err().and_then(TransactionError::response_code)
            == Some(response::SESSION_ALREADY_OPEN)
        {
            if let Err(err) = self.close_session() {
                if self.config().debug.mtp {
                    debug!(target: "mtp::mtp", "closing stale session failed: {err}");
                }
            }
            result = self.open_session_raw();
        }

        let Err(err) = result else {
            return Ok(());
        };

        warn!(target: "mtp::mtp", "failed to open session: {err}, attempting reset");
        if self.is_open() {
            if let Err(reset_err) = self.transport_mut().reset() {
                warn!(target: "mtp::usb", "reset failed: {reset_err}");
            }
        }
        if let Err(close_err) = self.close() {
            warn!(target: "mtp::usb", "close before reopening failed: {close_err}");
        }

        std::thread::sleep(self.config().recovery.reset_backoff());

        self.open()
            .map_err(|source| ConfigureError::OpenAfterReset { source })?;
        self.open_session_raw()
            .map_err(|source| ConfigureError::SessionOpenAfterReset { source })
    }
}
