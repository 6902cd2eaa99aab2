//! mtp-device library entry point.
//!
//! Drives an MTP device over a USB bulk transport: opening and claiming the
//! interface, running transactions with their data phases, and keeping a
//! session alive across resets.
//!
//! ```rust,no_run
//! use mtp_device::{DataPhase, DeviceConfig, DeviceConnection, MtpInterface};
//! # use mtp_device::UsbTransport;
//! # fn run<T: UsbTransport>(
//! #     transport: T,
//! #     iface: MtpInterface,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = DeviceConnection::new(transport, iface, DeviceConfig::default());
//! conn.configure()?;
//!
//! let mut info = Vec::new();
//! conn.run_transaction(mtp_core::Container::new(0x1001), DataPhase::Receive(&mut info))?;
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod infrastructure;

pub use application::connection::{DeviceConnection, DeviceId, MtpInterface};
pub use application::error::{
    ConfigureError, ConfigureStage, DesyncReason, OpenError, TransactionError,
};
pub use application::session::Session;
pub use application::transaction::{DataPhase, Endpoints};
pub use infrastructure::storage::config::{DebugFlags, DeviceConfig};
pub use infrastructure::usb::{TransportError, UsbTransport};
