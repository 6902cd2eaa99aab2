//! Application layer: the MTP transaction engine and the objects that use it.
//!
//! Everything here depends on the [`UsbTransport`](crate::infrastructure::usb::UsbTransport)
//! trait rather than a concrete USB stack, so the whole layer runs against
//! the simulated device in tests.
//!
//! # Sub-modules
//!
//! - **`transaction`** – frames one request, runs the optional data phase,
//!   reassembles the response, and classifies failures.  This is the hot
//!   path every MTP operation goes through.
//!
//! - **`connection`** – owns the transport and the claimed interface, opens
//!   and closes the device, and tears the connection down on fatal errors.
//!
//! - **`session`** – session IDs, the transaction counter, and the
//!   self-healing `configure` sequence.
//!
//! - **`error`** – the error taxonomy shared by the three modules above.

pub mod connection;
pub mod error;
pub mod session;
pub mod transaction;
