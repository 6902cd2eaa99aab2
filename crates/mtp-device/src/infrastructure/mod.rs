//! Infrastructure layer for device connections.
//!
//! Contains the OS-facing pieces: the USB transport trait and its simulated
//! implementation, file-system storage for configuration, and transfer
//! diagnostics.
//!
//! **Dependency rule**: the `application` layer depends on the `UsbTransport`
//! trait and the configuration types defined here, never on a concrete USB
//! host stack.

pub mod diagnostics;
pub mod storage;
pub mod usb;
