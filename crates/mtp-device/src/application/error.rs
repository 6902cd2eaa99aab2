//! Error taxonomy for transactions, connection setup and session recovery.
//!
//! # Fatal vs. non-fatal (for beginners)
//!
//! MTP has no in-band framing beyond packet boundaries, so once the host and
//! the device disagree about where a transaction ends, every later response
//! would be read against the wrong request.  Errors that can leave the pipes
//! in that state are *fatal*: the connection wrapper closes the device when
//! it sees one.  Everything else (a device refusing an operation, a request
//! that could not be encoded, a local sink that failed to accept data) leaves
//! the packet stream in step and the connection usable.
//!
//! | Variant      | Fatal |
//! |--------------|-------|
//! | `NotOpen`    | no    |
//! | `Encode`     | no    |
//! | `Transport`  | yes   |
//! | `Desync`     | yes   |
//! | `Device`     | no    |
//! | `DataSource` | yes   |
//! | `DataSink`   | no    |

use mtp_core::{Container, ProtocolError};
use thiserror::Error;

use crate::infrastructure::usb::TransportError;

/// Why the host decided the packet stream is out of step with the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesyncReason {
    /// A packet was truncated, had an unknown type, or was not the expected
    /// container type.
    #[error("{0}")]
    Malformed(#[from] ProtocolError),

    /// The response belongs to a different transaction.
    #[error("transaction ID mismatch: got {got:#x}, want {expected:#x}")]
    TransactionIdMismatch { expected: u32, got: u32 },

    /// The device sent a data phase for an operation without a sink.
    #[error("unexpected data phase")]
    UnexpectedData,
}

/// Failure of a single MTP transaction.
///
/// Every variant names the operation code that was in flight.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("cannot run operation {operation:#06x}: device is not open")]
    NotOpen { operation: u16 },

    #[error("operation {operation:#06x}: cannot encode request: {source}")]
    Encode {
        operation: u16,
        #[source]
        source: ProtocolError,
    },

    #[error("operation {operation:#06x}: USB transfer failed: {source}")]
    Transport {
        operation: u16,
        #[source]
        source: TransportError,
    },

    #[error("operation {operation:#06x}: lost sync with device: {reason}")]
    Desync {
        operation: u16,
        reason: DesyncReason,
    },

    /// The device answered with a non-OK response code.  The full response,
    /// parameters included, is kept for callers that inspect it.
    #[error("operation {operation:#06x}: device returned response code {code:#06x}")]
    Device {
        operation: u16,
        code: u16,
        response: Container,
    },

    /// Outgoing data could not be read while the device was waiting for it.
    #[error("operation {operation:#06x}: reading outgoing data failed: {source}")]
    DataSource {
        operation: u16,
        #[source]
        source: std::io::Error,
    },

    /// The caller's sink rejected incoming data; the remainder was drained.
    #[error("operation {operation:#06x}: writing incoming data failed: {source}")]
    DataSink {
        operation: u16,
        #[source]
        source: std::io::Error,
    },
}

impl TransactionError {
    /// Whether this error leaves the connection in an unknown state and
    /// forces a teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransactionError::Transport { .. }
                | TransactionError::Desync { .. }
                | TransactionError::DataSource { .. }
        )
    }

    /// The operation code that was in flight.
    pub fn operation(&self) -> u16 {
        match self {
            TransactionError::NotOpen { operation }
            | TransactionError::Encode { operation, .. }
            | TransactionError::Transport { operation, .. }
            | TransactionError::Desync { operation, .. }
            | TransactionError::Device { operation, .. }
            | TransactionError::DataSource { operation, .. }
            | TransactionError::DataSink { operation, .. } => *operation,
        }
    }

    /// The device's response code, for [`TransactionError::Device`] only.
    pub fn response_code(&self) -> Option<u16> {
        match self {
            TransactionError::Device { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn desync(operation: u16, reason: impl Into<DesyncReason>) -> Self {
        TransactionError::Desync {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn transport(operation: u16) -> impl FnOnce(TransportError) -> Self {
        move |source| TransactionError::Transport { operation, source }
    }
}

/// Failure to open a device connection.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("device is already open")]
    AlreadyOpen,

    #[error("USB error while opening device: {0}")]
    Transport(#[from] TransportError),

    #[error("interface {interface:?} is not an MTP interface")]
    NotMtpInterface { interface: String },

    /// GetDeviceInfo, used to identify interfaces without a name, failed.
    #[error("reading device info failed: {0}")]
    DeviceInfo(#[source] TransactionError),

    #[error("no MTP extension in {extension:?}")]
    NoMtpExtension { extension: String },
}

/// Which step of `configure` gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureStage {
    Open,
    SessionOpen,
}

/// Failure of the self-healing `configure` sequence.
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// The device could not be opened before any recovery was attempted.
    #[error("opening device: {0}")]
    Open(#[source] OpenError),

    /// Reopening after the reset failed.
    #[error("opening after reset: {source}")]
    OpenAfterReset {
        #[source]
        source: OpenError,
    },

    /// The session could not be opened even after a reset.
    #[error("openSession after reset: {source}")]
    SessionOpenAfterReset {
        #[source]
        source: TransactionError,
    },
}

impl ConfigureError {
    pub fn stage(&self) -> ConfigureStage {
        match self {
            ConfigureError::Open(_) | ConfigureError::OpenAfterReset { .. } => ConfigureStage::Open,
            ConfigureError::SessionOpenAfterReset { .. } => ConfigureStage::SessionOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtp_core::protocol::container::response;

    #[test]
    fn test_fatal_classification() {
        // Arrange
        let op = 0x1001;
        let cases = [
            (TransactionError::NotOpen { operation: op }, false),
            (
                TransactionError::Encode {
                    operation: op,
                    source: ProtocolError::TooManyParameters(6),
                },
                false,
            ),
            (
                TransactionError::Transport {
                    operation: op,
                    source: TransportError::Timeout,
                },
                true,
            ),
            (
                TransactionError::desync(op, DesyncReason::UnexpectedData),
                true,
            ),
            (
                TransactionError::Device {
                    operation: op,
                    code: response::GENERAL_ERROR,
                    response: Container::new(response::GENERAL_ERROR),
                },
                false,
            ),
            (
                TransactionError::DataSource {
                    operation: op,
                    source: std::io::ErrorKind::UnexpectedEof.into(),
                },
                true,
            ),
            (
                TransactionError::DataSink {
                    operation: op,
                    source: std::io::ErrorKind::WriteZero.into(),
                },
                false,
            ),
        ];

        // Act / Assert
        for (err, fatal) in cases {
            assert_eq!(err.is_fatal(), fatal, "{err}");
            assert_eq!(err.operation(), op);
        }
    }

    #[test]
    fn test_response_code_only_for_device_errors() {
        let device = TransactionError::Device {
            operation: 0x1002,
            code: response::SESSION_ALREADY_OPEN,
            response: Container::new(response::SESSION_ALREADY_OPEN),
        };
        let other = TransactionError::NotOpen { operation: 0x1002 };

        assert_eq!(device.response_code(), Some(0x201E));
        assert_eq!(other.response_code(), None);
    }

    #[test]
    fn test_desync_message_names_operation_and_reason() {
        let err = TransactionError::desync(
            0x1007,
            DesyncReason::TransactionIdMismatch {
                expected: 5,
                got: 4,
            },
        );
        assert_eq!(
            err.to_string(),
            "operation 0x1007: lost sync with device: transaction ID mismatch: got 0x4, want 0x5"
        );
    }

    #[test]
    fn test_configure_stage_tags() {
        let open = ConfigureError::OpenAfterReset {
            source: OpenError::AlreadyOpen,
        };
        let session = ConfigureError::SessionOpenAfterReset {
            source: TransactionError::NotOpen { operation: 0x1002 },
        };

        assert_eq!(open.stage(), ConfigureStage::Open);
        assert_eq!(session.stage(), ConfigureStage::SessionOpen);
        assert_eq!(
            ConfigureError::Open(OpenError::AlreadyOpen).stage(),
            ConfigureStage::Open
        );
    }
}
