//! Integration tests for session setup and recovery.
//!
//! # Purpose
//!
//! `configure` is what a client calls after plugging in a device.  It has to
//! cope with devices in every state a previous host process may have left
//! them in.  These tests cover each branch:
//!
//! ```text
//! fresh device           ─► OpenSession OK
//! stale session          ─► 0x201E ─► CloseSession ─► OpenSession OK      (no reset)
//! wedged device          ─► failure ─► reset ─► close ─► backoff ─► reopen
//! already configured     ─► nothing sent
//! open_session fails     ─► connection closed (fatal errors only)
//! ```

use std::time::{Duration, Instant};

use mtp_core::protocol::container::{operation, response};
use mtp_device::infrastructure::usb::mock::{
    SimulatedDevice, UsbCall, SIM_EVENT_ENDPOINT, SIM_FETCH_ENDPOINT, SIM_SEND_ENDPOINT,
};
use mtp_device::{
    ConfigureError, ConfigureStage, DeviceConfig, DeviceConnection, Endpoints, MtpInterface,
    TransactionError, TransportError,
};

fn mtp_interface() -> MtpInterface {
    MtpInterface {
        interface_number: 2,
        interface_string_index: 5,
        endpoints: Endpoints {
            send: SIM_SEND_ENDPOINT,
            fetch: SIM_FETCH_ENDPOINT,
            event: SIM_EVENT_ENDPOINT,
        },
        ..MtpInterface::default()
    }
}

fn config_with_backoff(ms: u64) -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.recovery.reset_backoff_ms = ms;
    config
}

fn new_connection(dev: SimulatedDevice, backoff_ms: u64) -> DeviceConnection<SimulatedDevice> {
    DeviceConnection::new(dev, mtp_interface(), config_with_backoff(backoff_ms))
}

#[test]
fn test_configure_fresh_device_opens_session_with_tid_zero() {
    // Arrange
    let mut dev = SimulatedDevice::default().with_string(5, "MTP Device");
    dev.push_response(response::OK, 0, &[]);
    let mut conn = new_connection(dev, 0);

    // Act
    conn.configure().expect("configure");

    // Assert
    let session = conn.session().expect("session must be active");
    let commands = conn.transport().sent_commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].code, operation::OPEN_SESSION);
    assert_eq!(commands[0].transaction_id, 0);
    assert_eq!(commands[0].params, vec![session.id()]);
    assert_eq!(session.id() & 1, 1, "session IDs are odd");
    assert_eq!(session.next_transaction_id(), 1);
}

#[test]
fn test_configure_clears_stale_session_without_reset() {
    // Arrange – the device still holds a session from another process
    let mut dev = SimulatedDevice::default().with_string(5, "MTP");
    dev.push_response(response::SESSION_ALREADY_OPEN, 0, &[]);
    dev.push_response(response::OK, 0, &[]);
    dev.push_response(response::OK, 0, &[]);
    let mut conn = new_connection(dev, 0);

    // Act
    conn.configure().expect("configure");

    // Assert
    let codes: Vec<u16> = conn
        .transport()
        .sent_commands()
        .iter()
        .map(|c| c.code)
        .collect();
    assert_eq!(
        codes,
        vec![
            operation::OPEN_SESSION,
            operation::CLOSE_SESSION,
            operation::OPEN_SESSION
        ]
    );
    assert!(!conn.transport().calls().contains(&UsbCall::Reset));
    assert!(conn.session().is_some());
    assert!(conn.is_open());
}

#[test]
fn test_configure_is_idempotent_with_active_session() {
    // Arrange
    let mut dev = SimulatedDevice::default().with_string(5, "MTP");
    dev.push_response(response::OK, 0, &[]);
    let mut conn = new_connection(dev, 0);
    conn.configure().expect("first configure");
    let sid = conn.session().map(|s| s.id());
    conn.transport_mut().clear_log();

    // Act
    conn.configure().expect("second configure");

    // Assert
    assert!(conn.transport().writes().is_empty());
    assert!(conn.transport().calls().is_empty());
    assert_eq!(conn.session().map(|s| s.id()), sid);
}

#[test]
fn test_configure_recovers_after_reset() {
    // Arrange – the first OpenSession write stalls, the retry succeeds
    let mut dev = SimulatedDevice::default().with_string(5, "MTP");
    dev.push_write_result(Some(TransportError::Stall));
    dev.push_response(response::OK, 0, &[]);
    let mut conn = new_connection(dev, 0);

    // Act
    conn.configure().expect("configure after reset");

    // Assert
    assert_eq!(
        conn.transport().calls(),
        &[
            UsbCall::Open,
            UsbCall::Claim(2),
            UsbCall::Reset,
            UsbCall::Release(2),
            UsbCall::Close,
            UsbCall::Open,
            UsbCall::Claim(2),
        ]
    );
    assert!(conn.session().is_some());
}

#[test]
fn test_configure_transport_fault_reports_session_open_stage() {
    // Arrange – both OpenSession attempts time out waiting for a response
    let dev = SimulatedDevice::default().with_string(5, "MTP");
    let mut conn = new_connection(dev, 30);
    let started = Instant::now();

    // Act
    let err = conn.configure().expect_err("device never answers");

    // Assert
    assert_eq!(err.stage(), ConfigureStage::SessionOpen);
    match &err {
        ConfigureError::SessionOpenAfterReset { source } => assert!(matches!(
            source,
            TransactionError::Transport {
                source: TransportError::Timeout,
                ..
            }
        )),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(30), "backoff was honoured");
    let calls = conn.transport().calls();
    assert_eq!(calls.iter().filter(|c| **c == UsbCall::Reset).count(), 1);
    assert_eq!(calls.iter().filter(|c| **c == UsbCall::Open).count(), 2);
    assert!(conn.session().is_none());
}

#[test]
fn test_configure_reports_open_stage_when_reopen_fails() {
    // Arrange – device refuses the session, then vanishes during the reset
    let mut dev = SimulatedDevice::default().with_string(5, "MTP");
    dev.push_response(response::GENERAL_ERROR, 0, &[]);
    let mut conn = new_connection(dev, 0);
    conn.open().expect("open");
    conn.transport_mut().fail_next_open(TransportError::NoDevice);

    // Act
    let err = conn.configure().expect_err("reopen fails");

    // Assert
    assert_eq!(err.stage(), ConfigureStage::Open);
    assert!(matches!(err, ConfigureError::OpenAfterReset { .. }));
    assert!(!conn.is_open());
}

#[test]
fn test_configure_reports_open_stage_when_first_open_fails() {
    // Arrange
    let mut dev = SimulatedDevice::default().with_string(5, "Mass Storage");
    dev.push_response(response::OK, 0, &[]);
    let mut conn = new_connection(dev, 0);

    // Act
    let err = conn.configure().expect_err("not an MTP interface");

    // Assert
    assert_eq!(err.stage(), ConfigureStage::Open);
    assert!(matches!(err, ConfigureError::Open(_)));
    assert!(conn.transport().writes().is_empty(), "no session attempted");
}

#[test]
fn test_close_session_then_reopen_uses_fresh_counter() {
    // Arrange
    let mut dev = SimulatedDevice::default().with_string(5, "MTP");
    dev.push_response(response::OK, 0, &[]); // OpenSession
    dev.push_response(response::OK, 1, &[]); // GetNumObjects
    dev.push_response(response::OK, 2, &[]); // CloseSession
    dev.push_response(response::OK, 0, &[]); // OpenSession
    dev.push_response(response::OK, 1, &[]); // GetNumObjects
    let mut conn = new_connection(dev, 0);
    conn.configure().expect("configure");

    // Act
    conn.run_simple(0x1006).expect("first transaction");
    conn.close_session().expect("close session");
    let closed = conn.session().is_none();
    conn.open_session().expect("open session");
    let rep = conn.run_simple(0x1006).expect("transaction in new session");

    // Assert
    assert!(closed);
    assert_eq!(rep.transaction_id, 1);
    let tids: Vec<u32> = conn
        .transport()
        .sent_commands()
        .iter()
        .map(|c| c.transaction_id)
        .collect();
    assert_eq!(tids, vec![0, 1, 2, 0, 1]);
}

#[test]
fn test_open_session_on_closed_connection_is_not_open() {
    let mut conn = new_connection(SimulatedDevice::default(), 0);

    let err = conn.open_session().expect_err("closed");

    assert!(matches!(
        err,
        TransactionError::NotOpen {
            operation: operation::OPEN_SESSION
        }
    ));
}

#[test]
fn test_open_session_timeout_closes_connection() {
    // Arrange – OpenSession is sent but the device never answers
    let dev = SimulatedDevice::default().with_string(5, "MTP");
    let mut conn = new_connection(dev, 0);
    conn.open().expect("open");

    // Act
    let err = conn.open_session().expect_err("no response");

    // Assert
    assert!(err.is_fatal());
    assert!(!conn.is_open(), "a fatal OpenSession error closes the connection");
    assert!(conn.session().is_none());
    assert_eq!(
        conn.transport().calls(),
        &[UsbCall::Open, UsbCall::Claim(2), UsbCall::Release(2), UsbCall::Close]
    );
}

#[test]
fn test_late_open_session_response_is_not_taken_as_next_reply() {
    // Arrange
    let dev = SimulatedDevice::default().with_string(5, "MTP");
    let mut conn = new_connection(dev, 0);
    conn.open().expect("open");
    let _ = conn.open_session();
    conn.transport_mut().push_response(response::OK, 0, &[]);

    // Act
    let err = conn
        .run_simple(operation::GET_DEVICE_INFO)
        .expect_err("connection was torn down");

    // Assert
    assert!(matches!(
        err,
        TransactionError::NotOpen {
            operation: operation::GET_DEVICE_INFO
        }
    ));
    assert_eq!(conn.transport().pending_reads(), 1, "stale response left unread");
}
