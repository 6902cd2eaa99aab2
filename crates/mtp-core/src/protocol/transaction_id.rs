//! Per-session transaction ID counter.
//!
//! # What is a transaction ID? (for beginners)
//!
//! Every request sent inside an MTP session carries a 32-bit *transaction
//! ID*, and the device echoes it in the matching response.  Transaction IDs
//! are used to:
//!
//! - **Correlate** a response with the request that caused it.  MTP allows
//!   only one outstanding transaction at a time, so a response carrying any
//!   other ID means the packet stream is out of step.
//! - **Detect stale bytes** left over from an earlier, aborted transaction.
//!
//! # Reserved values
//!
//! ID `0` belongs to OpenSession (sent before a session exists) and
//! `0xFFFFFFFF` is reserved by the protocol.  The counter therefore
//! starts at 1 and, should a session ever run four billion transactions,
//! wraps from `0xFFFFFFFE` back to 1.
//!
//! # Threading
//!
//! A session is owned by exactly one connection and MTP forbids pipelining,
//! so the counter is a plain integer advanced through `&mut self`.

/// First transaction ID handed out in a fresh session.
pub const FIRST_TRANSACTION_ID: u32 = 1;

/// Reserved transaction ID that is never issued.
const RESERVED_TRANSACTION_ID: u32 = 0xFFFF_FFFF;

/// A monotonically increasing counter of transaction IDs.
///
/// # Examples
///
/// ```rust
/// use mtp_core::protocol::TransactionCounter;
///
/// let mut counter = TransactionCounter::new();
/// assert_eq!(counter.next_id(), 1);
/// assert_eq!(counter.next_id(), 2);
/// assert_eq!(counter.current(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCounter {
    next: u32,
}

impl TransactionCounter {
    /// Creates a counter whose first ID is [`FIRST_TRANSACTION_ID`].
    pub fn new() -> Self {
        Self {
            next: FIRST_TRANSACTION_ID,
        }
    }

    /// Returns the ID for the transaction about to be sent and advances.
    ///
    /// Each value is returned exactly once, whatever the outcome of the
    /// transaction that uses it.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = match id.wrapping_add(1) {
            0 | RESERVED_TRANSACTION_ID => FIRST_TRANSACTION_ID,
            n => n,
        };
        id
    }

    /// Returns the ID the next transaction will use, without advancing.
    pub fn current(&self) -> u32 {
        self.next
    }
}

impl Default for TransactionCounter {
    fn default() -> Self {
        Self::new()
    }
}
