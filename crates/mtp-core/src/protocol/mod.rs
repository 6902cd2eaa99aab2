//! Protocol module containing container types, the binary codec, and the
//! transaction counter.

pub mod codec;
pub mod container;
pub mod dataset;
pub mod transaction_id;

pub use codec::{
    decode_header, decode_response, encode_command, encode_data_header, encode_header,
    encode_response, ProtocolError,
};
pub use container::*;
pub use transaction_id::TransactionCounter;
