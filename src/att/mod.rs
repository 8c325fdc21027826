//! The Attribute Protocol (ATT): opcodes, error codes, handles, and PDU
//! pack/parse helpers. ATT rides over whatever transport carries PDUs
//! unmodified (see `crate::transport`); this module only knows about bytes.

pub mod handle;
pub mod pdus;

pub use handle::{AttHandle, HandleRange, InvalidHandleRange, RawHandleRange};
pub use pdus::{AttError, ErrorCode, Opcode};
