//! Protocol module - Defines the rpclink wire protocol
//!
//! Every multi-byte field is a 4-byte big-endian word:
//! - name frame: length (terminator included) + NUL-terminated name
//! - a status word after the name and after the argument block
//! - length-prefixed argument block and, if declared, result block

mod block;
mod codec;
mod frame;
mod status;

pub use block::*;
pub use codec::*;
pub use frame::*;
pub use status::*;

/// Default port for rpclink servers
pub const DEFAULT_PORT: u16 = 24900;

/// Width of every integer, float and length field
pub const WORD_SIZE: usize = 4;

/// Ends every string on the wire
pub const TERMINATOR: u8 = 0;

/// Largest argument or result block accepted by default (10 MB)
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 10 * 1024 * 1024;
