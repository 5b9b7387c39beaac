//! rpclink - a minimal binary RPC substrate
//!
//! Wire codec, message framing and request dispatch for proxy/stub pairs
//! that agree on procedure signatures ahead of time.

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod rpc;

#[cfg(test)]
mod test_util;

pub use error::{RpcError, RpcResult};
