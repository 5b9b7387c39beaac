//! Remote procedures
//!
//! Every remote procedure is described once by a [`Signature`]. The proxy
//! side calls it with [`call`]; the stub side implements [`Procedure`] and is
//! served by [`serve_call`] from a [`FunctionTable`]. Both sides go through
//! the same codec and framing entry points, so any pair built on these
//! traits agrees on the bytes.

mod dispatcher;
mod procedures;
mod proxy;
mod registry;
mod stub;
mod value;

pub use dispatcher::*;
pub use procedures::*;
pub use proxy::*;
pub use registry::*;
pub use stub::*;
pub use value::*;

use crate::protocol::{WireDecode, WireEncode, WireType};

/// Name and types of one remote procedure, shared by its proxy and stub
pub trait Signature: Send + Sync + 'static {
    /// Name sent in the name frame
    const NAME: &'static str;

    /// Arguments in declared order; tuples give one slot per element
    type Args: WireEncode + WireDecode + WireType + Send + Sync;

    /// Result; `()` means no result block is exchanged
    type Output: WireEncode + WireDecode + WireType + Send;
}

/// Server-side implementation of a remote procedure
pub trait Procedure: Signature {
    fn invoke(&self, args: Self::Args) -> Self::Output;
}
