//! Function table mapping procedure names to their stubs
//!
//! The table is filled once at startup and only read afterwards, so
//! connection tasks share it through an `Arc` without locking.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use super::{serve_call, CallReport, Procedure, Signature};
use crate::error::RpcResult;
use crate::network::Transport;
use crate::protocol::{FunctionHeader, WireType, DEFAULT_MAX_BLOCK_SIZE};

/// Per-call limits handed to every stub
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub max_block_size: usize,
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

/// Description of a registered procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcedureInfo {
    pub name: String,
    pub params: Vec<String>,
    pub returns: String,
}

impl ProcedureInfo {
    pub fn of<S: Signature>() -> Self {
        let mut params = Vec::new();
        S::Args::slot_types(&mut params);
        Self {
            name: S::NAME.to_string(),
            params,
            returns: S::Output::wire_type(),
        }
    }

    /// Header with the fixed slot sizes, where every parameter has one
    pub fn header(&self) -> Option<FunctionHeader> {
        let sizes = self
            .params
            .iter()
            .map(|ty| fixed_size(ty))
            .collect::<Option<Vec<u32>>>()?;
        Some(FunctionHeader::new(self.name.clone(), sizes))
    }
}

// Byte width of a fixed-size wire type name such as "u32" or "f32[3]".
fn fixed_size(ty: &str) -> Option<u32> {
    match ty {
        "u32" | "i32" | "f32" => Some(crate::protocol::WORD_SIZE as u32),
        _ => {
            let (elem, rest) = ty.split_once('[')?;
            let count: u32 = rest.strip_suffix(']')?.parse().ok()?;
            fixed_size(elem)?.checked_mul(count)
        }
    }
}

/// Decode arguments, invoke, encode the result - for one procedure
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    fn info(&self) -> ProcedureInfo;

    /// Run everything after the name checkpoint
    async fn serve(&self, conn: &mut dyn Transport, ctx: &CallContext) -> RpcResult<CallReport>;
}

/// Adapts a [`Procedure`] into a table entry
pub struct ProcedureStub<P> {
    procedure: P,
    fixed: Option<FunctionHeader>,
}

impl<P: Procedure> ProcedureStub<P> {
    pub fn new(procedure: P) -> Self {
        Self {
            procedure,
            fixed: ProcedureInfo::of::<P>().header(),
        }
    }
}

#[async_trait]
impl<P: Procedure> Handler for ProcedureStub<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn info(&self) -> ProcedureInfo {
        ProcedureInfo::of::<P>()
    }

    async fn serve(&self, conn: &mut dyn Transport, ctx: &CallContext) -> RpcResult<CallReport> {
        serve_call(&self.procedure, conn, self.fixed.as_ref(), ctx.max_block_size).await
    }
}

/// Read-only name to handler map
#[derive(Default)]
pub struct FunctionTable {
    handlers: HashMap<&'static str, Box<dyn Handler>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with<P: Procedure>(mut self, procedure: P) -> Self {
        self.register(procedure);
        self
    }

    /// Register a procedure. Returns false if it replaced one of the same name.
    pub fn register<P: Procedure>(&mut self, procedure: P) -> bool {
        let replaced = self
            .handlers
            .insert(P::NAME, Box::new(ProcedureStub::new(procedure)))
            .is_some();
        if replaced {
            tracing::warn!("Procedure {}() registered twice; keeping the last one", P::NAME);
        }
        !replaced
    }

    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers.get(name).map(|h| &**h)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Descriptions of every procedure, sorted by name
    pub fn infos(&self) -> Vec<ProcedureInfo> {
        let mut infos: Vec<_> = self.handlers.values().map(|h| h.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{builtin_table, Add, Double, Greet, Sum3};

    #[test]
    fn test_lookup() {
        let table = FunctionTable::new().with(Double).with(Add);

        assert_eq!(table.len(), 2);
        assert!(table.contains("double"));
        assert_eq!(table.get("add").map(|h| h.name()), Some("add"));
        assert!(table.get("unknown").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut table = FunctionTable::new();
        assert!(table.register(Double));
        assert!(!table.register(Double));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_info_and_header() {
        let add = ProcedureInfo::of::<Add>();
        assert_eq!(add.params, vec!["i32", "i32"]);
        assert_eq!(add.returns, "i32");
        assert_eq!(add.header().unwrap().arg_sizes, vec![4, 4]);

        let sum3 = ProcedureInfo::of::<Sum3>();
        assert_eq!(sum3.header().unwrap().block_len(), 12);

        // Strings have no fixed width.
        assert!(ProcedureInfo::of::<Greet>().header().is_none());
    }

    #[test]
    fn test_builtin_table_is_sorted() {
        let names: Vec<_> = builtin_table().infos().into_iter().map(|i| i.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(names.contains(&"double".to_string()));
    }
}
