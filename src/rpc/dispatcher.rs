//! Server-side request loop
//!
//! One dispatcher serves one connection at a time: it reads a name frame,
//! answers the name checkpoint, and hands the rest of the call to the
//! registered stub. Calls on one connection are strictly sequential.

use std::sync::Arc;
use tracing::{debug, error, trace, warn, Instrument, Span};

use super::{CallContext, CallReport, FunctionTable};
use crate::error::RpcResult;
use crate::network::Transport;
use crate::protocol::{read_name_frame, write_status, NameFrame, StatusCode, DEFAULT_MAX_BLOCK_SIZE};

/// Where the dispatcher is within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    WaitingForName,
    NameReceived,
    ArgsReceived,
    ResultSent,
    Eof,
}

/// How one pass through the loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed { name: String, report: CallReport },
    UnknownFunction { name: String },
    /// The name frame had no terminator where one was required
    Unterminated,
    /// Timed out waiting for the next call
    Idle,
    Eof,
}

/// Tally of one connection's calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub completed: u64,
    pub unknown: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    table: Arc<FunctionTable>,
    max_block_size: usize,
    span: Span,
}

impl Dispatcher {
    pub fn new(table: Arc<FunctionTable>) -> Self {
        Self {
            table,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            span: Span::none(),
        }
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    /// Span every call served by this dispatcher is logged under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn table(&self) -> &FunctionTable {
        &self.table
    }

    /// Serve a single call, or report why there was none
    pub async fn dispatch_one(&self, conn: &mut dyn Transport) -> RpcResult<DispatchOutcome> {
        self.dispatch(conn).instrument(self.span.clone()).await
    }

    async fn dispatch(&self, conn: &mut dyn Transport) -> RpcResult<DispatchOutcome> {
        trace!("state {:?}", DispatchState::WaitingForName);
        let name = match read_name_frame(conn).await {
            Ok(NameFrame::Name(name)) => name,
            Ok(NameFrame::Closed) => {
                trace!("state {:?}", DispatchState::Eof);
                return Ok(DispatchOutcome::Eof);
            }
            Ok(NameFrame::Idle) => return Ok(DispatchOutcome::Idle),
            Ok(NameFrame::Unterminated) => {
                write_status(conn, StatusCode::NoTerminatorFound).await?;
                return Ok(DispatchOutcome::Unterminated);
            }
            Err(e) => {
                if e.code() == Some(StatusCode::NoTerminatorFound) && !conn.is_eof() {
                    let _ = write_status(conn, StatusCode::NoTerminatorFound).await;
                }
                return Err(e);
            }
        };
        trace!("state {:?}: {}()", DispatchState::NameReceived, name);

        let handler = match self.table.get(&name) {
            Some(handler) => handler,
            None => {
                debug!("no procedure named {}()", name);
                write_status(conn, StatusCode::NonexistentFunction).await?;
                return Ok(DispatchOutcome::UnknownFunction { name });
            }
        };
        write_status(conn, StatusCode::ExistingFunction).await?;

        let ctx = CallContext {
            max_block_size: self.max_block_size,
        };
        let report = handler.serve(conn, &ctx).await?;
        trace!("state {:?}: {} argument bytes", DispatchState::ArgsReceived, report.args_len);
        if let Some(len) = report.result_len {
            trace!("state {:?}: {} result bytes", DispatchState::ResultSent, len);
        }
        debug!("served {}()", name);

        Ok(DispatchOutcome::Completed { name, report })
    }

    /// Serve calls until the peer goes away or the stream is corrupted.
    ///
    /// Failed calls that leave the stream on a frame boundary are logged and
    /// the loop moves on to the next name frame.
    pub async fn run(&self, conn: &mut dyn Transport) -> RpcResult<SessionSummary> {
        let span = self.span.clone();
        self.serve_loop(conn).instrument(span).await
    }

    async fn serve_loop(&self, conn: &mut dyn Transport) -> RpcResult<SessionSummary> {
        let mut summary = SessionSummary::default();
        loop {
            match self.dispatch(conn).await {
                Ok(DispatchOutcome::Completed { .. }) => summary.completed += 1,
                Ok(DispatchOutcome::UnknownFunction { .. }) => summary.unknown += 1,
                Ok(DispatchOutcome::Unterminated) => summary.failed += 1,
                Ok(DispatchOutcome::Idle) => continue,
                Ok(DispatchOutcome::Eof) => return Ok(summary),
                Err(e) => {
                    summary.failed += 1;
                    if conn.is_eof() {
                        debug!("peer closed mid-call: {}", e);
                        return Ok(summary);
                    }
                    if e.poisons_connection() {
                        error!("Closing connection: {}", e);
                        return Err(e);
                    }
                    warn!("Call failed: {}", e);
                }
            }
        }
    }
}
