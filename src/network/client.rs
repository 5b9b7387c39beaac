//! rpclink Client
//!
//! Owns one connection to a server and runs calls on it one at a time.
//! Once a call fails in a way that leaves the stream off a frame boundary,
//! the client refuses further calls instead of reading garbage.

use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{Instrument, Span};

use super::connection::{Connection, ConnectionStats};
use super::NetworkConfig;
use crate::error::{RpcError, RpcResult};
use crate::rpc::{self, Signature};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Call failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection is unusable after an earlier transport fault")]
    Unusable,
}

pub type ClientResult<T> = Result<T, ClientError>;

/// rpclink Client
pub struct Client<S = TcpStream> {
    conn: Connection<S>,
    max_block_size: usize,
    span: Span,
}

impl Client<TcpStream> {
    /// Connect to a server by address
    pub async fn connect(server_addr: SocketAddr, config: &NetworkConfig) -> ClientResult<Self> {
        tracing::info!("Connecting to {}", server_addr);

        let conn = Connection::connect(server_addr, config.connect_timeout())
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::TimedOut => ClientError::Timeout,
                _ => ClientError::Io(e),
            })?
            .with_read_timeout(config.read_timeout());

        let mut client = Self::new(conn);
        client.max_block_size = config.max_block_size;
        Ok(client)
    }

    /// Connect to a server by hostname
    pub async fn connect_hostname(hostname: &str, config: &NetworkConfig) -> ClientResult<Self> {
        let addr = super::resolve_host(hostname, config.port).await?;
        Self::connect(addr, config).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established connection
    pub fn new(conn: Connection<S>) -> Self {
        Self {
            conn,
            max_block_size: crate::protocol::DEFAULT_MAX_BLOCK_SIZE,
            span: Span::none(),
        }
    }

    /// Span every call made by this client is logged under
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Call the remote procedure described by `Sig`
    pub async fn call<Sig: Signature>(&mut self, args: &Sig::Args) -> ClientResult<Sig::Output> {
        self.check_usable()?;
        let max = self.max_block_size;
        let result = rpc::call::<Sig, _>(&mut self.conn, args, max)
            .instrument(self.span.clone())
            .await;
        self.settle(result)
    }

    /// Call by name with an already-encoded argument block
    pub async fn call_raw(
        &mut self,
        name: &str,
        args: &[u8],
        expects_result: bool,
    ) -> ClientResult<Option<Bytes>> {
        self.check_usable()?;
        let max = self.max_block_size;
        let result = rpc::call_raw(&mut self.conn, name, args, expects_result, max)
            .instrument(self.span.clone())
            .await;
        self.settle(result)
    }

    fn check_usable(&self) -> ClientResult<()> {
        if self.conn.is_usable() {
            Ok(())
        } else {
            Err(ClientError::Unusable)
        }
    }

    fn settle<T>(&mut self, result: RpcResult<T>) -> ClientResult<T> {
        result.map_err(|e| {
            if e.poisons_connection() {
                tracing::warn!("Connection marked unusable: {}", e);
                self.conn.mark_unusable();
            }
            ClientError::Rpc(e)
        })
    }

    /// Check if another call may be attempted
    pub fn is_usable(&self) -> bool {
        self.conn.is_usable()
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.conn.stats()
    }

    /// Close the connection
    pub async fn close(mut self) -> ClientResult<()> {
        self.conn.shutdown().await?;
        Ok(())
    }
}
