//! Connection handling for rpclink
//!
//! Wraps a byte stream as a [`Transport`], including:
//! - Per-read timeouts
//! - End-of-stream tracking
//! - Byte and call statistics

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;

/// State of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Frames can be exchanged
    Open,
    /// A transport fault left the stream between frame boundaries
    Unusable,
    /// The connection has been shut down
    Closed,
}

/// Connection statistics
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Calls to the underlying read
    pub reads: u64,
    /// Calls to the underlying write
    pub writes: u64,
    /// Reads that gave up waiting
    pub timeouts: u64,
}

/// A byte stream to one peer
pub struct Connection<S = TcpStream> {
    /// Remote peer address, when the stream has one
    remote_addr: Option<SocketAddr>,
    /// The underlying stream
    stream: S,
    /// Upper bound on a single read
    read_timeout: Option<Duration>,
    /// The peer closed its side
    eof: bool,
    /// The last read timed out
    timed_out: bool,
    /// Connection state
    state: ConnectionState,
    /// Last activity timestamp
    last_activity: Instant,
    /// Statistics
    stats: ConnectionStats,
}

impl Connection<TcpStream> {
    /// Wrap an established TCP stream
    pub fn from_tcp(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        // Frames are small and strictly request/response.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", remote_addr, e);
        }
        let mut conn = Self::new(stream);
        conn.remote_addr = Some(remote_addr);
        conn
    }

    /// Connect to a server, giving up after `connect_timeout`
    pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> io::Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Timed out connecting to {}", addr),
                )
            })??;
        Ok(Self::from_tcp(stream, addr))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap any bidirectional stream
    pub fn new(stream: S) -> Self {
        Self {
            remote_addr: None,
            stream,
            read_timeout: None,
            eof: false,
            timed_out: false,
            state: ConnectionState::Open,
            last_activity: Instant::now(),
            stats: ConnectionStats::default(),
        }
    }

    /// Bound every read by `timeout`
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Get the remote address
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Record that the stream can no longer be trusted
    pub fn mark_unusable(&mut self) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Unusable;
        }
    }

    /// Check if another call may be attempted
    pub fn is_usable(&self) -> bool {
        self.state == ConnectionState::Open && !self.eof
    }

    /// Get time since last activity
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Shut down the write side and mark the connection closed
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.state = ConnectionState::Closed;
        self.stream.shutdown().await
    }

    /// Get the underlying stream for advanced operations
    pub fn stream_ref(&self) -> &S {
        &self.stream
    }
}

#[async_trait]
impl<S> Transport for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.timed_out = false;
        self.stats.reads += 1;

        let n = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.stream.read(buf)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.timed_out = true;
                    self.stats.timeouts += 1;
                    return Ok(0);
                }
            },
            None => self.stream.read(buf).await?,
        };

        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        self.stats.bytes_received += n as u64;
        self.last_activity = Instant::now();
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf).await?;
        self.stream.flush().await?;

        self.stats.writes += 1;
        self.stats.bytes_sent += buf.len() as u64;
        self.last_activity = Instant::now();
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }
}
