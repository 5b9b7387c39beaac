//! rpclink Server
//!
//! The server accepts connections and runs one dispatcher per connection,
//! each in its own task. Calls on one connection are served in order;
//! different connections never share stream state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::connection::Connection;
use super::NetworkConfig;
use crate::rpc::{Dispatcher, FunctionTable, SessionSummary};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Events emitted by the server
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// Server started
    Started { bind_addr: SocketAddr },
    /// A new client has connected
    ClientConnected { session: Uuid, addr: SocketAddr },
    /// A client session has ended
    ClientDisconnected {
        session: Uuid,
        addr: SocketAddr,
        summary: SessionSummary,
        reason: String,
    },
    /// Server stopped
    Stopped,
    /// Error occurred
    Error { message: String },
}

/// Information about a connected client
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session: Uuid,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

type Sessions = Arc<RwLock<HashMap<Uuid, SessionInfo>>>;

/// rpclink Server
pub struct Server {
    /// Server configuration
    config: NetworkConfig,
    /// Procedures served to every client
    table: Arc<FunctionTable>,
    /// Connected clients
    sessions: Sessions,
    /// Event sender
    event_tx: mpsc::Sender<ServerEvent>,
    /// Event receiver (for consumers)
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Whether the server is running
    running: Arc<RwLock<bool>>,
}

impl Server {
    /// Create a new server
    pub fn new(config: NetworkConfig, table: Arc<FunctionTable>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);

        Self {
            config,
            table,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            event_rx: Some(event_rx),
            shutdown_tx: None,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Start the server and return the address it is listening on
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        {
            let running = self.running.read().await;
            if *running {
                return Err(ServerError::AlreadyRunning);
            }
        }

        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Server listening on {} with {} procedures",
            local_addr,
            self.table.len()
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        {
            let mut running = self.running.write().await;
            *running = true;
        }

        let _ = self
            .event_tx
            .send(ServerEvent::Started { bind_addr: local_addr })
            .await;

        let sessions = self.sessions.clone();
        let event_tx = self.event_tx.clone();
        let table = self.table.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        // Spawn the accept loop
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::info!("New connection from {}", addr);

                                let sessions = sessions.clone();
                                let event_tx = event_tx.clone();
                                let table = table.clone();
                                let config = config.clone();

                                tokio::spawn(async move {
                                    handle_client(stream, addr, table, &config, sessions, event_tx).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                let _ = event_tx.send(ServerEvent::Error {
                                    message: e.to_string(),
                                }).await;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Server shutdown requested");
                        break;
                    }
                }
            }

            let mut running = running.write().await;
            *running = false;

            let _ = event_tx.send(ServerEvent::Stopped).await;
        });

        Ok(local_addr)
    }

    /// Stop accepting connections. Sessions already open run to completion.
    pub async fn stop(&mut self) -> ServerResult<()> {
        {
            let running = self.running.read().await;
            if !*running {
                return Err(ServerError::NotRunning);
            }
        }

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        Ok(())
    }

    /// Get a list of connected clients
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.values().cloned().collect()
    }

    /// Check if the server is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

/// Serve one client until it disconnects or its stream is corrupted
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    table: Arc<FunctionTable>,
    config: &NetworkConfig,
    sessions: Sessions,
    event_tx: mpsc::Sender<ServerEvent>,
) {
    let session = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session, peer = %addr);

    {
        let mut sessions = sessions.write().await;
        sessions.insert(
            session,
            SessionInfo {
                session,
                addr,
                connected_at: Instant::now(),
            },
        );
    }

    let _ = event_tx
        .send(ServerEvent::ClientConnected { session, addr })
        .await;

    let mut conn = Connection::from_tcp(stream, addr).with_read_timeout(config.read_timeout());
    let dispatcher = Dispatcher::new(table)
        .with_max_block_size(config.max_block_size)
        .with_span(span.clone());

    let (summary, reason) = match dispatcher.run(&mut conn).await {
        Ok(summary) => (summary, "Connection closed".to_string()),
        Err(e) => {
            conn.mark_unusable();
            (SessionSummary::default(), format!("Error: {}", e))
        }
    };

    {
        let _guard = span.enter();
        tracing::info!(
            "Session ended after {} calls ({} unknown, {} failed): {}",
            summary.completed,
            summary.unknown,
            summary.failed,
            reason
        );
    }

    {
        let mut sessions = sessions.write().await;
        sessions.remove(&session);
    }

    let _ = event_tx
        .send(ServerEvent::ClientDisconnected {
            session,
            addr,
            summary,
            reason,
        })
        .await;

    let _ = conn.shutdown().await;
}
