//! Reliability layer
//!
//! Turns the short reads a stream is allowed to deliver into exact reads,
//! and keeps zero-length reads and writes away from the transport.

use std::io;

use super::Transport;
use crate::error::{RpcError, RpcResult};
use crate::protocol::StatusCode;

/// Result of trying to fill a buffer completely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every requested byte arrived
    Complete,
    /// The transport timed out after `filled` bytes
    TimedOut { filled: usize },
    /// The stream ended after `filled` bytes
    Incomplete { filled: usize },
}

impl ReadOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            ReadOutcome::Complete => StatusCode::Success,
            ReadOutcome::TimedOut { .. } => StatusCode::TimedOut,
            ReadOutcome::Incomplete { .. } => StatusCode::IncompleteBytes,
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, ReadOutcome::Complete)
    }

    /// Bytes placed in the buffer before the read stopped
    pub fn filled(self, requested: usize) -> usize {
        match self {
            ReadOutcome::Complete => requested,
            ReadOutcome::TimedOut { filled } | ReadOutcome::Incomplete { filled } => filled,
        }
    }
}

/// Fill `buf` completely, retrying short reads
pub async fn read_exact<T: Transport + ?Sized>(
    conn: &mut T,
    buf: &mut [u8],
) -> io::Result<ReadOutcome> {
    // An empty read must not trip end-of-stream detection.
    if buf.is_empty() {
        return Ok(ReadOutcome::Complete);
    }

    let mut filled = 0;
    loop {
        let n = conn.read(&mut buf[filled..]).await?;
        filled += n;

        if filled == buf.len() {
            return Ok(ReadOutcome::Complete);
        }
        if conn.timed_out() {
            return Ok(ReadOutcome::TimedOut { filled });
        }
        if n == 0 {
            return Ok(ReadOutcome::Incomplete { filled });
        }
    }
}

/// Like [`read_exact`], but any shortfall fails the current call
pub async fn read_or_fail<T: Transport + ?Sized>(conn: &mut T, buf: &mut [u8]) -> RpcResult<()> {
    let requested = buf.len();
    let outcome = read_exact(conn, buf).await?;
    if outcome.is_complete() {
        return Ok(());
    }

    Err(RpcError::transport(
        outcome.status(),
        format!("read {} of {} bytes", outcome.filled(requested), requested),
    ))
}

/// Write all of `buf`; an empty buffer never reaches the transport
pub async fn write_exact<T: Transport + ?Sized>(conn: &mut T, buf: &[u8]) -> io::Result<()> {
    // Some transports treat a zero-length write as end-of-stream.
    if buf.is_empty() {
        return Ok(());
    }
    conn.write(buf).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::ScriptedTransport;

    #[tokio::test]
    async fn test_empty_read_never_touches_transport() {
        let mut conn = ScriptedTransport::closed();
        let mut buf = [0u8; 0];

        let outcome = read_exact(&mut conn, &mut buf).await.unwrap();

        assert_eq!(outcome, ReadOutcome::Complete);
        assert_eq!(conn.reads, 0);
        assert!(!conn.is_eof());
    }

    #[tokio::test]
    async fn test_empty_write_never_touches_transport() {
        let mut conn = ScriptedTransport::closed();

        write_exact(&mut conn, &[]).await.unwrap();

        assert_eq!(conn.writes, 0);
        assert!(conn.written.is_empty());
    }

    #[tokio::test]
    async fn test_one_byte_per_read() {
        let payload: Vec<u8> = (0..100u8).collect();
        let mut trickle = ScriptedTransport::new(&payload).chunked(1);
        let mut whole = ScriptedTransport::new(&payload);

        let mut slow = [0u8; 100];
        let mut fast = [0u8; 100];
        assert!(read_exact(&mut trickle, &mut slow).await.unwrap().is_complete());
        assert!(read_exact(&mut whole, &mut fast).await.unwrap().is_complete());

        assert_eq!(trickle.reads, 100);
        assert_eq!(whole.reads, 1);
        assert_eq!(slow, fast);
    }

    #[tokio::test]
    async fn test_stream_ends_early() {
        let mut conn = ScriptedTransport::new(&[1, 2, 3]);
        let mut buf = [0u8; 8];

        let outcome = read_exact(&mut conn, &mut buf).await.unwrap();

        assert_eq!(outcome, ReadOutcome::Incomplete { filled: 3 });
        assert_eq!(outcome.status(), StatusCode::IncompleteBytes);
        assert!(conn.is_eof());
    }

    #[tokio::test]
    async fn test_timeout_mid_read() {
        let mut conn = ScriptedTransport::new(&[9, 9]).stalling();
        let mut buf = [0u8; 4];

        let err = read_or_fail(&mut conn, &mut buf).await.unwrap_err();

        assert_eq!(err.code(), Some(StatusCode::TimedOut));
        assert!(err.poisons_connection());
    }
}
