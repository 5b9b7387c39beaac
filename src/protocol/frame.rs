//! Message framing
//!
//! A call is a sequence of frames separated by checkpoints:
//!
//! ```text
//! proxy -> stub   [u32 nameLen][name bytes, NUL-terminated]
//! stub  -> proxy  [u32 status]            existing / nonexistent / no terminator
//! proxy -> stub   [u32 argsLen][argument block]
//! stub  -> proxy  [u32 status]            good / too many / too few / scrambled
//! stub  -> proxy  [u32 resLen][result block]   (only if a result is declared)
//! ```

use bytes::Bytes;
use std::fmt;
use tracing::{debug, trace};

use super::block::{BlockDecoder, BlockEncoder, ExtractError, WireDecode, WireEncode};
use super::codec::{read_u32, read_until_terminator, write_string, write_u32};
use super::{StatusCode, TERMINATOR};
use crate::error::{RpcError, RpcResult};
use crate::network::{read_exact, read_or_fail, write_exact, ReadOutcome, Transport};

/// Synchronization points within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Status after the name frame
    Name,
    /// Status after the argument block
    Arguments,
    /// Validation of the result block by the proxy
    Result,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Checkpoint::Name => "function name",
            Checkpoint::Arguments => "arguments",
            Checkpoint::Result => "result",
        };
        f.write_str(label)
    }
}

/// Declared shape of one call: the name and the byte length of each argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionHeader {
    pub name: String,
    pub arg_sizes: Vec<u32>,
}

impl FunctionHeader {
    pub fn new(name: impl Into<String>, arg_sizes: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            arg_sizes,
        }
    }

    /// Length of the argument block these slots add up to
    pub fn block_len(&self) -> usize {
        self.arg_sizes.iter().map(|&size| size as usize).sum()
    }

    /// Compare a received block length against the declared slots
    pub fn check_block_len(&self, actual: usize) -> StatusCode {
        let expected = self.block_len();
        if actual > expected {
            StatusCode::TooManyBytes
        } else if actual < expected {
            StatusCode::TooFewBytes
        } else {
            StatusCode::GoodBytes
        }
    }
}

// Name, argument count, then one size per argument.
impl WireEncode for FunctionHeader {
    fn encode(&self, enc: &mut BlockEncoder) {
        enc.put_string(&self.name);
        enc.put_u32(self.arg_sizes.len() as u32);
        for &size in &self.arg_sizes {
            enc.put_u32(size);
        }
    }
}

impl WireDecode for FunctionHeader {
    fn decode(dec: &mut BlockDecoder<'_>) -> Result<Self, ExtractError> {
        let name = dec.extract_string()?;
        let count = dec.extract_u32()? as usize;

        // Refuse counts the block cannot possibly hold before allocating.
        let needed = count.saturating_mul(super::WORD_SIZE);
        if needed > dec.remaining() {
            return Err(ExtractError::Exhausted {
                needed,
                remaining: dec.remaining(),
            });
        }

        let mut arg_sizes = Vec::with_capacity(count);
        for _ in 0..count {
            arg_sizes.push(dec.extract_u32()?);
        }
        Ok(Self { name, arg_sizes })
    }
}

/// What the stub found where a name frame should be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFrame {
    Name(String),
    /// The frame was read in full but its last byte is not a terminator
    Unterminated,
    /// The peer closed the stream before sending anything
    Closed,
    /// The read timed out before any byte of the frame arrived
    Idle,
}

pub async fn write_name_frame<T: Transport + ?Sized>(conn: &mut T, name: &str) -> RpcResult<()> {
    trace!("sending name frame for {}()", name);
    write_u32(conn, name.len() as u32 + 1).await?;
    write_string(conn, name).await
}

/// Read a name frame. Clean end-of-stream and an idle timeout at the frame
/// boundary are reported as states, not errors.
pub async fn read_name_frame<T: Transport + ?Sized>(conn: &mut T) -> RpcResult<NameFrame> {
    let mut len_buf = [0u8; super::WORD_SIZE];
    match read_exact(conn, &mut len_buf).await? {
        ReadOutcome::Complete => {}
        ReadOutcome::Incomplete { filled: 0 } => return Ok(NameFrame::Closed),
        ReadOutcome::TimedOut { filled: 0 } => return Ok(NameFrame::Idle),
        outcome => {
            return Err(RpcError::transport(
                outcome.status(),
                format!("name length cut short after {} bytes", outcome.filled(len_buf.len())),
            ));
        }
    }
    let len = super::codec::decode_word::<u32>(len_buf) as usize;
    if len == 0 {
        return Ok(NameFrame::Unterminated);
    }

    let name = match read_until_terminator(conn, len).await {
        Ok(name) => name,
        Err(RpcError::Protocol { code: StatusCode::NoTerminatorFound, .. }) if !conn.is_eof() => {
            return Ok(NameFrame::Unterminated);
        }
        Err(e) => return Err(e),
    };

    // A terminator before the declared end still has to be matched by one in
    // the last declared position.
    let rest = len - name.len() - 1;
    if rest > 0 {
        let mut tail = vec![0u8; rest];
        read_or_fail(conn, &mut tail).await?;
        if tail.last() != Some(&TERMINATOR) {
            return Ok(NameFrame::Unterminated);
        }
    }

    Ok(NameFrame::Name(String::from_utf8_lossy(&name).into_owned()))
}

pub async fn write_status<T: Transport + ?Sized>(conn: &mut T, code: StatusCode) -> RpcResult<()> {
    debug!("status {} sent", code);
    write_u32(conn, code.as_u32()).await
}

/// Read a status word; values outside the taxonomy are an error
pub async fn read_status<T: Transport + ?Sized>(conn: &mut T) -> RpcResult<StatusCode> {
    let raw = read_u32(conn).await?;
    let code = StatusCode::from_u32(raw)?;
    debug!("status {} received", code);
    Ok(code)
}

/// Read a status word and fail unless it is `expected`
pub async fn expect_status<T: Transport + ?Sized>(
    conn: &mut T,
    checkpoint: Checkpoint,
    expected: StatusCode,
) -> RpcResult<()> {
    let code = read_status(conn).await?;
    if code == expected {
        Ok(())
    } else {
        Err(RpcError::Rejected { checkpoint, code })
    }
}

/// Length-prefixed block
pub async fn write_block<T: Transport + ?Sized>(conn: &mut T, block: &[u8]) -> RpcResult<()> {
    trace!("sending block of {} bytes", block.len());
    write_u32(conn, block.len() as u32).await?;
    write_exact(conn, block).await?;
    Ok(())
}

/// Read a length-prefixed block of at most `max_len` bytes
pub async fn read_block<T: Transport + ?Sized>(conn: &mut T, max_len: usize) -> RpcResult<Bytes> {
    let len = read_u32(conn).await? as usize;
    if len > max_len {
        return Err(RpcError::Oversize { len, max: max_len });
    }

    let mut block = vec![0u8; len];
    read_or_fail(conn, &mut block).await?;
    trace!("received block of {} bytes", len);
    Ok(Bytes::from(block))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_block, encode_block};
    use crate::test_util::{name_frame, word, ScriptedTransport};

    #[test]
    fn test_header_without_arguments() {
        let header = FunctionHeader::new("ping", vec![]);
        let block = encode_block(&header);
        let back: FunctionHeader = decode_block(&block).unwrap();

        assert_eq!(back.name, "ping");
        assert!(back.arg_sizes.is_empty());
    }

    #[test]
    fn test_header_layout() {
        let header = FunctionHeader::new("add", vec![4, 4]);
        let block = encode_block(&header);

        let mut expected = b"add\0".to_vec();
        expected.extend_from_slice(&word(2));
        expected.extend_from_slice(&word(4));
        expected.extend_from_slice(&word(4));
        assert_eq!(&block[..], &expected[..]);
        assert_eq!(header.block_len(), 8);
    }

    #[test]
    fn test_header_with_absurd_count() {
        let mut block = b"x\0".to_vec();
        block.extend_from_slice(&word(u32::MAX));
        let err = decode_block::<FunctionHeader>(&block).unwrap_err();
        assert_eq!(err.status(), StatusCode::TooFewBytes);
    }

    #[test]
    fn test_block_length_check() {
        let header = FunctionHeader::new("double", vec![4]);
        assert_eq!(header.check_block_len(2), StatusCode::TooFewBytes);
        assert_eq!(header.check_block_len(4), StatusCode::GoodBytes);
        assert_eq!(header.check_block_len(6), StatusCode::TooManyBytes);
    }

    #[tokio::test]
    async fn test_name_frame_roundtrip() {
        let mut out = ScriptedTransport::closed();
        write_name_frame(&mut out, "double").await.unwrap();
        assert_eq!(out.written, name_frame("double"));

        let mut conn = ScriptedTransport::new(&out.written);
        let frame = read_name_frame(&mut conn).await.unwrap();
        assert_eq!(frame, NameFrame::Name("double".to_string()));
    }

    #[tokio::test]
    async fn test_name_frame_missing_terminator() {
        let mut bytes = word(3).to_vec();
        bytes.extend_from_slice(b"abc");
        bytes.extend_from_slice(&name_frame("next"));
        let mut conn = ScriptedTransport::new(&bytes);

        assert_eq!(read_name_frame(&mut conn).await.unwrap(), NameFrame::Unterminated);
        // Exactly the declared bytes were consumed; the next frame is intact.
        assert_eq!(
            read_name_frame(&mut conn).await.unwrap(),
            NameFrame::Name("next".to_string())
        );
    }

    #[tokio::test]
    async fn test_name_frame_early_terminator() {
        let mut bytes = word(6).to_vec();
        bytes.extend_from_slice(b"ab\0cd\0");
        let mut conn = ScriptedTransport::new(&bytes);

        assert_eq!(
            read_name_frame(&mut conn).await.unwrap(),
            NameFrame::Name("ab".to_string())
        );
    }

    #[tokio::test]
    async fn test_name_frame_at_eof() {
        let mut conn = ScriptedTransport::closed();
        assert_eq!(read_name_frame(&mut conn).await.unwrap(), NameFrame::Closed);

        let mut idle = ScriptedTransport::closed().stalling();
        assert_eq!(read_name_frame(&mut idle).await.unwrap(), NameFrame::Idle);
    }

    #[tokio::test]
    async fn test_name_frame_truncated_name() {
        let mut bytes = word(10).to_vec();
        bytes.extend_from_slice(b"dou");
        let mut conn = ScriptedTransport::new(&bytes);

        let err = read_name_frame(&mut conn).await.unwrap_err();
        assert_eq!(err.code(), Some(StatusCode::NoTerminatorFound));
    }

    #[tokio::test]
    async fn test_unknown_status_word() {
        let mut conn = ScriptedTransport::new(&word(1234));
        let err = read_status(&mut conn).await.unwrap_err();
        assert!(err.to_string().contains("unknown code 1234"));
    }

    #[tokio::test]
    async fn test_expect_status_rejection() {
        let mut conn = ScriptedTransport::new(&word(StatusCode::NonexistentFunction.as_u32()));
        let err = expect_status(&mut conn, Checkpoint::Name, StatusCode::ExistingFunction)
            .await
            .unwrap_err();

        match err {
            RpcError::Rejected { checkpoint, code } => {
                assert_eq!(checkpoint, Checkpoint::Name);
                assert_eq!(code, StatusCode::NonexistentFunction);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_block_writes_only_length() {
        let mut conn = ScriptedTransport::closed();
        write_block(&mut conn, &[]).await.unwrap();

        assert_eq!(conn.written, word(0));
        assert_eq!(conn.writes, 1);
    }

    #[tokio::test]
    async fn test_oversize_block_refused() {
        let mut conn = ScriptedTransport::new(&word(1 << 20));
        let err = read_block(&mut conn, 1024).await.unwrap_err();
        assert!(matches!(err, RpcError::Oversize { len, max: 1024 } if len == 1 << 20));
    }
}
