//! Wire codec for primitive values
//!
//! Every integer, float and length goes through [`encode_word`] and
//! [`decode_word`], so nothing can reach the wire in host byte order.

use tracing::trace;

use super::{TERMINATOR, WORD_SIZE};
use crate::error::{RpcError, RpcResult};
use crate::network::{read_exact, read_or_fail, write_exact, ReadOutcome, Transport};
use crate::protocol::StatusCode;

/// A value that travels as one 4-byte big-endian word
pub trait WireWord: Copy {
    fn to_word(self) -> u32;
    fn from_word(word: u32) -> Self;
}

impl WireWord for u32 {
    fn to_word(self) -> u32 {
        self
    }

    fn from_word(word: u32) -> Self {
        word
    }
}

impl WireWord for i32 {
    fn to_word(self) -> u32 {
        self as u32
    }

    fn from_word(word: u32) -> Self {
        word as i32
    }
}

// Raw bit punning: NaN payloads and -0.0 survive unchanged.
impl WireWord for f32 {
    fn to_word(self) -> u32 {
        self.to_bits()
    }

    fn from_word(word: u32) -> Self {
        f32::from_bits(word)
    }
}

/// Host value to network bytes
pub fn encode_word<W: WireWord>(value: W) -> [u8; WORD_SIZE] {
    value.to_word().to_be_bytes()
}

/// Network bytes to host value
pub fn decode_word<W: WireWord>(bytes: [u8; WORD_SIZE]) -> W {
    W::from_word(u32::from_be_bytes(bytes))
}

pub async fn read_word<W: WireWord, T: Transport + ?Sized>(conn: &mut T) -> RpcResult<W> {
    let mut buf = [0u8; WORD_SIZE];
    read_or_fail(conn, &mut buf).await?;
    Ok(decode_word(buf))
}

pub async fn write_word<W: WireWord, T: Transport + ?Sized>(conn: &mut T, value: W) -> RpcResult<()> {
    write_exact(conn, &encode_word(value)).await?;
    Ok(())
}

pub async fn read_u32<T: Transport + ?Sized>(conn: &mut T) -> RpcResult<u32> {
    let value = read_word(conn).await?;
    trace!("read u32 {}", value);
    Ok(value)
}

pub async fn write_u32<T: Transport + ?Sized>(conn: &mut T, value: u32) -> RpcResult<()> {
    trace!("writing u32 {}", value);
    write_word(conn, value).await
}

pub async fn read_i32<T: Transport + ?Sized>(conn: &mut T) -> RpcResult<i32> {
    let value = read_word(conn).await?;
    trace!("read i32 {}", value);
    Ok(value)
}

pub async fn write_i32<T: Transport + ?Sized>(conn: &mut T, value: i32) -> RpcResult<()> {
    trace!("writing i32 {}", value);
    write_word(conn, value).await
}

pub async fn read_f32<T: Transport + ?Sized>(conn: &mut T) -> RpcResult<f32> {
    let value = read_word(conn).await?;
    trace!("read f32 {}", value);
    Ok(value)
}

pub async fn write_f32<T: Transport + ?Sized>(conn: &mut T, value: f32) -> RpcResult<()> {
    trace!("writing f32 {}", value);
    write_word(conn, value).await
}

/// Read a string of `len` bytes, the last of which is its terminator.
/// The terminator itself is not checked.
pub async fn read_string<T: Transport + ?Sized>(conn: &mut T, len: usize) -> RpcResult<String> {
    let mut buf = vec![0u8; len];
    read_or_fail(conn, &mut buf).await?;
    buf.pop();

    let s = String::from_utf8(buf).map_err(|_| {
        RpcError::protocol(StatusCode::ScrambledBytes, "string is not valid UTF-8")
    })?;
    trace!("read string {:?}", s);
    Ok(s)
}

/// Write `s` followed by exactly one terminator
pub async fn write_string<T: Transport + ?Sized>(conn: &mut T, s: &str) -> RpcResult<()> {
    trace!("writing string {:?}", s);
    let mut buf = Vec::with_capacity(s.len() + 1);
    buf.extend_from_slice(s.as_bytes());
    buf.push(TERMINATOR);
    write_exact(conn, &buf).await?;
    Ok(())
}

/// Read one byte at a time until a terminator, consuming at most `limit`
/// bytes including the terminator. Returns the bytes before it.
pub async fn read_until_terminator<T: Transport + ?Sized>(
    conn: &mut T,
    limit: usize,
) -> RpcResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];

    while out.len() < limit {
        match read_exact(conn, &mut byte).await? {
            ReadOutcome::Complete if byte[0] == TERMINATOR => return Ok(out),
            ReadOutcome::Complete => out.push(byte[0]),
            ReadOutcome::TimedOut { .. } => {
                return Err(RpcError::transport(
                    StatusCode::TimedOut,
                    format!("timed out after {} bytes of an unterminated string", out.len()),
                ));
            }
            ReadOutcome::Incomplete { .. } => {
                return Err(RpcError::protocol(
                    StatusCode::NoTerminatorFound,
                    format!("stream ended after {} bytes without a terminator", out.len()),
                ));
            }
        }
    }

    Err(RpcError::protocol(
        StatusCode::NoTerminatorFound,
        format!("no terminator within {} bytes", limit),
    ))
}

/// String variant of [`read_until_terminator`], for when the length is not
/// known in advance
pub async fn read_string_until_terminator<T: Transport + ?Sized>(
    conn: &mut T,
    limit: usize,
) -> RpcResult<String> {
    let bytes = read_until_terminator(conn, limit).await?;
    String::from_utf8(bytes)
        .map_err(|_| RpcError::protocol(StatusCode::ScrambledBytes, "string is not valid UTF-8"))
}
