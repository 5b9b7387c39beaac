//! Transport abstraction consumed by the codec
//!
//! A transport is an ordered, reliable byte stream. Reads may come back
//! short; the reliability layer in [`super::reliable`] takes care of that.

use async_trait::async_trait;
use std::io;

/// Byte stream a call runs over
#[async_trait]
pub trait Transport: Send {
    /// Read at most `buf.len()` bytes.
    /// Returns 0 at end-of-stream or when the read timed out; `is_eof` and
    /// `timed_out` tell the two apart.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// The peer closed its side of the stream
    fn is_eof(&self) -> bool;

    /// The most recent read gave up waiting
    fn timed_out(&self) -> bool;
}
