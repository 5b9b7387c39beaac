//! In-memory transport with a fixed script of incoming bytes

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;

use crate::network::Transport;

/// Delivers a canned byte sequence and records everything written to it
pub struct ScriptedTransport {
    incoming: VecDeque<u8>,
    chunk: usize,
    stall_at_end: bool,
    eof: bool,
    timed_out: bool,
    pub written: Vec<u8>,
    pub reads: usize,
    pub writes: usize,
}

impl ScriptedTransport {
    pub fn new(incoming: &[u8]) -> Self {
        Self {
            incoming: incoming.iter().copied().collect(),
            chunk: usize::MAX,
            stall_at_end: false,
            eof: false,
            timed_out: false,
            written: Vec::new(),
            reads: 0,
            writes: 0,
        }
    }

    /// A transport whose peer has nothing to say
    pub fn closed() -> Self {
        Self::new(&[])
    }

    /// Deliver at most `chunk` bytes per read
    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Time out instead of reporting end-of-stream once the script runs dry
    pub fn stalling(mut self) -> Self {
        self.stall_at_end = true;
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        self.timed_out = false;

        if self.incoming.is_empty() {
            if self.stall_at_end {
                self.timed_out = true;
            } else {
                self.eof = true;
            }
            return Ok(0);
        }

        let n = buf.len().min(self.chunk).min(self.incoming.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.incoming.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writes += 1;
        self.written.extend_from_slice(buf);
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn timed_out(&self) -> bool {
        self.timed_out
    }
}

/// Big-endian word, for building expected wire bytes by hand
pub fn word(value: u32) -> [u8; 4] {
    value.to_be_bytes()
}

/// A complete name frame: length word plus NUL-terminated name
pub fn name_frame(name: &str) -> Vec<u8> {
    let mut out = word(name.len() as u32 + 1).to_vec();
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out
}
