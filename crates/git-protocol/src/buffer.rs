//! Growable receive buffer for the smart protocol engine.
//!
//! Grounded on libgit2's `gitno_buffer` (`original_source/src/transport.h`'s
//! companion `smart_protocol.c` draws on the same pattern): a single `Vec<u8>`
//! that accumulates raw subtransport bytes, an `offset` marking how much of
//! it has already been consumed by a completed pkt-line, and a `fill` that
//! pulls more bytes from a reader on demand. Parsers never block on partial
//! reads themselves — they report `PktError::BufferShort` and the caller
//! fills more data and retries, mirroring `GIT_EBUFS`.

use std::io::Read;

use crate::ProtocolError;

/// Hard cap on pending (unconsumed) bytes. A single pkt-line frame is at
/// most 65524 bytes, so a well-behaved peer never needs more than a couple
/// of those pending at once; this bounds how much a misbehaving or hostile
/// peer that never sends a complete frame can force the buffer to grow to.
const MAX_PENDING_BYTES: usize = 16 * 1024 * 1024;

/// A growable buffer of bytes read from a subtransport stream, with a
/// consumed/unconsumed split tracked by `offset`.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unconsumed portion of the buffer.
    pub fn pending(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Mark `n` bytes of the pending region as consumed. Once the whole
    /// buffer has been consumed, reclaim the storage so it doesn't grow
    /// unbounded across a long-running fetch.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.pending().len(), "consume past end of buffer");
        self.offset += n;
        if self.offset == self.data.len() {
            self.data.clear();
            self.offset = 0;
        } else if self.offset > 64 * 1024 {
            // Compact rather than let fully-consumed prefix bytes accumulate
            // forever on a subtransport that never hits the exact-length case.
            self.data.drain(..self.offset);
            self.offset = 0;
        }
    }

    /// Read at least one more chunk from `reader` and append it to the
    /// buffer. Returns the number of bytes read (0 means EOF).
    pub fn fill(&mut self, reader: &mut impl Read) -> Result<usize, ProtocolError> {
        if self.pending().len() >= MAX_PENDING_BYTES {
            return Err(ProtocolError::OutOfMemory);
        }
        let mut chunk = [0u8; 8192];
        let n = reader.read(&mut chunk)?;
        self.data.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Keep filling from `reader` until at least `min_len` pending bytes are
    /// available, or EOF. Returns an error if EOF is hit before `min_len` is
    /// reached.
    pub fn fill_at_least(&mut self, reader: &mut impl Read, min_len: usize) -> Result<(), ProtocolError> {
        while self.pending().len() < min_len {
            if self.fill(reader)? == 0 {
                return Err(ProtocolError::Protocol(
                    "unexpected EOF while filling receive buffer".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fill_appends_and_pending_reflects_offset() {
        let mut buf = RecvBuffer::new();
        let mut src = Cursor::new(b"hello world".to_vec());
        buf.fill(&mut src).unwrap();
        assert_eq!(buf.pending(), b"hello world");
        buf.consume(6);
        assert_eq!(buf.pending(), b"world");
    }

    #[test]
    fn full_consume_reclaims_storage() {
        let mut buf = RecvBuffer::new();
        let mut src = Cursor::new(b"abc".to_vec());
        buf.fill(&mut src).unwrap();
        buf.consume(3);
        assert!(buf.is_empty());
        assert_eq!(buf.pending().len(), 0);
    }

    #[test]
    fn fill_at_least_accumulates_across_multiple_reads() {
        struct Chunky(Vec<&'static [u8]>);
        impl Read for Chunky {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let chunk = self.0.remove(0);
                buf[..chunk.len()].copy_from_slice(chunk);
                Ok(chunk.len())
            }
        }
        let mut reader = Chunky(vec![b"ab", b"cd", b"ef"]);
        let mut buf = RecvBuffer::new();
        buf.fill_at_least(&mut reader, 5).unwrap();
        assert_eq!(buf.pending(), b"abcdef");
    }

    #[test]
    fn fill_at_least_errors_on_premature_eof() {
        let mut buf = RecvBuffer::new();
        let mut src = Cursor::new(b"ab".to_vec());
        let err = buf.fill_at_least(&mut src, 10).unwrap_err();
        assert!(matches!(err, ProtocolError::Protocol(_)));
    }

    #[test]
    fn fill_rejects_growth_past_the_pending_cap() {
        struct Endless;
        impl Read for Endless {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                buf.fill(0);
                Ok(buf.len())
            }
        }
        let mut buf = RecvBuffer::new();
        let mut reader = Endless;
        let err = loop {
            match buf.fill(&mut reader) {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ProtocolError::OutOfMemory));
    }
}
