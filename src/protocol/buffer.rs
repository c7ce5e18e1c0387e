//! Receive Buffer
//!
//! Holds raw reply bytes pulled from the transport and extracts
//! CRLF-terminated lines from them.
//!
//! ```text
//!  0                cursor                 filled         capacity
//!  ├── consumed ──────┼──── unconsumed ──────┼──── spare ─────┤
//! ```
//!
//! Invariant: `0 <= cursor <= filled <= capacity`.
//!
//! The buffer is reset at the start of every command cycle. Within one reply
//! it only ever grows: lines already handed out stay at their offsets, so a
//! decoded reply can borrow every element it decoded. When a line or a bulk
//! payload is not complete yet, the buffer keeps refilling from the
//! transport until it is, or until a timeout, EOF or error ends the reply.
//!
//! The whole capacity is initialized memory. It is zeroed once when the
//! buffer grows and then reused as-is by later reads and later replies, so
//! receiving a reply of `n` bytes costs `O(n)` no matter how it is split.

use crate::connection::{Received, Transport};
use crate::error::{ClientError, ProtocolError, Result};
use crate::protocol::types::Span;
use bytes::BytesMut;
use std::time::Duration;
use tracing::trace;

/// Initial buffer capacity (also the minimum size of one read)
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Largest reply the buffer will grow to hold (512 MB, same as the server's
/// bulk string limit)
pub const MAX_REPLY_SIZE: usize = 512 * 1024 * 1024;

/// A growable byte buffer with a read cursor.
#[derive(Debug)]
pub struct ReceiveBuffer {
    /// Initialized storage; `data.len()` is the capacity
    data: BytesMut,

    /// Length of the valid prefix of `data`
    filled: usize,

    /// Next unconsumed byte
    cursor: usize,

    /// Minimum free space requested from the transport per read
    chunk: usize,

    /// Upper bound on `filled`
    max_size: usize,
}

impl ReceiveBuffer {
    /// Creates a buffer with the given initial capacity and size limit.
    pub fn new(capacity: usize, max_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: BytesMut::with_capacity(capacity),
            filled: 0,
            cursor: 0,
            chunk: capacity,
            max_size: max_size.max(capacity),
        }
    }

    /// Discards all content: a fresh reply begins at offset zero.
    ///
    /// The storage is kept, stale bytes past `filled` are simply overwritten
    /// by the next read.
    pub fn reset(&mut self) {
        self.filled = 0;
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Bytes of initialized storage.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Upper bound on the filled length.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns true when every filled byte has been consumed.
    pub fn is_consumed(&self) -> bool {
        self.cursor >= self.filled
    }

    /// The filled region. Spans returned by [`read_line`](Self::read_line)
    /// index into this slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    pub(crate) fn slice(&self, span: Span) -> &[u8] {
        &self.as_slice()[span.range()]
    }

    /// Pulls one read from the transport into the spare capacity.
    ///
    /// Grows the buffer geometrically when less than one chunk is free, up
    /// to `max_size`. Only the newly added tail is zeroed. Returns the
    /// number of bytes read.
    pub fn fill<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<usize> {
        let filled = self.filled;
        if filled >= self.max_size {
            return Err(ProtocolError::ReplyTooLarge {
                size: filled,
                max: self.max_size,
            }
            .into());
        }

        if self.data.len() - filled < self.chunk {
            // Double the storage (at least one more chunk)
            let target = (self.data.len() * 2)
                .max(filled + self.chunk)
                .min(self.max_size);
            self.data.resize(target, 0);
            trace!(capacity = self.data.len(), "Receive buffer grown");
        }

        let spare = &mut self.data[filled..];
        let want = spare.len();
        let read = match transport.receive(spare, timeout) {
            Ok(Received::Data(n)) => n.min(want),
            Ok(Received::Closed) => return Err(ClientError::PeerClosed),
            Ok(Received::TimedOut) => return Err(ClientError::Timeout),
            Err(e) => return Err(ClientError::Receive(e)),
        };

        self.filled += read;
        trace!(bytes = read, filled = self.filled, "Read data");
        Ok(read)
    }

    /// Reads the next CRLF-terminated line.
    ///
    /// The terminator search starts `start_offset` bytes past the cursor, so
    /// a bulk decoder can skip a known-length payload that may itself contain
    /// CRLF. On success the cursor moves past the terminator and the returned
    /// span covers the line without it.
    pub fn read_line<T: Transport + ?Sized>(
        &mut self,
        start_offset: usize,
        transport: &mut T,
        timeout: Duration,
    ) -> Result<Span> {
        let mut from = self.cursor + start_offset;

        loop {
            let filled = self.filled;
            if filled >= from + CRLF_LEN {
                if let Some(pos) = find_crlf(&self.data[from..filled]) {
                    let end = from + pos;
                    let span = Span::new(self.cursor, end - self.cursor);
                    self.cursor = end + CRLF_LEN;
                    return Ok(span);
                }
                // A terminator may still start on the last filled byte
                from = filled - 1;
            }

            trace!(
                cursor = self.cursor,
                filled,
                "Incomplete line, need more data"
            );
            self.fill(transport, timeout)?;
        }
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, MAX_REPLY_SIZE)
    }
}

const CRLF_LEN: usize = 2;

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF_LEN).position(|w| w == b"\r\n")
}
