//! Reply Decoder
//!
//! Reads one reply from the receive buffer, dispatching on its type tag to
//! one of five decoding routines.
//!
//! ## How the Decoder Works
//!
//! ```text
//!  read_line ──> tag ──┬── '-' ──> Err(ProtocolError::Server(message))
//!                      ├── '+' ──> Status(span)
//!                      ├── ':' ──> Integer(legacy_integer(line))
//!                      ├── '$' ──> length ──> read_line(length) ──> Bulk(span)
//!                      └── '*' ──> count ──> count × ('$' header + payload)
//! ```
//!
//! The decoder never copies payload bytes: it records spans into the receive
//! buffer (and, for multi-bulk replies, into the connection's reusable
//! [`MultiBulkTable`]). [`Decoded::resolve`] turns those spans into a
//! borrowed [`Reply`] once decoding is finished.
//!
//! The error tag is accepted whatever the caller expected. Any other tag
//! that differs from the expected kind is a protocol error.

use crate::connection::{Received, Transport};
use crate::error::{ClientError, ProtocolError, Result};
use crate::protocol::buffer::{ReceiveBuffer, MAX_REPLY_SIZE};
use crate::protocol::types::{prefix, MultiBulk, OwnedReply, Reply, ReplyKind, Span};
use std::io;
use std::time::Duration;
use tracing::{trace, warn};

/// Multi-bulk table capacity grows in steps of this many slots
pub const MULTI_BULK_INCREMENT: usize = 64;

/// Smallest possible multi-bulk element on the wire (`$-1\r\n`)
const MIN_ELEMENT_SIZE: usize = 5;

/// Table memory taken by one multi-bulk element
const SLOT_SIZE: usize = std::mem::size_of::<Option<Span>>();

/// Reusable table of multi-bulk element spans.
///
/// Owned by the connection and overwritten by every multi-bulk reply. The
/// element count can be smaller than the table capacity.
#[derive(Debug)]
pub struct MultiBulkTable {
    slots: Vec<Option<Span>>,
    len: usize,
    null: bool,
    growths: usize,
}

impl MultiBulkTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MULTI_BULK_INCREMENT],
            len: 0,
            null: false,
            growths: 0,
        }
    }

    /// Number of slots available without growing.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of elements in the last decoded multi-bulk reply.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// How many times the table has grown since it was created.
    pub fn growths(&self) -> usize {
        self.growths
    }

    /// Prepares the table for a reply of `count` elements.
    ///
    /// Grows once, to the next multiple of [`MULTI_BULK_INCREMENT`] above
    /// `count`, when the capacity is too small.
    fn begin(&mut self, count: usize) {
        if count > self.slots.len() {
            let capacity = (count / MULTI_BULK_INCREMENT + 1) * MULTI_BULK_INCREMENT;
            self.slots.resize(capacity, None);
            self.growths += 1;
            trace!(count, capacity, "Multi-bulk table grown");
        }
        self.len = 0;
        self.null = false;
    }

    fn begin_null(&mut self) {
        self.len = 0;
        self.null = true;
    }

    fn push(&mut self, item: Option<Span>) {
        self.slots[self.len] = item;
        self.len += 1;
    }

    fn items(&self) -> &[Option<Span>] {
        &self.slots[..self.len]
    }
}

impl Default for MultiBulkTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded reply expressed as spans into the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoded {
    Status(Span),
    Integer(i64),
    Bulk(Option<Span>),
    /// Elements live in the [`MultiBulkTable`]
    MultiBulk,
}

impl Decoded {
    /// Borrows the decoded data out of the buffer and table it was decoded into.
    pub(crate) fn resolve<'a>(
        self,
        buffer: &'a ReceiveBuffer,
        table: &'a MultiBulkTable,
    ) -> Result<Reply<'a>> {
        Ok(match self {
            Decoded::Status(span) => Reply::Status(buffer.slice(span)),
            Decoded::Integer(n) => Reply::Integer(n),
            Decoded::Bulk(span) => Reply::Bulk(span.map(|span| buffer.slice(span))),
            Decoded::MultiBulk => {
                Reply::MultiBulk(MultiBulk::new(buffer.as_slice(), table.items(), table.null))
            }
        })
    }
}

/// Drives one reply decode over a receive buffer, refilling it from the
/// transport as needed.
pub(crate) struct ReplyDecoder<'c, T: ?Sized> {
    buffer: &'c mut ReceiveBuffer,
    table: &'c mut MultiBulkTable,
    transport: &'c mut T,
    timeout: Duration,
    max_size: usize,
}

impl<'c, T: Transport + ?Sized> ReplyDecoder<'c, T> {
    pub(crate) fn new(
        buffer: &'c mut ReceiveBuffer,
        table: &'c mut MultiBulkTable,
        transport: &'c mut T,
        timeout: Duration,
    ) -> Self {
        let max_size = buffer.max_size();
        Self {
            buffer,
            table,
            transport,
            timeout,
            max_size,
        }
    }

    /// Decodes exactly one reply of the `expected` kind.
    pub(crate) fn decode(&mut self, expected: ReplyKind) -> Result<Decoded> {
        let header = self.read_line(0)?;
        let line = self.buffer.slice(header);

        let tag = *line.first().ok_or(ProtocolError::EmptyLine)?;
        let kind = ReplyKind::from_tag(tag).ok_or(ProtocolError::UnknownTag(tag))?;
        trace!(tag = %kind, len = header.len, "Decoding reply");

        if kind != expected && kind != ReplyKind::Error {
            warn!(%expected, found = %kind, "Unexpected reply type");
            return Err(ProtocolError::UnexpectedType {
                expected,
                found: kind,
            }
            .into());
        }

        let rest = Span::new(header.start + 1, header.len - 1);
        match kind {
            ReplyKind::Error => Err(self.decode_error(rest)),
            ReplyKind::Status => Ok(Decoded::Status(rest)),
            ReplyKind::Integer => Ok(Decoded::Integer(legacy_integer(self.buffer.slice(rest)))),
            ReplyKind::Bulk => self.decode_bulk(rest),
            ReplyKind::MultiBulk => self.decode_multi_bulk(rest),
        }
    }

    /// `-<message>`: decoding succeeds, the outcome is a protocol error.
    fn decode_error(&self, rest: Span) -> ClientError {
        let message = String::from_utf8_lossy(self.buffer.slice(rest)).into_owned();
        warn!(message = %message, "Server replied with an error");
        ProtocolError::Server(message).into()
    }

    /// `$<length>\r\n<payload>\r\n`, or `$-1\r\n` for null.
    fn decode_bulk(&mut self, rest: Span) -> Result<Decoded> {
        let length = parse_length(self.buffer.slice(rest))?;
        match length {
            None => Ok(Decoded::Bulk(None)),
            Some(length) => Ok(Decoded::Bulk(Some(self.read_payload(length)?))),
        }
    }

    /// `*<count>\r\n` followed by `count` bulk sub-replies.
    fn decode_multi_bulk(&mut self, rest: Span) -> Result<Decoded> {
        let count = match parse_length(self.buffer.slice(rest))? {
            Some(count) => count,
            None => {
                self.table.begin_null();
                return Ok(Decoded::MultiBulk);
            }
        };

        // Bound both the bytes the elements need on the wire and the table
        // slots they need, before any slot is allocated
        let min_size = count.saturating_mul(MIN_ELEMENT_SIZE.max(SLOT_SIZE));
        if min_size > self.max_size {
            return Err(ProtocolError::ReplyTooLarge {
                size: min_size,
                max: self.max_size,
            }
            .into());
        }

        self.table.begin(count);
        for _ in 0..count {
            let header = self.read_line(0)?;
            let line = self.buffer.slice(header);

            let tag = *line.first().ok_or(ProtocolError::EmptyLine)?;
            if tag != prefix::BULK {
                return Err(ProtocolError::UnexpectedElement(tag).into());
            }

            let element = Span::new(header.start + 1, header.len - 1);
            let item = match parse_length(self.buffer.slice(element))? {
                None => None,
                Some(length) => Some(self.read_payload(length)?),
            };
            self.table.push(item);
        }

        trace!(count = self.table.len(), "Decoded multi-bulk reply");
        Ok(Decoded::MultiBulk)
    }

    /// Reads exactly `length` payload bytes followed by CRLF.
    fn read_payload(&mut self, length: usize) -> Result<Span> {
        if length > self.max_size {
            return Err(ProtocolError::ReplyTooLarge {
                size: length,
                max: self.max_size,
            }
            .into());
        }

        let span = self.read_line(length)?;
        if span.len != length {
            return Err(ProtocolError::BulkLengthMismatch {
                expected: length,
                actual: span.len,
            }
            .into());
        }
        Ok(span)
    }

    fn read_line(&mut self, start_offset: usize) -> Result<Span> {
        self.buffer
            .read_line(start_offset, &mut *self.transport, self.timeout)
    }
}

/// Parses a bulk length or multi-bulk count. `-1` is the null sentinel.
fn parse_length(line: &[u8]) -> std::result::Result<Option<usize>, ProtocolError> {
    let invalid = || ProtocolError::InvalidLength(String::from_utf8_lossy(line).into_owned());

    let n: i64 = std::str::from_utf8(line)
        .map_err(|_| invalid())?
        .parse()
        .map_err(|_| invalid())?;

    match n {
        -1 => Ok(None),
        n => usize::try_from(n).map(Some).map_err(|_| invalid()),
    }
}

/// Converts an integer reply the way the legacy protocol clients did:
/// leading whitespace, an optional sign, then as many digits as follow.
/// Text without digits yields 0 and out-of-range values saturate.
///
/// Every integer reply goes through here, so tightening this to a strict
/// parse is a one-function change.
pub fn legacy_integer(line: &[u8]) -> i64 {
    let mut bytes = line
        .iter()
        .copied()
        .skip_while(u8::is_ascii_whitespace)
        .peekable();

    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for digit in bytes.take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = value
            .checked_mul(10)
            .and_then(|v| {
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            })
            .unwrap_or(if negative { i64::MIN } else { i64::MAX });
    }
    value
}

/// In-memory transport over a byte slice. Reports EOF once it is drained.
struct SliceTransport<'a> {
    data: &'a [u8],
}

impl Transport for SliceTransport<'_> {
    fn send(&mut self, data: &[u8], _timeout: Duration) -> io::Result<usize> {
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<Received> {
        if self.data.is_empty() {
            return Ok(Received::Closed);
        }
        let n = self.data.len().min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(Received::Data(n))
    }
}

/// Decodes one reply of the `expected` kind from raw bytes.
///
/// Convenience for decoding captured traffic. Input that ends before the
/// reply is complete yields [`ClientError::PeerClosed`].
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::{decode_reply, OwnedReply, ReplyKind};
///
/// let reply = decode_reply(b":7\r\n", ReplyKind::Integer).unwrap();
/// assert_eq!(reply, OwnedReply::Integer(7));
/// ```
pub fn decode_reply(input: &[u8], expected: ReplyKind) -> Result<OwnedReply> {
    let mut transport = SliceTransport { data: input };
    let mut buffer = ReceiveBuffer::new(input.len().max(1), MAX_REPLY_SIZE);
    let mut table = MultiBulkTable::new();

    let decoded = ReplyDecoder::new(
        &mut buffer,
        &mut table,
        &mut transport,
        Duration::ZERO,
    )
    .decode(expected)?;

    Ok(decoded.resolve(&buffer, &table)?.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::{ScriptedTransport, Step};
    use bytes::Bytes;

    const TIMEOUT: Duration = Duration::from_millis(100);

    struct Harness {
        transport: ScriptedTransport,
        buffer: ReceiveBuffer,
        table: MultiBulkTable,
    }

    impl Harness {
        fn new(transport: ScriptedTransport) -> Self {
            Self {
                transport,
                buffer: ReceiveBuffer::default(),
                table: MultiBulkTable::new(),
            }
        }

        fn decode(&mut self, expected: ReplyKind) -> Result<OwnedReply> {
            let decoded = ReplyDecoder::new(
                &mut self.buffer,
                &mut self.table,
                &mut self.transport,
                TIMEOUT,
            )
            .decode(expected)?;
            Ok(decoded.resolve(&self.buffer, &self.table)?.into_owned())
        }
    }

    fn decode_chunks(chunks: &[&[u8]], expected: ReplyKind) -> Result<OwnedReply> {
        Harness::new(ScriptedTransport::chunks(chunks.iter().copied())).decode(expected)
    }

    fn bulk(s: &str) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn test_status() {
        let reply = decode_reply(b"+OK\r\n", ReplyKind::Status).unwrap();
        assert_eq!(reply, OwnedReply::Status(Bytes::from("OK")));
    }

    #[test]
    fn test_integer() {
        assert_eq!(
            decode_reply(b":7\r\n", ReplyKind::Integer).unwrap(),
            OwnedReply::Integer(7)
        );
        assert_eq!(
            decode_reply(b":-42\r\n", ReplyKind::Integer).unwrap(),
            OwnedReply::Integer(-42)
        );
    }

    #[test]
    fn test_integer_falls_back_on_garbage() {
        assert_eq!(
            decode_reply(b":not_a_number\r\n", ReplyKind::Integer).unwrap(),
            OwnedReply::Integer(0)
        );
    }

    #[test]
    fn test_legacy_integer() {
        assert_eq!(legacy_integer(b"123"), 123);
        assert_eq!(legacy_integer(b"  -17"), -17);
        assert_eq!(legacy_integer(b"+5"), 5);
        assert_eq!(legacy_integer(b"12abc"), 12);
        assert_eq!(legacy_integer(b"abc"), 0);
        assert_eq!(legacy_integer(b""), 0);
        assert_eq!(legacy_integer(b"-"), 0);
        assert_eq!(legacy_integer(b"99999999999999999999"), i64::MAX);
        assert_eq!(legacy_integer(b"-99999999999999999999"), i64::MIN);
        assert_eq!(legacy_integer(b"-9223372036854775808"), i64::MIN);
    }

    #[test]
    fn test_bulk() {
        let reply = decode_reply(b"$5\r\nhello\r\n", ReplyKind::Bulk).unwrap();
        assert_eq!(reply, OwnedReply::Bulk(bulk("hello")));
    }

    #[test]
    fn test_empty_bulk() {
        let reply = decode_reply(b"$0\r\n\r\n", ReplyKind::Bulk).unwrap();
        assert_eq!(reply, OwnedReply::Bulk(bulk("")));
    }

    #[test]
    fn test_null_bulk_reads_nothing_further() {
        let mut harness = Harness::new(ScriptedTransport::chunks([&b"$-1\r\n"[..]]));
        let reply = harness.decode(ReplyKind::Bulk).unwrap();

        assert_eq!(reply, OwnedReply::Bulk(None));
        assert!(harness.buffer.is_consumed());
        assert_eq!(harness.transport.receive_calls, 1);
    }

    #[test]
    fn test_bulk_with_embedded_crlf() {
        let reply = decode_reply(b"$8\r\nab\r\ncd\r\n\r\n", ReplyKind::Bulk).unwrap();
        assert_eq!(reply, OwnedReply::Bulk(bulk("ab\r\ncd\r\n")));
    }

    #[test]
    fn test_binary_safe_bulk() {
        let reply = decode_reply(b"$5\r\nhel\x00o\r\n", ReplyKind::Bulk).unwrap();
        assert_eq!(reply, OwnedReply::Bulk(Some(Bytes::from(&b"hel\x00o"[..]))));
    }

    #[test]
    fn test_bulk_split_across_reads() {
        let reply =
            decode_chunks(&[b"$1", b"1\r\nhello", b" wor", b"ld\r", b"\n"], ReplyKind::Bulk)
                .unwrap();
        assert_eq!(reply, OwnedReply::Bulk(bulk("hello world")));
    }

    #[test]
    fn test_bulk_length_mismatch() {
        let err = decode_reply(b"$3\r\nhello\r\n", ReplyKind::Bulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::BulkLengthMismatch {
                expected: 3,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_invalid_bulk_length() {
        let err = decode_reply(b"$abc\r\n", ReplyKind::Bulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::InvalidLength(ref s)) if s == "abc"
        ));

        let err = decode_reply(b"$-2\r\n", ReplyKind::Bulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_multi_bulk() {
        let reply = decode_reply(
            b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n",
            ReplyKind::MultiBulk,
        )
        .unwrap();
        assert_eq!(
            reply,
            OwnedReply::MultiBulk(Some(vec![bulk("foo"), bulk("bar")]))
        );
    }

    #[test]
    fn test_multi_bulk_with_null_element() {
        let reply = decode_reply(
            b"*3\r\n$1\r\na\r\n$-1\r\n$1\r\nc\r\n",
            ReplyKind::MultiBulk,
        )
        .unwrap();
        assert_eq!(
            reply,
            OwnedReply::MultiBulk(Some(vec![bulk("a"), None, bulk("c")]))
        );
    }

    #[test]
    fn test_empty_multi_bulk_reads_nothing_further() {
        let mut harness = Harness::new(ScriptedTransport::chunks([&b"*0\r\n"[..]]));
        let reply = harness.decode(ReplyKind::MultiBulk).unwrap();

        assert_eq!(reply, OwnedReply::MultiBulk(Some(vec![])));
        assert_eq!(harness.transport.receive_calls, 1);
        assert_eq!(harness.table.growths(), 0);
    }

    #[test]
    fn test_null_multi_bulk() {
        let reply = decode_reply(b"*-1\r\n", ReplyKind::MultiBulk).unwrap();
        assert_eq!(reply, OwnedReply::MultiBulk(None));
    }

    #[test]
    fn test_multi_bulk_spanning_reads() {
        let reply = decode_chunks(
            &[b"*2\r\n$3\r", b"\nfoo\r\n", b"$3\r\nba", b"r\r\n"],
            ReplyKind::MultiBulk,
        )
        .unwrap();
        assert_eq!(
            reply,
            OwnedReply::MultiBulk(Some(vec![bulk("foo"), bulk("bar")]))
        );
    }

    #[test]
    fn test_multi_bulk_table_grows_once() {
        let count = 100;
        let mut wire = format!("*{}\r\n", count).into_bytes();
        for i in 0..count {
            let item = format!("item{}", i);
            wire.extend_from_slice(format!("${}\r\n{}\r\n", item.len(), item).as_bytes());
        }

        let mut harness = Harness::new(ScriptedTransport::chunks([&wire[..]]));
        assert_eq!(harness.table.capacity(), MULTI_BULK_INCREMENT);

        let reply = harness.decode(ReplyKind::MultiBulk).unwrap();
        let OwnedReply::MultiBulk(Some(items)) = reply else {
            panic!("expected multi-bulk reply");
        };

        assert_eq!(items.len(), count);
        assert_eq!(items[99], bulk("item99"));
        assert_eq!(harness.table.growths(), 1);
        assert_eq!(harness.table.capacity(), 128);
        assert_eq!(harness.table.len(), count);
    }

    #[test]
    fn test_multi_bulk_rejects_non_bulk_elements() {
        let err = decode_reply(b"*2\r\n:1\r\n:2\r\n", ReplyKind::MultiBulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::UnexpectedElement(b':'))
        ));
    }

    #[test]
    fn test_multi_bulk_truncated_by_eof() {
        let err = decode_chunks(&[b"*2\r\n$3\r\nfoo\r\n"], ReplyKind::MultiBulk).unwrap_err();
        assert!(matches!(err, ClientError::PeerClosed));
    }

    #[test]
    fn test_multi_bulk_count_too_large() {
        let err = decode_reply(b"*999999999999\r\n", ReplyKind::MultiBulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::ReplyTooLarge { .. })
        ));
    }

    #[test]
    fn test_multi_bulk_count_bounded_by_table_memory() {
        // Few enough elements for the wire bound, too many slots for the limit
        let count = MAX_REPLY_SIZE / MIN_ELEMENT_SIZE - 1;
        let header = format!("*{}\r\n", count);
        let mut harness = Harness::new(ScriptedTransport::chunks([header.as_bytes()]));

        let err = harness.decode(ReplyKind::MultiBulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::ReplyTooLarge { size, max })
                if size == count * SLOT_SIZE && max == MAX_REPLY_SIZE
        ));
        assert_eq!(harness.table.capacity(), MULTI_BULK_INCREMENT);
        assert_eq!(harness.table.growths(), 0);
    }

    #[test]
    fn test_error_reply_accepted_for_any_expected_kind() {
        for expected in [
            ReplyKind::Status,
            ReplyKind::Integer,
            ReplyKind::Bulk,
            ReplyKind::MultiBulk,
        ] {
            let err = decode_reply(b"-ERR wrong type\r\n", expected).unwrap_err();
            assert_eq!(err.server_message(), Some("ERR wrong type"));
        }
    }

    #[test]
    fn test_unexpected_type() {
        let err = decode_reply(b":1\r\n", ReplyKind::Bulk).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::UnexpectedType {
                expected: ReplyKind::Bulk,
                found: ReplyKind::Integer,
            })
        ));
    }

    #[test]
    fn test_unknown_tag_and_empty_line() {
        let err = decode_reply(b"@oops\r\n", ReplyKind::Status).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::UnknownTag(b'@'))
        ));

        let err = decode_reply(b"\r\n", ReplyKind::Status).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::EmptyLine)));
    }

    #[test]
    fn test_non_utf8_status_kept_verbatim() {
        let reply = decode_reply(b"+\xff\xfe\r\n", ReplyKind::Status).unwrap();
        assert_eq!(reply, OwnedReply::Status(Bytes::from_static(b"\xff\xfe")));
        assert_eq!(reply.serialize(), b"+\xff\xfe\r\n");
    }

    #[test]
    fn test_timeout_mid_reply() {
        let transport = ScriptedTransport::chunks([&b"$5\r\nhel"[..]]).then(Step::Timeout);
        let err = Harness::new(transport).decode(ReplyKind::Bulk).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_returned_length_excludes_terminator() {
        let mut harness = Harness::new(ScriptedTransport::chunks([&b"+PONG\r\n"[..]]));
        let decoded = ReplyDecoder::new(
            &mut harness.buffer,
            &mut harness.table,
            &mut harness.transport,
            TIMEOUT,
        )
        .decode(ReplyKind::Status)
        .unwrap();

        assert_eq!(decoded, Decoded::Status(Span::new(1, 4)));
    }
}
