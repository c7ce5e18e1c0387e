//! Reply Types
//!
//! This module defines the reply kinds of the line-oriented, type-tagged
//! protocol and the values a decoded reply can carry.
//!
//! ## Protocol Format
//!
//! Each reply starts with a one-byte type tag:
//! - `-` Error
//! - `+` Status (inline) line
//! - `:` Integer
//! - `$` Bulk
//! - `*` Multi-bulk
//!
//! Every line is terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR wrong type\r\n`
//! Integer: `:7\r\n`
//! Bulk: `$3\r\nfoo\r\n`
//! Null bulk: `$-1\r\n`
//! Multi-bulk: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//!
//! ## Borrowed replies
//!
//! A [`Reply`] borrows its string data from the connection's receive buffer.
//! The borrow lasts until the next command is executed on that connection,
//! which the borrow checker enforces. Use [`Reply::into_owned`] to keep data
//! longer.

use bytes::Bytes;
use std::fmt;
use std::ops::Range;

/// The CRLF terminator used on every line
pub const CRLF: &[u8] = b"\r\n";

/// Reply type tags
pub mod prefix {
    pub const ERROR: u8 = b'-';
    pub const STATUS: u8 = b'+';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const MULTI_BULK: u8 = b'*';
}

/// The kind of reply a command expects, identified by its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    Error,
    Status,
    Integer,
    Bulk,
    MultiBulk,
}

impl ReplyKind {
    /// The one-byte tag that introduces this kind of reply.
    pub fn tag(self) -> u8 {
        match self {
            ReplyKind::Error => prefix::ERROR,
            ReplyKind::Status => prefix::STATUS,
            ReplyKind::Integer => prefix::INTEGER,
            ReplyKind::Bulk => prefix::BULK,
            ReplyKind::MultiBulk => prefix::MULTI_BULK,
        }
    }

    /// Maps a tag byte back to its kind.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            prefix::ERROR => Some(ReplyKind::Error),
            prefix::STATUS => Some(ReplyKind::Status),
            prefix::INTEGER => Some(ReplyKind::Integer),
            prefix::BULK => Some(ReplyKind::Bulk),
            prefix::MULTI_BULK => Some(ReplyKind::MultiBulk),
            _ => None,
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Error => "error",
            ReplyKind::Status => "status",
            ReplyKind::Integer => "integer",
            ReplyKind::Bulk => "bulk",
            ReplyKind::MultiBulk => "multi-bulk",
        };
        f.write_str(name)
    }
}

/// A region of the receive buffer: `len` bytes starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn range(self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// A decoded reply borrowing from the connection's receive buffer.
///
/// Error-tagged replies never appear here; they surface as
/// [`ProtocolError::Server`](crate::ProtocolError::Server).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply<'a> {
    /// Status line without the tag or terminator, exactly as received
    Status(&'a [u8]),

    /// Signed integer
    Integer(i64),

    /// Bulk payload, `None` for the `$-1` null value
    Bulk(Option<&'a [u8]>),

    /// Array of bulk payloads
    MultiBulk(MultiBulk<'a>),
}

impl<'a> Reply<'a> {
    /// The kind of reply this value was decoded from.
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Status(_) => ReplyKind::Status,
            Reply::Integer(_) => ReplyKind::Integer,
            Reply::Bulk(_) => ReplyKind::Bulk,
            Reply::MultiBulk(_) => ReplyKind::MultiBulk,
        }
    }

    /// The raw status line. Its bytes are not required to be UTF-8.
    pub fn as_status(&self) -> Option<&'a [u8]> {
        match self {
            Reply::Status(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The bulk payload. The outer `Option` is `None` when this is not a
    /// bulk reply, the inner one when the bulk is null.
    pub fn as_bulk(&self) -> Option<Option<&'a [u8]>> {
        match self {
            Reply::Bulk(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_multi_bulk(&self) -> Option<MultiBulk<'a>> {
        match self {
            Reply::MultiBulk(m) => Some(*m),
            _ => None,
        }
    }

    /// Copies the reply out of the receive buffer.
    pub fn into_owned(self) -> OwnedReply {
        match self {
            Reply::Status(s) => OwnedReply::Status(Bytes::copy_from_slice(s)),
            Reply::Integer(n) => OwnedReply::Integer(n),
            Reply::Bulk(b) => OwnedReply::Bulk(b.map(Bytes::copy_from_slice)),
            Reply::MultiBulk(m) => OwnedReply::MultiBulk(if m.is_null() {
                None
            } else {
                Some(m.iter().map(|b| b.map(Bytes::copy_from_slice)).collect())
            }),
        }
    }
}

/// A multi-bulk reply: a view over element spans in the receive buffer.
#[derive(Clone, Copy)]
pub struct MultiBulk<'a> {
    data: &'a [u8],
    items: &'a [Option<Span>],
    null: bool,
}

impl<'a> MultiBulk<'a> {
    pub(crate) fn new(data: &'a [u8], items: &'a [Option<Span>], null: bool) -> Self {
        Self { data, items, null }
    }

    /// Number of decoded elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True for the `*-1` null multi-bulk.
    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Element `index`: `None` when out of range, `Some(None)` for a null bulk.
    pub fn get(&self, index: usize) -> Option<Option<&'a [u8]>> {
        let data = self.data;
        self.items
            .get(index)
            .map(|item| item.map(|span| &data[span.range()]))
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'a [u8]>> + 'a {
        let data = self.data;
        self.items
            .iter()
            .map(move |item| item.map(|span| &data[span.range()]))
    }

    /// Copies every element out of the receive buffer.
    pub fn to_vec(&self) -> Vec<Option<Vec<u8>>> {
        self.iter().map(|b| b.map(<[u8]>::to_vec)).collect()
    }
}

impl PartialEq for MultiBulk<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.null == other.null && self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl fmt::Debug for MultiBulk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.null {
            return f.write_str("MultiBulk(null)");
        }
        f.debug_list()
            .entries(self.iter().map(|b| b.map(String::from_utf8_lossy)))
            .finish()
    }
}

/// A reply copied out of the receive buffer.
///
/// Also used to produce wire bytes for a reply, which scripted servers in
/// tests and benchmarks rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedReply {
    Status(Bytes),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    MultiBulk(Option<Vec<Option<Bytes>>>),
}

impl OwnedReply {
    /// Serializes the reply to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            OwnedReply::Status(s) => {
                buf.push(prefix::STATUS);
                buf.extend_from_slice(s);
                buf.extend_from_slice(CRLF);
            }
            OwnedReply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            OwnedReply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            OwnedReply::Bulk(data) => serialize_bulk(data.as_deref(), buf),
            OwnedReply::MultiBulk(None) => {
                buf.push(prefix::MULTI_BULK);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            OwnedReply::MultiBulk(Some(items)) => {
                buf.push(prefix::MULTI_BULK);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    serialize_bulk(item.as_deref(), buf);
                }
            }
        }
    }
}

fn serialize_bulk(data: Option<&[u8]>, buf: &mut Vec<u8>) {
    buf.push(prefix::BULK);
    match data {
        Some(data) => {
            buf.extend_from_slice(data.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(data);
        }
        None => buf.extend_from_slice(b"-1"),
    }
    buf.extend_from_slice(CRLF);
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: &[u8]) -> fmt::Result {
    if let Ok(s) = std::str::from_utf8(data) {
        write!(f, "\"{}\"", s)
    } else {
        write!(f, "(binary data, {} bytes)", data.len())
    }
}

impl fmt::Display for OwnedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnedReply::Status(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            OwnedReply::Error(s) => write!(f, "(error) {}", s),
            OwnedReply::Integer(n) => write!(f, "(integer) {}", n),
            OwnedReply::Bulk(Some(data)) => fmt_bulk(f, data),
            OwnedReply::Bulk(None) | OwnedReply::MultiBulk(None) => write!(f, "(nil)"),
            OwnedReply::MultiBulk(Some(items)) => {
                if items.is_empty() {
                    return write!(f, "(empty list or set)");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    match item {
                        Some(data) => fmt_bulk(f, data)?,
                        None => write!(f, "(nil)")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mapping() {
        for kind in [
            ReplyKind::Error,
            ReplyKind::Status,
            ReplyKind::Integer,
            ReplyKind::Bulk,
            ReplyKind::MultiBulk,
        ] {
            assert_eq!(ReplyKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ReplyKind::from_tag(b'@'), None);
    }

    #[test]
    fn test_multi_bulk_view() {
        let data = b"foo bar";
        let items = [Some(Span::new(0, 3)), None, Some(Span::new(4, 3))];
        let view = MultiBulk::new(data, &items, false);

        assert_eq!(view.len(), 3);
        assert_eq!(view.get(0), Some(Some(&b"foo"[..])));
        assert_eq!(view.get(1), Some(None));
        assert_eq!(view.get(3), None);
        assert_eq!(
            view.to_vec(),
            vec![Some(b"foo".to_vec()), None, Some(b"bar".to_vec())]
        );
    }

    #[test]
    fn test_into_owned() {
        let data = b"foo";
        let items = [Some(Span::new(0, 3))];
        let reply = Reply::MultiBulk(MultiBulk::new(data, &items, false));
        assert_eq!(
            reply.into_owned(),
            OwnedReply::MultiBulk(Some(vec![Some(Bytes::from("foo"))]))
        );

        let null = Reply::MultiBulk(MultiBulk::new(data, &[], true));
        assert_eq!(null.into_owned(), OwnedReply::MultiBulk(None));
    }

    #[test]
    fn test_serialize() {
        assert_eq!(OwnedReply::Status(Bytes::from("OK")).serialize(), b"+OK\r\n");
        assert_eq!(
            OwnedReply::Error("ERR wrong type".into()).serialize(),
            b"-ERR wrong type\r\n"
        );
        assert_eq!(OwnedReply::Integer(-42).serialize(), b":-42\r\n");
        assert_eq!(OwnedReply::Bulk(None).serialize(), b"$-1\r\n");
        assert_eq!(
            OwnedReply::MultiBulk(Some(vec![
                Some(Bytes::from("foo")),
                Some(Bytes::from("bar")),
            ]))
            .serialize(),
            b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(OwnedReply::Integer(7).to_string(), "(integer) 7");
        assert_eq!(OwnedReply::Bulk(None).to_string(), "(nil)");
        assert_eq!(
            OwnedReply::MultiBulk(Some(vec![Some(Bytes::from("a")), None])).to_string(),
            "1) \"a\"\n2) (nil)"
        );
        assert_eq!(
            OwnedReply::MultiBulk(Some(vec![])).to_string(),
            "(empty list or set)"
        );
    }
}
