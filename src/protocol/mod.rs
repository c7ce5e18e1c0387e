//! Reply Protocol Implementation
//!
//! This module implements the client side of the line-oriented, type-tagged
//! reply protocol spoken by FlashKV and other Redis-protocol servers.
//!
//! ## Modules
//!
//! - `types`: Reply kinds, borrowed [`Reply`] values and [`OwnedReply`]
//! - `buffer`: The growable receive buffer and CRLF line extraction
//! - `decoder`: The five reply decoding routines
//!
//! ## Example
//!
//! ```
//! use flashkv_client::protocol::{decode_reply, OwnedReply, ReplyKind};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
//! let reply = decode_reply(data, ReplyKind::MultiBulk).unwrap();
//! assert_eq!(
//!     reply,
//!     OwnedReply::MultiBulk(Some(vec![Some(Bytes::from("foo")), Some(Bytes::from("bar"))]))
//! );
//! ```

pub mod buffer;
pub mod decoder;
pub mod types;

// Re-export commonly used types for convenience
pub use buffer::{ReceiveBuffer, DEFAULT_BUFFER_SIZE, MAX_REPLY_SIZE};
pub use decoder::{decode_reply, legacy_integer, MultiBulkTable, MULTI_BULK_INCREMENT};
pub use types::{prefix, MultiBulk, OwnedReply, Reply, ReplyKind, CRLF};
