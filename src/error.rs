//! Error types for the FlashKV client.
//!
//! Every public operation returns one of these as a distinguishable outcome.
//! Nothing is retried internally; retry policy belongs to the caller.

use crate::protocol::ReplyKind;
use thiserror::Error;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while decoding a reply that arrived intact on the wire
/// but does not follow the reply grammar the command asked for.
///
/// After one of these the read position inside the connection is undefined.
/// The connection is not resynchronized, so callers should reconnect.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The server answered with an error-tagged (`-`) reply
    #[error("server error: {0}")]
    Server(String),

    /// The reply tag is neither the expected kind nor the error tag
    #[error("unexpected reply type: expected {expected}, found {found}")]
    UnexpectedType { expected: ReplyKind, found: ReplyKind },

    /// The first byte of the reply is not a known type tag
    #[error("unknown reply tag: {0:#04x}")]
    UnknownTag(u8),

    /// The reply header line was empty
    #[error("empty reply line")]
    EmptyLine,

    /// A bulk or multi-bulk length header could not be parsed
    #[error("invalid length header: {0:?}")]
    InvalidLength(String),

    /// The payload did not end where its length header said it would
    #[error("bulk length mismatch: declared {expected}, found {actual}")]
    BulkLengthMismatch { expected: usize, actual: usize },

    /// A multi-bulk element was not a bulk sub-reply
    #[error("unexpected multi-bulk element tag: {0:#04x}")]
    UnexpectedElement(u8),

    /// A status line was not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The reply would grow the receive buffer past its configured maximum
    #[error("reply too large: {size} bytes (max: {max})")]
    ReplyTooLarge { size: usize, max: usize },
}

/// Unified error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Address resolution or socket setup failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Polling or writing failed while sending a command
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Polling or reading failed while receiving a reply
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    /// Shutting the connection down failed
    #[error("close failed: {0}")]
    Close(#[source] std::io::Error),

    /// The configured deadline elapsed before the operation completed
    #[error("operation timed out")]
    Timeout,

    /// The server closed the connection (zero-length read)
    #[error("connection closed by peer")]
    PeerClosed,

    /// The reply violated the expected grammar, or was an error reply
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The formatted command does not fit in the send buffer
    #[error("command of {needed} bytes exceeds send buffer capacity of {capacity}")]
    Capacity { needed: usize, capacity: usize },

    /// A command argument cannot be expressed on the inline wire format
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// Returns true if the deadline elapsed (including a short send).
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }

    /// Returns true for any [`ProtocolError`], server error replies included.
    pub fn is_protocol(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }

    /// The message attached to an error-tagged server reply, if this is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Protocol(ProtocolError::Server(msg)) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message() {
        let err = ClientError::from(ProtocolError::Server("ERR wrong type".to_string()));
        assert!(err.is_protocol());
        assert_eq!(err.server_message(), Some("ERR wrong type"));
        assert_eq!(err.to_string(), "protocol error: server error: ERR wrong type");
    }

    #[test]
    fn test_non_server_errors_have_no_message() {
        assert_eq!(ClientError::Timeout.server_message(), None);
        assert!(ClientError::Timeout.is_timeout());
        assert!(!ClientError::PeerClosed.is_timeout());

        let err = ClientError::from(ProtocolError::EmptyLine);
        assert_eq!(err.server_message(), None);
    }

    #[test]
    fn test_unexpected_type_display() {
        let err = ProtocolError::UnexpectedType {
            expected: ReplyKind::Bulk,
            found: ReplyKind::Integer,
        };
        assert_eq!(
            err.to_string(),
            "unexpected reply type: expected bulk, found integer"
        );
    }
}
