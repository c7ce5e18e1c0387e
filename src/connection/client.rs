//! Client Connection
//!
//! A [`Connection`] owns one transport plus the buffers a command cycle
//! needs, and runs exactly one request/response exchange per
//! [`execute`](Connection::execute) call.
//!
//! ## Command Cycle
//!
//! ```text
//! 1. Format command into the send buffer
//!        │  (too long: Capacity error)
//!        ▼
//! 2. Send through the transport
//!        │  (short send: Timeout, failure: Send error)
//!        ▼
//! 3. Reset the receive buffer
//!        │
//!        ▼
//! 4. Decode one reply of the expected kind
//!        │
//!        ▼
//!    Reply borrowed from the receive buffer
//!    (valid until the next call on this connection)
//! ```
//!
//! `execute` takes `&mut self` and the returned [`Reply`] borrows the
//! connection, so a reply can never outlive the buffer it points into and no
//! second cycle can start while one is still being read. Nothing is retried:
//! after a protocol error the read position is undefined and the caller
//! should close and reconnect.

use crate::commands::{Command, SendBuffer};
use crate::config::ClientConfig;
use crate::connection::transport::{TcpTransport, Transport};
use crate::error::{ClientError, Result};
use crate::protocol::decoder::{Decoded, ReplyDecoder};
use crate::protocol::{MultiBulkTable, ReceiveBuffer, Reply, ReplyKind};
use nix::sys::socket::{setsockopt, sockopt};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Counters for one connection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Command cycles started
    pub commands_sent: u64,
    /// Command cycles that ended in an error
    pub errors: u64,
    /// Total bytes written to the transport
    pub bytes_sent: u64,
    /// Total bytes pulled from the transport
    pub bytes_received: u64,
}

/// A blocking, timeout-bounded connection to a server.
pub struct Connection<T: Transport = TcpTransport> {
    /// The byte stream to the server
    transport: T,

    /// Server address (for logging)
    addr: String,

    /// Bound on every send and receive wait
    timeout: Duration,

    /// Fixed-size buffer commands are formatted into
    send_buffer: SendBuffer,

    /// Raw reply bytes, reset at the start of each cycle
    receive_buffer: ReceiveBuffer,

    /// Element spans of the last multi-bulk reply
    table: MultiBulkTable,

    stats: ConnectionStats,
}

impl Connection<TcpTransport> {
    /// Connects to the server described by `config`.
    ///
    /// Every resolved address is tried in turn, each bounded by the configured
    /// timeout. The first one that accepts wins.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let addr = config.address();
        let connect_error = |source: io::Error| ClientError::Connect {
            addr: addr.clone(),
            source,
        };

        let candidates = addr.to_socket_addrs().map_err(connect_error)?;

        let mut last_error = None;
        let mut connected = None;
        for candidate in candidates {
            let attempt = if config.timeout.is_zero() {
                TcpStream::connect(candidate)
            } else {
                TcpStream::connect_timeout(&candidate, config.timeout)
            };
            match attempt {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    trace!(addr = %candidate, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let stream = match connected {
            Some(stream) => stream,
            None => {
                let source = last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
                });
                return Err(connect_error(source));
            }
        };

        configure_socket(&stream, config).map_err(connect_error)?;
        let transport = TcpTransport::new(stream).map_err(connect_error)?;

        debug!(peer = %addr, timeout_ms = config.timeout.as_millis() as u64, "Connected");
        Ok(Self::with_transport(transport, config, addr))
    }

    /// Connects to `host:port` with every other setting at its default.
    ///
    /// An empty host or a zero port falls back to the default.
    pub fn open(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let config = ClientConfig::builder()
            .host(host)
            .port(port)
            .timeout(timeout)
            .build();
        Self::connect(&config)
    }
}

fn configure_socket(stream: &TcpStream, config: &ClientConfig) -> io::Result<()> {
    if config.nodelay {
        stream.set_nodelay(true)?;
    }
    if config.keepalive {
        setsockopt(stream, sockopt::KeepAlive, &true).map_err(io::Error::from)?;
    }
    Ok(())
}

impl<T: Transport> Connection<T> {
    /// Builds a connection over an already established transport.
    pub fn with_transport(transport: T, config: &ClientConfig, addr: impl Into<String>) -> Self {
        Self {
            transport,
            addr: addr.into(),
            timeout: config.timeout,
            send_buffer: SendBuffer::new(config.send_buffer_capacity),
            receive_buffer: ReceiveBuffer::new(
                config.receive_buffer_capacity,
                config.max_reply_size,
            ),
            table: MultiBulkTable::new(),
            stats: ConnectionStats::default(),
        }
    }

    /// Runs one command cycle and returns the decoded reply.
    ///
    /// An error-tagged reply is reported as
    /// [`ProtocolError::Server`](crate::ProtocolError::Server) whatever kind
    /// was expected. Any other kind than `expected` is
    /// [`ProtocolError::UnexpectedType`](crate::ProtocolError::UnexpectedType).
    pub fn execute(&mut self, expected: ReplyKind, command: &Command) -> Result<Reply<'_>> {
        self.stats.commands_sent += 1;
        debug!(peer = %self.addr, command = %command, %expected, "Executing command");

        let outcome = self
            .exchange(expected, command)
            .and_then(|decoded| decoded.resolve(&self.receive_buffer, &self.table));

        match outcome {
            Ok(reply) => {
                trace!(peer = %self.addr, kind = %reply.kind(), "Reply decoded");
                Ok(reply)
            }
            Err(e) => {
                self.stats.errors += 1;
                match &e {
                    ClientError::Protocol(p) => {
                        warn!(peer = %self.addr, command = %command, error = %p, "Protocol error")
                    }
                    _ => {
                        debug!(peer = %self.addr, command = %command, error = %e, "Command failed")
                    }
                }
                Err(e)
            }
        }
    }

    /// Sends the command and decodes one reply into the receive buffer.
    fn exchange(&mut self, expected: ReplyKind, command: &Command) -> Result<Decoded> {
        let request = self.send_buffer.format(command)?;
        let sent = self
            .transport
            .send(request, self.timeout)
            .map_err(ClientError::Send)?;
        self.stats.bytes_sent += sent as u64;
        trace!(bytes = sent, total = request.len(), "Sent command");
        if sent < request.len() {
            return Err(ClientError::Timeout);
        }

        self.receive_buffer.reset();
        let decoded = ReplyDecoder::new(
            &mut self.receive_buffer,
            &mut self.table,
            &mut self.transport,
            self.timeout,
        )
        .decode(expected);
        self.stats.bytes_received += self.receive_buffer.filled() as u64;
        decoded
    }

    /// Shuts the transport down and releases the buffers.
    pub fn close(mut self) -> Result<()> {
        debug!(peer = %self.addr, commands = self.stats.commands_sent, "Closing connection");
        self.transport.shutdown().map_err(ClientError::Close)
    }

    /// Server address as given at connect time
    pub fn peer_addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the bound applied to subsequent sends and receives.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The multi-bulk element table (capacity and growth count)
    pub fn multi_bulk_table(&self) -> &MultiBulkTable {
        &self.table
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
