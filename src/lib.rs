//! # FlashKV Client - A Blocking Client for Redis-Protocol Servers
//!
//! `flashkv-client` talks to FlashKV (or any server speaking the same
//! line-oriented, type-tagged reply protocol) over a single TCP connection.
//! Every call is synchronous and bounded by a timeout.
//!
//! ## Features
//!
//! - **Timeout-Bounded I/O**: Every send and receive waits at most the
//!   configured timeout, using `poll(2)` readiness polling
//! - **Borrowed Replies**: Decoded replies point into the receive buffer,
//!   and the borrow checker stops them outliving the next call
//! - **Growable Buffers**: Replies of any size up to a configured limit,
//!   split across any number of socket reads
//! - **Typed Commands**: `get`, `incr`, `lrange` and friends return Rust types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           flashkv-client                                │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Typed     │───>│  Command    │───>│ Connection  │                  │
//! │  │  Wrappers   │    │ (formatter) │    │  execute()  │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                          ┌────────────────────┼──────────────┐          │
//! │                          ▼                    ▼              │          │
//! │                   ┌─────────────┐     ┌──────────────┐       │          │
//! │                   │  Transport  │────>│ ReceiveBuffer│       │          │
//! │                   │  (poll(2))  │     │  (BytesMut)  │       │          │
//! │                   └─────────────┘     └──────┬───────┘       │          │
//! │                                              ▼               │          │
//! │                                       ┌──────────────┐       │          │
//! │                                       │ ReplyDecoder │───────┘          │
//! │                                       │ + MultiBulk  │   Reply<'_>      │
//! │                                       │   Table      │                  │
//! │                                       └──────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashkv_client::{ClientConfig, Connection};
//!
//! fn main() -> flashkv_client::Result<()> {
//!     let config = ClientConfig::builder()
//!         .host("127.0.0.1")
//!         .port(6379)
//!         .timeout_ms(500)
//!         .build();
//!     let mut conn = Connection::connect(&config)?;
//!
//!     conn.set("name", "Ariz")?;
//!     if let Some(value) = conn.get("name")? {
//!         println!("name = {}", String::from_utf8_lossy(value));
//!     }
//!
//!     let count = conn.incr("visits")?;
//!     println!("visits = {}", count);
//!
//!     conn.close()
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Reply kinds, the receive buffer and the reply decoder
//! - [`connection`]: The timed transport and the command cycle
//! - [`commands`]: Command formatting and typed command wrappers
//! - [`config`]: Connection settings
//! - [`error`]: Error types
//!
//! ## Design Highlights
//!
//! ### Reply Lifetimes
//!
//! A reply borrows the connection that produced it. Holding on to one and
//! issuing another command does not compile:
//!
//! ```compile_fail
//! use flashkv_client::Connection;
//!
//! fn two_gets(conn: &mut Connection) -> flashkv_client::Result<()> {
//!     let first = conn.get("a")?;
//!     let second = conn.get("b")?;
//!     println!("{:?} {:?}", first, second);
//!     Ok(())
//! }
//! ```
//!
//! Call [`Reply::into_owned`] (or copy the bytes) to keep data across calls.
//!
//! ### No Hidden Retries
//!
//! Errors are returned as they happen. After a protocol error the position
//! in the byte stream is unknown, so the connection should be closed and a
//! new one opened.

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;

// Re-export commonly used types for convenience
pub use commands::{Command, KeyType};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection::{Connection, ConnectionStats, TcpTransport, Transport};
pub use error::{ClientError, ProtocolError, Result};
pub use protocol::{MultiBulk, OwnedReply, Reply, ReplyKind};

/// The default server port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of the FlashKV client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
