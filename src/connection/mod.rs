//! Connection Module
//!
//! The client side of one server connection.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Connection                  │
//! │   format ──> send ──> reset ──> decode      │
//! └──────────────────────┬──────────────────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────┐
//! │                 Transport                   │
//! │   poll(2) readiness wait + one I/O call     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - `client`: [`Connection`], connect/execute/close
//! - `transport`: The [`Transport`] seam and its TCP implementation

pub mod client;
pub mod transport;

pub use client::{Connection, ConnectionStats};
pub use transport::{Received, TcpTransport, Transport};

#[cfg(test)]
pub(crate) use transport::mock;
