//! Command Module
//!
//! The request side of a command cycle.
//!
//! ## Architecture
//!
//! ```text
//! conn.get("key")
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Typed wrapper  │  (wrappers module)
//! │                 │
//! │  - Build        │
//! │  - Execute      │
//! │  - Reinterpret  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Command      │  (command module)
//! │  GET key\r\n    │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Connection    │  (connection module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `PING`, `SET`, `GET`, `GETSET`, `MGET`, `SETNX`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`
//!
//! ### Key Commands
//! - `EXISTS`, `DEL`, `TYPE`, `KEYS`, `RANDOMKEY`
//! - `RENAME`, `RENAMENX`, `DBSIZE`, `EXPIRE`, `TTL`, `MOVE`, `SORT`
//!
//! ### List Commands
//! - `LPUSH`, `RPUSH`, `LLEN`, `LRANGE`, `LINDEX`, `LSET`, `LREM`, `LPOP`, `RPOP`
//!
//! ### Server Commands
//! - `SELECT`, `FLUSHDB`, `FLUSHALL`, `SAVE`, `BGSAVE`, `LASTSAVE`
//! - `INFO`, `SHUTDOWN`, `SLAVEOF`
//!
//! Anything else can be sent through [`Connection::execute`](crate::Connection::execute)
//! with a hand-built [`Command`].

pub mod command;
pub mod wrappers;

pub use command::{Command, SendBuffer};
pub use wrappers::KeyType;
