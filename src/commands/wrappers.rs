//! Typed Command Wrappers
//!
//! One method per server command on [`Connection`]. Each wrapper formats
//! its command, runs a cycle expecting the reply kind that command answers
//! with, and reinterprets the reply as a Rust type.
//!
//! Borrowed results (`&[u8]`, `&str`, [`MultiBulk`]) point into the
//! connection's receive buffer and live until the next call on the same
//! connection. Use [`Connection::execute`] plus [`Reply::into_owned`] to
//! keep a reply around.
//!
//! Stored values (`SET`, `GETSET`, `SETNX` and the list pushes and edits)
//! go out as a bulk value, so they may be empty or hold any bytes. Keys and
//! other arguments are inline fields.

use crate::commands::Command;
use crate::connection::{Connection, Transport};
use crate::error::{ClientError, ProtocolError, Result};
use crate::protocol::{MultiBulk, Reply, ReplyKind};
use std::fmt;
use tracing::debug;

/// The value type stored at a key, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    List,
    Set,
    /// The key does not exist (or holds a type this client does not know)
    None,
}

impl KeyType {
    /// Maps a `TYPE` status line. Unknown names map to [`KeyType::None`].
    pub fn from_status(line: &str) -> Self {
        match line {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            _ => KeyType::None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::None => "none",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Reply conversions
// ============================================================================

fn mismatch(expected: ReplyKind, reply: &Reply<'_>) -> ClientError {
    ProtocolError::UnexpectedType {
        expected,
        found: reply.kind(),
    }
    .into()
}

fn into_status(reply: Reply<'_>) -> Result<&[u8]> {
    reply
        .as_status()
        .ok_or_else(|| mismatch(ReplyKind::Status, &reply))
}

fn into_integer(reply: Reply<'_>) -> Result<i64> {
    reply
        .as_integer()
        .ok_or_else(|| mismatch(ReplyKind::Integer, &reply))
}

fn into_bulk(reply: Reply<'_>) -> Result<Option<&[u8]>> {
    reply
        .as_bulk()
        .ok_or_else(|| mismatch(ReplyKind::Bulk, &reply))
}

fn into_multi_bulk(reply: Reply<'_>) -> Result<MultiBulk<'_>> {
    reply
        .as_multi_bulk()
        .ok_or_else(|| mismatch(ReplyKind::MultiBulk, &reply))
}

impl<T: Transport> Connection<T> {
    fn status(&mut self, command: Command) -> Result<&[u8]> {
        into_status(self.execute(ReplyKind::Status, &command)?)
    }

    /// Status line that callers read as text.
    fn status_text(&mut self, command: Command) -> Result<&str> {
        let line = self.status(command)?;
        std::str::from_utf8(line).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()).into())
    }

    /// Runs a command whose status line carries no information.
    fn acknowledge(&mut self, command: Command) -> Result<()> {
        self.status(command).map(|_| ())
    }

    fn integer(&mut self, command: Command) -> Result<i64> {
        into_integer(self.execute(ReplyKind::Integer, &command)?)
    }

    /// Integer reply read as a flag: zero is false.
    fn flag(&mut self, command: Command) -> Result<bool> {
        self.integer(command).map(|n| n != 0)
    }

    fn bulk(&mut self, command: Command) -> Result<Option<&[u8]>> {
        into_bulk(self.execute(ReplyKind::Bulk, &command)?)
    }

    fn multi_bulk(&mut self, command: Command) -> Result<MultiBulk<'_>> {
        into_multi_bulk(self.execute(ReplyKind::MultiBulk, &command)?)
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// PING
    pub fn ping(&mut self) -> Result<()> {
        self.acknowledge(Command::new("PING"))
    }

    /// SET key value
    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.acknowledge(Command::new("SET").arg(key).value(value))
    }

    /// GET key
    pub fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("GET").arg(key))
    }

    /// GETSET key value. Returns the previous value.
    pub fn getset(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("GETSET").arg(key).value(value))
    }

    /// MGET key [key ...]
    pub fn mget<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<MultiBulk<'_>> {
        let command = keys
            .iter()
            .fold(Command::new("MGET"), |command, key| command.arg(key));
        self.multi_bulk(command)
    }

    /// SETNX key value. Returns true if the key was set.
    pub fn setnx(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<bool> {
        self.flag(Command::new("SETNX").arg(key).value(value))
    }

    /// INCR key. Returns the new value.
    pub fn incr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("INCR").arg(key))
    }

    /// DECR key. Returns the new value.
    pub fn decr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("DECR").arg(key))
    }

    /// INCRBY key increment
    pub fn incr_by(&mut self, key: impl AsRef<[u8]>, increment: i64) -> Result<i64> {
        self.integer(Command::new("INCRBY").arg(key).arg_int(increment))
    }

    /// DECRBY key decrement
    pub fn decr_by(&mut self, key: impl AsRef<[u8]>, decrement: i64) -> Result<i64> {
        self.integer(Command::new("DECRBY").arg(key).arg_int(decrement))
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// EXISTS key
    pub fn exists(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.flag(Command::new("EXISTS").arg(key))
    }

    /// DEL key. Returns true if the key existed.
    pub fn del(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        self.flag(Command::new("DEL").arg(key))
    }

    /// TYPE key
    pub fn key_type(&mut self, key: impl AsRef<[u8]>) -> Result<KeyType> {
        self.status_text(Command::new("TYPE").arg(key))
            .map(KeyType::from_status)
    }

    /// KEYS pattern
    pub fn keys(&mut self, pattern: impl AsRef<[u8]>) -> Result<MultiBulk<'_>> {
        self.multi_bulk(Command::new("KEYS").arg(pattern))
    }

    /// RANDOMKEY. `None` when the database is empty.
    pub fn randomkey(&mut self) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("RANDOMKEY"))
    }

    /// RENAME key newkey
    pub fn rename(&mut self, key: impl AsRef<[u8]>, new_key: impl AsRef<[u8]>) -> Result<()> {
        self.acknowledge(Command::new("RENAME").arg(key).arg(new_key))
    }

    /// RENAMENX key newkey. Returns false if `new_key` already exists.
    pub fn renamenx(
        &mut self,
        key: impl AsRef<[u8]>,
        new_key: impl AsRef<[u8]>,
    ) -> Result<bool> {
        self.flag(Command::new("RENAMENX").arg(key).arg(new_key))
    }

    /// DBSIZE
    pub fn dbsize(&mut self) -> Result<i64> {
        self.integer(Command::new("DBSIZE"))
    }

    /// EXPIRE key seconds. Returns false if the timeout was not set.
    pub fn expire(&mut self, key: impl AsRef<[u8]>, seconds: i64) -> Result<bool> {
        self.flag(Command::new("EXPIRE").arg(key).arg_int(seconds))
    }

    /// TTL key. Negative when the key has no timeout or does not exist.
    pub fn ttl(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("TTL").arg(key))
    }

    /// MOVE key db
    pub fn move_key(&mut self, key: impl AsRef<[u8]>, db: i64) -> Result<bool> {
        self.flag(Command::new("MOVE").arg(key).arg_int(db))
    }

    /// SORT key [option ...]
    ///
    /// Options are passed through word by word, e.g.
    /// `["LIMIT", "0", "10", "DESC"]`.
    pub fn sort<O: AsRef<[u8]>>(
        &mut self,
        key: impl AsRef<[u8]>,
        options: &[O],
    ) -> Result<MultiBulk<'_>> {
        let command = options
            .iter()
            .fold(Command::new("SORT").arg(key), |command, option| {
                command.arg(option)
            });
        self.multi_bulk(command)
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// LPUSH key value. Returns the new list length.
    pub fn lpush(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("LPUSH").arg(key).value(value))
    }

    /// RPUSH key value. Returns the new list length.
    pub fn rpush(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("RPUSH").arg(key).value(value))
    }

    /// LLEN key
    pub fn llen(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.integer(Command::new("LLEN").arg(key))
    }

    /// LRANGE key start stop
    pub fn lrange(
        &mut self,
        key: impl AsRef<[u8]>,
        start: i64,
        stop: i64,
    ) -> Result<MultiBulk<'_>> {
        self.multi_bulk(Command::new("LRANGE").arg(key).arg_int(start).arg_int(stop))
    }

    /// LINDEX key index
    pub fn lindex(&mut self, key: impl AsRef<[u8]>, index: i64) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("LINDEX").arg(key).arg_int(index))
    }

    /// LSET key index value
    pub fn lset(
        &mut self,
        key: impl AsRef<[u8]>,
        index: i64,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        self.acknowledge(Command::new("LSET").arg(key).arg_int(index).value(value))
    }

    /// LREM key count value. Returns the number of removed elements.
    pub fn lrem(
        &mut self,
        key: impl AsRef<[u8]>,
        count: i64,
        value: impl AsRef<[u8]>,
    ) -> Result<i64> {
        self.integer(Command::new("LREM").arg(key).arg_int(count).value(value))
    }

    /// LPOP key
    pub fn lpop(&mut self, key: impl AsRef<[u8]>) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("LPOP").arg(key))
    }

    /// RPOP key
    pub fn rpop(&mut self, key: impl AsRef<[u8]>) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("RPOP").arg(key))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// SELECT index
    pub fn select(&mut self, index: i64) -> Result<()> {
        self.acknowledge(Command::new("SELECT").arg_int(index))
    }

    /// FLUSHDB
    pub fn flushdb(&mut self) -> Result<()> {
        self.acknowledge(Command::new("FLUSHDB"))
    }

    /// FLUSHALL
    pub fn flushall(&mut self) -> Result<()> {
        self.acknowledge(Command::new("FLUSHALL"))
    }

    /// SAVE
    pub fn save(&mut self) -> Result<()> {
        self.acknowledge(Command::new("SAVE"))
    }

    /// BGSAVE. Returns the server's acknowledgement line.
    pub fn bgsave(&mut self) -> Result<&str> {
        self.status_text(Command::new("BGSAVE"))
    }

    /// LASTSAVE. Unix time of the last successful save.
    pub fn lastsave(&mut self) -> Result<i64> {
        self.integer(Command::new("LASTSAVE"))
    }

    /// INFO
    pub fn info(&mut self) -> Result<Option<&[u8]>> {
        self.bulk(Command::new("INFO"))
    }

    /// SHUTDOWN
    ///
    /// A server that shuts down closes the connection without replying, so
    /// the peer closing is the successful outcome here.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.execute(ReplyKind::Status, &Command::new("SHUTDOWN")) {
            Ok(_) => Ok(()),
            Err(ClientError::PeerClosed) => {
                debug!(peer = %self.peer_addr(), "Server closed the connection on SHUTDOWN");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// SLAVEOF host port, or SLAVEOF no one when `master` is `None`.
    pub fn slaveof(&mut self, master: Option<(&str, u16)>) -> Result<()> {
        let command = match master {
            Some((host, port)) => Command::new("SLAVEOF").arg(host).arg_int(i64::from(port)),
            None => Command::new("SLAVEOF").arg("no").arg("one"),
        };
        self.acknowledge(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::connection::mock::ScriptedTransport;

    fn scripted(replies: &[&[u8]]) -> Connection<ScriptedTransport> {
        let transport = ScriptedTransport::chunks(replies.iter().copied());
        Connection::with_transport(transport, &ClientConfig::default(), "scripted")
    }

    fn sent(conn: &Connection<ScriptedTransport>) -> String {
        String::from_utf8_lossy(&conn.transport().sent).into_owned()
    }

    #[test]
    fn test_key_type_from_status() {
        assert_eq!(KeyType::from_status("string"), KeyType::String);
        assert_eq!(KeyType::from_status("list"), KeyType::List);
        assert_eq!(KeyType::from_status("set"), KeyType::Set);
        assert_eq!(KeyType::from_status("none"), KeyType::None);
        assert_eq!(KeyType::from_status("zset"), KeyType::None);
        assert_eq!(KeyType::List.to_string(), "list");
    }

    #[test]
    fn test_set_get() {
        let mut conn = scripted(&[b"+OK\r\n", b"$5\r\nvalue\r\n"]);

        conn.set("key", "value").unwrap();
        assert_eq!(conn.get("key").unwrap(), Some(&b"value"[..]));
        assert_eq!(sent(&conn), "SET key 5\r\nvalue\r\nGET key\r\n");
    }

    #[test]
    fn test_get_nonexistent() {
        let mut conn = scripted(&[b"$-1\r\n"]);
        assert_eq!(conn.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_getset_and_mget() {
        let mut conn = scripted(&[b"$3\r\nold\r\n", b"*3\r\n$1\r\na\r\n$-1\r\n$1\r\nc\r\n"]);

        assert_eq!(conn.getset("k", "new").unwrap(), Some(&b"old"[..]));

        let values = conn.mget(&["k1", "k2", "k3"]).unwrap();
        assert_eq!(
            values.iter().collect::<Vec<_>>(),
            vec![Some(&b"a"[..]), None, Some(&b"c"[..])]
        );
        assert_eq!(sent(&conn), "GETSET k 3\r\nnew\r\nMGET k1 k2 k3\r\n");
    }

    #[test]
    fn test_incr_decr() {
        let mut conn = scripted(&[b":1\r\n", b":11\r\n", b":10\r\n", b":-5\r\n"]);

        assert_eq!(conn.incr("counter").unwrap(), 1);
        assert_eq!(conn.incr_by("counter", 10).unwrap(), 11);
        assert_eq!(conn.decr("counter").unwrap(), 10);
        assert_eq!(conn.decr_by("counter", 15).unwrap(), -5);
        assert_eq!(
            sent(&conn),
            "INCR counter\r\nINCRBY counter 10\r\nDECR counter\r\nDECRBY counter 15\r\n"
        );
    }

    #[test]
    fn test_flags() {
        let mut conn = scripted(&[b":1\r\n", b":0\r\n", b":1\r\n", b":0\r\n", b":1\r\n", b":0\r\n"]);

        assert!(conn.setnx("k", "v").unwrap());
        assert!(!conn.exists("missing").unwrap());
        assert!(conn.del("k").unwrap());
        assert!(!conn.renamenx("a", "b").unwrap());
        assert!(conn.expire("k", 60).unwrap());
        assert!(!conn.move_key("k", 1).unwrap());
        assert_eq!(
            sent(&conn),
            "SETNX k 1\r\nv\r\nEXISTS missing\r\nDEL k\r\nRENAMENX a b\r\nEXPIRE k 60\r\nMOVE k 1\r\n"
        );
    }

    #[test]
    fn test_key_type() {
        let mut conn = scripted(&[b"+list\r\n"]);
        assert_eq!(conn.key_type("mylist").unwrap(), KeyType::List);
        assert_eq!(sent(&conn), "TYPE mylist\r\n");
    }

    #[test]
    fn test_keys_and_randomkey() {
        let mut conn = scripted(&[b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n", b"$-1\r\n"]);

        let keys = conn.keys("*").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.get(1), Some(Some(&b"bar"[..])));

        assert_eq!(conn.randomkey().unwrap(), None);
    }

    #[test]
    fn test_list_commands() {
        let mut conn = scripted(&[
            b":1\r\n",
            b":2\r\n",
            b":2\r\n",
            b"*2\r\n$1\r\nb\r\n$1\r\na\r\n",
            b"$1\r\na\r\n",
            b"+OK\r\n",
            b":1\r\n",
            b"$1\r\nb\r\n",
            b"$-1\r\n",
        ]);

        assert_eq!(conn.lpush("l", "a").unwrap(), 1);
        assert_eq!(conn.rpush("l", "b").unwrap(), 2);
        assert_eq!(conn.llen("l").unwrap(), 2);
        assert_eq!(conn.lrange("l", 0, -1).unwrap().len(), 2);
        assert_eq!(conn.lindex("l", 1).unwrap(), Some(&b"a"[..]));
        conn.lset("l", 0, "z").unwrap();
        assert_eq!(conn.lrem("l", 0, "z").unwrap(), 1);
        assert_eq!(conn.lpop("l").unwrap(), Some(&b"b"[..]));
        assert_eq!(conn.rpop("l").unwrap(), None);

        assert_eq!(
            sent(&conn),
            "LPUSH l 1\r\na\r\nRPUSH l 1\r\nb\r\nLLEN l\r\nLRANGE l 0 -1\r\nLINDEX l 1\r\n\
             LSET l 0 1\r\nz\r\nLREM l 0 1\r\nz\r\nLPOP l\r\nRPOP l\r\n"
        );
    }

    #[test]
    fn test_sort_options() {
        let mut conn = scripted(&[b"*2\r\n$1\r\n3\r\n$1\r\n1\r\n"]);

        let sorted = conn.sort("nums", &["LIMIT", "0", "2", "DESC"]).unwrap();
        assert_eq!(sorted.to_vec(), vec![Some(b"3".to_vec()), Some(b"1".to_vec())]);
        assert_eq!(sent(&conn), "SORT nums LIMIT 0 2 DESC\r\n");
    }

    #[test]
    fn test_server_commands() {
        let mut conn = scripted(&[
            b"+PONG\r\n",
            b"+OK\r\n",
            b":3\r\n",
            b"+OK\r\n",
            b"+Background saving started\r\n",
            b":1700000000\r\n",
            b"$17\r\nredis_version:1.0\r\n",
            b"+OK\r\n",
        ]);

        conn.ping().unwrap();
        conn.select(2).unwrap();
        assert_eq!(conn.dbsize().unwrap(), 3);
        conn.flushdb().unwrap();
        assert_eq!(conn.bgsave().unwrap(), "Background saving started");
        assert_eq!(conn.lastsave().unwrap(), 1_700_000_000);
        assert_eq!(conn.info().unwrap(), Some(&b"redis_version:1.0"[..]));
        conn.slaveof(None).unwrap();

        assert_eq!(
            sent(&conn),
            "PING\r\nSELECT 2\r\nDBSIZE\r\nFLUSHDB\r\nBGSAVE\r\nLASTSAVE\r\nINFO\r\nSLAVEOF no one\r\n"
        );
    }

    #[test]
    fn test_slaveof_master() {
        let mut conn = scripted(&[b"+OK\r\n"]);
        conn.slaveof(Some(("10.0.0.1", 6380))).unwrap();
        assert_eq!(sent(&conn), "SLAVEOF 10.0.0.1 6380\r\n");
    }

    #[test]
    fn test_shutdown_accepts_peer_close() {
        let mut conn = scripted(&[]);
        conn.shutdown().unwrap();
        assert_eq!(sent(&conn), "SHUTDOWN\r\n");
    }

    #[test]
    fn test_server_error_propagates() {
        let mut conn = scripted(&[b"-ERR Operation against a key holding the wrong kind of value\r\n"]);
        let err = conn.lpush("string-key", "x").unwrap_err();
        assert_eq!(
            err.server_message(),
            Some("ERR Operation against a key holding the wrong kind of value")
        );
    }

    #[test]
    fn test_invalid_argument_is_not_sent() {
        let mut conn = scripted(&[]);
        let err = conn.set("two words", "value").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        let err = conn.get("").unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
        assert!(conn.transport().sent.is_empty());
    }

    #[test]
    fn test_values_with_whitespace_crlf_and_binary() {
        let mut conn = scripted(&[
            b"+OK\r\n",
            b"+OK\r\n",
            b":1\r\n",
            b"$11\r\nhello world\r\n",
            b"+OK\r\n",
        ]);

        conn.set("greeting", "hello world").unwrap();
        conn.set("lines", "a\r\nb").unwrap();
        assert!(conn.setnx("blob", [0u8, 0xff, b' ']).unwrap());
        assert_eq!(conn.getset("greeting", "").unwrap(), Some(&b"hello world"[..]));
        conn.lset("l", -1, "x y").unwrap();

        let mut expected = b"SET greeting 11\r\nhello world\r\n".to_vec();
        expected.extend_from_slice(b"SET lines 4\r\na\r\nb\r\n");
        expected.extend_from_slice(b"SETNX blob 3\r\n\x00\xff \r\n");
        expected.extend_from_slice(b"GETSET greeting 0\r\n\r\nLSET l -1 3\r\nx y\r\n");
        assert_eq!(conn.transport().sent, expected);
    }

    #[test]
    fn test_non_utf8_status_line() {
        let mut conn = scripted(&[b"+\xffOK\r\n", b"+\xff\r\n"]);

        conn.set("k", "v").unwrap();
        let err = conn.key_type("k").unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::InvalidUtf8(_))
        ));
    }
}
