//! Command formatting
//!
//! A [`Command`] is a name plus arguments, written on the wire as one inline
//! line: fields separated by a single space and terminated by CRLF.
//!
//! ```text
//! SET counter 10\r\n
//! ```
//!
//! Inline fields cannot carry whitespace or line breaks, and cannot be
//! empty. Such arguments are rejected with
//! [`ClientError::InvalidArgument`] when the command is formatted.
//!
//! A command may end with one bulk value instead. Its byte length goes on
//! the inline line as the last field and the value follows on its own, so
//! it can hold any bytes at all:
//!
//! ```text
//! SET greeting 11\r\nhello world\r\n
//! ```

use crate::error::{ClientError, Result};
use crate::protocol::CRLF;
use bytes::BytesMut;
use std::fmt;

/// A command ready to be formatted into a send buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Vec<u8>>,
    value: Option<Vec<u8>>,
}

impl Command {
    /// Creates a command with no arguments.
    ///
    /// # Example
    /// ```
    /// use flashkv_client::Command;
    /// let cmd = Command::new("LRANGE").arg("mylist").arg_int(0).arg_int(-1);
    /// assert_eq!(cmd.to_bytes().unwrap(), b"LRANGE mylist 0 -1\r\n");
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            value: None,
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Appends an integer argument in decimal.
    pub fn arg_int(self, n: i64) -> Self {
        self.arg(n.to_string())
    }

    /// Sets the trailing bulk value, sent after the inline line.
    ///
    /// The value may be empty and may contain whitespace, CRLF or arbitrary
    /// binary bytes. Setting it again replaces the previous one.
    ///
    /// # Example
    /// ```
    /// use flashkv_client::Command;
    /// let cmd = Command::new("SET").arg("greeting").value("hello world");
    /// assert_eq!(cmd.to_bytes().unwrap(), b"SET greeting 11\r\nhello world\r\n");
    /// ```
    pub fn value(mut self, value: impl AsRef<[u8]>) -> Self {
        self.value = Some(value.as_ref().to_vec());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn bulk_value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Number of bytes the formatted command occupies, terminator included.
    pub fn encoded_len(&self) -> usize {
        let inline = self.name.len()
            + self.args.iter().map(|arg| arg.len() + 1).sum::<usize>()
            + CRLF.len();
        match &self.value {
            Some(value) => inline + 1 + decimal_len(value.len()) + value.len() + CRLF.len(),
            None => inline,
        }
    }

    /// Checks every inline field can be carried on the inline format. The
    /// bulk value is exempt.
    pub fn validate(&self) -> Result<()> {
        validate_field(self.name.as_bytes())?;
        self.args.iter().try_for_each(|arg| validate_field(arg))
    }

    /// Formats the command into `buf`, replacing its contents.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.validate()?;
        buf.clear();
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(self.name.as_bytes());
        for arg in &self.args {
            buf.extend_from_slice(b" ");
            buf.extend_from_slice(arg);
        }
        if let Some(value) = &self.value {
            buf.extend_from_slice(b" ");
            buf.extend_from_slice(value.len().to_string().as_bytes());
            buf.extend_from_slice(CRLF);
            buf.extend_from_slice(value);
        }
        buf.extend_from_slice(CRLF);
        Ok(())
    }

    /// Formats the command into a fresh vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf)?;
        Ok(buf.to_vec())
    }
}

/// Number of decimal digits in `n`.
fn decimal_len(n: usize) -> usize {
    n.checked_ilog10().map_or(1, |digits| digits as usize + 1)
}

fn validate_field(field: &[u8]) -> Result<()> {
    if field.is_empty() {
        return Err(ClientError::InvalidArgument(
            "empty field cannot be sent inline".to_string(),
        ));
    }
    if let Some(b) = field.iter().find(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')) {
        return Err(ClientError::InvalidArgument(format!(
            "{:?} contains {:?}",
            String::from_utf8_lossy(field),
            char::from(*b)
        )));
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        if let Some(value) = &self.value {
            write!(f, " {:?}", String::from_utf8_lossy(value))?;
        }
        Ok(())
    }
}

/// Fixed-capacity buffer commands are formatted into before sending.
///
/// It never grows: a command that does not fit fails with
/// [`ClientError::Capacity`].
#[derive(Debug)]
pub struct SendBuffer {
    data: BytesMut,
    capacity: usize,
}

impl SendBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Formats `command`, returning the bytes to send.
    pub fn format(&mut self, command: &Command) -> Result<&[u8]> {
        let needed = command.encoded_len();
        if needed > self.capacity {
            return Err(ClientError::Capacity {
                needed,
                capacity: self.capacity,
            });
        }
        command.write_to(&mut self.data)?;
        Ok(&self.data)
    }
}
