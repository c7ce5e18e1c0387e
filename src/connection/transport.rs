//! Timed Transport
//!
//! Blocking send/receive over a stream socket, bounded by a millisecond
//! timeout. Readiness is awaited with `poll(2)` instead of socket-level
//! read/write timeout options, and the same wait is used for both
//! directions.
//!
//! ```text
//!   send:    [poll POLLOUT] -> write -> [poll POLLOUT] -> write ... (until all sent
//!                                                                    or deadline)
//!   receive: [poll POLLIN]  -> read once
//! ```
//!
//! A short send count means the deadline elapsed. A receive reports data,
//! an orderly peer shutdown, or a timeout as three distinct outcomes.

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::AsFd;
use std::time::{Duration, Instant};
use tracing::trace;

/// Outcome of a single [`Transport::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// `n > 0` bytes were read into the buffer
    Data(usize),
    /// The peer shut the connection down (zero-length read)
    Closed,
    /// Nothing became readable before the timeout
    TimedOut,
}

/// The byte-stream seam beneath a connection.
///
/// One request is outstanding at a time, so implementations need no
/// internal synchronization.
pub trait Transport {
    /// Sends `data`, returning how many bytes went out before `timeout`.
    ///
    /// A count shorter than `data.len()` means the deadline elapsed.
    /// Errors are polling or write failures.
    fn send(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Waits up to `timeout` for readability, then performs one bounded read
    /// into `buf`. `buf` must not be empty.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Received>;

    /// Shuts the transport down. Called once when the connection closes.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// [`Transport`] over a non-blocking `TcpStream`, driven by `poll(2)`.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Wraps a connected stream, switching it to non-blocking mode so no
    /// read or write can block past the readiness wait.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8], timeout: Duration) -> io::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut sent = 0;

        while sent < data.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !wait_ready(&self.stream, PollFlags::POLLOUT, remaining)? {
                trace!(sent, total = data.len(), "Send deadline elapsed");
                break;
            }

            match self.stream.write(&data[sent..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => sent += n,
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(sent)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Received> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !wait_ready(&self.stream, PollFlags::POLLIN, remaining)? {
                return Ok(Received::TimedOut);
            }

            match self.stream.read(buf) {
                Ok(0) => return Ok(Received::Closed),
                Ok(n) => return Ok(Received::Data(n)),
                // Spurious readiness: wait again on whatever time is left
                Err(e) if is_retryable(&e) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Waits until `fd` is ready for `events` or `timeout` elapses.
///
/// Returns `Ok(false)` on timeout. Error and hang-up conditions count as
/// ready so the following read or write reports them.
fn wait_ready<F: AsFd>(fd: &F, events: PollFlags, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut fds = [PollFd::new(fd.as_fd(), events)];

        let timeout = PollTimeout::try_from(poll_millis(remaining)).unwrap_or(PollTimeout::MAX);

        match poll(&mut fds, timeout) {
            Ok(0) => return Ok(false),
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno.into()),
        }
    }
}

/// Converts a duration to `poll` milliseconds, rounding sub-millisecond
/// remainders up so a nearly expired deadline does not spin.
fn poll_millis(timeout: Duration) -> i32 {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    i32::try_from(millis).unwrap_or(i32::MAX)
}
