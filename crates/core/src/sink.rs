//! Byte sinks with a partial-write contract
//!
//! A `WriteSink` may consume fewer bytes than offered; `write_all` keeps
//! offering the remainder, in order, until everything is consumed. `flush`
//! marks the end of one logical message (one trace line, one rendered error).

use std::fmt;
use std::io;

/// Streaming byte consumer
pub trait WriteSink {
    /// Consume a prefix of `buf`, returning how many bytes were taken
    fn write(&mut self, buf: &[u8]) -> usize;

    /// End of a logical message
    fn flush(&mut self);
}

/// Failure to deliver bytes to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink consumed nothing from a non-empty buffer
    Closed { delivered: usize, remaining: usize },
    /// The sink claimed to consume more bytes than it was offered
    Overrun { offered: usize, claimed: usize },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed {
                delivered,
                remaining,
            } => write!(
                f,
                "sink stopped accepting data after {} bytes ({} bytes undelivered)",
                delivered, remaining
            ),
            SinkError::Overrun { offered, claimed } => write!(
                f,
                "sink reported consuming {} bytes of a {} byte buffer",
                claimed, offered
            ),
        }
    }
}

impl std::error::Error for SinkError {}

/// Deliver every byte of `bytes` to `sink`, retrying on partial consumption
pub fn write_all(sink: &mut (impl WriteSink + ?Sized), bytes: &[u8]) -> Result<(), SinkError> {
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        let taken = sink.write(rest);
        if taken == 0 {
            return Err(SinkError::Closed {
                delivered: offset,
                remaining: rest.len(),
            });
        }
        if taken > rest.len() {
            return Err(SinkError::Overrun {
                offered: rest.len(),
                claimed: taken,
            });
        }
        offset += taken;
    }
    Ok(())
}

/// Deliver a whole message and then flush
pub fn write_message(
    sink: &mut (impl WriteSink + ?Sized),
    bytes: &[u8],
) -> Result<(), SinkError> {
    write_all(sink, bytes)?;
    sink.flush();
    Ok(())
}

impl WriteSink for Vec<u8> {
    fn write(&mut self, buf: &[u8]) -> usize {
        self.extend_from_slice(buf);
        buf.len()
    }

    fn flush(&mut self) {}
}

/// Adapter from any `std::io::Write`
///
/// I/O errors surface as zero-byte writes, which `write_all` reports as a
/// closed sink.
pub struct IoSink<W: io::Write> {
    inner: W,
}

impl<W: io::Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        IoSink { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> WriteSink for IoSink<W> {
    fn write(&mut self, buf: &[u8]) -> usize {
        loop {
            match self.inner.write(buf) {
                Ok(n) => return n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("io sink write failed: {}", e);
                    return 0;
                }
            }
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.inner.flush() {
            tracing::debug!("io sink flush failed: {}", e);
        }
    }
}
