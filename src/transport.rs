//! Transport abstraction — any byte-oriented channel to the daemon.
//!
//! Concrete implementations:
//! - Unix domain socket, one per expansion port (the production path)
//! - `NullTransport` for wiring up a port with no daemon attached
//!
//! The port engine is generic over `Transport`, so swapping the channel
//! requires zero changes to the protocol logic.

use crate::error::TransportError;

/// Byte-oriented transport channel.
///
/// The stream must be reliable and ordered; the protocol has no framing
/// redundancy and cannot survive reordering or loss.
pub trait Transport {
    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    /// A closed stream is [`TransportError::Closed`], not a zero read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
/// Useful as a default when no daemon connection exists.
pub struct NullTransport;

impl Transport for NullTransport {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

// ── In-memory transport for unit tests ───────────────────────
