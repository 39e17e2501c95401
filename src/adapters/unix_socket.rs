//! Unix-domain-socket transport — the production channel to the daemon.
//!
//! The socket stays non-blocking so the port's drive loop never stalls
//! on reads. Writes that hit a full kernel buffer briefly drop to
//! blocking mode instead of failing; command streams must reach the
//! daemon complete or not at all.

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use log::info;

use crate::error::TransportError;
use crate::transport::Transport;

pub struct UnixSocketTransport {
    stream: UnixStream,
    /// One byte pulled off the socket by `available`, handed back by the
    /// next `read`.
    peeked: Cell<Option<u8>>,
    eof: Cell<bool>,
}

impl UnixSocketTransport {
    /// Connect to the daemon socket at `path`.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)?;
        info!("connected to {}", path.display());
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: UnixStream) -> Result<Self, TransportError> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            peeked: Cell::new(None),
            eof: Cell::new(false),
        })
    }

    fn write_blocking(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.set_nonblocking(false)?;
        let result = self.stream.write(data);
        self.stream.set_nonblocking(true)?;
        result
    }
}

impl Transport for UnixSocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut n = 0;
        if let Some(byte) = self.peeked.take() {
            if buf.is_empty() {
                self.peeked.set(Some(byte));
                return Ok(0);
            }
            buf[0] = byte;
            n = 1;
            if n == buf.len() {
                return Ok(n);
            }
        }
        if self.eof.get() {
            // Hand out bytes read before the hangup first.
            return if n > 0 { Ok(n) } else { Err(TransportError::Closed) };
        }
        loop {
            return match self.stream.read(&mut buf[n..]) {
                // EOF on a stream socket: the daemon went away.
                Ok(0) => {
                    self.eof.set(true);
                    if n > 0 { Ok(n) } else { Err(TransportError::Closed) }
                }
                Ok(m) => Ok(n + m),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // The peeked byte must reach the caller; the error will
                // reproduce on the next read.
                Err(_) if n > 0 => Ok(n),
                Err(e) => Err(e.into()),
            };
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        loop {
            return match self.stream.write(data) {
                Ok(0) => Err(TransportError::Closed),
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Kernel buffer full; wait it out rather than drop
                    // part of a command stream.
                    match self.write_blocking(data) {
                        Ok(0) => Err(TransportError::Closed),
                        Ok(n) => Ok(n),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => Err(e.into()),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e.into()),
            };
        }
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.stream.flush()?;
        Ok(())
    }

    fn available(&self) -> bool {
        if self.peeked.get().is_some() || self.eof.get() {
            return true;
        }
        // The socket has no non-destructive probe on stable, so pull one
        // byte into the hand-back slot.
        let mut probe = [0u8; 1];
        match (&self.stream).read(&mut probe) {
            Ok(0) => {
                // Hangup also counts as readable: the next read must
                // surface `Closed`.
                self.eof.set(true);
                true
            }
            Ok(_) => {
                self.peeked.set(Some(probe[0]));
                true
            }
            Err(_) => false,
        }
    }
}
