//! Unified error types for the port protocol engine.
//!
//! A single `Error` funnel that every subsystem converts into, keeping the
//! caller's error handling uniform. Caller errors fail synchronously before
//! any bytes reach the wire; protocol violations mean the host and daemon
//! have desynchronised and are fatal to the affected port.

use core::fmt;

use crate::pin::InterruptMode;

// ---------------------------------------------------------------------------
// Top-level driver error
// ---------------------------------------------------------------------------

/// Every fallible operation in the driver funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// The caller asked for something the protocol cannot express.
    Caller(CallerError),
    /// The reply stream desynchronised from the command stream.
    Protocol(ProtocolError),
    /// The byte-stream connection to the daemon failed.
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller(e) => write!(f, "caller: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Caller errors
// ---------------------------------------------------------------------------

/// Rejected before any command bytes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerError {
    /// A tx-class payload must be 1..=255 bytes; the length field is one
    /// byte and chunking across commands is not implemented.
    InvalidLength { len: usize },
    /// Requested SPI clock is outside the hardware range.
    ClockOutOfRange { requested_hz: u32 },
    /// The pin has no interrupt capability.
    InterruptsUnsupported { pin: usize },
    /// Level modes (`high`/`low`) fire exactly once and must be armed
    /// with a one-shot registration.
    LevelInterruptNotOneShot { mode: InterruptMode },
    /// A different interrupt mode is already armed on this pin.
    ConflictingInterruptMode {
        active: InterruptMode,
        requested: InterruptMode,
    },
    /// Pin index outside 0..8.
    InvalidPin { pin: usize },
    /// I2C addresses are 7-bit.
    InvalidAddress { address: u8 },
    /// The UART peripheral is intentionally unimplemented.
    UartUnsupported,
    /// Pulse-duration measurement is intentionally unimplemented.
    PulseReadUnsupported,
}

impl fmt::Display for CallerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { len } => {
                write!(f, "payload length {len} outside 1..=255")
            }
            Self::ClockOutOfRange { requested_hz } => {
                write!(f, "SPI clock {requested_hz} Hz outside 93750..=24000000")
            }
            Self::InterruptsUnsupported { pin } => {
                write!(f, "interrupts not supported on pin {pin}")
            }
            Self::LevelInterruptNotOneShot { mode } => {
                write!(f, "level mode {mode} requires a one-shot registration")
            }
            Self::ConflictingInterruptMode { active, requested } => {
                write!(f, "cannot arm {requested}; already armed for {active}")
            }
            Self::InvalidPin { pin } => write!(f, "no pin {pin} on this port"),
            Self::InvalidAddress { address } => {
                write!(f, "I2C address {address:#04x} exceeds 7 bits")
            }
            Self::UartUnsupported => write!(f, "UART is not implemented"),
            Self::PulseReadUnsupported => write!(f, "pulse read is not implemented"),
        }
    }
}

impl From<CallerError> for Error {
    fn from(e: CallerError) -> Self {
        Self::Caller(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------------------

/// Fatal decode-time desync. `Copy` so the port can keep its poison state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// A synchronous reply byte arrived with no command pending.
    UnexpectedReply { byte: u8 },
    /// A data-follows marker arrived when the queue head expects no payload.
    UnexpectedData,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedReply { byte } => {
                write!(f, "unexpected reply {byte:#04x} with no commands pending")
            }
            Self::UnexpectedData => write!(f, "unexpected data packet"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Transport failures
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TransportError {
    /// The daemon closed the stream. Fatal to the port; no reconnection.
    Closed,
    /// An I/O error from the underlying stream.
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "stream closed"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
