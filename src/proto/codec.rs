//! Opcode table, reply-byte constants, and pure command encoders.
//!
//! Single source of truth — the numeric values are a fixed contract with
//! the daemon. Nothing in here holds state or touches a transport.

use crate::error::CallerError;

/// Largest payload a tx-class command can carry; the length field is one
/// byte and zero is reserved. Callers must pre-chunk larger transfers.
pub const MAX_PAYLOAD: usize = 255;

/// Command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    Nop = 0,
    Flush = 1,
    Echo = 2,

    GpioIn = 10,
    GpioHigh = 11,
    GpioLow = 12,
    GpioToggle = 13,
    GpioCfg = 14,
    GpioWait = 15,
    GpioInt = 16,
    GpioInput = 17,
    GpioOutput = 18,
    GpioRawRead = 19,

    EnableSpi = 30,
    DisableSpi = 31,

    EnableI2c = 40,
    DisableI2c = 41,
    Start = 42,
    Stop = 43,

    EnableUart = 50,
    DisableUart = 51,

    Tx = 60,
    Rx = 61,
    Txrx = 62,
}

impl Cmd {
    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

/// Reply bytes.
pub mod reply {
    pub const ACK: u8 = 0x80;
    pub const NACK: u8 = 0x81;
    pub const HIGH: u8 = 0x82;
    pub const LOW: u8 = 0x83;
    /// Marker: the queue head's payload follows.
    pub const DATA: u8 = 0x84;

    /// Everything at or above this value is an unsolicited event.
    pub const MIN_ASYNC: u8 = 0xA0;
    /// Base of the 8-wide pin-change sub-range; pin index = offset.
    pub const ASYNC_PIN_CHANGE_BASE: u8 = 0xC0;
    pub const PIN_CHANGE_SPAN: u8 = 8;
}

// ── Encoders ─────────────────────────────────────────────────

/// Bare opcode.
pub const fn cmd0(cmd: Cmd) -> [u8; 1] {
    [cmd as u8]
}

/// Opcode + one parameter byte.
pub const fn cmd1(cmd: Cmd, a: u8) -> [u8; 2] {
    [cmd as u8, a]
}

/// Opcode + two parameter bytes.
pub const fn cmd2(cmd: Cmd, a: u8, b: u8) -> [u8; 3] {
    [cmd as u8, a, b]
}

/// Header for a length-prefixed tx-class command (`TX`, `RX`, `TXRX`,
/// `ECHO`). The raw payload follows the header on the wire.
///
/// Rejects length 0 and lengths above [`MAX_PAYLOAD`] before anything is
/// written; a too-large transfer fails fast rather than silently truncating.
pub fn tx_header(cmd: Cmd, len: usize) -> Result<[u8; 2], CallerError> {
    if len == 0 || len > MAX_PAYLOAD {
        return Err(CallerError::InvalidLength { len });
    }
    Ok([cmd as u8, len as u8])
}
