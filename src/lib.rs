//! Host-side driver for the expansion-port I/O daemon.
//!
//! One persistent, ordered byte-stream connection per physical expansion
//! port. High-level peripheral operations (GPIO, interrupts, SPI, I2C) are
//! encoded into a compact binary command protocol; the daemon's replies —
//! synchronous acknowledgements, data payloads, and unsolicited asynchronous
//! events — come back as typed results and pin-change notifications.
//!
//! ```text
//!  peripheral call ──▶ encoder ──▶ Port writes (batched) ──▶ daemon
//!                                  │
//!                                  └─ ReplyQueue records expectation
//!  daemon bytes ──▶ StreamDecoder ──▶ FIFO match ──▶ completion
//!                        └──▶ async event ──▶ pin listeners / event sink
//! ```
//!
//! The engine is single-threaded and cooperative: the caller drives reply
//! decoding through [`Port::process`], and no operation blocks.

#![deny(unused_must_use)]

pub mod adapters;
#[cfg(unix)]
pub mod board;
pub mod config;
pub mod proto;
pub mod transport;

mod error;
mod i2c;
mod pin;
mod port;
mod spi;

#[cfg(unix)]
pub use board::Board;
pub use config::{BoardConfig, PortConfig};
pub use error::{CallerError, Error, ProtocolError, Result, TransportError};
pub use i2c::I2c;
pub use pin::{InterruptMode, Pin, Subscription};
pub use port::{Ack, PIN_COUNT, Port, PortMode, Uart};
pub use proto::queue::{Payload, Reply};
pub use spi::{
    ChipSelectActive, ClockPhase, ClockPolarity, SPI_MAX_CLOCK_HZ, SPI_MIN_CLOCK_HZ,
    SPI_REF_CLOCK_HZ, Spi, SpiConfig,
};
pub use transport::{NullTransport, Transport};
