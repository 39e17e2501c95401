//! SPI master access through a port.
//!
//! Configuration is validated up front in [`Port::spi`]: an out-of-range
//! clock or bad chip-select pin fails before a single byte is written.
//! Every transfer wraps its chip-select assert and deassert around the
//! data command inside one write batch, honouring the configured
//! active level in both directions.

use log::debug;

use crate::error::{CallerError, Result};
use crate::pin::Pin;
use crate::port::{Ack, Port, PortMode};
use crate::proto::codec::{Cmd, cmd0, cmd2};
use crate::proto::queue::Payload;
use crate::transport::Transport;

/// Reference clock feeding the SPI divider.
pub const SPI_REF_CLOCK_HZ: u32 = 48_000_000;
/// Slowest representable SPI clock (divider register saturated).
pub const SPI_MIN_CLOCK_HZ: u32 = 93_750;
/// Fastest supported SPI clock.
pub const SPI_MAX_CLOCK_HZ: u32 = 24_000_000;

const DEFAULT_CLOCK_HZ: u32 = 2_000_000;
const DEFAULT_CHIP_SELECT: usize = 5;

/// Divider register value for `speed`. Truncates toward the next
/// representable speed at or below the request.
fn clock_divisor(speed: u32) -> core::result::Result<u8, CallerError> {
    if !(SPI_MIN_CLOCK_HZ..=SPI_MAX_CLOCK_HZ).contains(&speed) {
        return Err(CallerError::ClockOutOfRange { requested_hz: speed });
    }
    Ok((SPI_REF_CLOCK_HZ / (2 * speed) - 1) as u8)
}

/// Electrical level that asserts the chip-select line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChipSelectActive {
    #[default]
    Low,
    High,
}

/// Clock idle level (CPOL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPolarity {
    #[default]
    IdleLow,
    IdleHigh,
}

/// Sampling edge (CPHA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPhase {
    #[default]
    FirstEdge,
    SecondEdge,
}

/// SPI bus parameters. The defaults are 2 MHz, mode 0, active-low
/// chip select on pin 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    pub chip_select: usize,
    pub chip_select_active: ChipSelectActive,
    pub clock_speed: u32,
    pub polarity: ClockPolarity,
    pub phase: ClockPhase,
    /// Numeric SPI mode 0..=3. When set, overrides `polarity` (bit 0)
    /// and `phase` (bit 1).
    pub data_mode: Option<u8>,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            chip_select: DEFAULT_CHIP_SELECT,
            chip_select_active: ChipSelectActive::default(),
            clock_speed: DEFAULT_CLOCK_HZ,
            polarity: ClockPolarity::default(),
            phase: ClockPhase::default(),
            data_mode: None,
        }
    }
}

impl SpiConfig {
    /// CPOL and CPHA bits after applying any `data_mode` override.
    fn mode_bits(&self) -> (u8, u8) {
        match self.data_mode {
            Some(mode) => (mode & 1, (mode >> 1) & 1),
            None => (
                u8::from(self.polarity == ClockPolarity::IdleHigh),
                u8::from(self.phase == ClockPhase::SecondEdge),
            ),
        }
    }
}

impl<T: Transport> Port<T> {
    /// Enable the SPI peripheral with `config`.
    ///
    /// The chip-select pin is parked at its inactive level before the
    /// enable command, inside the same write batch.
    pub fn spi(&self, config: SpiConfig) -> Result<Spi<T>> {
        Spi::new(self.clone(), config)
    }
}

/// The SPI peripheral on a port.
pub struct Spi<T: Transport> {
    port: Port<T>,
    chip_select: Pin<T>,
    active: ChipSelectActive,
}

impl<T: Transport> Spi<T> {
    fn new(port: Port<T>, config: SpiConfig) -> Result<Self> {
        // Validate everything before the first write.
        let divisor = clock_divisor(config.clock_speed)?;
        let chip_select = port.pin(config.chip_select)?;
        let (cpol, cpha) = config.mode_bits();

        let spi = Self {
            port,
            chip_select,
            active: config.chip_select_active,
        };
        spi.port.batch(|port| {
            spi.deselect(None)?;
            port.simple_command(&cmd2(Cmd::EnableSpi, cpol | (cpha << 1), divisor), None)
        })?;
        spi.port.set_mode(PortMode::Spi);
        debug!(
            "{}: spi enabled, {} Hz (divisor {divisor}), cpol {cpol} cpha {cpha}, cs pin {}",
            spi.port.name(),
            config.clock_speed,
            config.chip_select
        );
        Ok(spi)
    }

    fn select(&self) -> Result<()> {
        match self.active {
            ChipSelectActive::Low => self.chip_select.low(None),
            ChipSelectActive::High => self.chip_select.high(None),
        }
    }

    fn deselect(&self, done: Option<Ack>) -> Result<()> {
        match self.active {
            ChipSelectActive::Low => self.chip_select.high(done),
            ChipSelectActive::High => self.chip_select.low(done),
        }
    }

    /// Transmit `data` with chip select held asserted. `done`, if given,
    /// runs once the daemon acknowledges the deassert.
    pub fn send(&self, data: &[u8], done: Option<Ack>) -> Result<()> {
        self.port.batch(|port| {
            self.select()?;
            port.tx(data, None)?;
            self.deselect(done)
        })
    }

    /// Clock in `len` (1..=255) bytes with chip select held asserted.
    pub fn receive(&self, len: usize, done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.port.batch(|port| {
            self.select()?;
            port.rx(len, done)?;
            self.deselect(None)
        })
    }

    /// Full-duplex transfer of `data.len()` bytes.
    pub fn transfer(&self, data: &[u8], done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.port.batch(|port| {
            self.select()?;
            port.txrx(data, done)?;
            self.deselect(None)
        })
    }

    /// Disable the SPI peripheral. The chip-select pin keeps its level.
    pub fn deinit(&self) -> Result<()> {
        self.port.simple_command(&cmd0(Cmd::DisableSpi), None)?;
        self.port.set_mode(PortMode::None);
        Ok(())
    }
}
