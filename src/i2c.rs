//! I²C master access through a port.
//!
//! Every public operation is a composite transaction (start condition,
//! data phases, stop condition) issued inside a write batch, so the
//! byte sequence reaches the daemon as one contiguous unit and cannot
//! interleave with other traffic on the same port.

use log::debug;

use crate::error::{CallerError, Result};
use crate::port::{Ack, Port};
use crate::proto::codec::{Cmd, cmd0, cmd1};
use crate::proto::queue::Payload;
use crate::transport::Transport;

/// Highest valid 7-bit peripheral address.
const MAX_ADDRESS: u8 = 0x7F;

impl<T: Transport> Port<T> {
    /// Enable the I²C peripheral and return a handle bound to the
    /// 7-bit peripheral at `address`.
    ///
    /// Multiple handles with different addresses may coexist; the
    /// peripheral is enabled once per handle, which the daemon treats
    /// as idempotent.
    pub fn i2c(&self, address: u8) -> Result<I2c<T>> {
        I2c::new(self.clone(), address)
    }
}

/// One I²C peripheral on a port.
pub struct I2c<T: Transport> {
    port: Port<T>,
    address: u8,
}

impl<T: Transport> Clone for I2c<T> {
    fn clone(&self) -> Self {
        Self {
            port: self.port.clone(),
            address: self.address,
        }
    }
}

impl<T: Transport> I2c<T> {
    fn new(port: Port<T>, address: u8) -> Result<Self> {
        if address > MAX_ADDRESS {
            return Err(CallerError::InvalidAddress { address }.into());
        }
        port.simple_command(&cmd1(Cmd::EnableI2c, 0), None)?;
        port.set_mode(crate::port::PortMode::I2c);
        debug!("{}: i2c enabled, address {address:#04x}", port.name());
        Ok(Self { port, address })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Address byte with the read/write flag in bit 0.
    fn address_byte(&self, read: bool) -> u8 {
        (self.address << 1) | u8::from(read)
    }

    /// Write `data` to the peripheral. `done`, if given, runs once the
    /// stop condition is acknowledged.
    pub fn send(&self, data: &[u8], done: Option<Ack>) -> Result<()> {
        self.port.batch(|port| {
            port.simple_command(&cmd1(Cmd::Start, self.address_byte(false)), None)?;
            port.tx(data, None)?;
            port.simple_command(&cmd0(Cmd::Stop), done)
        })
    }

    /// Read `len` (1..=255) bytes from the peripheral.
    pub fn read(&self, len: usize, done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.port.batch(|port| {
            port.simple_command(&cmd1(Cmd::Start, self.address_byte(true)), None)?;
            port.rx(len, done)?;
            port.simple_command(&cmd0(Cmd::Stop), None)
        })
    }

    /// Write `data`, then read `read_len` bytes after a repeated start.
    /// The write phase is skipped when `data` is empty.
    pub fn transfer(
        &self,
        data: &[u8],
        read_len: usize,
        done: impl FnOnce(Payload) + 'static,
    ) -> Result<()> {
        self.port.batch(|port| {
            if !data.is_empty() {
                port.simple_command(&cmd1(Cmd::Start, self.address_byte(false)), None)?;
                port.tx(data, None)?;
            }
            port.simple_command(&cmd1(Cmd::Start, self.address_byte(true)), None)?;
            port.rx(read_len, done)?;
            port.simple_command(&cmd0(Cmd::Stop), None)
        })
    }

    /// Disable the I²C peripheral on the port.
    pub fn deinit(&self) -> Result<()> {
        self.port.simple_command(&cmd0(Cmd::DisableI2c), None)?;
        self.port.set_mode(crate::port::PortMode::None);
        Ok(())
    }
}
