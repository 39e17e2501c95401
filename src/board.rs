//! The board: both expansion ports behind their daemon sockets.
//!
//! An explicit value, constructed from a [`BoardConfig`] — nothing here
//! is global, and two boards in one process stay fully independent.

use log::info;

use crate::adapters::UnixSocketTransport;
use crate::config::BoardConfig;
use crate::error::Result;
use crate::port::Port;

pub struct Board {
    port_a: Port<UnixSocketTransport>,
    port_b: Port<UnixSocketTransport>,
}

impl Board {
    /// Connect to both port daemons named by `config`.
    pub fn connect(config: &BoardConfig) -> Result<Self> {
        let port_a = Port::new(
            config.port_a.name.clone(),
            UnixSocketTransport::connect(&config.port_a.socket_path)?,
        );
        let port_b = Port::new(
            config.port_b.name.clone(),
            UnixSocketTransport::connect(&config.port_b.socket_path)?,
        );
        info!("board connected: ports {}, {}", port_a.name(), port_b.name());
        Ok(Self { port_a, port_b })
    }

    pub fn port_a(&self) -> &Port<UnixSocketTransport> {
        &self.port_a
    }

    pub fn port_b(&self) -> &Port<UnixSocketTransport> {
        &self.port_b
    }

    /// Look a port up by its configured name.
    pub fn port(&self, name: &str) -> Option<&Port<UnixSocketTransport>> {
        if self.port_a.name() == name {
            Some(&self.port_a)
        } else if self.port_b.name() == name {
            Some(&self.port_b)
        } else {
            None
        }
    }

    /// True when either port has undecoded input waiting.
    pub fn readable(&self) -> bool {
        self.port_a.readable() || self.port_b.readable()
    }

    /// Drive both ports' decode loops once.
    pub fn process(&self) -> Result<()> {
        self.port_a.process()?;
        self.port_b.process()
    }
}
