//! GPIO pins and the per-pin interrupt state machine.
//!
//! A pin supports exactly one armed interrupt mode at a time. Arming and
//! disarming are explicit operations: [`Pin::arm`] / [`Pin::arm_once`]
//! return a [`Subscription`] whose release removes the listener and sends
//! the disarm command when it was the last subscriber. Level modes
//! (`high`/`low`) are inherently single-fire: the hardware disarms itself
//! after the first event, so they must be registered one-shot.

use std::rc::Rc;

use log::warn;

use crate::error::{CallerError, Result};
use crate::port::{Ack, Port, PortInner};
use crate::proto::codec::{Cmd, cmd1};
use crate::transport::Transport;

/// Interrupt trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptMode {
    Rise,
    Fall,
    Change,
    /// Level trigger; fires once, then the pin disarms itself.
    High,
    /// Level trigger; fires once, then the pin disarms itself.
    Low,
}

impl InterruptMode {
    /// Bitmask value in the GPIO_INT command parameter.
    pub const fn mask(self) -> u8 {
        match self {
            Self::Rise => 1,
            Self::Fall => 2,
            Self::Change => 3,
            Self::High => 4,
            Self::Low => 5,
        }
    }

    /// Level triggers are one-shot at the hardware.
    pub const fn is_level(self) -> bool {
        matches!(self, Self::High | Self::Low)
    }
}

impl core::fmt::Display for InterruptMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Rise => "rise",
            Self::Fall => "fall",
            Self::Change => "change",
            Self::High => "high",
            Self::Low => "low",
        };
        write!(f, "{name}")
    }
}

// ── Per-pin state, owned by the port ─────────────────────────

pub(crate) enum ListenerKind {
    Recurring(Box<dyn FnMut(InterruptMode)>),
    Once(Box<dyn FnOnce(InterruptMode)>),
}

pub(crate) struct Listener {
    pub id: u32,
    pub kind: ListenerKind,
}

pub(crate) struct PinState {
    pub interrupt_supported: bool,
    pub is_pwm: bool,
    pub interrupt_mode: Option<InterruptMode>,
    pub listeners: Vec<Listener>,
    pub next_listener_id: u32,
    /// True while the listener set is out for event delivery; releases
    /// arriving meanwhile are queued in `pending_removals` and applied
    /// when the set is rebuilt.
    pub delivering: bool,
    pub pending_removals: Vec<u32>,
}

impl PinState {
    pub fn new(index: usize) -> Self {
        Self {
            interrupt_supported: matches!(index, 2 | 5 | 6 | 7),
            is_pwm: false,
            interrupt_mode: None,
            listeners: Vec::new(),
            next_listener_id: 0,
            delivering: false,
            pending_removals: Vec::new(),
        }
    }
}

// ── Public pin handle ────────────────────────────────────────

/// One of the eight GPIO pins on a port. Cheap to clone; all state lives
/// in the owning port.
pub struct Pin<T: Transport> {
    index: usize,
    port: Port<T>,
}

impl<T: Transport> Clone for Pin<T> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            port: self.port.clone(),
        }
    }
}

impl<T: Transport> Pin<T> {
    pub(crate) fn new(index: usize, port: Port<T>) -> Self {
        Self { index, port }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn interrupt_supported(&self) -> bool {
        self.port.inner().borrow().pin_state(self.index).interrupt_supported
    }

    pub fn is_pwm(&self) -> bool {
        self.port.inner().borrow().pin_state(self.index).is_pwm
    }

    /// Currently-armed interrupt mode, if any.
    pub fn interrupt_mode(&self) -> Option<InterruptMode> {
        self.port.inner().borrow().pin_state(self.index).interrupt_mode
    }

    /// Number of registered interrupt listeners.
    pub fn listener_count(&self) -> usize {
        self.port.inner().borrow().pin_state(self.index).listeners.len()
    }

    // ── GPIO operations ──────────────────────────────────────

    /// Drive the pin high.
    pub fn high(&self, done: Option<Ack>) -> Result<()> {
        self.port
            .simple_command(&cmd1(Cmd::GpioHigh, self.index as u8), done)
    }

    /// Drive the pin low.
    pub fn low(&self, done: Option<Ack>) -> Result<()> {
        self.port
            .simple_command(&cmd1(Cmd::GpioLow, self.index as u8), done)
    }

    /// Invert the pin's output level.
    pub fn toggle(&self, done: Option<Ack>) -> Result<()> {
        self.port
            .simple_command(&cmd1(Cmd::GpioToggle, self.index as u8), done)
    }

    /// Configure as output at the given initial level.
    pub fn output(&self, value: bool, done: Option<Ack>) -> Result<()> {
        if value { self.high(done) } else { self.low(done) }
    }

    /// Same as [`Pin::output`].
    pub fn write(&self, value: bool, done: Option<Ack>) -> Result<()> {
        self.output(value, done)
    }

    /// Configure as input.
    pub fn input(&self, done: Option<Ack>) -> Result<()> {
        self.port
            .simple_command(&cmd1(Cmd::GpioInput, self.index as u8), done)
    }

    /// Set the pin direction without touching pull configuration.
    pub fn raw_direction(&self, is_output: bool, done: Option<Ack>) -> Result<()> {
        let cmd = if is_output {
            Cmd::GpioOutput
        } else {
            Cmd::GpioInput
        };
        self.port.simple_command(&cmd1(cmd, self.index as u8), done)
    }

    /// Read the pin, configuring it as an input first.
    /// The callback receives `true` for a high level.
    pub fn read(&self, done: impl FnOnce(bool) + 'static) -> Result<()> {
        self.port
            .status_command(&cmd1(Cmd::GpioIn, self.index as u8), move |byte| {
                done(byte == crate::proto::codec::reply::HIGH);
            })
    }

    /// Read the pin level without reconfiguring it. The callback receives
    /// the raw reply byte.
    pub fn raw_read(&self, done: impl FnOnce(u8) + 'static) -> Result<()> {
        self.port
            .status_command(&cmd1(Cmd::GpioRawRead, self.index as u8), done)
    }

    /// Pulse-duration measurement. Guaranteed failure; the daemon does not
    /// implement it.
    pub fn read_pulse(&self) -> Result<()> {
        Err(CallerError::PulseReadUnsupported.into())
    }

    // ── Interrupt arming ─────────────────────────────────────

    /// Arm `mode` and register a recurring listener.
    ///
    /// Level modes are rejected here — use [`Pin::arm_once`]. Arming while
    /// a different mode is active fails without sending anything; arming
    /// the same mode again adds the listener with no wire command.
    pub fn arm(
        &self,
        mode: InterruptMode,
        listener: impl FnMut(InterruptMode) + 'static,
    ) -> Result<Subscription<T>> {
        let id = self.port.inner().borrow_mut().arm_pin(
            self.index,
            mode,
            false,
            ListenerKind::Recurring(Box::new(listener)),
        )?;
        Ok(self.subscription(id))
    }

    /// Arm `mode` and register a one-shot listener. The only way to listen
    /// for the level modes.
    pub fn arm_once(
        &self,
        mode: InterruptMode,
        listener: impl FnOnce(InterruptMode) + 'static,
    ) -> Result<Subscription<T>> {
        let id = self.port.inner().borrow_mut().arm_pin(
            self.index,
            mode,
            true,
            ListenerKind::Once(Box::new(listener)),
        )?;
        Ok(self.subscription(id))
    }

    fn subscription(&self, id: u32) -> Subscription<T> {
        Subscription {
            pin: self.index,
            id,
            port: Rc::downgrade(self.port.inner()),
            released: false,
        }
    }
}

// ── Subscription handle ──────────────────────────────────────

/// Handle to a registered interrupt listener.
///
/// Releasing it (explicitly or by drop) removes the listener; removing the
/// last listener for the active mode disarms the pin on the wire. A
/// subscription whose one-shot listener has already fired releases as a
/// no-op.
pub struct Subscription<T: Transport> {
    pin: usize,
    id: u32,
    port: std::rc::Weak<std::cell::RefCell<PortInner<T>>>,
    released: bool,
}

impl<T: Transport> Subscription<T> {
    /// Remove the listener, disarming the pin if it was the last one.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let Some(inner) = self.port.upgrade() else {
            return Ok(());
        };
        inner.borrow_mut().release_listener(self.pin, self.id)
    }
}

impl<T: Transport> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("pin {}: disarm on drop failed: {}", self.pin, e);
        }
    }
}
