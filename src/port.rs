//! One physical expansion port: its transport connection, reply queue,
//! stream decoder, and eight pins.
//!
//! The port is a cheap-clone handle over shared single-threaded state;
//! pins and peripheral adapters hold clones of it. Callers drive reply
//! decoding through [`Port::process`] — nothing here blocks or spawns.
//!
//! Multi-step transactions stay atomic on the wire through scoped write
//! batching: inside [`Port::batch`], writes accumulate and flush as one
//! unit when the scope exits, on success and on failure alike.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, trace, warn};

use crate::error::{CallerError, Error, ProtocolError, Result, TransportError};
use crate::pin::{InterruptMode, Listener, ListenerKind, Pin, PinState};
use crate::proto::codec::{Cmd, cmd1, tx_header};
use crate::proto::decoder::{DecodeEvent, StreamDecoder};
use crate::proto::queue::{Completion, Payload, Reply, ReplyEntry, ReplyQueue};
use crate::transport::Transport;

/// Pins per expansion port.
pub const PIN_COUNT: usize = 8;

const READ_BUF_SIZE: usize = 1024;

/// Probe byte for the echo-based synchronisation barrier.
const SYNC_PROBE: u8 = 0x88;

/// Optional acknowledgement callback for fire-and-forget commands.
pub type Ack = Box<dyn FnOnce() + 'static>;

/// Currently-active peripheral. Advisory only — nothing enforces
/// exclusivity, and the last enable command written wins at the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortMode {
    #[default]
    None,
    I2c,
    Spi,
    Uart,
}

/// The UART peripheral. Intentionally unimplemented upstream;
/// [`Port::uart`] always fails, so this type has no values.
pub enum Uart {}

// ── Shared port state ────────────────────────────────────────

pub(crate) struct PortInner<T: Transport> {
    name: String,
    transport: T,
    mode: PortMode,
    queue: ReplyQueue,
    decoder: StreamDecoder,
    pins: [PinState; PIN_COUNT],
    cork_depth: u32,
    batch: Vec<u8>,
    async_handlers: Vec<Box<dyn FnMut(u8)>>,
    /// Set after a protocol violation; the port is unrecoverable.
    poisoned: Option<ProtocolError>,
}

impl<T: Transport> PortInner<T> {
    fn new(name: String, transport: T) -> Self {
        Self {
            name,
            transport,
            mode: PortMode::None,
            queue: ReplyQueue::new(),
            decoder: StreamDecoder::new(),
            pins: core::array::from_fn(PinState::new),
            cork_depth: 0,
            batch: Vec::new(),
            async_handlers: Vec::new(),
            poisoned: None,
        }
    }

    fn check_poisoned(&self) -> Result<()> {
        match self.poisoned {
            Some(violation) => Err(violation.into()),
            None => Ok(()),
        }
    }

    pub(crate) fn pin_state(&self, index: usize) -> &PinState {
        &self.pins[index]
    }

    pub(crate) fn set_mode(&mut self, mode: PortMode) {
        self.mode = mode;
    }

    // ── Write path ───────────────────────────────────────────

    fn write_direct(transport: &mut T, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let written = transport.write(bytes)?;
            if written == 0 {
                return Err(TransportError::Closed.into());
            }
            bytes = &bytes[written..];
        }
        transport.flush()?;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("{}: > {:02x?}", self.name, bytes);
        if self.cork_depth > 0 {
            self.batch.extend_from_slice(bytes);
            return Ok(());
        }
        Self::write_direct(&mut self.transport, bytes)
    }

    pub(crate) fn cork(&mut self) {
        self.cork_depth += 1;
    }

    /// Leave one batch scope; the outermost release flushes everything
    /// accumulated, including bytes written before a mid-scope failure.
    pub(crate) fn uncork(&mut self) -> Result<()> {
        debug_assert!(self.cork_depth > 0);
        self.cork_depth = self.cork_depth.saturating_sub(1);
        if self.cork_depth == 0 && !self.batch.is_empty() {
            let bytes = std::mem::take(&mut self.batch);
            Self::write_direct(&mut self.transport, &bytes)?;
        }
        Ok(())
    }

    fn batched<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.cork();
        let result = f(self);
        let flushed = self.uncork();
        let value = result?;
        flushed?;
        Ok(value)
    }

    // ── Command primitives ───────────────────────────────────

    fn simple_command(&mut self, bytes: &[u8], completion: Option<Completion>) -> Result<()> {
        self.check_poisoned()?;
        self.write_all(bytes)?;
        if let Some(completion) = completion {
            self.queue.push(ReplyEntry {
                size: 0,
                completion: Some(completion),
            });
        }
        Ok(())
    }

    fn status_command(&mut self, bytes: &[u8], completion: Completion) -> Result<()> {
        self.check_poisoned()?;
        self.write_all(bytes)?;
        self.queue.push(ReplyEntry {
            size: 0,
            completion: Some(completion),
        });
        Ok(())
    }

    fn tx(&mut self, data: &[u8], completion: Option<Completion>) -> Result<()> {
        self.check_poisoned()?;
        let header = tx_header(Cmd::Tx, data.len())?;
        self.batched(|port| {
            port.write_all(&header)?;
            port.write_all(data)?;
            if let Some(completion) = completion {
                port.queue.push(ReplyEntry {
                    size: 0,
                    completion: Some(completion),
                });
            }
            Ok(())
        })
    }

    fn rx(&mut self, len: usize, completion: Completion) -> Result<()> {
        self.check_poisoned()?;
        let header = tx_header(Cmd::Rx, len)?;
        self.write_all(&header)?;
        self.queue.push(ReplyEntry {
            size: len as u8,
            completion: Some(completion),
        });
        Ok(())
    }

    fn txrx(&mut self, data: &[u8], completion: Completion) -> Result<()> {
        self.check_poisoned()?;
        let header = tx_header(Cmd::Txrx, data.len())?;
        self.batched(|port| {
            port.write_all(&header)?;
            port.write_all(data)?;
            port.queue.push(ReplyEntry {
                size: data.len() as u8,
                completion: Some(completion),
            });
            Ok(())
        })
    }

    fn echo(&mut self, data: &[u8], completion: Completion) -> Result<()> {
        self.check_poisoned()?;
        let header = tx_header(Cmd::Echo, data.len())?;
        self.batched(|port| {
            port.write_all(&header)?;
            port.write_all(data)?;
            port.queue.push(ReplyEntry {
                size: data.len() as u8,
                completion: Some(completion),
            });
            Ok(())
        })
    }

    // ── Interrupt state machine ──────────────────────────────

    pub(crate) fn arm_pin(
        &mut self,
        index: usize,
        mode: InterruptMode,
        one_shot: bool,
        kind: ListenerKind,
    ) -> Result<u32> {
        self.check_poisoned()?;
        if !self.pins[index].interrupt_supported {
            return Err(CallerError::InterruptsUnsupported { pin: index }.into());
        }
        if mode.is_level() && !one_shot {
            return Err(CallerError::LevelInterruptNotOneShot { mode }.into());
        }
        match self.pins[index].interrupt_mode {
            // Same mode already armed: listener only, nothing on the wire.
            Some(active) if active == mode => {}
            Some(active) => {
                return Err(CallerError::ConflictingInterruptMode {
                    active,
                    requested: mode,
                }
                .into());
            }
            None => {
                self.send_interrupt_command(index, Some(mode))?;
                self.pins[index].interrupt_mode = Some(mode);
                debug!("{}: pin {} armed for {}", self.name, index, mode);
            }
        }
        let pin = &mut self.pins[index];
        let id = pin.next_listener_id;
        pin.next_listener_id += 1;
        pin.listeners.push(Listener { id, kind });
        Ok(id)
    }

    fn send_interrupt_command(&mut self, index: usize, mode: Option<InterruptMode>) -> Result<()> {
        let bits = mode.map_or(0, |m| m.mask() << 4);
        let cmd = cmd1(Cmd::GpioInt, (index as u8) | bits);
        self.simple_command(&cmd, None)
    }

    pub(crate) fn release_listener(&mut self, index: usize, id: u32) -> Result<()> {
        let pin = &mut self.pins[index];
        if pin.delivering {
            // The listener set is out for delivery; the removal (and any
            // resulting disarm) applies when the set is rebuilt.
            pin.pending_removals.push(id);
            return Ok(());
        }
        let before = pin.listeners.len();
        pin.listeners.retain(|l| l.id != id);
        if pin.listeners.len() == before {
            // Already gone — a fired one-shot, or a poisoned teardown.
            return Ok(());
        }
        let disarm = pin.listeners.is_empty() && pin.interrupt_mode.is_some();
        if disarm {
            self.pins[index].interrupt_mode = None;
            self.send_interrupt_command(index, None)?;
            debug!("{}: pin {} disarmed", self.name, index);
        }
        Ok(())
    }

    // ── Read path ────────────────────────────────────────────

    /// Read everything currently available and decode it.
    ///
    /// Events decoded before a mid-pass failure are still returned —
    /// their queue entries are already consumed, and every completion
    /// whose reply arrived must fire exactly once.
    fn drain(&mut self) -> (Vec<DecodeEvent>, Option<Error>) {
        let mut out = Vec::new();
        if let Err(e) = self.check_poisoned() {
            return (out, Some(e));
        }
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = match self.transport.read(&mut buf) {
                Ok(n) => n,
                Err(e) => return (out, Some(e.into())),
            };
            if n == 0 {
                break;
            }
            trace!("{}: < {:02x?}", self.name, &buf[..n]);
            if let Err(violation) = self.decoder.feed(&buf[..n], &mut self.queue, &mut out) {
                error!("{}: {}", self.name, violation);
                self.poisoned = Some(violation);
                return (out, Some(violation.into()));
            }
        }
        (out, None)
    }
}

// ── Public port handle ───────────────────────────────────────

/// One physical expansion port and its dedicated daemon connection.
pub struct Port<T: Transport> {
    inner: Rc<RefCell<PortInner<T>>>,
}

impl<T: Transport> Clone for Port<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Port<T> {
    /// Wrap an established daemon connection.
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(PortInner::new(name.into(), transport))),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<PortInner<T>>> {
        &self.inner
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Advisory record of the active peripheral.
    pub fn mode(&self) -> PortMode {
        self.inner.borrow().mode
    }

    pub(crate) fn set_mode(&self, mode: PortMode) {
        self.inner.borrow_mut().set_mode(mode);
    }

    /// Number of commands issued but not yet acknowledged.
    pub fn pending_replies(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// True when the transport has bytes waiting for [`Port::process`].
    pub fn readable(&self) -> bool {
        self.inner.borrow().transport.available()
    }

    /// Handle to pin `index` (0..8).
    pub fn pin(&self, index: usize) -> Result<Pin<T>> {
        if index >= PIN_COUNT {
            return Err(CallerError::InvalidPin { pin: index }.into());
        }
        Ok(Pin::new(index, self.clone()))
    }

    /// The UART peripheral is intentionally unimplemented; this always
    /// fails.
    pub fn uart(&self) -> Result<Uart> {
        Err(CallerError::UartUnsupported.into())
    }

    /// Register a handler for generic asynchronous events (the non-pin
    /// async range). Handlers observe every such byte, in arrival order.
    pub fn on_async_event(&self, handler: impl FnMut(u8) + 'static) {
        self.inner
            .borrow_mut()
            .async_handlers
            .push(Box::new(handler));
    }

    // ── Scoped write batching ────────────────────────────────

    /// Run `f` with writes batched; everything flushes as one contiguous
    /// unit when the scope exits, including on failure. Scopes nest — only
    /// the outermost release flushes.
    pub fn batch<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        self.inner.borrow_mut().cork();
        let result = f(self);
        let flushed = self.inner.borrow_mut().uncork();
        let value = result?;
        flushed?;
        Ok(value)
    }

    // ── Low-level command primitives ─────────────────────────

    /// Write a fixed-layout command. With `done`, a zero-payload ack
    /// expectation is appended: a synchronisation barrier confirming
    /// everything before it was processed.
    pub fn simple_command(&self, bytes: &[u8], done: Option<Ack>) -> Result<()> {
        let completion = done.map(|done| -> Completion { Box::new(move |_reply| done()) });
        self.inner.borrow_mut().simple_command(bytes, completion)
    }

    /// Write a command whose single reply byte is the result (e.g. a GPIO
    /// read).
    pub fn status_command(&self, bytes: &[u8], done: impl FnOnce(u8) + 'static) -> Result<()> {
        let completion: Completion = Box::new(move |reply| {
            if let Reply::Byte(byte) = reply {
                done(byte);
            }
        });
        self.inner.borrow_mut().status_command(bytes, completion)
    }

    /// Transmit 1..=255 bytes to the active peripheral.
    pub fn tx(&self, data: &[u8], done: Option<Ack>) -> Result<()> {
        let completion = done.map(|done| -> Completion { Box::new(move |_reply| done()) });
        self.inner.borrow_mut().tx(data, completion)
    }

    /// Receive `len` (1..=255) bytes from the active peripheral.
    pub fn rx(&self, len: usize, done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.inner.borrow_mut().rx(len, data_completion(done))
    }

    /// Full-duplex transfer: transmit `data`, receive the same number of
    /// bytes.
    pub fn txrx(&self, data: &[u8], done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.inner.borrow_mut().txrx(data, data_completion(done))
    }

    /// Ask the daemon to echo `data` back.
    pub fn echo(&self, data: &[u8], done: impl FnOnce(Payload) + 'static) -> Result<()> {
        self.inner.borrow_mut().echo(data, data_completion(done))
    }

    /// Barrier: `done` runs once every previously-issued command has been
    /// processed by the daemon.
    pub fn sync(&self, done: impl FnOnce() + 'static) -> Result<()> {
        self.echo(&[SYNC_PROBE], move |_| done())
    }

    // ── Drive loop ───────────────────────────────────────────

    /// Decode everything the transport currently has and deliver the
    /// results: completions in FIFO issue order, pin-change events to the
    /// armed pin's listeners, generic async events to the event handlers.
    ///
    /// Callbacks run after internal state is released, so they may issue
    /// new commands on this port.
    ///
    /// When the pass ends in an error, everything decoded before the
    /// failure point is delivered first, then the error is returned.
    pub fn process(&self) -> Result<()> {
        let (events, error) = self.inner.borrow_mut().drain();
        for event in events {
            match event {
                DecodeEvent::Completion { entry, reply } => {
                    if let Some(completion) = entry.completion {
                        completion(reply);
                    }
                }
                DecodeEvent::PinChange { pin } => self.deliver_pin_change(pin),
                DecodeEvent::AsyncEvent { byte } => self.deliver_async(byte),
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn deliver_async(&self, byte: u8) {
        let mut handlers = std::mem::take(&mut self.inner.borrow_mut().async_handlers);
        if handlers.is_empty() {
            debug!("async event {byte:#04x} with no handlers");
        }
        for handler in &mut handlers {
            handler(byte);
        }
        // Handlers registered during delivery land after the existing set.
        let mut inner = self.inner.borrow_mut();
        let added = std::mem::take(&mut inner.async_handlers);
        handlers.extend(added);
        inner.async_handlers = handlers;
    }

    fn deliver_pin_change(&self, index: usize) {
        let (mode, fired) = {
            let mut inner = self.inner.borrow_mut();
            let pin = &mut inner.pins[index];
            let Some(mode) = pin.interrupt_mode else {
                warn!("pin {index} change event with no armed mode");
                return;
            };
            // Level triggers are one-shot: the hardware has already
            // disarmed, so clear the mode before delivering.
            if mode.is_level() {
                pin.interrupt_mode = None;
            }
            pin.delivering = true;
            (mode, std::mem::take(&mut pin.listeners))
        };

        let mut survivors = Vec::new();
        for listener in fired {
            match listener.kind {
                ListenerKind::Once(f) => f(mode),
                ListenerKind::Recurring(mut f) => {
                    f(mode);
                    survivors.push(Listener {
                        id: listener.id,
                        kind: ListenerKind::Recurring(f),
                    });
                }
            }
        }

        let disarm = {
            let mut inner = self.inner.borrow_mut();
            let pin = &mut inner.pins[index];
            let added = std::mem::take(&mut pin.listeners);
            survivors.extend(added);
            // Subscriptions released from inside a listener queued their
            // ids instead of mutating the set we were iterating.
            let removals = std::mem::take(&mut pin.pending_removals);
            survivors.retain(|l| !removals.contains(&l.id));
            pin.listeners = survivors;
            pin.delivering = false;
            pin.listeners.is_empty() && pin.interrupt_mode.is_some()
        };
        if disarm {
            // The last one-shot listener on an edge mode was just consumed.
            let mut inner = self.inner.borrow_mut();
            inner.pins[index].interrupt_mode = None;
            if let Err(e) = inner.send_interrupt_command(index, None) {
                warn!("pin {index}: disarm after delivery failed: {e}");
            }
        }
    }
}

fn data_completion(done: impl FnOnce(Payload) + 'static) -> Completion {
    Box::new(move |reply| {
        if let Reply::Data(payload) = reply {
            done(payload);
        }
    })
}
