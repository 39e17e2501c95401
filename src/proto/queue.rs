//! The FIFO list of pending synchronous command expectations.
//!
//! Entries are appended in the exact order their commands are written to
//! the transport and consumed strictly front-first as replies arrive.
//! Invariant: queue length equals the number of synchronous commands issued
//! but not yet acknowledged.

use std::collections::VecDeque;

use super::codec::reply;

/// A reply payload. The wire bounds payloads at 255 bytes, so a
/// fixed-capacity buffer always suffices.
pub type Payload = heapless::Vec<u8, 256>;

/// Build a payload from wire bytes. `bytes` never exceeds
/// [`super::codec::MAX_PAYLOAD`], which the capacity covers.
pub(crate) fn payload_from(bytes: &[u8]) -> Payload {
    let mut payload = Payload::new();
    let _ = payload.extend_from_slice(bytes);
    payload
}

/// The value a completed expectation resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A bare reply byte (ack/nack/high/low) for zero-payload expectations.
    Byte(u8),
    /// The payload that followed a data marker.
    Data(Payload),
}

impl Reply {
    pub fn byte(&self) -> Option<u8> {
        match self {
            Self::Byte(b) => Some(*b),
            Self::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Byte(_) => None,
            Self::Data(p) => Some(p),
        }
    }

    pub fn is_high(&self) -> bool {
        self.byte() == Some(reply::HIGH)
    }
}

/// Invoked exactly once when the expectation's reply arrives.
pub type Completion = Box<dyn FnOnce(Reply) + 'static>;

/// One pending synchronous expectation.
pub struct ReplyEntry {
    /// Expected payload size; 0 means a single reply byte terminates it.
    pub size: u8,
    pub completion: Option<Completion>,
}

/// Ordered list of pending expectations, matched one-to-one against
/// decoder output.
#[derive(Default)]
pub struct ReplyQueue {
    entries: VecDeque<ReplyEntry>,
}

impl ReplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation. Must happen in command-write order; the
    /// decoder matches strictly FIFO.
    pub fn push(&mut self, entry: ReplyEntry) {
        self.entries.push_back(entry);
    }

    /// Consume the head expectation.
    pub fn pop(&mut self) -> Option<ReplyEntry> {
        self.entries.pop_front()
    }

    /// Expected payload size of the head, or `None` when nothing is pending.
    pub fn head_size(&self) -> Option<u8> {
        self.entries.front().map(|e| e.size)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
