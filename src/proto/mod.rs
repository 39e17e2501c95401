//! The port protocol: opcode tables, pure command encoders, the FIFO reply
//! queue, and the resumable stream decoder.
//!
//! Wire format, host → daemon:
//! ```text
//! ┌────────┬──────────────┐      ┌────────┬──────┬─────────────┐
//! │ opcode │ 0–2 params   │  or  │ opcode │ len  │ payload     │
//! │ (1B)   │              │      │ (1B)   │ (1B) │ (1–255 B)   │
//! └────────┴──────────────┘      └────────┴──────┴─────────────┘
//! ```
//!
//! Daemon → host, one byte classifies each reply: values below
//! [`codec::reply::MIN_ASYNC`] are synchronous (matched FIFO against pending
//! commands, optionally followed by a payload after the DATA marker); values
//! at or above it are unsolicited events, with an 8-wide sub-range reserved
//! for per-pin change notifications.

pub mod codec;
pub mod decoder;
pub mod queue;
