//! Resumable stream decoder.
//!
//! Consumes raw bytes from the transport, classifies each reply byte as
//! synchronous-ack, synchronous-data, or asynchronous-event, and matches
//! synchronous replies strictly FIFO against the pending reply queue.
//!
//! A payload may arrive in arbitrarily many fragments. When the data marker
//! has been seen but fewer than the expected bytes are available, the
//! decoder parks the partial payload in its own state and resumes on the
//! next `feed` — no bytes are dropped or double-delivered, and the parked
//! expectation stays at the queue head until the payload completes. This
//! replaces stream-level push-back: the decoder never un-reads input.

use log::trace;

use super::codec::{MAX_PAYLOAD, reply};
use super::queue::{Reply, ReplyEntry, ReplyQueue, payload_from};
use crate::error::ProtocolError;

/// One decoded item, in stream order.
pub enum DecodeEvent {
    /// A synchronous expectation completed.
    Completion { entry: ReplyEntry, reply: Reply },
    /// Unsolicited pin-change notification for pin 0..8.
    PinChange { pin: usize },
    /// Unsolicited generic event carrying the raw byte.
    AsyncEvent { byte: u8 },
}

/// Payload read in progress; the data marker has already been consumed.
struct Pending {
    expected: usize,
    collected: usize,
    buf: [u8; MAX_PAYLOAD],
}

impl Pending {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            collected: 0,
            buf: [0; MAX_PAYLOAD],
        }
    }

    /// Copy bytes from `input`, returning how many were taken.
    fn fill(&mut self, input: &[u8]) -> usize {
        let take = (self.expected - self.collected).min(input.len());
        self.buf[self.collected..self.collected + take].copy_from_slice(&input[..take]);
        self.collected += take;
        take
    }

    fn is_complete(&self) -> bool {
        self.collected == self.expected
    }
}

/// Streaming reply decoder. Exactly one reply is in flight at a time per
/// port; the decoder never interleaves two partially-read replies.
#[derive(Default)]
pub struct StreamDecoder {
    pending: Option<Pending>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a payload read is parked awaiting more bytes.
    pub fn is_parked(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed the currently-available bytes.
    ///
    /// Decoded items are appended to `out` in stream order; completed
    /// expectations are popped from `queue` as they finish. Asynchronous
    /// bytes never consume a queue entry. Errors are fatal for the stream —
    /// the host and daemon have desynchronised.
    pub fn feed(
        &mut self,
        input: &[u8],
        queue: &mut ReplyQueue,
        out: &mut Vec<DecodeEvent>,
    ) -> Result<(), ProtocolError> {
        let mut rest = input;

        if let Some(mut pending) = self.pending.take() {
            let taken = pending.fill(rest);
            rest = &rest[taken..];
            if pending.is_complete() {
                Self::complete_payload(pending, queue, out)?;
            } else {
                trace!(
                    "payload parked at {}/{} bytes",
                    pending.collected, pending.expected
                );
                self.pending = Some(pending);
                return Ok(());
            }
        }

        while let Some((&byte, tail)) = rest.split_first() {
            rest = tail;

            if byte >= reply::MIN_ASYNC {
                let base = reply::ASYNC_PIN_CHANGE_BASE;
                if byte >= base && byte < base + reply::PIN_CHANGE_SPAN {
                    out.push(DecodeEvent::PinChange {
                        pin: (byte - base) as usize,
                    });
                } else {
                    out.push(DecodeEvent::AsyncEvent { byte });
                }
                continue;
            }

            let Some(size) = queue.head_size() else {
                return Err(ProtocolError::UnexpectedReply { byte });
            };

            if byte == reply::DATA {
                if size == 0 {
                    return Err(ProtocolError::UnexpectedData);
                }
                let mut pending = Pending::new(size as usize);
                let taken = pending.fill(rest);
                rest = &rest[taken..];
                if pending.is_complete() {
                    Self::complete_payload(pending, queue, out)?;
                } else {
                    trace!(
                        "payload parked at {}/{} bytes",
                        pending.collected, pending.expected
                    );
                    self.pending = Some(pending);
                    return Ok(());
                }
            } else {
                // Plain ack/nack/high/low terminates the head expectation.
                let Some(entry) = queue.pop() else {
                    return Err(ProtocolError::UnexpectedReply { byte });
                };
                out.push(DecodeEvent::Completion {
                    entry,
                    reply: Reply::Byte(byte),
                });
            }
        }

        Ok(())
    }

    fn complete_payload(
        pending: Pending,
        queue: &mut ReplyQueue,
        out: &mut Vec<DecodeEvent>,
    ) -> Result<(), ProtocolError> {
        // The head is only parked while its entry is still queued, so a
        // missing entry here is the same desync as an unexpected reply.
        let Some(entry) = queue.pop() else {
            return Err(ProtocolError::UnexpectedReply { byte: reply::DATA });
        };
        out.push(DecodeEvent::Completion {
            entry,
            reply: Reply::Data(payload_from(&pending.buf[..pending.expected])),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u8) -> ReplyEntry {
        ReplyEntry {
            size,
            completion: None,
        }
    }

    fn feed_all(decoder: &mut StreamDecoder, input: &[u8], queue: &mut ReplyQueue) -> Vec<DecodeEvent> {
        let mut out = Vec::new();
        decoder.feed(input, queue, &mut out).unwrap();
        out
    }

    #[test]
    fn plain_ack_completes_head() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(0));

        let out = feed_all(&mut decoder, &[reply::ACK], &mut queue);
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            DecodeEvent::Completion {
                reply: Reply::Byte(b),
                ..
            } if b == reply::ACK
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn data_reply_in_one_block() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(3));

        let out = feed_all(&mut decoder, &[reply::DATA, 1, 2, 3], &mut queue);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DecodeEvent::Completion { reply, .. } => {
                assert_eq!(reply.data(), Some(&[1u8, 2, 3][..]));
            }
            _ => panic!("expected completion"),
        }
        assert!(!decoder.is_parked());
    }

    #[test]
    fn partial_payload_parks_and_resumes() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(4));

        // Marker plus one byte — park.
        let out = feed_all(&mut decoder, &[reply::DATA, 0xAA], &mut queue);
        assert!(out.is_empty());
        assert!(decoder.is_parked());
        // Entry stays queued while parked.
        assert_eq!(queue.len(), 1);

        // Two more — still short.
        let out = feed_all(&mut decoder, &[0xBB, 0xCC], &mut queue);
        assert!(out.is_empty());
        assert!(decoder.is_parked());

        // Final byte completes.
        let out = feed_all(&mut decoder, &[0xDD], &mut queue);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DecodeEvent::Completion { reply, .. } => {
                assert_eq!(reply.data(), Some(&[0xAA, 0xBB, 0xCC, 0xDD][..]));
            }
            _ => panic!("expected completion"),
        }
        assert!(!decoder.is_parked());
        assert!(queue.is_empty());
    }

    #[test]
    fn byte_at_a_time_equals_one_block() {
        let stream = [
            reply::ACK,
            reply::DATA,
            9,
            8,
            0xC3, // pin change mid-stream
            reply::HIGH,
        ];

        let run = |fragment_size: usize| {
            let mut decoder = StreamDecoder::new();
            let mut queue = ReplyQueue::new();
            queue.push(entry(0));
            queue.push(entry(2));
            queue.push(entry(0));

            let mut out = Vec::new();
            for chunk in stream.chunks(fragment_size) {
                decoder.feed(chunk, &mut queue, &mut out).unwrap();
            }
            out
        };

        for fragment_size in 1..=stream.len() {
            let out = run(fragment_size);
            assert_eq!(out.len(), 4, "fragment size {fragment_size}");
            assert!(matches!(
                out[0],
                DecodeEvent::Completion { reply: Reply::Byte(b), .. } if b == reply::ACK
            ));
            match &out[1] {
                DecodeEvent::Completion { reply, .. } => {
                    assert_eq!(reply.data(), Some(&[9u8, 8][..]));
                }
                _ => panic!("expected data completion"),
            }
            assert!(matches!(out[2], DecodeEvent::PinChange { pin: 3 }));
            assert!(matches!(
                out[3],
                DecodeEvent::Completion { reply: Reply::Byte(b), .. } if b == reply::HIGH
            ));
        }
    }

    #[test]
    fn async_bytes_never_touch_the_queue() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(0));

        let out = feed_all(&mut decoder, &[0xA0, 0xBF, 0xC7, 0xFF], &mut queue);
        assert_eq!(out.len(), 4);
        assert!(matches!(out[0], DecodeEvent::AsyncEvent { byte: 0xA0 }));
        assert!(matches!(out[1], DecodeEvent::AsyncEvent { byte: 0xBF }));
        assert!(matches!(out[2], DecodeEvent::PinChange { pin: 7 }));
        // 0xC8 and above is generic again.
        assert!(matches!(out[3], DecodeEvent::AsyncEvent { byte: 0xFF }));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn sync_byte_with_empty_queue_is_fatal() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        let mut out = Vec::new();

        let err = decoder.feed(&[reply::ACK], &mut queue, &mut out).unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedReply { byte: reply::ACK });
    }

    #[test]
    fn data_marker_against_zero_size_head_is_fatal() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(0));
        let mut out = Vec::new();

        let err = decoder
            .feed(&[reply::DATA], &mut queue, &mut out)
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedData);
    }

    #[test]
    fn max_size_payload() {
        let mut decoder = StreamDecoder::new();
        let mut queue = ReplyQueue::new();
        queue.push(entry(255));

        let mut stream = vec![reply::DATA];
        stream.extend((0..255).map(|i| i as u8));

        let out = feed_all(&mut decoder, &stream, &mut queue);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DecodeEvent::Completion { reply, .. } => {
                assert_eq!(reply.data().unwrap().len(), 255);
                assert_eq!(reply.data().unwrap()[254], 254);
            }
            _ => panic!("expected completion"),
        }
    }
}
