//! Property tests for the reply stream decoder: decoding must be
//! invariant under fragmentation, and FIFO matching must survive any
//! interleaving of asynchronous events.

use proptest::prelude::*;

use portlink::proto::decoder::{DecodeEvent, StreamDecoder};
use portlink::proto::queue::{ReplyEntry, ReplyQueue};

const REPLY_DATA: u8 = 0x84;
const MIN_ASYNC: u8 = 0xA0;
const PIN_BASE: u8 = 0xC0;

/// One daemon-side reply in a generated conversation.
#[derive(Debug, Clone)]
enum Item {
    /// Plain status byte for a zero-payload expectation.
    Byte(u8),
    /// Data marker plus payload for a sized expectation.
    Data(Vec<u8>),
    /// Unsolicited event byte; consumes no expectation.
    Async(u8),
}

fn item_strategy() -> impl Strategy<Value = Item> {
    prop_oneof![
        (0x80u8..=0x83).prop_map(Item::Byte),
        proptest::collection::vec(any::<u8>(), 1..=16).prop_map(Item::Data),
        (MIN_ASYNC..=0xFF).prop_map(Item::Async),
    ]
}

fn conversation() -> impl Strategy<Value = Vec<Item>> {
    proptest::collection::vec(item_strategy(), 0..=12)
}

/// Wire stream and matching expectation queue for a conversation.
fn build(items: &[Item]) -> (Vec<u8>, ReplyQueue) {
    let mut stream = Vec::new();
    let mut queue = ReplyQueue::new();
    for item in items {
        match item {
            Item::Byte(b) => {
                stream.push(*b);
                queue.push(ReplyEntry {
                    size: 0,
                    completion: None,
                });
            }
            Item::Data(payload) => {
                stream.push(REPLY_DATA);
                stream.extend_from_slice(payload);
                queue.push(ReplyEntry {
                    size: payload.len() as u8,
                    completion: None,
                });
            }
            Item::Async(b) => stream.push(*b),
        }
    }
    (stream, queue)
}

/// Comparable shape of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Summary {
    Byte(u8),
    Data(Vec<u8>),
    Pin(usize),
    Async(u8),
}

fn summarize(events: &[DecodeEvent]) -> Vec<Summary> {
    events
        .iter()
        .map(|event| match event {
            DecodeEvent::Completion { reply, .. } => match (reply.byte(), reply.data()) {
                (Some(b), _) => Summary::Byte(b),
                (None, Some(d)) => Summary::Data(d.to_vec()),
                (None, None) => unreachable!(),
            },
            DecodeEvent::PinChange { pin } => Summary::Pin(*pin),
            DecodeEvent::AsyncEvent { byte } => Summary::Async(*byte),
        })
        .collect()
}

fn decode_fragmented(stream: &[u8], queue: &mut ReplyQueue, fragments: &[usize]) -> Vec<Summary> {
    let mut decoder = StreamDecoder::new();
    let mut out = Vec::new();
    let mut rest = stream;
    let mut i = 0;
    while !rest.is_empty() {
        let take = fragments[i % fragments.len()].min(rest.len());
        decoder.feed(&rest[..take], queue, &mut out).unwrap();
        rest = &rest[take..];
        i += 1;
    }
    assert!(!decoder.is_parked(), "complete stream left a parked payload");
    summarize(&out)
}

proptest! {
    /// Decoding is invariant under how the byte stream is fragmented.
    #[test]
    fn fragmentation_does_not_change_decoding(
        items in conversation(),
        fragments in proptest::collection::vec(1usize..=7, 1..=4),
    ) {
        let (stream, mut whole_queue) = build(&items);
        let (_, mut frag_queue) = build(&items);

        let mut whole_out = Vec::new();
        StreamDecoder::new()
            .feed(&stream, &mut whole_queue, &mut whole_out)
            .unwrap();
        let whole = summarize(&whole_out);

        let fragmented = decode_fragmented(&stream, &mut frag_queue, &fragments);

        prop_assert_eq!(whole, fragmented);
        prop_assert_eq!(whole_queue.len(), frag_queue.len());
        prop_assert!(whole_queue.is_empty());
    }

    /// Synchronous completions come out in exactly the order their
    /// expectations were queued; async bytes never consume one.
    #[test]
    fn fifo_order_survives_async_interleaving(items in conversation()) {
        let (stream, mut queue) = build(&items);

        let expected: Vec<Summary> = items
            .iter()
            .filter_map(|item| match item {
                Item::Byte(b) => Some(Summary::Byte(*b)),
                Item::Data(payload) => Some(Summary::Data(payload.clone())),
                Item::Async(_) => None,
            })
            .collect();

        let mut out = Vec::new();
        StreamDecoder::new().feed(&stream, &mut queue, &mut out).unwrap();
        let completions: Vec<Summary> = summarize(&out)
            .into_iter()
            .filter(|s| matches!(s, Summary::Byte(_) | Summary::Data(_)))
            .collect();

        prop_assert_eq!(completions, expected);
        prop_assert!(queue.is_empty());
    }

    /// Every async byte surfaces, classified by the pin-change sub-range.
    #[test]
    fn async_bytes_classify_by_range(byte in MIN_ASYNC..=0xFF) {
        let mut queue = ReplyQueue::new();
        let mut out = Vec::new();
        StreamDecoder::new().feed(&[byte], &mut queue, &mut out).unwrap();

        prop_assert_eq!(out.len(), 1);
        if (PIN_BASE..PIN_BASE + 8).contains(&byte) {
            let is_pin_change =
                matches!(out[0], DecodeEvent::PinChange { pin } if pin == (byte - PIN_BASE) as usize);
            prop_assert!(is_pin_change);
        } else {
            let is_generic = matches!(out[0], DecodeEvent::AsyncEvent { byte: b } if b == byte);
            prop_assert!(is_generic);
        }
    }
}
