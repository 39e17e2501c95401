//! Feed arbitrary byte streams through the reply decoder.
//!
//! The first bytes seed the expectation queue (one entry per byte, the
//! byte being the expected payload size); the remainder is the daemon
//! stream, fed in irregular fragments. Protocol errors are expected
//! outcomes; panics and state corruption are the bugs being hunted.

#![no_main]

use libfuzzer_sys::fuzz_target;
use portlink::proto::decoder::StreamDecoder;
use portlink::proto::queue::{ReplyEntry, ReplyQueue};

fuzz_target!(|data: &[u8]| {
    let Some((&n_entries, rest)) = data.split_first() else {
        return;
    };
    let n_entries = (n_entries % 16) as usize;
    if rest.len() < n_entries {
        return;
    }
    let (sizes, stream) = rest.split_at(n_entries);

    let mut queue = ReplyQueue::new();
    for &size in sizes {
        queue.push(ReplyEntry {
            size,
            completion: None,
        });
    }

    let mut decoder = StreamDecoder::new();
    let mut out = Vec::new();
    let mut rest = stream;
    let mut fragment = 1usize;
    while !rest.is_empty() {
        let take = fragment.min(rest.len());
        if decoder.feed(&rest[..take], &mut queue, &mut out).is_err() {
            // Desync is fatal; a real port stops here.
            return;
        }
        rest = &rest[take..];
        fragment = (fragment % 7) + 1;
    }
});
