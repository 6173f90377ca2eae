//! Fuzz target for FrameDecoder::decode
//!
//! Splits arbitrary text with both framing strategies to find:
//! - Panics on slicing (non-ASCII input, unbalanced braces)
//! - Frames that do not end on a closing brace
//! - Frames that overlap or come out of stream order
//!
//! The decoder should NEVER panic. Garbage ends up in a frame prefix or in
//! the trailing remainder.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{FrameDecoder, FramingStrategy};

fuzz_target!(|data: &[u8]| {
    let chunk = String::from_utf8_lossy(data);
    let base = chunk.as_ptr() as usize;

    let mut per_strategy = Vec::new();
    for strategy in [FramingStrategy::BraceDepth, FramingStrategy::StringAware] {
        let decoded = FrameDecoder::new(strategy).decode(&chunk);

        let mut cursor = 0;
        for frame in &decoded.frames {
            let offset = frame.as_ptr() as usize - base;
            assert!(offset >= cursor, "frames overlap or are out of order");
            assert!(frame.ends_with('}'), "frame does not close: {frame:?}");
            assert!(!frame.starts_with(|c: char| c.is_ascii_whitespace()));
            cursor = offset + frame.len();
        }

        if let Some(trailing) = decoded.trailing {
            let offset = trailing.as_ptr() as usize - base;
            assert!(offset >= cursor, "trailing overlaps a frame");
            assert_eq!(offset + trailing.len(), chunk.len(), "trailing is not a suffix");
        }

        per_strategy.push(decoded.frames);
    }

    // Without string literals the strategies must agree
    if !chunk.contains('"') {
        assert_eq!(per_strategy[0], per_strategy[1]);
    }
});
