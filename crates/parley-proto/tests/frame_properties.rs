//! Property-based tests for stream framing.
//!
//! These verify that splitting is correct for ALL concatenations of valid
//! documents, not just hand-picked chunks.

use parley_proto::{FrameDecoder, FramingStrategy};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

/// Strategy for string values without braces or quotes.
fn plain_text() -> impl Strategy<Value = String> + Clone {
    "[a-zA-Z0-9 .,!?-]{0,16}"
}

/// Strategy for JSON values whose strings come from `text`.
fn json_value<S>(text: S) -> impl Strategy<Value = Value>
where
    S: Strategy<Value = String> + Clone + 'static,
{
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
        text.clone().prop_map(Value::from),
    ];

    leaf.prop_recursive(3, 16, 4, move |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for a serialized top-level object.
fn document<S>(text: S) -> impl Strategy<Value = String>
where
    S: Strategy<Value = String> + Clone + 'static,
{
    ("[a-zA-Z]{1,12}", prop::collection::btree_map("[a-z]{1,8}", json_value(text), 0..5))
        .prop_map(|(kind, fields)| {
            let mut object = Map::new();
            object.insert("type".into(), json!(kind));
            object.extend(fields);
            Value::Object(object).to_string()
        })
}

proptest! {
    #[test]
    fn prop_concatenated_documents_round_trip(
        docs in prop::collection::vec(document(plain_text()), 0..8)
    ) {
        let chunk = docs.concat();

        for strategy in [FramingStrategy::BraceDepth, FramingStrategy::StringAware] {
            let decoded = FrameDecoder::new(strategy).decode(&chunk);

            // PROPERTY: exactly N frames, in order, byte-identical
            prop_assert_eq!(decoded.frames.len(), docs.len());
            for (frame, doc) in decoded.frames.iter().zip(&docs) {
                prop_assert_eq!(*frame, doc.as_str());
            }
            prop_assert_eq!(decoded.trailing, None);
        }
    }

    #[test]
    fn prop_string_aware_handles_arbitrary_string_values(
        docs in prop::collection::vec(document("\\PC{0,16}"), 1..6)
    ) {
        let chunk = docs.concat();
        let decoded = FrameDecoder::new(FramingStrategy::StringAware).decode(&chunk);

        prop_assert_eq!(decoded.frames, docs.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn prop_whitespace_separators_are_skipped(
        docs in prop::collection::vec(document(plain_text()), 1..6),
        gaps in prop::collection::vec("[ \t\r\n]{0,3}", 6)
    ) {
        let mut chunk = String::new();
        for (doc, gap) in docs.iter().zip(&gaps) {
            chunk.push_str(gap);
            chunk.push_str(doc);
        }

        let decoded = FrameDecoder::default().decode(&chunk);
        prop_assert_eq!(decoded.frames, docs.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn prop_decode_never_panics_and_frames_are_closed(input in "\\PC{0,64}") {
        for strategy in [FramingStrategy::BraceDepth, FramingStrategy::StringAware] {
            let decoded = FrameDecoder::new(strategy).decode(&input);

            for frame in &decoded.frames {
                prop_assert!(frame.ends_with('}'), "frame {:?} does not end with a closing brace", frame);
                prop_assert!(!frame.starts_with(|c: char| c.is_ascii_whitespace()));
                prop_assert!(input.contains(frame));
            }
        }
    }

    #[test]
    fn prop_truncated_tail_is_reported(
        docs in prop::collection::vec(document(plain_text()), 1..4),
        cut in 1usize..8
    ) {
        let last = docs.last().cloned().unwrap_or_default();
        let cut = cut.min(last.len() - 1);
        let mut chunk = docs[..docs.len() - 1].concat();
        chunk.push_str(&last[..last.len() - cut]);

        let decoded = FrameDecoder::default().decode(&chunk);

        prop_assert_eq!(decoded.frames.len(), docs.len() - 1);
        prop_assert!(decoded.trailing.is_some());
    }
}
