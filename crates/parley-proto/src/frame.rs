//! Stream framing for concatenated JSON documents.
//!
//! The server writes one JSON object per logical message but may coalesce
//! several of them into a single transport chunk with no delimiter:
//!
//! ```text
//! {"type":"userJoined","userId":"bob"}{"type":"onlineUsers","users":[]}
//! ```
//!
//! [`FrameDecoder`] recovers the individual documents by tracking brace depth.
//! A frame ends exactly when depth returns to zero after having been positive.
//!
//! # Protocol assumptions
//!
//! - Each chunk is self-contained. Partial documents are never carried over to
//!   the next chunk; unterminated text at the end of a chunk is reported in
//!   [`DecodedChunk::trailing`] and dropped by the caller.
//! - Only JSON objects are framed. Top-level arrays or scalars are not
//!   documents in this protocol.
//!
//! # Known limitation
//!
//! [`FramingStrategy::BraceDepth`] does not understand string literals, so a
//! `{` or `}` inside a quoted value corrupts the depth count and splits (or
//! merges) documents incorrectly. [`FramingStrategy::StringAware`] skips
//! braces inside strings, honouring backslash escapes. Both produce the same
//! boundaries for documents without braces in string values. A newline or
//! length-prefixed wire format would remove the need for either.

/// How document boundaries are recovered from a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingStrategy {
    /// Count every `{` and `}` regardless of context.
    BraceDepth,
    /// Count braces outside JSON string literals only.
    #[default]
    StringAware,
}

/// Result of splitting one transport chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedChunk<'a> {
    /// Complete candidate documents, in stream order.
    ///
    /// Each frame starts at its first non-whitespace character and ends at
    /// the closing brace. Frames are not validated as JSON here.
    pub frames: Vec<&'a str>,

    /// Text after the last complete frame that never closed. `None` if the
    /// chunk ended on a boundary (ignoring whitespace).
    pub trailing: Option<&'a str>,
}

/// Splits raw text chunks into candidate JSON documents.
///
/// Stateless between calls: see the module docs for the protocol assumption
/// this relies on.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    strategy: FramingStrategy,
}

impl FrameDecoder {
    /// Create a decoder using the given strategy.
    pub fn new(strategy: FramingStrategy) -> Self {
        Self { strategy }
    }

    /// Active framing strategy.
    pub fn strategy(&self) -> FramingStrategy {
        self.strategy
    }

    /// Split `chunk` into candidate documents.
    ///
    /// Never fails: text that does not form a balanced object is either
    /// prefixed to the next frame (where JSON parsing will reject it) or
    /// returned as [`DecodedChunk::trailing`].
    pub fn decode<'a>(&self, chunk: &'a str) -> DecodedChunk<'a> {
        let track_strings = self.strategy == FramingStrategy::StringAware;
        let bytes = chunk.as_bytes();

        let mut frames = Vec::new();
        let mut start: Option<usize> = None;
        let mut depth: usize = 0;
        let mut in_string = false;
        let mut escaped = false;

        // Braces, quotes and backslashes are ASCII, so every index we slice at
        // is a char boundary even when values contain multi-byte UTF-8.
        for (i, &byte) in bytes.iter().enumerate() {
            if start.is_none() {
                if byte.is_ascii_whitespace() {
                    continue;
                }
                start = Some(i);
            }

            if in_string {
                if escaped {
                    escaped = false;
                } else if byte == b'\\' {
                    escaped = true;
                } else if byte == b'"' {
                    in_string = false;
                }
                continue;
            }

            match byte {
                b'"' if track_strings => in_string = true,
                b'{' => depth += 1,
                // A stray closer at depth zero never opens a frame; it stays
                // in the pending prefix and fails to parse downstream.
                b'}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0
                        && let Some(begin) = start.take()
                    {
                        frames.push(&chunk[begin..=i]);
                    }
                },
                _ => {},
            }
        }

        DecodedChunk { frames, trailing: start.map(|begin| &chunk[begin..]) }
    }
}
