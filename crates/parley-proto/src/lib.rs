//! Parley wire protocol
//!
//! JSON documents with a `type` discriminator, exchanged over a single text
//! stream. This crate owns two concerns:
//!
//! - [`payloads`]: typed outbound ([`ClientMessage`]) and inbound
//!   ([`ServerMessage`]) documents.
//! - [`frame`]: splitting a raw inbound chunk into individual documents
//!   ([`FrameDecoder`]). The server concatenates documents without a
//!   delimiter, so framing is recovered by scanning brace depth.
//!
//! # Invariants
//!
//! - Every [`ServerMessage`] variant maps to exactly one wire `type` string,
//!   listed in [`ServerMessage::KNOWN_TYPES`].
//! - Decoding distinguishes an unknown `type` from a malformed document so
//!   callers can treat them differently (drop with diagnostic vs. parse
//!   failure).

#![forbid(unsafe_code)]

pub mod errors;
pub mod frame;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::{DecodedChunk, FrameDecoder, FramingStrategy};
pub use payloads::{ClientMessage, ServerMessage, WireTimestamp};
