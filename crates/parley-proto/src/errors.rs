//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire documents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Document is not valid JSON, or a known `type` has the wrong shape.
    #[error("malformed document: {reason}")]
    Malformed {
        /// Parser diagnostic
        reason: String,
    },

    /// Document is a JSON value without a string `type` field.
    #[error("document has no type discriminator")]
    MissingType,

    /// Document carries a `type` this client does not understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Outbound document could not be serialized.
    #[error("failed to encode {kind}: {reason}")]
    Encode {
        /// Wire type of the document
        kind: &'static str,
        /// Serializer diagnostic
        reason: String,
    },
}

impl ProtocolError {
    /// Returns true if the document was syntactically broken, as opposed to
    /// well-formed but not understood.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed { reason: err.to_string() }
    }
}
