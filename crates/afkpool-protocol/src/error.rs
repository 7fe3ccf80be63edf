//! Error types for the protocol layer.
//!
//! Each afkpool crate owns its own error enum. A `ProtocolError` always
//! means "the bytes or values were wrong", never "the network failed".

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `event`/`op` tag,
    /// or missing fields.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value is not a usable identity (see [`Identity::parse`](crate::Identity::parse)).
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}
