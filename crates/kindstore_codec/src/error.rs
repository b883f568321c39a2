//! Codec error types.

use thiserror::Error;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failures raised while converting records to or from bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The record could not be serialized.
    #[error("encoding failed: {message}")]
    Encode {
        /// Serializer message.
        message: String,
    },

    /// The bytes could not be deserialized into the requested shape.
    #[error("decoding failed: {message}")]
    Decode {
        /// Deserializer message.
        message: String,
    },
}

impl CodecError {
    /// Creates an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}
