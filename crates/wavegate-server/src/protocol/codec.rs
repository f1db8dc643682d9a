//! JSON text-frame codec.

use std::sync::Arc;

use super::messages::{IncomingMessage, OutgoingMessage};

/// Codec failures.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not a valid client message.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// An outgoing message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),
}

/// Decode one client frame.
///
/// The frame must be a JSON object with string `messageId` and `command`
/// fields; anything else is [`CodecError::Malformed`].
pub fn decode(raw: &str) -> Result<IncomingMessage, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode one outgoing message as a shareable text payload.
pub fn encode(message: &OutgoingMessage) -> Result<Arc<str>, CodecError> {
    serde_json::to_string(message)
        .map(Arc::from)
        .map_err(CodecError::Encode)
}
