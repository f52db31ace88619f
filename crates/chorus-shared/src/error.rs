use thiserror::Error;

/// Errors produced while encoding or decoding push-channel frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame exceeds maximum size ({0} bytes)")]
    TooLarge(usize),
}
