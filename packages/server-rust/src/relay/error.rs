use gabriel_core::{ClientIdentity, CodecError};

/// Errors from the relay's connection lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Another live session already uses this identity.
    #[error("client {0} is already connected")]
    DuplicateClient(ClientIdentity),
    #[error("failed to encode welcome message: {0}")]
    Codec(#[from] CodecError),
}
