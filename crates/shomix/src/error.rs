use shomix_image::ImageError;

use crate::composite::ChannelSlot;

/// An error type for the channel mixing pipeline.
#[derive(thiserror::Error, Debug)]
pub enum MixError {
    /// Error when an argument is outside of its numeric or structural domain.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error when a required source channel is not bound.
    #[error("Missing source channel {0}")]
    MissingChannel(ChannelSlot),

    /// Error when coefficient data holds fewer than the expected number of bytes.
    #[error("Truncated coefficient data: expected {expected} bytes, found {found}")]
    TruncatedPersistenceData {
        /// The number of bytes required.
        expected: usize,
        /// The number of bytes available.
        found: usize,
    },

    /// Error reported by an imaging primitive.
    #[error("Imaging primitive failed: {0}")]
    PrimitiveFailure(#[from] ImageError),

    /// Error when reading or writing a coefficient file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
