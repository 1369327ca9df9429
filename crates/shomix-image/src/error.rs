/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when the image has no pixels.
    #[error("Image has zero width or height")]
    EmptyImage,

    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images that must match have different sizes.
    #[error("Image size mismatch: ({0}x{1}) vs ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when the channel index is out of bounds.
    #[error("Channel index {0} is out of bounds for an image with {1} channels")]
    ChannelIndexOutOfBounds(usize, usize),

    /// Error when a value cannot be cast to the target type.
    #[error("Failed to cast image data")]
    CastError,

    /// Error when an operation receives an unsupported number of inputs.
    #[error("Operation {0} does not accept {1} input images")]
    InvalidInputCount(&'static str, usize),

    /// Error when the number of weights does not match the number of inputs.
    #[error("Got {0} weights for {1} input images")]
    WeightCountMismatch(usize, usize),

    /// Error when a numeric parameter is outside of its domain.
    #[error("Invalid parameter {0}: {1}")]
    InvalidParameter(&'static str, String),

    /// Error when no pixel falls inside the background reference band.
    #[error("No background reference pixels in the range [{0}, {1}]")]
    EmptyBackgroundReference(f32, f32),
}
