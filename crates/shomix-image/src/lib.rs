#![deny(missing_docs)]
//! Image types for narrowband channel mixing

/// image representation for channel mixing.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
