use shomix_image::Image;

use crate::{backend::ImagingBackend, error::MixError};

/// Remove pink halos around stars from an RGB composite in place.
///
/// Pink is the complement of green: the image is inverted, the green cast of the negative is
/// suppressed with full strength while preserving lightness, and the image is inverted back.
pub fn remove_pink_halos<B: ImagingBackend>(
    backend: &B,
    rgb: &mut Image<f32, 3>,
) -> Result<(), MixError> {
    backend.invert(rgb)?;
    backend.suppress_green(rgb, 1.0, true)?;
    backend.invert(rgb)?;
    Ok(())
}
