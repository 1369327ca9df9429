use shomix_image::{Image, ImageError};

use super::{kernels, separable_filter};

/// Blur an image using a gaussian blur filter.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `sigma` - The standard deviation of the gaussian, in pixels.
///
/// # Errors
///
/// Returns an error if the sizes differ or `sigma` is not positive.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    sigma: f32,
) -> Result<(), ImageError> {
    if sigma.is_nan() || sigma <= 0.0 {
        return Err(ImageError::InvalidParameter(
            "sigma",
            format!("{sigma} is not positive"),
        ));
    }
    let kernel = kernels::gaussian_kernel_1d(sigma);
    separable_filter(src, dst, &kernel, &kernel, 1)
}
