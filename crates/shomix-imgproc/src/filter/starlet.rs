use shomix_image::{Image, ImageError};

use super::{kernels, separable_filter};

/// Decompose a single channel image with the isotropic undecimated wavelet (starlet) transform.
///
/// Scale `j` smooths the previous approximation with the B3 spline kernel dilated by `2^j`; the
/// detail layer is the difference of the two approximations. Adding all detail layers to the
/// residual reproduces the input.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `layers` - The number of detail layers.
///
/// # Returns
///
/// The detail layers, finest first, and the residual approximation.
///
/// # Errors
///
/// Returns [`ImageError::InvalidParameter`] if the dilation of the coarsest layer overflows the
/// kernel offsets.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::filter::starlet_decompose;
///
/// let src = Image::<f32, 1>::new(ImageSize { width: 3, height: 1 }, vec![0.0, 1.0, 0.0]).unwrap();
/// let (details, residual) = starlet_decompose(&src, 2).unwrap();
/// assert_eq!(details.len(), 2);
///
/// let sum = details[0].as_slice()[1] + details[1].as_slice()[1] + residual.as_slice()[1];
/// assert!((sum - 1.0).abs() < 1e-6);
/// ```
pub fn starlet_decompose(
    src: &Image<f32, 1>,
    layers: usize,
) -> Result<(Vec<Image<f32, 1>>, Image<f32, 1>), ImageError> {
    let kernel = kernels::b3_spline_kernel_1d();

    if let Some(coarsest) = layers.checked_sub(1) {
        let half = kernel.len() / 2;
        u32::try_from(coarsest)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .and_then(|dilation| dilation.checked_mul(half))
            .filter(|&reach| isize::try_from(reach).is_ok())
            .ok_or_else(|| {
                ImageError::InvalidParameter("layers", format!("{layers} starlet layers overflow"))
            })?;
    }

    let mut details = Vec::with_capacity(layers);
    let mut current = src.clone();
    let mut smoothed = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;

    for j in 0..layers {
        separable_filter(&current, &mut smoothed, &kernel, &kernel, 1 << j)?;

        let mut detail = current.clone();
        detail
            .as_slice_mut()
            .iter_mut()
            .zip(smoothed.as_slice())
            .for_each(|(d, &s)| *d -= s);
        details.push(detail);

        std::mem::swap(&mut current, &mut smoothed);
    }

    Ok((details, current))
}

/// Reconstruct an image from starlet detail layers and the residual.
///
/// # Errors
///
/// Returns an error if the layer sizes differ from the residual size.
pub fn starlet_reconstruct(
    details: &[Image<f32, 1>],
    residual: &Image<f32, 1>,
) -> Result<Image<f32, 1>, ImageError> {
    let mut dst = residual.clone();
    for layer in details {
        if layer.size() != dst.size() {
            return Err(ImageError::InvalidImageSize(
                layer.cols(),
                layer.rows(),
                dst.cols(),
                dst.rows(),
            ));
        }
        dst.as_slice_mut()
            .iter_mut()
            .zip(layer.as_slice())
            .for_each(|(d, &v)| *d += v);
    }
    Ok(dst)
}
