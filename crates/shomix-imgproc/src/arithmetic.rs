//! Pointwise pixel arithmetic over several input images.
//!
//! Every operation writes into a caller provided destination so that long lived working buffers
//! can be reused between recomputations. The result is then brought back into the normalized
//! `[0, 1]` range according to a [`RangePolicy`].

use rayon::prelude::*;
use shomix_image::{Image, ImageError};

use crate::parallel;

/// How out of range results are brought back into `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Map the full `[min, max]` range linearly onto `[0, 1]` when any sample leaves `[0, 1]`.
    #[default]
    Rescale,
    /// Clip every sample to `[0, 1]`.
    Truncate,
}

impl RangePolicy {
    /// Select the policy from a rescale flag.
    pub fn from_rescale(rescale: bool) -> Self {
        if rescale {
            RangePolicy::Rescale
        } else {
            RangePolicy::Truncate
        }
    }
}

/// Pointwise operator combining one sample of each input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendOp {
    /// Minimum of the inputs.
    Min,
    /// Maximum of the inputs.
    Max,
    /// Product of the inputs.
    Multiply,
    /// Inverted product of the inverted inputs, `1 - Π(1 - x)`.
    Screen,
    /// Two input overlay; the first input selects between screen and multiply.
    Overlay,
    /// Arithmetic mean of the inputs.
    Average,
}

impl BlendOp {
    /// Name of the operator, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            BlendOp::Min => "min",
            BlendOp::Max => "max",
            BlendOp::Multiply => "multiply",
            BlendOp::Screen => "screen",
            BlendOp::Overlay => "overlay",
            BlendOp::Average => "average",
        }
    }

    /// Whether the operator accepts `count` inputs.
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            BlendOp::Overlay => count == 2,
            _ => count >= 1,
        }
    }

    /// Evaluate the operator on already weighted samples.
    ///
    /// PRECONDITION: `values.len()` is accepted by the operator.
    pub fn evaluate(&self, values: &[f32]) -> f32 {
        match self {
            BlendOp::Min => values.iter().copied().fold(f32::INFINITY, f32::min),
            BlendOp::Max => values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            BlendOp::Multiply => values.iter().product(),
            BlendOp::Screen => 1.0 - values.iter().map(|&v| 1.0 - v).product::<f32>(),
            BlendOp::Overlay => {
                let (a, b) = (values[0], values[1]);
                if a > 0.5 {
                    1.0 - (1.0 - 2.0 * (a - 0.5)) * (1.0 - b)
                } else {
                    2.0 * a * b
                }
            }
            BlendOp::Average => values.iter().sum::<f32>() / values.len() as f32,
        }
    }
}

fn check_same_size<const C1: usize, const C2: usize>(
    a: &Image<f32, C1>,
    b: &Image<f32, C2>,
) -> Result<(), ImageError> {
    if a.size() != b.size() {
        return Err(ImageError::InvalidImageSize(
            a.cols(),
            a.rows(),
            b.cols(),
            b.rows(),
        ));
    }
    Ok(())
}

/// Bring an image back into `[0, 1]` following `policy`.
///
/// Samples are always clipped to `[0, 1]` at the end; with [`RangePolicy::Rescale`] the image
/// is first mapped linearly from its `[min, max]` range when that range leaves `[0, 1]`.
///
/// # Returns
///
/// `true` when a rescale was performed.
pub fn apply_range_policy<const C: usize>(image: &mut Image<f32, C>, policy: RangePolicy) -> bool {
    let mut rescaled = false;

    if policy == RangePolicy::Rescale {
        let (lo, hi) = parallel::par_min_max(image);
        if (lo < 0.0 || hi > 1.0) && hi > lo {
            let scale = 1.0 / (hi - lo);
            parallel::par_iter_rows_mut(image, |px| {
                px.iter_mut().for_each(|v| *v = (*v - lo) * scale);
            });
            rescaled = true;
        }
    }

    parallel::par_iter_rows_mut(image, |px| {
        px.iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
    });

    rescaled
}

/// Linear combination of single channel images into an RGB image.
///
/// Each input contributes `input * weight[c]` to output channel `c`:
///
/// dst(x,y,c) = Σ_i src_i(x,y) * w_i[c]
///
/// # Arguments
///
/// * `terms` - The input images, each paired with its (R, G, B) weights.
/// * `policy` - The range policy applied to the result.
/// * `dst` - The output RGB image. Its previous content is discarded.
///
/// # Errors
///
/// Returns an error if any input size differs from the size of `dst`.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::arithmetic::{linear_combination, RangePolicy};
///
/// let size = ImageSize { width: 2, height: 1 };
/// let ha = Image::<f32, 1>::new(size, vec![0.2, 0.4]).unwrap();
/// let oiii = Image::<f32, 1>::new(size, vec![0.1, 0.3]).unwrap();
///
/// let mut rgb = Image::<f32, 3>::from_size_val(size, 0.0).unwrap();
/// linear_combination(
///     &[(&ha, [1.0, 0.5, 0.0]), (&oiii, [0.0, 0.5, 1.0])],
///     RangePolicy::Truncate,
///     &mut rgb,
/// ).unwrap();
///
/// assert!((rgb.as_slice()[1] - 0.15).abs() < 1e-6);
/// ```
pub fn linear_combination(
    terms: &[(&Image<f32, 1>, [f32; 3])],
    policy: RangePolicy,
    dst: &mut Image<f32, 3>,
) -> Result<(), ImageError> {
    for (src, _) in terms {
        check_same_size(src, dst)?;
    }

    dst.fill(0.0);
    for (src, weights) in terms {
        parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
            let s = src_pixel[0];
            dst_pixel
                .iter_mut()
                .zip(weights.iter())
                .for_each(|(d, &w)| *d += s * w);
        });
    }

    let rescaled = apply_range_policy(dst, policy);
    log::debug!(
        "linear combination of {} terms, rescaled: {}",
        terms.len(),
        rescaled
    );

    Ok(())
}

/// Blend weighted single channel images with a pointwise operator.
///
/// Each input is scaled by its weight before the operator is evaluated.
///
/// # Arguments
///
/// * `inputs` - The input images.
/// * `weights` - One weight per input.
/// * `op` - The blend operator.
/// * `policy` - The range policy applied to the result.
/// * `dst` - The output image.
///
/// # Errors
///
/// Returns an error if the operator does not accept the number of inputs, if the number of
/// weights differs from the number of inputs, or if the sizes do not match.
pub fn blend(
    inputs: &[&Image<f32, 1>],
    weights: &[f32],
    op: BlendOp,
    policy: RangePolicy,
    dst: &mut Image<f32, 1>,
) -> Result<(), ImageError> {
    if !op.accepts(inputs.len()) {
        return Err(ImageError::InvalidInputCount(op.name(), inputs.len()));
    }

    if weights.len() != inputs.len() {
        return Err(ImageError::WeightCountMismatch(weights.len(), inputs.len()));
    }

    for src in inputs {
        check_same_size(src, dst)?;
    }

    let planes = inputs.iter().map(|img| img.as_slice()).collect::<Vec<_>>();
    let cols = dst.cols();

    dst.as_slice_mut()
        .par_chunks_exact_mut(cols)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let offset = row * cols;
            let mut values = vec![0.0f32; planes.len()];
            dst_row.iter_mut().enumerate().for_each(|(col, d)| {
                values
                    .iter_mut()
                    .zip(planes.iter().zip(weights.iter()))
                    .for_each(|(v, (plane, &w))| *v = plane[offset + col] * w);
                *d = op.evaluate(&values);
            });
        });

    apply_range_policy(dst, policy);

    Ok(())
}

/// Invert an image in place, `x -> 1 - x`.
pub fn invert<const C: usize>(image: &mut Image<f32, C>) {
    parallel::par_iter_rows_mut(image, |px| {
        px.iter_mut().for_each(|v| *v = 1.0 - *v);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shomix_image::ImageSize;

    fn gray(data: Vec<f32>) -> Result<Image<f32, 1>, ImageError> {
        let width = data.len();
        Image::new(ImageSize { width, height: 1 }, data)
    }

    #[test]
    fn test_blend_ops() {
        assert_eq!(BlendOp::Min.evaluate(&[0.3, 0.1, 0.2]), 0.1);
        assert_eq!(BlendOp::Max.evaluate(&[0.3, 0.1, 0.2]), 0.3);
        assert_relative_eq!(BlendOp::Multiply.evaluate(&[0.5, 0.4]), 0.2);
        assert_relative_eq!(BlendOp::Screen.evaluate(&[0.5, 0.5]), 0.75);
        assert_relative_eq!(BlendOp::Screen.evaluate(&[0.5, 0.5, 0.5]), 0.875);
        assert_relative_eq!(BlendOp::Average.evaluate(&[0.3, 0.6, 0.9]), 0.6);
        // overlay: dark base multiplies, bright base screens
        assert_relative_eq!(BlendOp::Overlay.evaluate(&[0.25, 0.5]), 0.25);
        assert_relative_eq!(BlendOp::Overlay.evaluate(&[0.75, 0.5]), 0.75);
    }

    #[test]
    fn test_overlay_requires_two_inputs() -> Result<(), ImageError> {
        let a = gray(vec![0.5])?;
        let mut dst = gray(vec![0.0])?;
        let res = blend(
            &[&a, &a, &a],
            &[1.0, 1.0, 1.0],
            BlendOp::Overlay,
            RangePolicy::Truncate,
            &mut dst,
        );
        assert_eq!(res.err(), Some(ImageError::InvalidInputCount("overlay", 3)));
        Ok(())
    }

    #[test]
    fn test_blend_weight_mismatch() -> Result<(), ImageError> {
        let a = gray(vec![0.5])?;
        let mut dst = gray(vec![0.0])?;
        let res = blend(
            &[&a, &a],
            &[1.0],
            BlendOp::Min,
            RangePolicy::Truncate,
            &mut dst,
        );
        assert_eq!(res.err(), Some(ImageError::WeightCountMismatch(1, 2)));
        Ok(())
    }

    #[test]
    fn test_blend_weighted() -> Result<(), ImageError> {
        let a = gray(vec![0.2, 0.8])?;
        let b = gray(vec![0.6, 0.6])?;
        let mut dst = gray(vec![0.0, 0.0])?;
        blend(
            &[&a, &b],
            &[1.0, 0.5],
            BlendOp::Max,
            RangePolicy::Truncate,
            &mut dst,
        )?;
        assert_relative_eq!(dst.as_slice()[0], 0.3);
        assert_relative_eq!(dst.as_slice()[1], 0.8);
        Ok(())
    }

    #[test]
    fn test_linear_combination_truncate() -> Result<(), ImageError> {
        let s = gray(vec![0.5, 1.0])?;
        let mut rgb = Image::<f32, 3>::from_size_val(s.size(), 0.7)?;
        linear_combination(&[(&s, [2.0, -1.0, 0.5])], RangePolicy::Truncate, &mut rgb)?;
        assert_eq!(rgb.as_slice(), &[1.0, 0.0, 0.25, 1.0, 0.0, 0.5]);
        Ok(())
    }

    #[test]
    fn test_linear_combination_rescale() -> Result<(), ImageError> {
        let s = gray(vec![0.25, 1.0])?;
        let mut rgb = Image::<f32, 3>::from_size_val(s.size(), 0.0)?;
        linear_combination(&[(&s, [2.0, 1.0, 0.0])], RangePolicy::Rescale, &mut rgb)?;
        // range [0, 2] is mapped onto [0, 1]
        let expected = [0.25, 0.125, 0.0, 1.0, 0.5, 0.0];
        rgb.as_slice()
            .iter()
            .zip(expected.iter())
            .for_each(|(a, b)| assert_relative_eq!(a, b, epsilon = 1e-6));
        Ok(())
    }

    #[test]
    fn test_rescale_in_range_is_noop() -> Result<(), ImageError> {
        let mut a = gray(vec![0.1, 0.4, 0.7])?;
        let b = a.clone();
        assert!(!apply_range_policy(&mut a, RangePolicy::Rescale));
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_invert() -> Result<(), ImageError> {
        let mut a = gray(vec![0.0, 0.25, 1.0])?;
        invert(&mut a);
        assert_eq!(a.as_slice(), &[1.0, 0.75, 0.0]);
        Ok(())
    }
}
