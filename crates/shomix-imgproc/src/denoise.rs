//! Iterative noise reduction in CIE L*a*b* space.
//!
//! Lightness and chrominance are smoothed separately with gaussian kernels. Small bright
//! structures (stars) can be excluded from the lightness smoothing with a threshold on the
//! difference between a pixel and its smoothed value.

use shomix_image::{Image, ImageError};

use crate::{color, filter};

/// Smoothing applied to one component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    /// Standard deviation of the gaussian, in pixels.
    pub sigma: f32,
    /// Blend amount toward the smoothed value, in `[0, 1]`.
    pub amount: f32,
}

/// Parameters of a denoise pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DenoiseParams {
    /// Number of iterations.
    pub iterations: usize,
    /// Lightness smoothing, `None` leaves the lightness untouched.
    pub lightness: Option<SmoothingParams>,
    /// Chrominance smoothing, `None` leaves a* and b* untouched.
    pub chrominance: Option<SmoothingParams>,
    /// Lightness difference above which a pixel is treated as structure and keeps its lightness.
    pub star_threshold: Option<f32>,
}

fn smooth_plane(
    plane: &mut Image<f32, 1>,
    smoothing: &SmoothingParams,
    protect: Option<f32>,
) -> Result<(), ImageError> {
    let mut smoothed = Image::<f32, 1>::from_size_val(plane.size(), 0.0)?;
    filter::gaussian_blur(plane, &mut smoothed, smoothing.sigma)?;

    let amount = smoothing.amount;
    plane
        .as_slice_mut()
        .iter_mut()
        .zip(smoothed.as_slice())
        .for_each(|(v, &s)| match protect {
            Some(threshold) if (*v - s).abs() > threshold => {}
            _ => *v += amount * (s - *v),
        });

    Ok(())
}

/// Denoise an RGB image in place.
///
/// # Arguments
///
/// * `rgb` - The image to denoise.
/// * `params` - The denoise parameters.
///
/// # Errors
///
/// Returns an error if an amount is outside `[0, 1]` or a sigma is not positive.
pub fn denoise(rgb: &mut Image<f32, 3>, params: &DenoiseParams) -> Result<(), ImageError> {
    for smoothing in [params.lightness, params.chrominance].iter().flatten() {
        if !(0.0..=1.0).contains(&smoothing.amount) {
            return Err(ImageError::InvalidParameter(
                "amount",
                format!("{} is outside [0, 1]", smoothing.amount),
            ));
        }
    }

    if params.iterations == 0 || (params.lightness.is_none() && params.chrominance.is_none()) {
        return Ok(());
    }

    let mut lab = Image::<f32, 3>::from_size_val(rgb.size(), 0.0)?;

    for _ in 0..params.iterations {
        color::lab_from_rgb(rgb, &mut lab)?;

        if let Some(smoothing) = &params.lightness {
            let mut l = lab.channel(0)?;
            smooth_plane(&mut l, smoothing, params.star_threshold)?;
            lab.set_channel(0, &l)?;
        }

        if let Some(smoothing) = &params.chrominance {
            for channel in 1..3 {
                let mut plane = lab.channel(channel)?;
                smooth_plane(&mut plane, smoothing, None)?;
                lab.set_channel(channel, &plane)?;
            }
        }

        color::rgb_from_lab(&lab, rgb)?;
    }

    log::debug!("denoise: {} iterations", params.iterations);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn variance(values: impl Iterator<Item = f32> + Clone) -> f32 {
        let n = values.clone().count() as f32;
        let mean = values.clone().sum::<f32>() / n;
        values.map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
    }

    #[test]
    fn test_denoise_reduces_noise() -> Result<(), ImageError> {
        let mut rng = rand::rng();
        let data = (0..32 * 32 * 3)
            .map(|_| 0.3 + rng.random_range(-0.05..0.05))
            .collect::<Vec<f32>>();
        let mut rgb = Image::<f32, 3>::new([32, 32].into(), data)?;
        let before = variance(rgb.as_slice().iter().copied().step_by(3));

        let params = DenoiseParams {
            iterations: 2,
            lightness: Some(SmoothingParams {
                sigma: 1.5,
                amount: 1.0,
            }),
            chrominance: Some(SmoothingParams {
                sigma: 2.0,
                amount: 1.0,
            }),
            star_threshold: None,
        };
        denoise(&mut rgb, &params)?;

        let after = variance(rgb.as_slice().iter().copied().step_by(3));
        assert!(after < before * 0.5);
        Ok(())
    }

    #[test]
    fn test_star_is_protected() -> Result<(), ImageError> {
        let mut rgb = Image::<f32, 3>::from_size_val([9, 9].into(), 0.05)?;
        let center = (4 * 9 + 4) * 3;
        rgb.as_slice_mut()[center..center + 3].copy_from_slice(&[1.0, 1.0, 1.0]);

        let params = DenoiseParams {
            iterations: 1,
            lightness: Some(SmoothingParams {
                sigma: 1.5,
                amount: 1.0,
            }),
            chrominance: None,
            star_threshold: Some(0.03),
        };
        denoise(&mut rgb, &params)?;
        assert!(rgb.as_slice()[center] > 0.99);
        Ok(())
    }

    #[test]
    fn test_zero_iterations_is_identity() -> Result<(), ImageError> {
        let mut rgb = Image::<f32, 3>::new([1, 1].into(), vec![0.1, 0.2, 0.3])?;
        let params = DenoiseParams {
            iterations: 0,
            lightness: Some(SmoothingParams {
                sigma: 1.0,
                amount: 1.0,
            }),
            chrominance: None,
            star_threshold: None,
        };
        denoise(&mut rgb, &params)?;
        assert_eq!(rgb.as_slice(), &[0.1, 0.2, 0.3]);
        Ok(())
    }
}
