//! Luminance combination: replaces the lightness of a color image by a separate luminance layer.
//!
//! The color image is converted to CIE L*a*b*, its lightness is pulled toward the luminance layer
//! and both lightness and chroma go through a midtones transfer before converting back to RGB.

use shomix_image::{Image, ImageError};

use crate::{color, filter, histogram::mtf, parallel};

/// Chrominance noise reduction applied to the a* and b* planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChrominanceNoiseReduction {
    /// Number of starlet detail layers that are removed.
    pub layers_removed: usize,
    /// Number of the finest layers that are kept even when they fall below `layers_removed`.
    pub layers_protected: usize,
}

/// Parameters of a luminance combination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LuminanceCombination {
    /// Amount of the luminance layer in the new lightness, in `[0, 1]`.
    pub weight: f32,
    /// Midtones balance applied to the new lightness, 0.5 is the identity.
    pub lightness_midtones: f32,
    /// Midtones balance applied to the chroma, 0.5 is the identity.
    pub saturation_midtones: f32,
    /// Clip highlights to `[0, 1]` instead of scaling saturated pixels down.
    pub clip_highlights: bool,
    /// Optional chrominance noise reduction.
    pub chrominance_noise: Option<ChrominanceNoiseReduction>,
}

impl Default for LuminanceCombination {
    fn default() -> Self {
        Self {
            weight: 1.0,
            lightness_midtones: 0.5,
            saturation_midtones: 0.5,
            clip_highlights: true,
            chrominance_noise: None,
        }
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ImageError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ImageError::InvalidParameter(
            name,
            format!("{value} is outside [0, 1]"),
        ));
    }
    Ok(())
}

fn reduce_chrominance_noise(
    lab: &mut Image<f32, 3>,
    params: &ChrominanceNoiseReduction,
) -> Result<(), ImageError> {
    for channel in 1..3 {
        let plane = lab.channel(channel)?;
        let (mut details, residual) = filter::starlet_decompose(&plane, params.layers_removed)?;
        details
            .iter_mut()
            .skip(params.layers_protected)
            .for_each(|layer| layer.fill(0.0));
        let denoised = filter::starlet_reconstruct(&details, &residual)?;
        lab.set_channel(channel, &denoised)?;
    }
    Ok(())
}

/// Combine a luminance layer into an RGB image in place.
///
/// # Arguments
///
/// * `rgb` - The color image, modified in place.
/// * `lum` - The luminance layer, same size as `rgb`.
/// * `params` - The combination parameters.
///
/// # Errors
///
/// Returns an error if the sizes differ or a parameter is outside `[0, 1]`.
pub fn combine_luminance(
    rgb: &mut Image<f32, 3>,
    lum: &Image<f32, 1>,
    params: &LuminanceCombination,
) -> Result<(), ImageError> {
    if rgb.size() != lum.size() {
        return Err(ImageError::InvalidImageSize(
            rgb.cols(),
            rgb.rows(),
            lum.cols(),
            lum.rows(),
        ));
    }
    check_unit("weight", params.weight)?;
    check_unit("lightness_midtones", params.lightness_midtones)?;
    check_unit("saturation_midtones", params.saturation_midtones)?;

    let mut lab = Image::<f32, 3>::from_size_val(rgb.size(), 0.0)?;
    color::lab_from_rgb(rgb, &mut lab)?;

    let weight = params.weight;
    let ml = params.lightness_midtones as f64;
    let mc = params.saturation_midtones as f64;

    parallel::par_iter_rows(lum, &mut lab, |lum_pixel, lab_pixel| {
        let l = lab_pixel[0] + weight * (lum_pixel[0] - lab_pixel[0]);
        lab_pixel[0] = mtf(ml, l as f64) as f32;

        let chroma = lab_pixel[1].hypot(lab_pixel[2]);
        if chroma > 0.0 && chroma < 1.0 {
            let scale = (mtf(mc, chroma as f64) / chroma as f64) as f32;
            lab_pixel[1] *= scale;
            lab_pixel[2] *= scale;
        }
    });

    if let Some(nr) = &params.chrominance_noise {
        reduce_chrominance_noise(&mut lab, nr)?;
    }

    color::rgb_from_lab(&lab, rgb)?;

    let clip = params.clip_highlights;
    parallel::par_iter_rows_mut(rgb, |px| {
        if !clip {
            let max = px.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            if max > 1.0 {
                px.iter_mut().for_each(|v| *v /= max);
            }
        }
        px.iter_mut().for_each(|v| *v = v.clamp(0.0, 1.0));
    });

    log::debug!(
        "luminance combination: weight {:.3}, lightness {:.3}, saturation {:.3}",
        weight,
        ml,
        mc
    );

    Ok(())
}
