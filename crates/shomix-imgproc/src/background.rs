//! Background neutralization: equalizes the sky level of the three color channels.

use rayon::prelude::*;
use shomix_image::{Image, ImageError};

use crate::{
    arithmetic::{apply_range_policy, RangePolicy},
    parallel,
};

/// Reference band and target of a background neutralization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundReference {
    /// Lower bound of the reference band.
    pub low: f32,
    /// Upper bound of the reference band.
    pub high: f32,
    /// Background level every channel is moved to.
    pub target: f32,
}

impl Default for BackgroundReference {
    fn default() -> Self {
        Self {
            low: 0.0,
            high: 0.1,
            target: 0.01,
        }
    }
}

/// Neutralize the background of an RGB image in place.
///
/// Pixels whose three samples all fall inside `[low, high]` form the background reference. Each
/// channel is shifted so that its reference mean equals `target`; the image is rescaled to
/// `[0, 1]` when the shift moves samples out of range.
///
/// # Returns
///
/// The offsets added to each channel.
///
/// # Errors
///
/// Returns [`ImageError::EmptyBackgroundReference`] if no pixel lies inside the band.
pub fn neutralize_background(
    rgb: &mut Image<f32, 3>,
    reference: &BackgroundReference,
) -> Result<[f32; 3], ImageError> {
    let (low, high) = (reference.low, reference.high);

    let (sums, count) = rgb
        .as_slice()
        .par_chunks_exact(3)
        .filter(|px| px.iter().all(|v| (low..=high).contains(v)))
        .fold(
            || ([0.0f64; 3], 0usize),
            |(mut sums, count), px| {
                sums.iter_mut()
                    .zip(px.iter())
                    .for_each(|(s, &v)| *s += v as f64);
                (sums, count + 1)
            },
        )
        .reduce(
            || ([0.0f64; 3], 0usize),
            |(a, na), (b, nb)| ([a[0] + b[0], a[1] + b[1], a[2] + b[2]], na + nb),
        );

    if count == 0 {
        return Err(ImageError::EmptyBackgroundReference(low, high));
    }

    let offsets = sums.map(|s| reference.target - (s / count as f64) as f32);

    parallel::par_iter_rows_mut(rgb, |px| {
        px.iter_mut()
            .zip(offsets.iter())
            .for_each(|(v, &o)| *v += o);
    });

    apply_range_policy(rgb, RangePolicy::Rescale);

    log::debug!(
        "background neutralization: {} reference pixels, offsets {:?}",
        count,
        offsets
    );

    Ok(offsets)
}
