//! Robust per channel statistics used to drive automatic stretching.
//!
//! Astronomical frames are dominated by background sky, so the median is a good estimate of the
//! background level and the average absolute deviation from it a good estimate of its noise.

use shomix_image::{Image, ImageError};

/// Calculate the median of f32 values in-place.
///
/// Mutates the input buffer (partial sort via quickselect). For an even number of samples the
/// mean of the two middle samples is returned.
///
/// PRECONDITION: `data` is not empty.
pub fn median_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let right = *median;

    if len % 2 == 1 {
        return right;
    }

    let left = left_part
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    (left + right) * 0.5
}

/// Average absolute deviation of `values` around `center`.
///
/// Accumulates in f64 to keep large frames accurate.
pub fn avg_dev(values: &[f32], center: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let center = center as f64;
    let sum = values
        .iter()
        .map(|&v| (v as f64 - center).abs())
        .sum::<f64>();
    (sum / values.len() as f64) as f32
}

/// Compute the median and average absolute deviation of one channel of an image.
///
/// Only the samples of `channel` take part in the computation.
///
/// # Arguments
///
/// * `image` - The input image.
/// * `channel` - The channel index to measure.
///
/// # Returns
///
/// A tuple `(median, avg_dev)`.
///
/// # Errors
///
/// Returns [`ImageError::ChannelIndexOutOfBounds`] if the channel does not exist.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::stats::channel_median_avg_dev;
///
/// let image = Image::<f32, 1>::new(
///     ImageSize { width: 5, height: 1 },
///     vec![0.1, 0.2, 0.3, 0.4, 0.5],
/// ).unwrap();
///
/// let (median, avg_dev) = channel_median_avg_dev(&image, 0).unwrap();
/// assert!((median - 0.3).abs() < 1e-6);
/// assert!((avg_dev - 0.12).abs() < 1e-6);
/// ```
pub fn channel_median_avg_dev<const C: usize>(
    image: &Image<f32, C>,
    channel: usize,
) -> Result<(f32, f32), ImageError> {
    if channel >= C {
        return Err(ImageError::ChannelIndexOutOfBounds(channel, C));
    }

    let mut values = image
        .as_slice()
        .iter()
        .skip(channel)
        .step_by(C)
        .copied()
        .collect::<Vec<_>>();

    let median = median_mut(&mut values);
    let avg_dev = avg_dev(&values, median);

    Ok((median, avg_dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        let mut odd = vec![0.5, 0.1, 0.9];
        assert_eq!(median_mut(&mut odd), 0.5);

        let mut even = vec![0.4, 0.1, 0.9, 0.2];
        assert_relative_eq!(median_mut(&mut even), 0.3);
    }

    #[test]
    fn test_channel_isolation() -> Result<(), ImageError> {
        // channel 0 ramps, channel 1 is constant, channel 2 is bright
        let data = (0..4)
            .flat_map(|i| [i as f32 * 0.1, 0.5, 0.9])
            .collect::<Vec<_>>();
        let image = Image::<f32, 3>::new([2, 2].into(), data)?;

        let (m0, d0) = channel_median_avg_dev(&image, 0)?;
        assert_relative_eq!(m0, 0.15, epsilon = 1e-6);
        assert_relative_eq!(d0, 0.1, epsilon = 1e-6);

        let (m1, d1) = channel_median_avg_dev(&image, 1)?;
        assert_eq!(m1, 0.5);
        assert_eq!(d1, 0.0);

        let (m2, _) = channel_median_avg_dev(&image, 2)?;
        assert_eq!(m2, 0.9);

        assert_eq!(
            channel_median_avg_dev(&image, 3).err(),
            Some(ImageError::ChannelIndexOutOfBounds(3, 3))
        );
        Ok(())
    }
}
