//! The imaging primitives the mixing pipeline is built on.
//!
//! The pipeline only talks to pixels through [`ImagingBackend`]; [`CpuBackend`] implements it with
//! the reference kernels of `shomix-imgproc`.

use shomix_image::Image;
use shomix_imgproc::{
    arithmetic::{self, BlendOp, RangePolicy},
    background::{self, BackgroundReference},
    color,
    denoise::{self, DenoiseParams},
    histogram::{self, TransferCurve},
    lrgb::{self, LuminanceCombination},
    scnr, stats,
};

use crate::error::MixError;

/// Robust statistics of one image channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelStats {
    /// Median of the channel samples.
    pub median: f64,
    /// Average absolute deviation from the median.
    pub avg_dev: f64,
}

/// Pixel level operations consumed by the mixing pipeline.
///
/// Implementations report failures as [`MixError::PrimitiveFailure`]; callers propagate them
/// unchanged.
pub trait ImagingBackend {
    /// Median and average absolute deviation of one channel.
    fn channel_stats<const C: usize>(
        &self,
        image: &Image<f32, C>,
        channel: usize,
    ) -> Result<ChannelStats, MixError>;

    /// Per channel histogram transformation from `src` into `dst`.
    fn histogram_transform<const C: usize>(
        &self,
        src: &Image<f32, C>,
        dst: &mut Image<f32, C>,
        curves: &[TransferCurve; C],
    ) -> Result<(), MixError>;

    /// Weighted sum of single channel images into an RGB image.
    fn linear_combination(
        &self,
        terms: &[(&Image<f32, 1>, [f32; 3])],
        policy: RangePolicy,
        dst: &mut Image<f32, 3>,
    ) -> Result<(), MixError>;

    /// Pointwise blend of weighted single channel images.
    fn blend(
        &self,
        inputs: &[&Image<f32, 1>],
        weights: &[f32],
        op: BlendOp,
        policy: RangePolicy,
        dst: &mut Image<f32, 1>,
    ) -> Result<(), MixError>;

    /// Greyscale version of a color image.
    fn desaturate(&self, src: &Image<f32, 3>, dst: &mut Image<f32, 1>) -> Result<(), MixError>;

    /// Merge a luminance layer into an RGB image in place.
    fn combine_luminance(
        &self,
        rgb: &mut Image<f32, 3>,
        lum: &Image<f32, 1>,
        params: &LuminanceCombination,
    ) -> Result<(), MixError>;

    /// Denoise an RGB image in place.
    fn denoise(&self, rgb: &mut Image<f32, 3>, params: &DenoiseParams) -> Result<(), MixError>;

    /// Equalize the background of an RGB image in place, returning the channel offsets.
    fn neutralize_background(
        &self,
        rgb: &mut Image<f32, 3>,
        reference: &BackgroundReference,
    ) -> Result<[f32; 3], MixError>;

    /// Remove a green cast in place.
    fn suppress_green(
        &self,
        rgb: &mut Image<f32, 3>,
        amount: f32,
        preserve_lightness: bool,
    ) -> Result<(), MixError>;

    /// Invert an image in place.
    fn invert<const C: usize>(&self, image: &mut Image<f32, C>) -> Result<(), MixError>;
}

/// Reference backend running the `shomix-imgproc` kernels on the CPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl ImagingBackend for CpuBackend {
    fn channel_stats<const C: usize>(
        &self,
        image: &Image<f32, C>,
        channel: usize,
    ) -> Result<ChannelStats, MixError> {
        let (median, avg_dev) = stats::channel_median_avg_dev(image, channel)?;
        Ok(ChannelStats {
            median: median as f64,
            avg_dev: avg_dev as f64,
        })
    }

    fn histogram_transform<const C: usize>(
        &self,
        src: &Image<f32, C>,
        dst: &mut Image<f32, C>,
        curves: &[TransferCurve; C],
    ) -> Result<(), MixError> {
        Ok(histogram::histogram_transform(src, dst, curves)?)
    }

    fn linear_combination(
        &self,
        terms: &[(&Image<f32, 1>, [f32; 3])],
        policy: RangePolicy,
        dst: &mut Image<f32, 3>,
    ) -> Result<(), MixError> {
        Ok(arithmetic::linear_combination(terms, policy, dst)?)
    }

    fn blend(
        &self,
        inputs: &[&Image<f32, 1>],
        weights: &[f32],
        op: BlendOp,
        policy: RangePolicy,
        dst: &mut Image<f32, 1>,
    ) -> Result<(), MixError> {
        Ok(arithmetic::blend(inputs, weights, op, policy, dst)?)
    }

    fn desaturate(&self, src: &Image<f32, 3>, dst: &mut Image<f32, 1>) -> Result<(), MixError> {
        Ok(color::lightness_from_rgb(src, dst)?)
    }

    fn combine_luminance(
        &self,
        rgb: &mut Image<f32, 3>,
        lum: &Image<f32, 1>,
        params: &LuminanceCombination,
    ) -> Result<(), MixError> {
        Ok(lrgb::combine_luminance(rgb, lum, params)?)
    }

    fn denoise(&self, rgb: &mut Image<f32, 3>, params: &DenoiseParams) -> Result<(), MixError> {
        Ok(denoise::denoise(rgb, params)?)
    }

    fn neutralize_background(
        &self,
        rgb: &mut Image<f32, 3>,
        reference: &BackgroundReference,
    ) -> Result<[f32; 3], MixError> {
        Ok(background::neutralize_background(rgb, reference)?)
    }

    fn suppress_green(
        &self,
        rgb: &mut Image<f32, 3>,
        amount: f32,
        preserve_lightness: bool,
    ) -> Result<(), MixError> {
        Ok(scnr::suppress_green(rgb, amount, preserve_lightness)?)
    }

    fn invert<const C: usize>(&self, image: &mut Image<f32, C>) -> Result<(), MixError> {
        arithmetic::invert(image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cpu_channel_stats() -> Result<(), MixError> {
        let image = Image::<f32, 3>::new(
            [2, 1].into(),
            vec![0.1, 0.5, 0.9, 0.3, 0.5, 0.7],
        )?;
        let stats = CpuBackend.channel_stats(&image, 0)?;
        assert_relative_eq!(stats.median, 0.2, epsilon = 1e-6);
        assert_relative_eq!(stats.avg_dev, 0.1, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_cpu_errors_are_primitive_failures() -> Result<(), MixError> {
        let image = Image::<f32, 1>::from_size_val([2, 2].into(), 0.0)?;
        let res = CpuBackend.channel_stats(&image, 1);
        assert!(matches!(res, Err(MixError::PrimitiveFailure(_))));
        Ok(())
    }
}
