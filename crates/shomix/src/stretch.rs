//! Automatic screen stretch: estimation of per channel transfer curves from robust statistics and
//! their application, either baked into a copy of the pixels or attached as a display curve.

use shomix_image::Image;
use shomix_imgproc::histogram::TransferCurve;

use crate::{backend::ImagingBackend, error::MixError, solver::solve_midtone};

/// Default shadows clipping point, in units of average deviation from the median.
pub const SHADOWS_CLIP: f64 = -1.25;

/// Default target background level.
pub const TARGET_BACKGROUND: f64 = 0.25;

/// One row of a stretch descriptor: clipping points, midtones balance and output range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StretchRow {
    /// Shadows clipping point.
    pub c0: f64,
    /// Highlights clipping point.
    pub c1: f64,
    /// Midtones balance.
    pub m: f64,
    /// Lower bound of the output range.
    pub r0: f64,
    /// Upper bound of the output range.
    pub r1: f64,
}

impl StretchRow {
    /// The identity row.
    pub const NEUTRAL: StretchRow = StretchRow {
        c0: 0.0,
        c1: 1.0,
        m: 0.5,
        r0: 0.0,
        r1: 1.0,
    };

    /// Create a row with the full output range.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if `c0 > c1` or `m` is outside `[0, 1]`.
    pub fn new(c0: f64, c1: f64, m: f64) -> Result<Self, MixError> {
        if c0 > c1 {
            return Err(MixError::InvalidInput(format!(
                "shadows clipping {c0} above highlights clipping {c1}"
            )));
        }
        if !(0.0..=1.0).contains(&m) {
            return Err(MixError::InvalidInput(format!(
                "midtones balance {m} outside [0, 1]"
            )));
        }
        Ok(Self {
            c0,
            c1,
            m,
            r0: 0.0,
            r1: 1.0,
        })
    }

    /// The transfer curve of this row.
    pub fn curve(&self) -> TransferCurve {
        TransferCurve {
            shadows: self.c0,
            highlights: self.c1,
            midtones: self.m,
            low: self.r0,
            high: self.r1,
        }
    }
}

impl Default for StretchRow {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Per channel stretch rows plus the fixed neutral luminance row.
#[derive(Clone, Debug, PartialEq)]
pub struct StretchDescriptor {
    /// One row per image channel.
    pub channels: Vec<StretchRow>,
    /// The luminance row, always [`StretchRow::NEUTRAL`].
    pub luminance: StretchRow,
}

impl StretchDescriptor {
    /// The transfer curves for an image with `C` channels.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if the descriptor does not hold `C` rows.
    pub fn curves<const C: usize>(&self) -> Result<[TransferCurve; C], MixError> {
        if self.channels.len() != C {
            return Err(MixError::InvalidInput(format!(
                "stretch descriptor has {} rows for an image with {} channels",
                self.channels.len(),
                C
            )));
        }
        let mut curves = [TransferCurve::IDENTITY; C];
        curves
            .iter_mut()
            .zip(self.channels.iter())
            .for_each(|(curve, row)| *curve = row.curve());
        Ok(curves)
    }
}

/// Parameters of the stretch estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StretchParams {
    /// Shadows clipping point in average deviations from the median, usually negative.
    pub shadows_clip: f64,
    /// Target background level.
    pub target_background: f64,
    /// Share one curve between all channels.
    pub linked: bool,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            shadows_clip: SHADOWS_CLIP,
            target_background: TARGET_BACKGROUND,
            linked: false,
        }
    }
}

fn inverted_row(median: f64, avg_dev: f64, params: &StretchParams) -> Result<StretchRow, MixError> {
    let c1 = (median - params.shadows_clip * avg_dev).clamp(0.0, 1.0);
    let m = 1.0 - solve_midtone(params.target_background, c1 - median);
    StretchRow::new(0.0, c1, m)
}

fn direct_row(median: f64, avg_dev: f64, params: &StretchParams) -> Result<StretchRow, MixError> {
    let c0 = (median + params.shadows_clip * avg_dev).clamp(0.0, 1.0);
    let m = solve_midtone(params.target_background, median - c0);
    StretchRow::new(c0, 1.0, m)
}

/// Estimate a stretch descriptor from per channel statistics.
///
/// A channel counts as inverted when its median is above 0.5. In linked mode one row is shared
/// by every channel; it uses the inverted formula only when all channels are inverted. Unlinked,
/// each channel gets its own row. The image is not modified.
///
/// # Arguments
///
/// * `backend` - Provides the channel statistics.
/// * `image` - The image to measure.
/// * `params` - The estimation parameters.
///
/// # Returns
///
/// A descriptor with one row per channel.
pub fn estimate_stretch<B: ImagingBackend, const C: usize>(
    backend: &B,
    image: &Image<f32, C>,
    params: &StretchParams,
) -> Result<StretchDescriptor, MixError> {
    let stats = (0..C)
        .map(|c| backend.channel_stats(image, c))
        .collect::<Result<Vec<_>, _>>()?;

    let channels = if params.linked {
        let n = stats.len() as f64;
        let inverted = stats.iter().filter(|s| s.median > 0.5).count();
        let median = stats.iter().map(|s| s.median).sum::<f64>() / n;

        let row = if inverted < stats.len() {
            let c0 = stats
                .iter()
                .map(|s| s.median + params.shadows_clip * s.avg_dev)
                .sum::<f64>()
                / n;
            let c0 = c0.clamp(0.0, 1.0);
            let m = solve_midtone(params.target_background, median - c0);
            StretchRow::new(c0, 1.0, m)?
        } else {
            let c1 = stats
                .iter()
                .map(|s| s.median - params.shadows_clip * s.avg_dev)
                .sum::<f64>()
                / n;
            let c1 = c1.clamp(0.0, 1.0);
            let m = 1.0 - solve_midtone(params.target_background, c1 - median);
            StretchRow::new(0.0, c1, m)?
        };
        vec![row; C]
    } else {
        stats
            .iter()
            .map(|s| {
                if s.median > 0.5 {
                    inverted_row(s.median, s.avg_dev, params)
                } else {
                    direct_row(s.median, s.avg_dev, params)
                }
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    for (c, row) in channels.iter().enumerate() {
        log::debug!(
            "stretch channel {}: c0 {:.6} c1 {:.6} m {:.6}",
            c,
            row.c0,
            row.c1,
            row.m
        );
    }

    Ok(StretchDescriptor {
        channels,
        luminance: StretchRow::NEUTRAL,
    })
}

/// How a stretch is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StretchMode {
    /// Transform a copy of the pixels.
    Bake,
    /// Attach the stretch as a display curve; stored pixels are untouched.
    Preview,
}

/// An image together with an optional display-only stretch.
#[derive(Clone, Debug)]
pub struct DisplayView<const C: usize> {
    image: Image<f32, C>,
    stf: Option<StretchDescriptor>,
}

impl<const C: usize> DisplayView<C> {
    /// Create a view without display curve.
    pub fn new(image: Image<f32, C>) -> Self {
        Self { image, stf: None }
    }

    /// The stored image.
    pub fn image(&self) -> &Image<f32, C> {
        &self.image
    }

    /// Mutable access to the stored image.
    pub fn image_mut(&mut self) -> &mut Image<f32, C> {
        &mut self.image
    }

    /// Consume the view and return the stored image.
    pub fn into_image(self) -> Image<f32, C> {
        self.image
    }

    /// The attached display curve.
    pub fn stf(&self) -> Option<&StretchDescriptor> {
        self.stf.as_ref()
    }

    /// Attach a display curve, replacing the previous one.
    pub fn attach_stretch(&mut self, descriptor: StretchDescriptor) {
        self.stf = Some(descriptor);
    }

    /// Remove the display curve.
    pub fn clear_stretch(&mut self) {
        self.stf = None;
    }

    /// The image as displayed: the stored image through the display curve, if any.
    pub fn render<B: ImagingBackend>(&self, backend: &B) -> Result<Image<f32, C>, MixError> {
        match &self.stf {
            Some(descriptor) => bake_stretch(backend, &self.image, descriptor),
            None => Ok(self.image.clone()),
        }
    }
}

/// Apply a stretch to a copy of `image`.
pub fn bake_stretch<B: ImagingBackend, const C: usize>(
    backend: &B,
    image: &Image<f32, C>,
    descriptor: &StretchDescriptor,
) -> Result<Image<f32, C>, MixError> {
    let mut dst = Image::from_size_val(image.size(), 0.0)?;
    bake_stretch_into(backend, image, &mut dst, descriptor)?;
    Ok(dst)
}

/// Apply a stretch to `src`, writing the result into an existing image of the same size.
pub fn bake_stretch_into<B: ImagingBackend, const C: usize>(
    backend: &B,
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    descriptor: &StretchDescriptor,
) -> Result<(), MixError> {
    let curves = descriptor.curves::<C>()?;
    backend.histogram_transform(src, dst, &curves)
}

/// Apply a stretch to a view.
///
/// In [`StretchMode::Bake`] the stored image is transformed into a new image and left untouched.
/// In [`StretchMode::Preview`] the descriptor becomes the display curve of the view. Both modes
/// return the resulting image.
pub fn apply_stretch<B: ImagingBackend, const C: usize>(
    backend: &B,
    view: &mut DisplayView<C>,
    descriptor: &StretchDescriptor,
    mode: StretchMode,
) -> Result<Image<f32, C>, MixError> {
    match mode {
        StretchMode::Bake => bake_stretch(backend, view.image(), descriptor),
        StretchMode::Preview => {
            view.attach_stretch(descriptor.clone());
            view.render(backend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use approx::assert_relative_eq;
    use rand::Rng;
    use shomix_image::ImageSize;
    use shomix_imgproc::histogram::mtf;

    fn sky(size: ImageSize, level: f32, noise: f32) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..size.num_pixels())
            .map(|_| level + rng.random_range(-noise..noise))
            .collect()
    }

    fn interleave(planes: [&[f32]; 3]) -> Vec<f32> {
        (0..planes[0].len())
            .flat_map(|i| [planes[0][i], planes[1][i], planes[2][i]])
            .collect()
    }

    #[test]
    fn test_row_guard() {
        assert!(StretchRow::new(0.6, 0.4, 0.5).is_err());
        assert!(StretchRow::new(0.1, 1.0, 1.5).is_err());
        assert_eq!(
            StretchRow::new(0.0, 1.0, 0.5).ok(),
            Some(StretchRow::NEUTRAL)
        );
    }

    #[test]
    fn test_direct_row_maps_median_to_target() -> Result<(), MixError> {
        let size = ImageSize {
            width: 64,
            height: 64,
        };
        let image = Image::<f32, 1>::new(size, sky(size, 0.05, 0.01))?;
        let descriptor = estimate_stretch(&CpuBackend, &image, &StretchParams::default())?;
        assert_eq!(descriptor.channels.len(), 1);
        assert_eq!(descriptor.luminance, StretchRow::NEUTRAL);

        let stats = CpuBackend.channel_stats(&image, 0)?;
        let row = descriptor.channels[0];
        assert_eq!(row.c1, 1.0);
        assert!(row.c0 < stats.median);
        let y = mtf(row.m, stats.median - row.c0);
        assert_relative_eq!(y, TARGET_BACKGROUND, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_inverted_channel() -> Result<(), MixError> {
        let size = ImageSize {
            width: 32,
            height: 32,
        };
        let image = Image::<f32, 1>::new(size, sky(size, 0.9, 0.01))?;
        let descriptor = estimate_stretch(&CpuBackend, &image, &StretchParams::default())?;
        let row = descriptor.channels[0];
        assert_eq!(row.c0, 0.0);
        assert!(row.c1 > 0.9);
        assert!(row.m > 0.5);
        Ok(())
    }

    #[test]
    fn test_linked_rows_are_shared() -> Result<(), MixError> {
        let size = ImageSize {
            width: 32,
            height: 32,
        };
        let r = sky(size, 0.04, 0.01);
        let g = sky(size, 0.08, 0.02);
        let b = sky(size, 0.12, 0.01);
        let image = Image::<f32, 3>::new(size, interleave([&r, &g, &b]))?;
        let params = StretchParams {
            linked: true,
            ..Default::default()
        };
        let descriptor = estimate_stretch(&CpuBackend, &image, &params)?;
        assert_eq!(descriptor.channels.len(), 3);
        assert_eq!(descriptor.channels[0], descriptor.channels[1]);
        assert_eq!(descriptor.channels[1], descriptor.channels[2]);

        let unlinked = estimate_stretch(&CpuBackend, &image, &StretchParams::default())?;
        assert_ne!(unlinked.channels[0], unlinked.channels[2]);
        Ok(())
    }

    #[test]
    fn test_linked_all_inverted() -> Result<(), MixError> {
        let size = ImageSize {
            width: 32,
            height: 32,
        };
        let r = sky(size, 0.6, 0.01);
        let g = sky(size, 0.75, 0.02);
        let b = sky(size, 0.9, 0.01);
        let image = Image::<f32, 3>::new(size, interleave([&r, &g, &b]))?;
        let params = StretchParams {
            linked: true,
            ..Default::default()
        };

        let stats = (0..3)
            .map(|c| CpuBackend.channel_stats(&image, c))
            .collect::<Result<Vec<_>, _>>()?;
        let median = stats.iter().map(|s| s.median).sum::<f64>() / 3.0;
        let c1 = (stats
            .iter()
            .map(|s| s.median - params.shadows_clip * s.avg_dev)
            .sum::<f64>()
            / 3.0)
            .clamp(0.0, 1.0);
        let m = 1.0 - solve_midtone(params.target_background, c1 - median);

        let descriptor = estimate_stretch(&CpuBackend, &image, &params)?;
        for row in &descriptor.channels {
            assert_eq!(row.c0, 0.0);
            assert_relative_eq!(row.c1, c1, epsilon = 1e-12);
            assert_relative_eq!(row.m, m, epsilon = 1e-12);
            assert!(row.c1 > median);
            assert!(row.m > 0.5);
        }
        assert_eq!(descriptor.channels[0], descriptor.channels[2]);

        // one direct channel switches the shared row back to the direct formula
        let dark = sky(size, 0.2, 0.01);
        let mixed = Image::<f32, 3>::new(size, interleave([&dark, &g, &b]))?;
        let row = estimate_stretch(&CpuBackend, &mixed, &params)?.channels[0];
        assert_eq!(row.c1, 1.0);
        assert!(row.c0 > 0.0);
        Ok(())
    }

    #[test]
    fn test_linked_permutation_invariant() -> Result<(), MixError> {
        let size = ImageSize {
            width: 16,
            height: 16,
        };
        let a = sky(size, 0.1, 0.02);
        let b = sky(size, 0.2, 0.05);
        let c = sky(size, 0.7, 0.05);
        let params = StretchParams {
            linked: true,
            ..Default::default()
        };

        let abc = Image::<f32, 3>::new(size, interleave([&a, &b, &c]))?;
        let cab = Image::<f32, 3>::new(size, interleave([&c, &a, &b]))?;
        let d0 = estimate_stretch(&CpuBackend, &abc, &params)?;
        let d1 = estimate_stretch(&CpuBackend, &cab, &params)?;
        for (r0, r1) in d0.channels.iter().zip(d1.channels.iter()) {
            assert_relative_eq!(r0.c0, r1.c0, epsilon = 1e-12);
            assert_relative_eq!(r0.c1, r1.c1, epsilon = 1e-12);
            assert_relative_eq!(r0.m, r1.m, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_bake_and_preview() -> Result<(), MixError> {
        let size = ImageSize {
            width: 16,
            height: 16,
        };
        let image = Image::<f32, 1>::new(size, sky(size, 0.05, 0.01))?;
        let descriptor = estimate_stretch(&CpuBackend, &image, &StretchParams::default())?;

        let mut view = DisplayView::new(image.clone());
        let baked = apply_stretch(&CpuBackend, &mut view, &descriptor, StretchMode::Bake)?;
        assert_eq!(view.image(), &image);
        assert!(view.stf().is_none());
        assert_ne!(baked, image);

        let shown = apply_stretch(&CpuBackend, &mut view, &descriptor, StretchMode::Preview)?;
        assert_eq!(view.image(), &image);
        assert_eq!(view.stf(), Some(&descriptor));
        assert_eq!(shown, baked);

        // idempotent
        let again = apply_stretch(&CpuBackend, &mut view, &descriptor, StretchMode::Preview)?;
        assert_eq!(again, shown);
        assert_eq!(
            apply_stretch(&CpuBackend, &mut view, &descriptor, StretchMode::Bake)?,
            baked
        );
        Ok(())
    }

    #[test]
    fn test_descriptor_channel_mismatch() -> Result<(), MixError> {
        let image = Image::<f32, 3>::from_size_val([2, 2].into(), 0.1)?;
        let descriptor = StretchDescriptor {
            channels: vec![StretchRow::NEUTRAL],
            luminance: StretchRow::NEUTRAL,
        };
        let res = bake_stretch(&CpuBackend, &image, &descriptor);
        assert!(matches!(res, Err(MixError::InvalidInput(_))));
        Ok(())
    }
}
