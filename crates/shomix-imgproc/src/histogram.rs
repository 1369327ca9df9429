use shomix_image::{Image, ImageError};

use crate::parallel;

/// Midtones transfer function.
///
/// Maps `x` through the rational curve
///
/// ```text
/// MTF(m, x) = ((m - 1) * x) / ((2m - 1) * x - m)
/// ```
///
/// which fixes 0 and 1, is the identity for `m = 0.5`, brightens for `m < 0.5` and darkens for
/// `m > 0.5`. For a fixed `x` in (0, 1) the curve is monotonically decreasing in `m`.
///
/// # Example
///
/// ```
/// use shomix_imgproc::histogram::mtf;
///
/// assert_eq!(mtf(0.5, 0.3), 0.3);
/// assert!(mtf(0.25, 0.5) > 0.5);
/// assert_eq!(mtf(0.25, 0.0), 0.0);
/// assert_eq!(mtf(0.25, 1.0), 1.0);
/// ```
pub fn mtf(m: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    if m == 0.5 {
        return x;
    }
    ((m - 1.0) * x) / ((2.0 * m - 1.0) * x - m)
}

/// Parameters of a histogram transformation for one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferCurve {
    /// Shadows clipping point; samples at or below map to `low`.
    pub shadows: f64,
    /// Highlights clipping point; samples at or above map to `high`.
    pub highlights: f64,
    /// Midtones balance applied between the clipping points.
    pub midtones: f64,
    /// Lower bound of the output range.
    pub low: f64,
    /// Upper bound of the output range.
    pub high: f64,
}

impl TransferCurve {
    /// The identity transfer curve.
    pub const IDENTITY: TransferCurve = TransferCurve {
        shadows: 0.0,
        highlights: 1.0,
        midtones: 0.5,
        low: 0.0,
        high: 1.0,
    };

    /// Transform a single sample.
    ///
    /// A degenerate curve with `highlights <= shadows` acts as a threshold at `shadows`.
    pub fn apply(&self, x: f32) -> f32 {
        let x = x as f64;
        let y = if self.highlights <= self.shadows {
            if x < self.shadows {
                0.0
            } else {
                1.0
            }
        } else if x <= self.shadows {
            0.0
        } else if x >= self.highlights {
            1.0
        } else {
            mtf(
                self.midtones,
                (x - self.shadows) / (self.highlights - self.shadows),
            )
        };
        (self.low + y * (self.high - self.low)) as f32
    }
}

impl Default for TransferCurve {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Apply a per channel histogram transformation.
///
/// # Arguments
///
/// * `src` - The input image with shape (H, W, C).
/// * `dst` - The output image with shape (H, W, C).
/// * `curves` - One transfer curve per channel.
///
/// # Errors
///
/// Returns an error if the sizes of `src` and `dst` do not match.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::histogram::{histogram_transform, TransferCurve};
///
/// let src = Image::<f32, 1>::new(ImageSize { width: 3, height: 1 }, vec![0.1, 0.2, 0.6]).unwrap();
/// let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0).unwrap();
///
/// let curve = TransferCurve { shadows: 0.2, ..TransferCurve::IDENTITY };
/// histogram_transform(&src, &mut dst, &[curve]).unwrap();
///
/// assert_eq!(dst.as_slice()[0], 0.0);
/// assert_eq!(dst.as_slice()[1], 0.0);
/// assert!((dst.as_slice()[2] - 0.5).abs() < 1e-6);
/// ```
pub fn histogram_transform<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    curves: &[TransferCurve; C],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        src_pixel
            .iter()
            .zip(dst_pixel.iter_mut())
            .zip(curves.iter())
            .for_each(|((&s, d), curve)| *d = curve.apply(s));
    });

    Ok(())
}
