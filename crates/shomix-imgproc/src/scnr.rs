//! Subtractive chromatic noise reduction of the green channel.

use shomix_image::{Image, ImageError};

use crate::{color, parallel};

/// Remove a green cast with the average neutral protection method.
///
/// Each green sample is limited to the mean of its red and blue samples, `g' = min(g, (r+b)/2)`,
/// and the result is blended with the original green by `amount`. With `preserve_lightness` the
/// CIE L* of every pixel is restored after the suppression.
///
/// # Errors
///
/// Returns an error if `amount` is outside `[0, 1]`.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::scnr::suppress_green;
///
/// let mut rgb = Image::<f32, 3>::new(ImageSize { width: 1, height: 1 }, vec![0.2, 0.8, 0.4]).unwrap();
/// suppress_green(&mut rgb, 1.0, false).unwrap();
/// assert!((rgb.as_slice()[1] - 0.3).abs() < 1e-6);
/// ```
pub fn suppress_green(
    rgb: &mut Image<f32, 3>,
    amount: f32,
    preserve_lightness: bool,
) -> Result<(), ImageError> {
    if !(0.0..=1.0).contains(&amount) {
        return Err(ImageError::InvalidParameter(
            "amount",
            format!("{amount} is outside [0, 1]"),
        ));
    }

    parallel::par_iter_rows_mut(rgb, |px| {
        let (r, g, b) = (px[0], px[1], px[2]);
        let neutral = g.min(0.5 * (r + b));
        let g_new = g + amount * (neutral - g);

        if !preserve_lightness || g_new == g {
            px[1] = g_new;
            return;
        }

        let lightness = color::rgb_to_lab([r, g, b])[0];
        let mut lab = color::rgb_to_lab([r, g_new, b]);
        lab[0] = lightness;
        let restored = color::lab_to_rgb(lab);
        px.iter_mut()
            .zip(restored.iter())
            .for_each(|(v, &n)| *v = n.clamp(0.0, 1.0));
    });

    Ok(())
}
