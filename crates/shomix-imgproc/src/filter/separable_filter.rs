use rayon::prelude::*;
use shomix_image::{Image, ImageError};

fn clamped_offsets(kernel_len: usize, dilation: usize) -> Result<Vec<isize>, ImageError> {
    let too_wide = || {
        ImageError::InvalidParameter(
            "dilation",
            format!("{dilation} overflows the offsets of a {kernel_len} tap kernel"),
        )
    };
    let half = (kernel_len / 2) as isize;
    let dilation = isize::try_from(dilation).map_err(|_| too_wide())?;
    (0..kernel_len as isize)
        .map(|i| (i - half).checked_mul(dilation).ok_or_else(too_wide))
        .collect()
}

/// Apply a separable filter to an image.
///
/// The horizontal kernel is applied first into a temporary buffer, then the vertical kernel.
/// Samples outside of the image are replicated from the nearest border sample. With a
/// `dilation` greater than one the kernel taps are spread `dilation` pixels apart (à trous).
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel. Must have odd length.
/// * `kernel_y` - The vertical kernel. Must have odd length.
/// * `dilation` - The spacing between kernel taps, at least 1.
///
/// # Errors
///
/// Returns an error if the image sizes differ, the dilation is zero or the dilated kernel offsets
/// overflow.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
    dilation: usize,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    if dilation == 0 {
        return Err(ImageError::InvalidParameter(
            "dilation",
            "must be at least 1".to_string(),
        ));
    }

    let rows = src.rows();
    let cols = src.cols();
    let offsets_x = clamped_offsets(kernel_x.len(), dilation)?;
    let offsets_y = clamped_offsets(kernel_y.len(), dilation)?;

    let src_data = src.as_slice();
    let mut temp = vec![0.0f32; src_data.len()];

    // horizontal
    temp.par_chunks_exact_mut(cols * C)
        .zip(src_data.par_chunks_exact(cols * C))
        .for_each(|(row_temp, row_src)| {
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (&k, &off) in kernel_x.iter().zip(offsets_x.iter()) {
                    let x = (c as isize)
                        .saturating_add(off)
                        .clamp(0, cols as isize - 1) as usize;
                    let px = &row_src[x * C..x * C + C];
                    acc.iter_mut().zip(px.iter()).for_each(|(a, &v)| *a += v * k);
                }
                row_temp[c * C..c * C + C].copy_from_slice(&acc);
            }
        });

    // vertical
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, row_dst)| {
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (&k, &off) in kernel_y.iter().zip(offsets_y.iter()) {
                    let y = (r as isize)
                        .saturating_add(off)
                        .clamp(0, rows as isize - 1) as usize;
                    let idx = (y * cols + c) * C;
                    let px = &temp[idx..idx + C];
                    acc.iter_mut().zip(px.iter()).for_each(|(a, &v)| *a += v * k);
                }
                row_dst[c * C..c * C + C].copy_from_slice(&acc);
            }
        });

    Ok(())
}
