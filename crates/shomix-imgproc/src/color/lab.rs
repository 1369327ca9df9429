use crate::parallel;
use shomix_image::{Image, ImageError};

// D65 reference white
const XN: f32 = 0.95047;
const YN: f32 = 1.0;
const ZN: f32 = 1.08883;

const EPSILON: f32 = 216.0 / 24389.0;
const KAPPA: f32 = 24389.0 / 27.0;

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let f3 = f * f * f;
    if f3 > EPSILON {
        f3
    } else {
        (116.0 * f - 16.0) / KAPPA
    }
}

/// Convert one linear RGB pixel to normalized CIE L*a*b*.
///
/// The components are scaled by 1/100 so that L lies in `[0, 1]` for normalized input; a and b
/// are zero for neutral (r = g = b) pixels.
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = 0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b;

    let fx = lab_f(x / XN);
    let fy = lab_f(y / YN);
    let fz = lab_f(z / ZN);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let bb = 200.0 * (fy - fz);

    [l / 100.0, a / 100.0, bb / 100.0]
}

/// Convert one normalized CIE L*a*b* pixel back to linear RGB.
///
/// Inverse of [`rgb_to_lab`]. The result is not clipped.
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let l = lab[0] * 100.0;
    let a = lab[1] * 100.0;
    let bb = lab[2] * 100.0;

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - bb / 200.0;

    let x = lab_f_inv(fx) * XN;
    let y = lab_f_inv(fy) * YN;
    let z = lab_f_inv(fz) * ZN;

    [
        3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z,
        -0.969_266 * x + 1.876_010_8 * y + 0.041_556 * z,
        0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z,
    ]
}

/// Convert an RGB image to normalized CIE L*a*b*.
///
/// # Arguments
///
/// * `src` - The input RGB image.
/// * `dst` - The output L*a*b* image.
///
/// Precondition: the input and output images must have the same size.
pub fn lab_from_rgb(src: &Image<f32, 3>, dst: &mut Image<f32, 3>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let lab = rgb_to_lab([src_pixel[0], src_pixel[1], src_pixel[2]]);
        dst_pixel.copy_from_slice(&lab);
    });

    Ok(())
}

/// Convert a normalized CIE L*a*b* image to RGB.
///
/// # Arguments
///
/// * `src` - The input L*a*b* image.
/// * `dst` - The output RGB image.
///
/// Precondition: the input and output images must have the same size.
pub fn rgb_from_lab(src: &Image<f32, 3>, dst: &mut Image<f32, 3>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let rgb = lab_to_rgb([src_pixel[0], src_pixel[1], src_pixel[2]]);
        dst_pixel.copy_from_slice(&rgb);
    });

    Ok(())
}

/// Extract the normalized CIE L* lightness of an RGB image.
///
/// Used to desaturate color images to greyscale.
///
/// # Example
///
/// ```
/// use shomix_image::{Image, ImageSize};
/// use shomix_imgproc::color::lightness_from_rgb;
///
/// let rgb = Image::<f32, 3>::new(ImageSize { width: 1, height: 1 }, vec![1.0, 1.0, 1.0]).unwrap();
/// let mut gray = Image::<f32, 1>::from_size_val(rgb.size(), 0.0).unwrap();
///
/// lightness_from_rgb(&rgb, &mut gray).unwrap();
/// assert!((gray.as_slice()[0] - 1.0).abs() < 1e-4);
/// ```
pub fn lightness_from_rgb(src: &Image<f32, 3>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        dst_pixel[0] = rgb_to_lab([src_pixel[0], src_pixel[1], src_pixel[2]])[0];
    });

    Ok(())
}
