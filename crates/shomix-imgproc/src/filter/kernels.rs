/// Create a gaussian blur kernel.
///
/// The kernel covers three standard deviations on each side, so its size is
/// `2 * ceil(3 * sigma) + 1`.
///
/// # Arguments
///
/// * `sigma` - The sigma of the gaussian kernel. Must be positive.
///
/// # Returns
///
/// A normalized vector of the kernel.
pub fn gaussian_kernel_1d(sigma: f32) -> Vec<f32> {
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    let kernel_size = 2 * half + 1;
    let mut kernel = Vec::with_capacity(kernel_size);

    let sigma_sq = sigma * sigma;

    for i in 0..kernel_size {
        let x = i as f32 - half as f32;
        kernel.push((-(x * x) / (2.0 * sigma_sq)).exp());
    }

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    kernel
}

/// The B3 spline kernel `[1, 4, 6, 4, 1] / 16` of the starlet transform.
pub fn b3_spline_kernel_1d() -> Vec<f32> {
    vec![1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0]
}
