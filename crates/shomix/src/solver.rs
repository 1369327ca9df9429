//! Midtones balance solver.
//!
//! Finds the midtones balance `m` that maps a given input level onto a target output level
//! through the midtones transfer function.

use shomix_imgproc::histogram::mtf;

/// Default convergence tolerance.
pub const DEFAULT_EPS: f64 = 5e-5;

/// Smallest accepted tolerance.
pub const MIN_EPS: f64 = 1e-15;

/// Maximum number of interval halvings.
pub const MAX_ITERATIONS: usize = 100;

/// Solve `MTF(m, v1) = v0` for `m` with the default tolerance.
///
/// # Example
///
/// ```
/// use shomix::solver::solve_midtone;
/// use shomix::imgproc::histogram::mtf;
///
/// let m = solve_midtone(0.25, 0.05);
/// assert!((mtf(m, 0.05) - 0.25).abs() < 5e-5);
/// ```
pub fn solve_midtone(v0: f64, v1: f64) -> f64 {
    solve_midtone_with_eps(v0, v1, DEFAULT_EPS)
}

/// Solve `MTF(m, v1) = v0` for `m` by bisection.
///
/// `v0` is clamped to `[0, 1]` and `eps` is floored at [`MIN_EPS`]. An input level `v1` at or
/// below 0 yields 0 and at or above 1 yields 1. The search stops after [`MAX_ITERATIONS`]
/// halvings and returns the current midpoint.
///
/// # Arguments
///
/// * `v0` - The target output level.
/// * `v1` - The input level.
/// * `eps` - The tolerance on the output level.
///
/// # Returns
///
/// The midtones balance in `[0, 1]`.
pub fn solve_midtone_with_eps(v0: f64, v1: f64, eps: f64) -> f64 {
    let v0 = v0.clamp(0.0, 1.0);
    let eps = eps.max(MIN_EPS);

    if v1 <= 0.0 {
        return 0.0;
    }
    if v1 >= 1.0 {
        return 1.0;
    }
    if v0 == v1 {
        return 0.5;
    }

    // the transfer function decreases with m: brightening needs m below 0.5
    let (mut m0, mut m1) = if v1 < v0 { (0.0, 0.5) } else { (0.5, 1.0) };
    let mut m = 0.5 * (m0 + m1);

    for _ in 0..MAX_ITERATIONS {
        m = 0.5 * (m0 + m1);
        let v = mtf(m, v1);
        if (v - v0).abs() < eps {
            return m;
        }
        if v < v0 {
            m1 = m;
        } else {
            m0 = m;
        }
    }

    log::warn!("midtones solver reached the iteration cap for v0={v0}, v1={v1}");
    m
}
