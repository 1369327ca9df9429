//! Filter operations
//!
//! Separable convolutions with replicated borders and the à trous starlet transform used for
//! multiscale noise reduction.

/// Filter kernels
pub mod kernels;

/// Filter operations
mod ops;
pub use ops::*;

/// Separable filter operations
mod separable_filter;
pub use separable_filter::*;

/// Starlet (à trous wavelet) transform
mod starlet;
pub use starlet::*;
