#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// pixel arithmetic: linear combinations, blend formulas and range policies.
pub mod arithmetic;

/// background neutralization module.
pub mod background;

/// color transformations module.
pub mod color;

/// noise reduction module.
pub mod denoise;

/// image filtering module.
pub mod filter;

/// histogram transformation and midtones transfer function.
pub mod histogram;

/// luminance combination module.
pub mod lrgb;

/// module containing parallelization utilities.
pub mod parallel;

/// green cast suppression module.
pub mod scnr;

/// per channel pixel statistics.
pub mod stats;
