#![deny(missing_docs)]
//! Narrowband channel mixing for astronomical images.
//!
//! Source channels (S, H, O, N and broadband R, V, B) are combined into an RGB composite through
//! a 3x5 coefficient matrix, a luminance layer can be synthesized from master images and injected
//! progressively, and the result can be stretched automatically for display.
//!
//! The pixel work goes through the [`backend::ImagingBackend`] trait; [`backend::CpuBackend`]
//! runs the reference kernels of [`imgproc`].

#[doc(inline)]
pub use shomix_image as image;

#[doc(inline)]
pub use shomix_imgproc as imgproc;

/// imaging primitives consumed by the pipeline.
pub mod backend;

/// luminance synthesis from master images.
pub mod blend;

/// linear channel compositor and mixing coefficients.
pub mod composite;

/// session settings.
pub mod config;

/// error types.
pub mod error;

/// single-flight guard.
pub mod flight;

/// pink halo removal.
pub mod halos;

/// progressive luminance injection.
pub mod inject;

/// coefficient file format.
pub mod persistence;

/// the mixing session.
pub mod session;

/// midtones balance solver.
pub mod solver;

/// automatic stretch estimation and application.
pub mod stretch;

pub use error::MixError;
pub use session::{MixingSession, RunStatus};
