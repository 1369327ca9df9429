//! Luminance synthesis from two or three master images.

use serde::{Deserialize, Serialize};
use shomix_image::Image;
use shomix_imgproc::arithmetic::{BlendOp, RangePolicy};

use crate::{backend::ImagingBackend, error::MixError, flight::SingleFlight};

/// Blend formulas for two masters `a` and `b`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFormula2 {
    /// `min(a, b)`
    #[default]
    Darken,
    /// `a * b`
    Multiply,
    /// `max(a, b)`
    Lighten,
    /// `1 - (1 - a)(1 - b)`
    Screen,
    /// Screen where `a > 0.5`, multiply elsewhere.
    Overlay,
}

impl BlendFormula2 {
    fn op(&self) -> BlendOp {
        match self {
            BlendFormula2::Darken => BlendOp::Min,
            BlendFormula2::Multiply => BlendOp::Multiply,
            BlendFormula2::Lighten => BlendOp::Max,
            BlendFormula2::Screen => BlendOp::Screen,
            BlendFormula2::Overlay => BlendOp::Overlay,
        }
    }
}

/// Blend formulas for three masters `a`, `b` and `c`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFormula3 {
    /// `min(a, b, c)`
    #[default]
    Darken,
    /// `max(a, b, c)`
    Lighten,
    /// `1 - (1 - a)(1 - b)(1 - c)`
    Screen,
    /// `(a + b + c) / 3`
    Average,
}

impl BlendFormula3 {
    fn op(&self) -> BlendOp {
        match self {
            BlendFormula3::Darken => BlendOp::Min,
            BlendFormula3::Lighten => BlendOp::Max,
            BlendFormula3::Screen => BlendOp::Screen,
            BlendFormula3::Average => BlendOp::Average,
        }
    }
}

/// A blend formula together with its number of masters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFormula {
    /// Two masters.
    Two(BlendFormula2),
    /// Three masters.
    Three(BlendFormula3),
}

impl BlendFormula {
    /// Number of masters the formula takes.
    pub fn arity(&self) -> usize {
        match self {
            BlendFormula::Two(_) => 2,
            BlendFormula::Three(_) => 3,
        }
    }

    fn op(&self) -> BlendOp {
        match self {
            BlendFormula::Two(f) => f.op(),
            BlendFormula::Three(f) => f.op(),
        }
    }
}

/// A master image; color masters are desaturated before blending.
#[derive(Clone, Debug)]
pub enum MasterImage {
    /// Greyscale master.
    Gray(Image<f32, 1>),
    /// Color master.
    Rgb(Image<f32, 3>),
}

impl MasterImage {
    fn size(&self) -> shomix_image::ImageSize {
        match self {
            MasterImage::Gray(img) => img.size(),
            MasterImage::Rgb(img) => img.size(),
        }
    }
}

/// Blend two or three masters into a greyscale image.
///
/// Each master is scaled by its weight before the formula is evaluated; the result is rescaled
/// or truncated into `[0, 1]`.
///
/// # Arguments
///
/// * `backend` - Performs the pixel arithmetic.
/// * `masters` - The master images, all of the same size.
/// * `weights` - One weight in `[0, 1]` per master.
/// * `formula` - The blend formula; its arity must match the number of masters.
/// * `rescale` - Rescale instead of truncate.
///
/// # Errors
///
/// Returns [`MixError::InvalidInput`] on a count, weight or size mismatch.
pub fn blend_masters<B: ImagingBackend>(
    backend: &B,
    masters: &[MasterImage],
    weights: &[f32],
    formula: BlendFormula,
    rescale: bool,
) -> Result<Image<f32, 1>, MixError> {
    if masters.len() != formula.arity() {
        return Err(MixError::InvalidInput(format!(
            "{:?} takes {} masters, got {}",
            formula,
            formula.arity(),
            masters.len()
        )));
    }

    if weights.len() != masters.len() {
        return Err(MixError::InvalidInput(format!(
            "got {} weights for {} masters",
            weights.len(),
            masters.len()
        )));
    }

    if let Some(w) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
        return Err(MixError::InvalidInput(format!(
            "master weight {w} outside [0, 1]"
        )));
    }

    let size = masters[0].size();
    if let Some(other) = masters.iter().find(|m| m.size() != size) {
        return Err(MixError::InvalidInput(format!(
            "master sizes differ: {} and {}",
            size,
            other.size()
        )));
    }

    let mut desaturated = Vec::with_capacity(masters.len());
    for master in masters {
        if let MasterImage::Rgb(rgb) = master {
            let mut gray = Image::from_size_val(size, 0.0)?;
            backend.desaturate(rgb, &mut gray)?;
            desaturated.push(gray);
        }
    }

    let mut desaturated = desaturated.iter();
    let inputs = masters
        .iter()
        .filter_map(|master| match master {
            MasterImage::Gray(gray) => Some(gray),
            MasterImage::Rgb(_) => desaturated.next(),
        })
        .collect::<Vec<_>>();

    let mut dst = Image::from_size_val(size, 0.0)?;
    backend.blend(
        &inputs,
        weights,
        formula.op(),
        RangePolicy::from_rescale(rescale),
        &mut dst,
    )?;

    log::debug!("blended {} masters with {:?}", masters.len(), formula);

    Ok(dst)
}

/// Luminance synthesis guarded against overlapping requests.
#[derive(Clone, Debug, Default)]
pub struct LuminanceSynthesizer {
    flight: SingleFlight,
}

impl LuminanceSynthesizer {
    /// Create an idle synthesizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The guard shared by every clone of this synthesizer.
    pub fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    /// Blend masters unless a synthesis is already running.
    ///
    /// # Returns
    ///
    /// `None` when the request was dropped because another synthesis is in flight.
    pub fn synthesize<B: ImagingBackend>(
        &self,
        backend: &B,
        masters: &[MasterImage],
        weights: &[f32],
        formula: BlendFormula,
        rescale: bool,
    ) -> Result<Option<Image<f32, 1>>, MixError> {
        let Some(_guard) = self.flight.try_acquire() else {
            log::warn!("luminance synthesis already running, request dropped");
            return Ok(None);
        };
        blend_masters(backend, masters, weights, formula, rescale).map(Some)
    }
}
