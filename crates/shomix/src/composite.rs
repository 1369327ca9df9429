//! Linear channel compositor.
//!
//! Assembles an RGB image from up to four narrowband channels (S, H, O, N) and one broadband
//! fallback per output channel (R, V, B), weighted by a [`MixMatrix`].

use serde::{Deserialize, Serialize};
use shomix_image::{Image, ImageSize};
use shomix_imgproc::{arithmetic::RangePolicy, background::BackgroundReference};

use crate::{backend::ImagingBackend, error::MixError};

/// Reference band and target used by the background neutralization after compositing.
pub const BACKGROUND_REFERENCE: BackgroundReference = BackgroundReference {
    low: 0.0,
    high: 0.1,
    target: 0.01,
};

/// A source channel slot of a mixing session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelSlot {
    /// Sulfur II narrowband.
    Sulfur,
    /// Hydrogen alpha narrowband.
    Hydrogen,
    /// Oxygen III narrowband.
    Oxygen,
    /// Nitrogen II narrowband.
    Nitrogen,
    /// Broadband red, fallback of the red row.
    Red,
    /// Broadband green, fallback of the green row.
    Green,
    /// Broadband blue, fallback of the blue row.
    Blue,
    /// Luminance layer injected into the composite.
    Luminance,
}

impl ChannelSlot {
    /// All slots in binding order.
    pub const ALL: [ChannelSlot; 8] = [
        ChannelSlot::Sulfur,
        ChannelSlot::Hydrogen,
        ChannelSlot::Oxygen,
        ChannelSlot::Nitrogen,
        ChannelSlot::Red,
        ChannelSlot::Green,
        ChannelSlot::Blue,
        ChannelSlot::Luminance,
    ];

    /// Slots that take part in the linear combination.
    pub const MIXING: [ChannelSlot; 7] = [
        ChannelSlot::Sulfur,
        ChannelSlot::Hydrogen,
        ChannelSlot::Oxygen,
        ChannelSlot::Nitrogen,
        ChannelSlot::Red,
        ChannelSlot::Green,
        ChannelSlot::Blue,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// One letter name of the slot.
    pub fn letter(&self) -> char {
        match self {
            ChannelSlot::Sulfur => 'S',
            ChannelSlot::Hydrogen => 'H',
            ChannelSlot::Oxygen => 'O',
            ChannelSlot::Nitrogen => 'N',
            ChannelSlot::Red => 'R',
            ChannelSlot::Green => 'V',
            ChannelSlot::Blue => 'B',
            ChannelSlot::Luminance => 'L',
        }
    }

    /// Per output channel weights of this slot under `matrix`; `None` for the luminance slot.
    fn weights(&self, matrix: &MixMatrix) -> Option<[f32; 3]> {
        let column = |c: MatrixColumn| {
            [
                matrix.get(OutputChannel::Red, c),
                matrix.get(OutputChannel::Green, c),
                matrix.get(OutputChannel::Blue, c),
            ]
        };
        let broadband = |out: OutputChannel| {
            let mut w = [0.0; 3];
            w[out as usize] = matrix.get(out, MatrixColumn::Broadband);
            w
        };
        match self {
            ChannelSlot::Sulfur => Some(column(MatrixColumn::Sulfur)),
            ChannelSlot::Hydrogen => Some(column(MatrixColumn::Hydrogen)),
            ChannelSlot::Oxygen => Some(column(MatrixColumn::Oxygen)),
            ChannelSlot::Nitrogen => Some(column(MatrixColumn::Nitrogen)),
            ChannelSlot::Red => Some(broadband(OutputChannel::Red)),
            ChannelSlot::Green => Some(broadband(OutputChannel::Green)),
            ChannelSlot::Blue => Some(broadband(OutputChannel::Blue)),
            ChannelSlot::Luminance => None,
        }
    }
}

impl std::fmt::Display for ChannelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Output channel of the composite, a row of the [`MixMatrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputChannel {
    /// Red output.
    Red = 0,
    /// Green output.
    Green = 1,
    /// Blue output.
    Blue = 2,
}

/// Input column of the [`MixMatrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixColumn {
    /// Sulfur II.
    Sulfur = 0,
    /// Hydrogen alpha.
    Hydrogen = 1,
    /// Oxygen III.
    Oxygen = 2,
    /// Nitrogen II.
    Nitrogen = 3,
    /// The broadband channel matching the row.
    Broadband = 4,
}

/// The 15 mixing coefficients: three rows (R, G, B) over (S, H, O, N, broadband).
///
/// Weights are free reals and never normalized.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixMatrix {
    /// Rows indexed by [`OutputChannel`], columns by [`MatrixColumn`].
    pub rows: [[f32; 5]; 3],
}

impl MixMatrix {
    /// All weights zero.
    pub const ZERO: MixMatrix = MixMatrix { rows: [[0.0; 5]; 3] };

    /// Weight of `column` in the `out` row.
    pub fn get(&self, out: OutputChannel, column: MatrixColumn) -> f32 {
        self.rows[out as usize][column as usize]
    }

    /// Set the weight of `column` in the `out` row.
    pub fn set(&mut self, out: OutputChannel, column: MatrixColumn, weight: f32) {
        self.rows[out as usize][column as usize] = weight;
    }

    /// Coefficients in file order.
    pub fn coefficients(&self) -> [f32; 15] {
        let mut out = [0.0; 15];
        out.iter_mut()
            .zip(self.rows.iter().flatten())
            .for_each(|(o, &w)| *o = w);
        out
    }

    /// Build a matrix from coefficients in file order.
    pub fn from_coefficients(coefficients: [f32; 15]) -> Self {
        let mut rows = [[0.0; 5]; 3];
        rows.iter_mut()
            .flatten()
            .zip(coefficients.iter())
            .for_each(|(w, &c)| *w = c);
        Self { rows }
    }

    /// Whether every weight is finite.
    pub fn is_finite(&self) -> bool {
        self.rows.iter().flatten().all(|w| w.is_finite())
    }
}

impl Default for MixMatrix {
    /// The SHO palette: S to red, H to green, O to blue.
    fn default() -> Self {
        let mut matrix = Self::ZERO;
        matrix.set(OutputChannel::Red, MatrixColumn::Sulfur, 1.0);
        matrix.set(OutputChannel::Green, MatrixColumn::Hydrogen, 1.0);
        matrix.set(OutputChannel::Blue, MatrixColumn::Oxygen, 1.0);
        matrix
    }
}

/// Source channel bindings. Every bound image shares one size.
#[derive(Clone, Debug, Default)]
pub struct SourceChannels {
    slots: [Option<Image<f32, 1>>; 8],
}

impl SourceChannels {
    /// Create empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an image to a slot, returning the previously bound image.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if the size differs from the other bound images.
    pub fn bind(
        &mut self,
        slot: ChannelSlot,
        image: Image<f32, 1>,
    ) -> Result<Option<Image<f32, 1>>, MixError> {
        let others = ChannelSlot::ALL
            .iter()
            .filter(|&&s| s != slot)
            .find_map(|&s| self.get(s));
        if let Some(other) = others {
            if other.size() != image.size() {
                return Err(MixError::InvalidInput(format!(
                    "channel {} has size {} but the bound channels have size {}",
                    slot,
                    image.size(),
                    other.size()
                )));
            }
        }
        Ok(self.slots[slot.index()].replace(image))
    }

    /// Remove the image bound to a slot.
    pub fn unbind(&mut self, slot: ChannelSlot) -> Option<Image<f32, 1>> {
        self.slots[slot.index()].take()
    }

    /// The image bound to a slot.
    pub fn get(&self, slot: ChannelSlot) -> Option<&Image<f32, 1>> {
        self.slots[slot.index()].as_ref()
    }

    /// Whether any slot taking part in the linear combination is bound.
    pub fn has_mixing_channel(&self) -> bool {
        ChannelSlot::MIXING.iter().any(|&s| self.get(s).is_some())
    }

    /// Size shared by the bound images.
    pub fn size(&self) -> Option<ImageSize> {
        self.slots.iter().flatten().map(|img| img.size()).next()
    }
}

/// Options of a composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CompositeOptions {
    /// Rescale an out of range result instead of truncating it.
    pub rescale: bool,
    /// Neutralize the background after combining.
    pub neutralize_background: bool,
}

/// Composite the bound channels into `dst`.
///
/// Each output channel is the weighted sum of the bound narrowband channels and its broadband
/// fallback; unbound channels contribute nothing. The result is then rescaled or truncated into
/// `[0, 1]` and optionally background neutralized.
///
/// # Errors
///
/// Returns [`MixError::InvalidInput`] if no mixing channel is bound or `dst` has a different
/// size, and propagates primitive failures.
pub fn composite_into<B: ImagingBackend>(
    backend: &B,
    channels: &SourceChannels,
    matrix: &MixMatrix,
    options: &CompositeOptions,
    dst: &mut Image<f32, 3>,
) -> Result<(), MixError> {
    if !channels.has_mixing_channel() {
        return Err(MixError::InvalidInput("no source channel bound".to_string()));
    }

    if let Some(size) = channels.size() {
        if size != dst.size() {
            return Err(MixError::InvalidInput(format!(
                "composite has size {} but the channels have size {}",
                dst.size(),
                size
            )));
        }
    }

    let terms = ChannelSlot::MIXING
        .iter()
        .filter_map(|slot| Some((channels.get(*slot)?, slot.weights(matrix)?)))
        .collect::<Vec<_>>();

    log::debug!(
        "compositing {} channels, rescale: {}",
        terms.len(),
        options.rescale
    );

    backend.linear_combination(&terms, RangePolicy::from_rescale(options.rescale), dst)?;

    if options.neutralize_background {
        let offsets = backend.neutralize_background(dst, &BACKGROUND_REFERENCE)?;
        log::debug!("background offsets: {:?}", offsets);
    }

    Ok(())
}

/// Composite the bound channels into a new RGB image.
///
/// See [`composite_into`].
pub fn composite<B: ImagingBackend>(
    backend: &B,
    channels: &SourceChannels,
    matrix: &MixMatrix,
    options: &CompositeOptions,
) -> Result<Image<f32, 3>, MixError> {
    let size = channels
        .size()
        .ok_or_else(|| MixError::InvalidInput("no source channel bound".to_string()))?;
    let mut dst = Image::from_size_val(size, 0.0)?;
    composite_into(backend, channels, matrix, options, &mut dst)?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use rand::Rng;

    fn random_plane(size: ImageSize) -> Result<Image<f32, 1>, MixError> {
        let mut rng = rand::rng();
        let data = (0..size.num_pixels())
            .map(|_| rng.random_range(-0.2..1.2))
            .collect();
        Ok(Image::new(size, data)?)
    }

    #[test]
    fn test_coefficient_order() {
        let matrix = MixMatrix::default();
        let c = matrix.coefficients();
        assert_eq!(c[0], 1.0);
        assert_eq!(c[6], 1.0);
        assert_eq!(c[12], 1.0);
        assert_eq!(c.iter().filter(|&&w| w != 0.0).count(), 3);
        assert_eq!(MixMatrix::from_coefficients(c), matrix);
    }

    #[test]
    fn test_zero_matrix() -> Result<(), MixError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let mut channels = SourceChannels::new();
        for slot in ChannelSlot::MIXING {
            channels.bind(slot, random_plane(size)?)?;
        }
        for rescale in [false, true] {
            let options = CompositeOptions {
                rescale,
                ..Default::default()
            };
            let rgb = composite(&CpuBackend, &channels, &MixMatrix::ZERO, &options)?;
            assert!(rgb.as_slice().iter().all(|&v| v == 0.0));
        }
        Ok(())
    }

    #[test]
    fn test_sulfur_to_red() -> Result<(), MixError> {
        let size = ImageSize {
            width: 5,
            height: 3,
        };
        let s = random_plane(size)?;
        let mut channels = SourceChannels::new();
        channels.bind(ChannelSlot::Sulfur, s.clone())?;

        let mut matrix = MixMatrix::ZERO;
        matrix.set(OutputChannel::Red, MatrixColumn::Sulfur, 1.0);

        let rgb = composite(&CpuBackend, &channels, &matrix, &CompositeOptions::default())?;
        for (px, &v) in rgb.as_slice().chunks_exact(3).zip(s.as_slice()) {
            assert_eq!(px[0], v.clamp(0.0, 1.0));
            assert_eq!(px[1], 0.0);
            assert_eq!(px[2], 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_broadband_fallback_only_feeds_its_row() -> Result<(), MixError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let mut channels = SourceChannels::new();
        channels.bind(ChannelSlot::Green, Image::from_size_val(size, 0.5)?)?;

        let mut matrix = MixMatrix::ZERO;
        for out in [OutputChannel::Red, OutputChannel::Green, OutputChannel::Blue] {
            matrix.set(out, MatrixColumn::Broadband, 1.0);
        }

        let rgb = composite(&CpuBackend, &channels, &matrix, &CompositeOptions::default())?;
        for px in rgb.as_slice().chunks_exact(3) {
            assert_eq!(px, &[0.0, 0.5, 0.0]);
        }
        Ok(())
    }

    #[test]
    fn test_rescale_matches_truncate_in_range() -> Result<(), MixError> {
        let size = ImageSize {
            width: 8,
            height: 8,
        };
        let mut rng = rand::rng();
        let mut channels = SourceChannels::new();
        for slot in [ChannelSlot::Hydrogen, ChannelSlot::Oxygen] {
            let data = (0..size.num_pixels())
                .map(|_| rng.random_range(0.0..0.5))
                .collect();
            channels.bind(slot, Image::new(size, data)?)?;
        }
        let mut matrix = MixMatrix::ZERO;
        matrix.rows = [
            [0.0, 1.0, 0.0, 0.0, 0.0],
            [0.0, 0.5, 0.5, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, 0.0],
        ];

        let on = CompositeOptions {
            rescale: true,
            ..Default::default()
        };
        let off = CompositeOptions {
            rescale: false,
            ..Default::default()
        };
        let a = composite(&CpuBackend, &channels, &matrix, &on)?;
        let b = composite(&CpuBackend, &channels, &matrix, &off)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_rescale_common_range() -> Result<(), MixError> {
        let size = ImageSize {
            width: 2,
            height: 1,
        };
        let mut channels = SourceChannels::new();
        channels.bind(ChannelSlot::Hydrogen, Image::new(size, vec![0.5, 1.0])?)?;
        let mut matrix = MixMatrix::ZERO;
        matrix.set(OutputChannel::Red, MatrixColumn::Hydrogen, 2.0);
        matrix.set(OutputChannel::Green, MatrixColumn::Hydrogen, 1.0);

        let options = CompositeOptions {
            rescale: true,
            ..Default::default()
        };
        let rgb = composite(&CpuBackend, &channels, &matrix, &options)?;
        assert_eq!(rgb.as_slice(), &[0.5, 0.25, 0.0, 1.0, 0.5, 0.0]);
        Ok(())
    }

    #[test]
    fn test_no_channel_bound() {
        let channels = SourceChannels::new();
        let res = composite(
            &CpuBackend,
            &channels,
            &MixMatrix::default(),
            &CompositeOptions::default(),
        );
        assert!(matches!(res, Err(MixError::InvalidInput(_))));
    }

    #[test]
    fn test_bind_size_mismatch() -> Result<(), MixError> {
        let mut channels = SourceChannels::new();
        channels.bind(ChannelSlot::Sulfur, Image::from_size_val([2, 2].into(), 0.0)?)?;
        let res = channels.bind(ChannelSlot::Oxygen, Image::from_size_val([3, 2].into(), 0.0)?);
        assert!(matches!(res, Err(MixError::InvalidInput(_))));

        // rebinding the only bound slot may change the size
        channels.bind(ChannelSlot::Sulfur, Image::from_size_val([3, 2].into(), 0.0)?)?;
        assert_eq!(channels.size(), Some([3, 2].into()));
        Ok(())
    }

    #[test]
    fn test_background_neutralization() -> Result<(), MixError> {
        let size = ImageSize {
            width: 3,
            height: 1,
        };
        let mut channels = SourceChannels::new();
        channels.bind(ChannelSlot::Sulfur, Image::new(size, vec![0.05, 0.07, 0.9])?)?;
        channels.bind(ChannelSlot::Hydrogen, Image::new(size, vec![0.03, 0.05, 0.6])?)?;
        channels.bind(ChannelSlot::Oxygen, Image::new(size, vec![0.02, 0.04, 0.5])?)?;

        let options = CompositeOptions {
            rescale: false,
            neutralize_background: true,
        };
        let rgb = composite(&CpuBackend, &channels, &MixMatrix::default(), &options)?;
        let px = &rgb.as_slice()[0..3];
        assert!((px[0] - px[1]).abs() < 1e-6);
        assert!((px[1] - px[2]).abs() < 1e-6);
        Ok(())
    }
}
