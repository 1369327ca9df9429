//! Progressive luminance injection.
//!
//! Injecting a strong luminance layer in a single step tends to leave colored halos around bright
//! structures. With the progressive (AIP) method the layer is injected in three stages of growing
//! strength and the composite is denoised between stages.

use std::ops::RangeInclusive;

use shomix_image::Image;
use shomix_imgproc::{
    denoise::{DenoiseParams, SmoothingParams},
    lrgb::{ChrominanceNoiseReduction, LuminanceCombination},
};

use crate::{backend::ImagingBackend, error::MixError};

/// Fractions of the luminance scale used by the three progressive stages.
pub const AIP_FRACTIONS: [f32; 3] = [0.33, 0.66, 1.0];

/// Lightness smoothing of the denoise pass between progressive stages.
pub const INTERSTAGE_LIGHTNESS: SmoothingParams = SmoothingParams {
    sigma: 1.5,
    amount: 0.2,
};

/// Chrominance smoothing of the denoise pass between progressive stages.
pub const INTERSTAGE_CHROMINANCE: SmoothingParams = SmoothingParams {
    sigma: 2.0,
    amount: 1.0,
};

/// Structure threshold of the denoise pass between progressive stages.
pub const INTERSTAGE_STAR_THRESHOLD: f32 = 0.03;

/// Accepted number of starlet layers removed by chrominance noise reduction.
pub const SMOOTHED_LAYERS: RangeInclusive<usize> = 1..=6;

/// Accepted number of starlet layers protected from chrominance noise reduction.
pub const PROTECTED_LAYERS: RangeInclusive<usize> = 0..=5;

/// Accepted number of iterations of the interstage denoise pass.
pub const DENOISE_ITERATIONS: RangeInclusive<usize> = 1..=5;

/// Parameters of a luminance injection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InjectionParams {
    /// Strength of the luminance layer, in percent.
    pub scale_percent: f32,
    /// Midtones balance of the final lightness, 0.5 is neutral.
    pub lightness_mix: f32,
    /// Midtones balance of the final saturation, 0.5 is neutral.
    pub saturation_mix: f32,
    /// Iterations of each interstage denoise pass.
    pub denoise_iterations: usize,
    /// Starlet layers removed by the final chrominance noise reduction.
    pub smoothed_layers: usize,
    /// Starlet layers protected from the final chrominance noise reduction.
    pub protected_layers: usize,
    /// Enable chrominance noise reduction in the final stage.
    pub chrominance_noise_reduction: bool,
    /// Inject progressively in three stages.
    pub aip: bool,
}

impl Default for InjectionParams {
    fn default() -> Self {
        Self {
            scale_percent: 100.0,
            lightness_mix: 0.5,
            saturation_mix: 0.5,
            denoise_iterations: 1,
            smoothed_layers: 4,
            protected_layers: 2,
            chrominance_noise_reduction: false,
            aip: true,
        }
    }
}

impl InjectionParams {
    pub(crate) fn validate(&self) -> Result<(), MixError> {
        if !(0.0..=100.0).contains(&self.scale_percent) {
            return Err(MixError::InvalidInput(format!(
                "luminance scale {}% outside [0, 100]",
                self.scale_percent
            )));
        }
        for (name, value) in [
            ("lightness", self.lightness_mix),
            ("saturation", self.saturation_mix),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MixError::InvalidInput(format!(
                    "{name} mix {value} outside [0, 1]"
                )));
            }
        }
        for (name, value, range) in [
            ("smoothed layers", self.smoothed_layers, SMOOTHED_LAYERS),
            ("protected layers", self.protected_layers, PROTECTED_LAYERS),
            ("denoise iterations", self.denoise_iterations, DENOISE_ITERATIONS),
        ] {
            if !range.contains(&value) {
                return Err(MixError::InvalidInput(format!(
                    "{name} {value} outside [{}, {}]",
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(())
    }

    fn final_stage(&self) -> LuminanceCombination {
        LuminanceCombination {
            weight: self.scale_percent / 100.0,
            lightness_midtones: self.lightness_mix,
            saturation_midtones: self.saturation_mix,
            clip_highlights: true,
            chrominance_noise: self
                .chrominance_noise_reduction
                .then_some(ChrominanceNoiseReduction {
                    layers_removed: self.smoothed_layers,
                    layers_protected: self.protected_layers,
                }),
        }
    }

    fn interstage_denoise(&self) -> DenoiseParams {
        DenoiseParams {
            iterations: self.denoise_iterations,
            lightness: Some(INTERSTAGE_LIGHTNESS),
            chrominance: Some(INTERSTAGE_CHROMINANCE),
            star_threshold: Some(INTERSTAGE_STAR_THRESHOLD),
        }
    }
}

/// Inject a luminance layer into an RGB image in place.
///
/// Without AIP a single combination runs at the full scale with the caller's parameters. With
/// AIP the first two stages run at 33% and 66% of the scale with neutral lightness and
/// saturation and no chrominance noise reduction, each followed by a fixed denoise pass; the
/// third stage runs at the full scale with the caller's parameters.
///
/// A failing stage aborts the remaining ones and leaves `rgb` with the stages already applied.
///
/// # Errors
///
/// Returns [`MixError::InvalidInput`] for out of range parameters or mismatching sizes and
/// propagates primitive failures.
pub fn inject_luminance<B: ImagingBackend>(
    backend: &B,
    rgb: &mut Image<f32, 3>,
    lum: &Image<f32, 1>,
    params: &InjectionParams,
) -> Result<(), MixError> {
    params.validate()?;

    if rgb.size() != lum.size() {
        return Err(MixError::InvalidInput(format!(
            "luminance has size {} but the composite has size {}",
            lum.size(),
            rgb.size()
        )));
    }

    let final_stage = params.final_stage();

    if !params.aip {
        log::debug!("injecting luminance at {:.3}", final_stage.weight);
        return backend.combine_luminance(rgb, lum, &final_stage);
    }

    let denoise = params.interstage_denoise();

    for (stage, fraction) in AIP_FRACTIONS.iter().enumerate() {
        let combination = if stage + 1 < AIP_FRACTIONS.len() {
            LuminanceCombination {
                weight: final_stage.weight * fraction,
                lightness_midtones: 0.5,
                saturation_midtones: 0.5,
                clip_highlights: true,
                chrominance_noise: None,
            }
        } else {
            final_stage
        };

        log::debug!(
            "injection stage {}: amplitude {:.3}",
            stage + 1,
            combination.weight
        );
        backend.combine_luminance(rgb, lum, &combination)?;

        if stage + 1 < AIP_FRACTIONS.len() {
            backend.denoise(rgb, &denoise)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChannelStats, CpuBackend};
    use shomix_image::ImageError;
    use shomix_imgproc::{
        arithmetic::{BlendOp, RangePolicy},
        background::BackgroundReference,
        histogram::TransferCurve,
    };
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    enum Call {
        Combine(LuminanceCombination),
        Denoise(DenoiseParams),
    }

    /// Records the injection calls and fails the n-th combination when asked to.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<Call>>,
        fail_combination: Option<usize>,
    }

    impl ImagingBackend for Recorder {
        fn channel_stats<const C: usize>(
            &self,
            image: &Image<f32, C>,
            channel: usize,
        ) -> Result<ChannelStats, MixError> {
            CpuBackend.channel_stats(image, channel)
        }

        fn histogram_transform<const C: usize>(
            &self,
            src: &Image<f32, C>,
            dst: &mut Image<f32, C>,
            curves: &[TransferCurve; C],
        ) -> Result<(), MixError> {
            CpuBackend.histogram_transform(src, dst, curves)
        }

        fn linear_combination(
            &self,
            terms: &[(&Image<f32, 1>, [f32; 3])],
            policy: RangePolicy,
            dst: &mut Image<f32, 3>,
        ) -> Result<(), MixError> {
            CpuBackend.linear_combination(terms, policy, dst)
        }

        fn blend(
            &self,
            inputs: &[&Image<f32, 1>],
            weights: &[f32],
            op: BlendOp,
            policy: RangePolicy,
            dst: &mut Image<f32, 1>,
        ) -> Result<(), MixError> {
            CpuBackend.blend(inputs, weights, op, policy, dst)
        }

        fn desaturate(
            &self,
            src: &Image<f32, 3>,
            dst: &mut Image<f32, 1>,
        ) -> Result<(), MixError> {
            CpuBackend.desaturate(src, dst)
        }

        fn combine_luminance(
            &self,
            rgb: &mut Image<f32, 3>,
            lum: &Image<f32, 1>,
            params: &LuminanceCombination,
        ) -> Result<(), MixError> {
            let count = self
                .calls
                .borrow()
                .iter()
                .filter(|c| matches!(c, Call::Combine(_)))
                .count();
            if self.fail_combination == Some(count) {
                return Err(ImageError::CastError.into());
            }
            self.calls.borrow_mut().push(Call::Combine(*params));
            CpuBackend.combine_luminance(rgb, lum, params)
        }

        fn denoise(&self, rgb: &mut Image<f32, 3>, params: &DenoiseParams) -> Result<(), MixError> {
            self.calls.borrow_mut().push(Call::Denoise(*params));
            CpuBackend.denoise(rgb, params)
        }

        fn neutralize_background(
            &self,
            rgb: &mut Image<f32, 3>,
            reference: &BackgroundReference,
        ) -> Result<[f32; 3], MixError> {
            CpuBackend.neutralize_background(rgb, reference)
        }

        fn suppress_green(
            &self,
            rgb: &mut Image<f32, 3>,
            amount: f32,
            preserve_lightness: bool,
        ) -> Result<(), MixError> {
            CpuBackend.suppress_green(rgb, amount, preserve_lightness)
        }

        fn invert<const C: usize>(&self, image: &mut Image<f32, C>) -> Result<(), MixError> {
            CpuBackend.invert(image)
        }
    }

    fn images() -> Result<(Image<f32, 3>, Image<f32, 1>), MixError> {
        let rgb = Image::<f32, 3>::from_size_val([8, 8].into(), 0.2)?;
        let lum = Image::<f32, 1>::from_size_val([8, 8].into(), 0.6)?;
        Ok((rgb, lum))
    }

    #[test]
    fn test_single_stage() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        let backend = Recorder::default();
        let params = InjectionParams {
            scale_percent: 80.0,
            lightness_mix: 0.4,
            saturation_mix: 0.6,
            aip: false,
            chrominance_noise_reduction: true,
            ..Default::default()
        };
        inject_luminance(&backend, &mut rgb, &lum, &params)?;

        let calls = backend.calls.borrow();
        assert_eq!(calls.len(), 1);
        let Call::Combine(c) = &calls[0] else {
            panic!("expected a combination")
        };
        assert!((c.weight - 0.8).abs() < 1e-6);
        assert_eq!(c.lightness_midtones, 0.4);
        assert_eq!(c.saturation_midtones, 0.6);
        assert!(c.clip_highlights);
        assert_eq!(
            c.chrominance_noise,
            Some(ChrominanceNoiseReduction {
                layers_removed: 4,
                layers_protected: 2
            })
        );
        Ok(())
    }

    #[test]
    fn test_progressive_stages() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        let backend = Recorder::default();
        let params = InjectionParams {
            lightness_mix: 0.3,
            denoise_iterations: 3,
            chrominance_noise_reduction: true,
            ..Default::default()
        };
        inject_luminance(&backend, &mut rgb, &lum, &params)?;

        let calls = backend.calls.borrow();
        assert_eq!(calls.len(), 5);

        let weights = calls
            .iter()
            .filter_map(|c| match c {
                Call::Combine(c) => Some(c.weight),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(weights.len(), 3);
        for (w, f) in weights.iter().zip(AIP_FRACTIONS.iter()) {
            assert!((w - f).abs() < 1e-6);
        }

        let Call::Combine(first) = &calls[0] else {
            panic!("expected a combination")
        };
        assert_eq!(first.lightness_midtones, 0.5);
        assert_eq!(first.chrominance_noise, None);

        let Call::Denoise(d) = &calls[1] else {
            panic!("expected a denoise pass")
        };
        assert_eq!(d.iterations, 3);
        assert_eq!(d.lightness, Some(INTERSTAGE_LIGHTNESS));
        assert!(matches!(calls[3], Call::Denoise(_)));

        let Call::Combine(last) = &calls[4] else {
            panic!("expected a combination")
        };
        assert_eq!(last.lightness_midtones, 0.3);
        assert!(last.chrominance_noise.is_some());
        Ok(())
    }

    #[test]
    fn test_failing_stage_aborts() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        let backend = Recorder {
            fail_combination: Some(1),
            ..Default::default()
        };
        let res = inject_luminance(&backend, &mut rgb, &lum, &InjectionParams::default());
        assert!(matches!(res, Err(MixError::PrimitiveFailure(_))));
        // first stage and its denoise pass ran, nothing after the failure
        assert_eq!(backend.calls.borrow().len(), 2);
        Ok(())
    }

    #[test]
    fn test_invalid_params() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        let params = InjectionParams {
            scale_percent: 120.0,
            ..Default::default()
        };
        let res = inject_luminance(&CpuBackend, &mut rgb, &lum, &params);
        assert!(matches!(res, Err(MixError::InvalidInput(_))));
        Ok(())
    }

    #[test]
    fn test_layer_counts_out_of_range() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        let before = rgb.clone();
        let bad = [
            InjectionParams {
                smoothed_layers: 64,
                protected_layers: 0,
                chrominance_noise_reduction: true,
                aip: false,
                ..Default::default()
            },
            InjectionParams {
                smoothed_layers: 0,
                ..Default::default()
            },
            InjectionParams {
                protected_layers: 6,
                ..Default::default()
            },
            InjectionParams {
                denoise_iterations: 0,
                ..Default::default()
            },
            InjectionParams {
                denoise_iterations: 6,
                ..Default::default()
            },
        ];
        for params in bad {
            let res = inject_luminance(&CpuBackend, &mut rgb, &lum, &params);
            assert!(matches!(res, Err(MixError::InvalidInput(_))), "{params:?}");
        }
        assert_eq!(rgb, before);

        let widest = InjectionParams {
            smoothed_layers: 6,
            protected_layers: 5,
            denoise_iterations: 5,
            chrominance_noise_reduction: true,
            ..Default::default()
        };
        inject_luminance(&CpuBackend, &mut rgb, &lum, &widest)?;
        Ok(())
    }

    #[test]
    fn test_injection_brightens_toward_luminance() -> Result<(), MixError> {
        let (mut rgb, lum) = images()?;
        inject_luminance(&CpuBackend, &mut rgb, &lum, &InjectionParams::default())?;
        assert!(rgb.as_slice().iter().all(|&v| v > 0.2 && v <= 1.0));
        Ok(())
    }
}
