//! The mixing session: channel bindings, settings and the working composite.
//!
//! Every recompute runs on a second, session owned buffer and is swapped in only once all of
//! its stages succeeded, so a failing stage leaves the previous composite in place. Recomputes
//! requested while another one is running are ignored.

use std::path::Path;

use shomix_image::{Image, ImageSize};

use crate::{
    backend::{CpuBackend, ImagingBackend},
    blend::{BlendFormula, LuminanceSynthesizer, MasterImage},
    composite::{composite_into, ChannelSlot, CompositeOptions, MixMatrix, SourceChannels},
    config::SessionConfig,
    error::MixError,
    flight::SingleFlight,
    halos,
    inject::inject_luminance,
    persistence,
    stretch::{bake_stretch_into, estimate_stretch, DisplayView, StretchDescriptor},
};

/// Outcome of a session operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// The operation ran to completion.
    Completed,
    /// The operation was dropped because another one was running.
    Ignored,
}

/// An interactive mixing session.
pub struct MixingSession<B: ImagingBackend = CpuBackend> {
    backend: B,
    config: SessionConfig,
    channels: SourceChannels,
    composite: DisplayView<3>,
    scratch: Image<f32, 3>,
    stretched: Image<f32, 3>,
    busy: SingleFlight,
    synthesizer: LuminanceSynthesizer,
}

impl MixingSession<CpuBackend> {
    /// Create a session for images of `size` on the CPU backend.
    pub fn new(size: ImageSize, config: SessionConfig) -> Result<Self, MixError> {
        Self::with_backend(CpuBackend, size, config)
    }
}

impl<B: ImagingBackend> MixingSession<B> {
    /// Create a session for images of `size`.
    ///
    /// The composite buffers are allocated here and reused by every recompute.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if the configuration is invalid.
    pub fn with_backend(backend: B, size: ImageSize, config: SessionConfig) -> Result<Self, MixError> {
        config.validate()?;
        let composite = DisplayView::new(Image::from_size_val(size, 0.0)?);
        let scratch = Image::from_size_val(size, 0.0)?;
        let stretched = Image::from_size_val(size, 0.0)?;
        Ok(Self {
            backend,
            config,
            channels: SourceChannels::new(),
            composite,
            scratch,
            stretched,
            busy: SingleFlight::new(),
            synthesizer: LuminanceSynthesizer::new(),
        })
    }

    /// The image size of the session.
    pub fn size(&self) -> ImageSize {
        self.scratch.size()
    }

    /// The imaging backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the session settings.
    pub fn set_config(&mut self, config: SessionConfig) -> Result<(), MixError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// The mixing coefficients.
    pub fn matrix(&self) -> &MixMatrix {
        &self.config.matrix
    }

    /// Replace the mixing coefficients.
    pub fn set_matrix(&mut self, matrix: MixMatrix) -> Result<(), MixError> {
        if !matrix.is_finite() {
            return Err(MixError::InvalidInput(
                "mixing coefficients must be finite".to_string(),
            ));
        }
        self.config.matrix = matrix;
        Ok(())
    }

    /// Load the mixing coefficients from a file.
    pub fn load_matrix(&mut self, path: impl AsRef<Path>) -> Result<(), MixError> {
        let matrix = persistence::load_from_path(path)?;
        self.set_matrix(matrix)
    }

    /// Save the mixing coefficients to a file.
    pub fn save_matrix(&self, path: impl AsRef<Path>) -> Result<(), MixError> {
        persistence::save_to_path(&self.config.matrix, path)
    }

    /// Bind a source image to a slot, returning the previously bound image.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] if the image size differs from the session size.
    pub fn bind(
        &mut self,
        slot: ChannelSlot,
        image: Image<f32, 1>,
    ) -> Result<Option<Image<f32, 1>>, MixError> {
        if image.size() != self.size() {
            return Err(MixError::InvalidInput(format!(
                "channel {} has size {} but the session has size {}",
                slot,
                image.size(),
                self.size()
            )));
        }
        self.channels.bind(slot, image)
    }

    /// Remove the image bound to a slot.
    pub fn unbind(&mut self, slot: ChannelSlot) -> Option<Image<f32, 1>> {
        self.channels.unbind(slot)
    }

    /// The source bindings.
    pub fn channels(&self) -> &SourceChannels {
        &self.channels
    }

    /// The current composite.
    pub fn composite(&self) -> &Image<f32, 3> {
        self.composite.image()
    }

    /// The current composite with its display curve.
    pub fn display(&self) -> &DisplayView<3> {
        &self.composite
    }

    /// The session busy flag. A clone held elsewhere blocks recomputes while acquired.
    pub fn busy_flag(&self) -> SingleFlight {
        self.busy.clone()
    }

    /// The luminance synthesis guard.
    pub fn synthesis_flag(&self) -> SingleFlight {
        self.synthesizer.flight().clone()
    }

    /// Composite the bound channels, then neutralize the background when enabled.
    pub fn mix_channels(&mut self) -> Result<RunStatus, MixError> {
        self.recompute("Mixing SHONRVB", |backend, channels, config, _, dst| {
            composite_into(
                backend,
                channels,
                &config.matrix,
                &config.composite_options(),
                dst,
            )
        })
    }

    /// Composite the bound channels and inject the bound luminance.
    ///
    /// Background neutralization is not applied in this path.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::MissingChannel`] if no luminance is bound.
    pub fn mix_with_luminance(&mut self) -> Result<RunStatus, MixError> {
        self.recompute("Mixing L-SHONRVB", |backend, channels, config, _, dst| {
            let lum = channels
                .get(ChannelSlot::Luminance)
                .ok_or(MixError::MissingChannel(ChannelSlot::Luminance))?;
            let options = CompositeOptions {
                neutralize_background: false,
                ..config.composite_options()
            };
            composite_into(backend, channels, &config.matrix, &options, dst)?;
            inject_luminance(backend, dst, lum, &config.injection_params())
        })
    }

    /// Remove pink star halos from the current composite.
    pub fn remove_pink_halos(&mut self) -> Result<RunStatus, MixError> {
        self.recompute("Removing pink halos", |backend, _, _, current, dst| {
            dst.copy_from(current)?;
            halos::remove_pink_halos(backend, dst)
        })
    }

    /// Blend two or three masters and bind the result as the luminance.
    ///
    /// The formula is chosen by the number of masters; the weights come from the master
    /// opacities of the configuration.
    pub fn synthesize_luminance(&mut self, masters: &[MasterImage]) -> Result<RunStatus, MixError> {
        let formula = match masters.len() {
            2 => BlendFormula::Two(self.config.formula2),
            3 => BlendFormula::Three(self.config.formula3),
            n => {
                let err = MixError::InvalidInput(format!("expected 2 or 3 masters, got {n}"));
                log::error!("Mixing Luminance failed: {err}");
                return Err(err);
            }
        };
        let weights = self.config.master_weights(masters.len());

        let result = self
            .synthesizer
            .synthesize(
                &self.backend,
                masters,
                &weights,
                formula,
                self.config.rescale,
            )
            .and_then(|lum| match lum {
                Some(lum) => self.bind(ChannelSlot::Luminance, lum).map(|_| true),
                None => Ok(false),
            });

        match result {
            Ok(true) => {
                log::info!("Mixing Luminance done");
                Ok(RunStatus::Completed)
            }
            Ok(false) => Ok(RunStatus::Ignored),
            Err(err) => {
                log::error!("Mixing Luminance failed: {err}");
                Err(err)
            }
        }
    }

    /// End the session and return the final composite.
    pub fn finish(self) -> Image<f32, 3> {
        self.composite.into_image()
    }

    fn recompute<F>(&mut self, name: &str, stage: F) -> Result<RunStatus, MixError>
    where
        F: FnOnce(
            &B,
            &SourceChannels,
            &SessionConfig,
            &Image<f32, 3>,
            &mut Image<f32, 3>,
        ) -> Result<(), MixError>,
    {
        let Some(_guard) = self.busy.try_acquire() else {
            log::warn!("{name} ignored: a recompute is already running");
            return Ok(RunStatus::Ignored);
        };

        let result = stage(
            &self.backend,
            &self.channels,
            &self.config,
            self.composite.image(),
            &mut self.scratch,
        )
        .and_then(|_| {
            refresh_preview(
                &self.backend,
                &self.config,
                &mut self.scratch,
                &mut self.stretched,
            )
        });

        match result {
            Ok(stf) => {
                std::mem::swap(self.composite.image_mut(), &mut self.scratch);
                match stf {
                    Some(descriptor) => self.composite.attach_stretch(descriptor),
                    None => self.composite.clear_stretch(),
                }
                log::info!("{name} done");
                Ok(RunStatus::Completed)
            }
            Err(err) => {
                log::error!("{name} failed: {err}");
                Err(err)
            }
        }
    }
}

/// Stretch a freshly computed composite when auto stretch is on.
///
/// The estimated stretch is baked through `stretched` and swapped into `image`, then estimated
/// again on the baked data so that the display curve follows it.
fn refresh_preview<B: ImagingBackend>(
    backend: &B,
    config: &SessionConfig,
    image: &mut Image<f32, 3>,
    stretched: &mut Image<f32, 3>,
) -> Result<Option<StretchDescriptor>, MixError> {
    if !config.auto_stretch {
        return Ok(None);
    }
    let params = config.stretch_params();
    let descriptor = estimate_stretch(backend, image, &params)?;
    bake_stretch_into(backend, image, stretched, &descriptor)?;
    std::mem::swap(image, stretched);
    estimate_stretch(backend, image, &params).map(Some)
}
