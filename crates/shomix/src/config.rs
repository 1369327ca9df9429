use serde::{Deserialize, Serialize};

use crate::{
    blend::{BlendFormula2, BlendFormula3},
    composite::{CompositeOptions, MixMatrix},
    error::MixError,
    inject::InjectionParams,
    stretch::{StretchParams, SHADOWS_CLIP, TARGET_BACKGROUND},
};

/// Every setting of a mixing session.
///
/// Missing fields take their default value when deserializing.
///
/// # Example
///
/// ```
/// use shomix::config::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{ "rescale": false, "luminance_scale": 60.0 }"#).unwrap();
/// assert!(!config.rescale);
/// assert!(config.aip);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The mixing coefficients.
    pub matrix: MixMatrix,
    /// Strength of the injected luminance, in percent.
    pub luminance_scale: f32,
    /// Inject luminance progressively.
    pub aip: bool,
    /// Rescale out of range results instead of truncating.
    pub rescale: bool,
    /// Neutralize the background after compositing.
    pub neutralize_background: bool,
    /// Stretch the composite after every recompute.
    pub auto_stretch: bool,
    /// Share one stretch curve between channels.
    pub linked_stretch: bool,
    /// Opacity of each master image, in percent.
    pub master_opacity: [f32; 3],
    /// Formula used with two masters.
    pub formula2: BlendFormula2,
    /// Formula used with three masters.
    pub formula3: BlendFormula3,
    /// Lightness midtones of the final injection.
    pub lightness: f32,
    /// Saturation midtones of the final injection.
    pub saturation: f32,
    /// Starlet layers removed by chrominance noise reduction.
    pub smoothed_layers: usize,
    /// Starlet layers protected from chrominance noise reduction.
    pub protected_layers: usize,
    /// Chrominance noise reduction in the final injection.
    pub chrominance_noise_reduction: bool,
    /// Iterations of the denoise passes between progressive stages.
    pub denoise_iterations: usize,
    /// Stretch shadows clipping, in average deviations.
    pub shadows_clip: f64,
    /// Stretch target background.
    pub target_background: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            matrix: MixMatrix::default(),
            luminance_scale: 100.0,
            aip: true,
            rescale: true,
            neutralize_background: false,
            auto_stretch: false,
            linked_stretch: false,
            master_opacity: [100.0; 3],
            formula2: BlendFormula2::default(),
            formula3: BlendFormula3::default(),
            lightness: 0.5,
            saturation: 0.5,
            smoothed_layers: 4,
            protected_layers: 2,
            chrominance_noise_reduction: false,
            denoise_iterations: 1,
            shadows_clip: SHADOWS_CLIP,
            target_background: TARGET_BACKGROUND,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, MixError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MixError::InvalidInput(format!("malformed session config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty printed JSON.
    pub fn to_json(&self) -> Result<String, MixError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MixError::InvalidInput(format!("unserializable session config: {e}")))
    }

    /// Check every setting against its domain.
    ///
    /// # Errors
    ///
    /// Returns [`MixError::InvalidInput`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), MixError> {
        let invalid = |what: String| Err(MixError::InvalidInput(what));

        if !self.matrix.is_finite() {
            return invalid("mixing coefficients must be finite".to_string());
        }
        if !(0.0..=100.0).contains(&self.luminance_scale) {
            return invalid(format!(
                "luminance scale {} outside [0, 100]",
                self.luminance_scale
            ));
        }
        if let Some(o) = self
            .master_opacity
            .iter()
            .find(|o| !(0.0..=100.0).contains(*o))
        {
            return invalid(format!("master opacity {o} outside [0, 100]"));
        }
        for (name, value) in [("lightness", self.lightness), ("saturation", self.saturation)] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} {value} outside [0, 1]"));
            }
        }
        if !self.shadows_clip.is_finite() {
            return invalid("shadows clipping must be finite".to_string());
        }
        if !(0.0..=1.0).contains(&self.target_background) {
            return invalid(format!(
                "target background {} outside [0, 1]",
                self.target_background
            ));
        }
        self.injection_params().validate()
    }

    /// Compositing options.
    pub fn composite_options(&self) -> CompositeOptions {
        CompositeOptions {
            rescale: self.rescale,
            neutralize_background: self.neutralize_background,
        }
    }

    /// Luminance injection parameters.
    pub fn injection_params(&self) -> InjectionParams {
        InjectionParams {
            scale_percent: self.luminance_scale,
            lightness_mix: self.lightness,
            saturation_mix: self.saturation,
            denoise_iterations: self.denoise_iterations,
            smoothed_layers: self.smoothed_layers,
            protected_layers: self.protected_layers,
            chrominance_noise_reduction: self.chrominance_noise_reduction,
            aip: self.aip,
        }
    }

    /// Stretch estimation parameters.
    pub fn stretch_params(&self) -> StretchParams {
        StretchParams {
            shadows_clip: self.shadows_clip,
            target_background: self.target_background,
            linked: self.linked_stretch,
        }
    }

    /// Master weights in `[0, 1]`, one per master.
    pub fn master_weights(&self, count: usize) -> Vec<f32> {
        self.master_opacity
            .iter()
            .take(count)
            .map(|o| o / 100.0)
            .collect()
    }
}
