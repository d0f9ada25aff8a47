//! Audio-to-mouth parameter mapping
//!
//! Converts per-frame audio features into bounded Live2D-style mouth
//! parameters. Pure functions, no I/O.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FORM_VARIATION, DEFAULT_MAX_MOUTH_OPEN, DEFAULT_MIN_MOUTH_OPEN, DEFAULT_SENSITIVITY,
    DEFAULT_SMOOTHING_FACTOR,
};

/// Lip-sync mapping configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouthSyncConfig {
    pub sensitivity: f64,
    /// Applied viewer-side; forwarded in `mouth_sync_start` payloads
    pub smoothing_factor: f64,
    pub min_mouth_open: f64,
    pub max_mouth_open: f64,
    pub form_variation: f64,
}

impl Default for MouthSyncConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            min_mouth_open: DEFAULT_MIN_MOUTH_OPEN,
            max_mouth_open: DEFAULT_MAX_MOUTH_OPEN,
            form_variation: DEFAULT_FORM_VARIATION,
        }
    }
}

impl MouthSyncConfig {
    /// Check the configuration invariants
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("sensitivity", self.sensitivity),
            ("smoothing_factor", self.smoothing_factor),
            ("min_mouth_open", self.min_mouth_open),
            ("max_mouth_open", self.max_mouth_open),
            ("form_variation", self.form_variation),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("mouth.{} must be finite", name));
        }
        if self.min_mouth_open > self.max_mouth_open {
            return Err(format!(
                "mouth.min_mouth_open ({}) exceeds mouth.max_mouth_open ({})",
                self.min_mouth_open, self.max_mouth_open
            ));
        }
        if self.sensitivity < 0.0 {
            return Err("mouth.sensitivity must not be negative".into());
        }
        Ok(())
    }
}

/// Mouth opening for an audio level in `[0, 1]`.
///
/// Linear in the level scaled by `sensitivity`, clamped to
/// `[min_mouth_open, max_mouth_open]`.
pub fn mouth_open(audio_level: f64, config: &MouthSyncConfig) -> f64 {
    let adjusted = audio_level * config.sensitivity;
    let value =
        config.min_mouth_open + adjusted * (config.max_mouth_open - config.min_mouth_open);
    value.clamp(config.min_mouth_open, config.max_mouth_open)
}

/// Mouth form in `[-1, 1]` from a magnitude spectrum.
///
/// Share of energy in the upper half of the bins, centered at 0.5 and
/// scaled by `form_variation`. Silence (empty or zero-energy input) maps to
/// a neutral 0.0.
pub fn mouth_form(frequency_bins: &[f64], config: &MouthSyncConfig) -> f64 {
    if frequency_bins.is_empty() {
        return 0.0;
    }

    let total: f64 = frequency_bins.iter().sum();
    if !total.is_finite() || total == 0.0 {
        return 0.0;
    }

    let upper: f64 = frequency_bins[frequency_bins.len() / 2..].iter().sum();
    let ratio = upper / total;
    let form = (ratio - 0.5) * config.form_variation;

    if form.is_finite() {
        form.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
