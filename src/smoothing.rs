// src/smoothing.rs
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Blends a geometrically predicted depth with the current estimate.
///
/// The blend factor is the weight kept on the current estimate and is picked
/// from three tiers by the ratio `|reference| / sqrt(delta_sq)`. Whatever the
/// tier, a single call never moves the estimate by more than `max_step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingPolicy {
    pub max_step: f64,
    /// Ratios above this use `high_ratio_blend`.
    pub high_ratio: f64,
    /// Ratios at or below this use `low_ratio_blend`.
    pub low_ratio: f64,
    pub high_ratio_blend: f64,
    pub low_ratio_blend: f64,
    pub default_blend: f64,
}

impl Default for SmoothingPolicy {
    fn default() -> Self {
        Self {
            max_step: 0.05,
            high_ratio: 0.75,
            low_ratio: 0.25,
            high_ratio_blend: 0.01,
            low_ratio_blend: 0.3,
            default_blend: 0.05,
        }
    }
}

impl SmoothingPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(ConfigError::InvalidSmoothing(format!(
                "max_step must be positive, got {}",
                self.max_step
            )));
        }
        if !(self.low_ratio >= 0.0 && self.low_ratio <= self.high_ratio) {
            return Err(ConfigError::InvalidSmoothing(format!(
                "ratio thresholds must satisfy 0 <= low ({}) <= high ({})",
                self.low_ratio, self.high_ratio
            )));
        }
        for (name, blend) in [
            ("high_ratio_blend", self.high_ratio_blend),
            ("low_ratio_blend", self.low_ratio_blend),
            ("default_blend", self.default_blend),
        ] {
            if !(0.0..=1.0).contains(&blend) {
                return Err(ConfigError::InvalidSmoothing(format!(
                    "{name} must lie in [0, 1], got {blend}"
                )));
            }
        }
        Ok(())
    }

    /// Weight kept on the current estimate for a given confidence ratio.
    pub fn blend_factor(&self, ratio: f64) -> f64 {
        if ratio > self.high_ratio {
            self.high_ratio_blend
        } else if ratio <= self.low_ratio {
            self.low_ratio_blend
        } else {
            self.default_blend
        }
    }

    /// Advances `current` toward the depth implied by the bone sphere.
    ///
    /// The predicted depth sits `sqrt(delta_sq)` away from `reference`, on the
    /// same side as `raw`. When `raw` equals `reference` the prediction is the
    /// reference itself.
    pub fn smooth_transition(&self, current: f64, delta_sq: f64, reference: f64, raw: f64) -> f64 {
        if delta_sq < 0.0 {
            return reference;
        }

        let delta = delta_sq.sqrt();
        let predicted = reference + sign(raw - reference) * delta;
        let ratio = if delta_sq > 0.0 { reference.abs() / delta } else { 0.0 };
        let blend = self.blend_factor(ratio);

        let blended = blend * current + (1.0 - blend) * predicted;
        let step = (blended - current).clamp(-self.max_step, self.max_step);
        current + step
    }
}

// `f64::signum` maps 0.0 to 1.0; a zero residual must not pick a side.
fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}
