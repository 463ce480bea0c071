// src/config.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::skeleton::{DepthCovariance, Topology};
use crate::smoothing::SmoothingPolicy;

/// Bone radii in world-landmark units (metres). Each radius bounds how far a
/// joint may sit from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoneRadii {
    pub right_forearm: f64,
    pub right_upper_arm: f64,
    pub right_torso: f64,
    pub left_forearm: f64,
    pub left_upper_arm: f64,
    pub left_torso: f64,
    pub right_thigh: f64,
    pub right_shin: f64,
    pub left_thigh: f64,
    pub left_shin: f64,
    /// Shared by the root joints (face and hips), measured from the origin.
    pub full_body: f64,
}

impl Default for BoneRadii {
    fn default() -> Self {
        Self {
            right_forearm: 0.26,
            right_upper_arm: 0.30,
            right_torso: 0.52,
            left_forearm: 0.26,
            left_upper_arm: 0.30,
            left_torso: 0.52,
            right_thigh: 0.45,
            right_shin: 0.42,
            left_thigh: 0.45,
            left_shin: 0.42,
            full_body: 0.95,
        }
    }
}

impl BoneRadii {
    pub fn named(&self) -> [(&'static str, f64); 11] {
        [
            ("right_forearm", self.right_forearm),
            ("right_upper_arm", self.right_upper_arm),
            ("right_torso", self.right_torso),
            ("left_forearm", self.left_forearm),
            ("left_upper_arm", self.left_upper_arm),
            ("left_torso", self.left_torso),
            ("right_thigh", self.right_thigh),
            ("right_shin", self.right_shin),
            ("left_thigh", self.left_thigh),
            ("left_shin", self.left_shin),
            ("full_body", self.full_body),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub radii: BoneRadii,
    /// Diagonal of `Q`.
    pub process_noise: f64,
    /// Diagonal of `R`.
    pub measurement_noise: f64,
    /// Diagonal of the initial `P`.
    pub initial_covariance: f64,
    pub time_step: f64,
    pub smoothing: SmoothingPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            radii: BoneRadii::default(),
            process_noise: 1.0,
            measurement_noise: 0.1,
            initial_covariance: 1.0,
            time_step: 1.0,
            smoothing: SmoothingPolicy::default(),
        }
    }
}

impl FilterConfig {
    /// Reads a JSON config; keys that are missing keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: FilterConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in self.radii.named() {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveRadius { name, value });
            }
        }
        for (name, value) in [
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
            ("initial_covariance", self.initial_covariance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveNoise { name, value });
            }
        }
        self.smoothing.validate()
    }

    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Ok(Topology::human(&self.radii)?)
    }

    pub fn process_covariance(&self) -> DepthCovariance {
        DepthCovariance::identity() * self.process_noise
    }

    pub fn measurement_covariance(&self) -> DepthCovariance {
        DepthCovariance::identity() * self.measurement_noise
    }

    pub fn initial_state_covariance(&self) -> DepthCovariance {
        DepthCovariance::identity() * self.initial_covariance
    }
}
