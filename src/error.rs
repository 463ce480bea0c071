// src/error.rs
use thiserror::Error;

use crate::skeleton::Joint;

/// Errors raised by the depth filter for a single frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// `P + R` could not be inverted. The update is skipped and the predicted
    /// state is kept.
    #[error("innovation covariance is singular, update skipped")]
    SingularInnovation,

    #[error("observation for {joint} has a non-finite {field}")]
    NonFiniteObservation { joint: Joint, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("{0} is listed as its own parent")]
    SelfParent(Joint),

    #[error("skeleton contains a cycle through {0}")]
    Cycle(Joint),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("bone radius `{name}` must be positive and finite, got {value}")]
    NonPositiveRadius { name: &'static str, value: f64 },

    #[error("noise term `{name}` must be positive and finite, got {value}")]
    NonPositiveNoise { name: &'static str, value: f64 },

    #[error("invalid smoothing policy: {0}")]
    InvalidSmoothing(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}
