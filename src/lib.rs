// src/lib.rs - Skeleton depth estimation with a bone-length constrained EKF
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod filter;
pub mod geometry;
pub mod mediapipe_bridge;
pub mod skeleton;
pub mod smoothing;
pub mod tracking;
pub mod transition;

pub use config::{BoneRadii, FilterConfig};
pub use error::{ConfigError, FilterError, TopologyError};
pub use filter::{DepthFilter, ExtendedKalmanFilter};
pub use skeleton::{Anchor, Bone, DepthVector, Joint, Topology, JOINT_COUNT};
pub use smoothing::SmoothingPolicy;
pub use tracking::{DepthTracker, TrackingResult};
pub use transition::{ConstrainedTransition, JointObservation, MeasurementFrame, TransitionModel};
