// src/mediapipe_bridge.rs - Conversion from pose-detector output to filter input
use anyhow::{anyhow, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::skeleton::{Joint, JOINT_COUNT};
use crate::transition::{JointObservation, MeasurementFrame};

/// Number of landmarks in a MediaPipe pose result.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// The payload the capture side sends per frame: the 13 tracked joints as a
/// flat `[x0, y0, z0, x1, y1, z1, ...]` list, optionally followed by a
/// calibration reference depth per joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosePacket {
    pub coords: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Vec<f64>>,
}

impl PosePacket {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed pose packet")
    }

    pub fn from_frame(frame: &MeasurementFrame) -> Self {
        let observations = frame.observations();
        Self {
            coords: observations
                .iter()
                .flat_map(|o| [o.position.x, o.position.y, o.raw_depth])
                .collect(),
            reference: Some(observations.iter().map(|o| o.reference_depth).collect()),
        }
    }

    pub fn to_frame(&self) -> Result<MeasurementFrame> {
        ensure!(
            self.coords.len() == JOINT_COUNT * 3,
            "pose packet has {} coordinates, expected {}",
            self.coords.len(),
            JOINT_COUNT * 3
        );
        if let Some(reference) = &self.reference {
            ensure!(
                reference.len() == JOINT_COUNT,
                "pose packet has {} reference depths, expected {}",
                reference.len(),
                JOINT_COUNT
            );
        }

        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        for (i, (joint, xyz)) in joints.iter_mut().zip(self.coords.chunks_exact(3)).enumerate() {
            let reference = self.reference.as_ref().map_or(xyz[2], |r| r[i]);
            *joint = JointObservation::new(xyz[0], xyz[1], xyz[2], reference);
        }
        Ok(MeasurementFrame::new(joints))
    }
}

impl MeasurementFrame {
    /// Picks the 13 tracked joints out of a full MediaPipe pose result.
    ///
    /// Without a separate calibration the raw depth doubles as the reference.
    pub fn from_landmarks(landmarks: &[[f64; 3]]) -> Result<Self> {
        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        for joint in Joint::ALL {
            let [x, y, z] = *landmarks.get(joint.landmark_index()).ok_or_else(|| {
                anyhow!(
                    "pose result has {} landmarks, {} needs index {}",
                    landmarks.len(),
                    joint,
                    joint.landmark_index()
                )
            })?;
            joints[joint.index()] = JointObservation::new(x, y, z, z);
        }
        Ok(Self::new(joints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks() -> Vec<[f64; 3]> {
        (0..POSE_LANDMARK_COUNT)
            .map(|i| [i as f64, i as f64 * 0.5, -(i as f64) * 0.01])
            .collect()
    }

    #[test]
    fn from_landmarks_selects_tracked_joints() {
        let frame = MeasurementFrame::from_landmarks(&landmarks()).unwrap();
        let wrist = frame[Joint::RightWrist];
        assert_eq!(wrist.position.x, 16.0);
        assert_eq!(wrist.position.y, 8.0);
        assert_eq!(wrist.raw_depth, -0.16);
        assert_eq!(wrist.reference_depth, wrist.raw_depth);
        assert_eq!(frame[Joint::RightAnkle].position.x, 28.0);
    }

    #[test]
    fn from_landmarks_rejects_short_result() {
        let short = &landmarks()[..20];
        let err = MeasurementFrame::from_landmarks(short).unwrap_err();
        assert!(err.to_string().contains("left_hip"));
    }

    #[test]
    fn packet_without_reference_uses_raw_depth() {
        let coords: Vec<f64> = (0..JOINT_COUNT * 3).map(|i| i as f64).collect();
        let text = serde_json::to_string(&serde_json::json!({ "coords": coords })).unwrap();
        let frame = PosePacket::parse(&text).unwrap().to_frame().unwrap();
        let elbow = frame[Joint::LeftElbow];
        assert_eq!(elbow.position.x, 9.0);
        assert_eq!(elbow.raw_depth, 11.0);
        assert_eq!(elbow.reference_depth, 11.0);
    }

    #[test]
    fn packet_reference_overrides_raw_depth() {
        let packet = PosePacket {
            coords: vec![0.5; JOINT_COUNT * 3],
            reference: Some((0..JOINT_COUNT).map(|i| i as f64).collect()),
        };
        let frame = packet.to_frame().unwrap();
        assert_eq!(frame[Joint::Nose].reference_depth, 0.0);
        assert_eq!(frame[Joint::RightHip].reference_depth, 8.0);
        assert_eq!(PosePacket::from_frame(&frame), packet);
    }

    #[test]
    fn packet_with_wrong_length_is_rejected() {
        let packet = PosePacket { coords: vec![0.0; 12], reference: None };
        assert!(packet.to_frame().is_err());
        let packet = PosePacket { coords: vec![0.0; 39], reference: Some(vec![0.0; 3]) };
        assert!(packet.to_frame().is_err());
    }
}
