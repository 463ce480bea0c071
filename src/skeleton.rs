// src/skeleton.rs - Joint identities and the bone table the depth filter walks
use std::collections::VecDeque;
use std::fmt;

use nalgebra::{SMatrix, SVector};

use crate::config::BoneRadii;
use crate::error::TopologyError;

pub const JOINT_COUNT: usize = 13;

/// One estimated depth per joint, in [`Joint`] order.
pub type DepthVector = SVector<f64, JOINT_COUNT>;
pub type DepthCovariance = SMatrix<f64, JOINT_COUNT, JOINT_COUNT>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Joint {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Nose,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// Position of this joint in the state vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Index of the matching landmark in MediaPipe's 33-point pose output.
    pub fn landmark_index(self) -> usize {
        match self {
            Joint::Nose => 0,
            Joint::LeftShoulder => 11,
            Joint::RightShoulder => 12,
            Joint::LeftElbow => 13,
            Joint::RightElbow => 14,
            Joint::LeftWrist => 15,
            Joint::RightWrist => 16,
            Joint::LeftHip => 23,
            Joint::RightHip => 24,
            Joint::LeftKnee => 25,
            Joint::RightKnee => 26,
            Joint::LeftAnkle => 27,
            Joint::RightAnkle => 28,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Joint::Nose => "nose",
            Joint::LeftShoulder => "left_shoulder",
            Joint::RightShoulder => "right_shoulder",
            Joint::LeftElbow => "left_elbow",
            Joint::RightElbow => "right_elbow",
            Joint::LeftWrist => "left_wrist",
            Joint::RightWrist => "right_wrist",
            Joint::LeftHip => "left_hip",
            Joint::RightHip => "right_hip",
            Joint::LeftKnee => "left_knee",
            Joint::RightKnee => "right_knee",
            Joint::LeftAnkle => "left_ankle",
            Joint::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a joint's sphere is centred and where its reference depth comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    /// Centred at the planar origin; reference depth is the frame's
    /// calibration reference for this joint.
    Root,
    /// Centred at the parent's planar position; reference depth is the
    /// parent's depth after it was updated in the same transition.
    Parent(Joint),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bone {
    pub anchor: Anchor,
    pub radius: f64,
}

impl Bone {
    pub fn root(radius: f64) -> Self {
        Self { anchor: Anchor::Root, radius }
    }

    pub fn child_of(parent: Joint, radius: f64) -> Self {
        Self { anchor: Anchor::Parent(parent), radius }
    }
}

/// Immutable parent/radius table plus the parent-before-child order derived
/// from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    bones: [Bone; JOINT_COUNT],
    order: [Joint; JOINT_COUNT],
}

impl Topology {
    /// Builds a topology from a table indexed by [`Joint::index`].
    pub fn new(bones: [Bone; JOINT_COUNT]) -> Result<Self, TopologyError> {
        let order = processing_order(&bones)?;
        Ok(Self { bones, order })
    }

    /// The human skeleton: face and both hips are roots, arms hang off the
    /// hips through the shoulders, legs through the knees.
    pub fn human(radii: &BoneRadii) -> Result<Self, TopologyError> {
        use Joint::*;

        let mut bones = [Bone::root(radii.full_body); JOINT_COUNT];
        let mut set = |joint: Joint, bone: Bone| bones[joint.index()] = bone;

        set(LeftShoulder, Bone::child_of(LeftHip, radii.left_torso));
        set(LeftKnee, Bone::child_of(LeftHip, radii.left_thigh));
        set(LeftElbow, Bone::child_of(LeftShoulder, radii.left_upper_arm));
        set(LeftAnkle, Bone::child_of(LeftKnee, radii.left_shin));
        set(LeftWrist, Bone::child_of(LeftElbow, radii.left_forearm));
        set(RightShoulder, Bone::child_of(RightHip, radii.right_torso));
        set(RightKnee, Bone::child_of(RightHip, radii.right_thigh));
        set(RightElbow, Bone::child_of(RightShoulder, radii.right_upper_arm));
        set(RightAnkle, Bone::child_of(RightKnee, radii.right_shin));
        set(RightWrist, Bone::child_of(RightElbow, radii.right_forearm));

        Self::new(bones)
    }

    pub fn bone(&self, joint: Joint) -> &Bone {
        &self.bones[joint.index()]
    }

    pub fn parent(&self, joint: Joint) -> Option<Joint> {
        match self.bone(joint).anchor {
            Anchor::Root => None,
            Anchor::Parent(parent) => Some(parent),
        }
    }

    pub fn processing_order(&self) -> &[Joint; JOINT_COUNT] {
        &self.order
    }
}

/// Kahn's algorithm over the parent links. Roots are seeded in joint order and
/// children are enqueued in joint order, so the result is deterministic.
fn processing_order(bones: &[Bone; JOINT_COUNT]) -> Result<[Joint; JOINT_COUNT], TopologyError> {
    let mut children: [Vec<Joint>; JOINT_COUNT] = Default::default();
    let mut queue = VecDeque::with_capacity(JOINT_COUNT);

    for joint in Joint::ALL {
        match bones[joint.index()].anchor {
            Anchor::Root => queue.push_back(joint),
            Anchor::Parent(parent) if parent == joint => {
                return Err(TopologyError::SelfParent(joint));
            }
            Anchor::Parent(parent) => children[parent.index()].push(joint),
        }
    }

    let mut order = [Joint::Nose; JOINT_COUNT];
    let mut placed = 0;
    let mut visited = [false; JOINT_COUNT];
    while let Some(joint) = queue.pop_front() {
        order[placed] = joint;
        placed += 1;
        visited[joint.index()] = true;
        queue.extend(children[joint.index()].iter().copied());
    }

    if placed < JOINT_COUNT {
        // Anything never reached sits on a cycle or hangs below one.
        let stuck = Joint::ALL
            .into_iter()
            .find(|joint| !visited[joint.index()])
            .unwrap_or(Joint::Nose);
        return Err(TopologyError::Cycle(stuck));
    }

    Ok(order)
}
