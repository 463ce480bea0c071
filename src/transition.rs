// src/transition.rs - Parent-first constrained transition over the joint depths
use std::ops::Index;

use nalgebra::{SVector, Vector2};

use crate::error::FilterError;
use crate::geometry::project_to_sphere;
use crate::skeleton::{Anchor, DepthVector, Joint, Topology, JOINT_COUNT};
use crate::smoothing::SmoothingPolicy;

/// A state transition `x' = f(x, context, dt)` the filter can linearize.
pub trait TransitionModel<const N: usize> {
    /// Per-frame data the transition reads besides the state.
    type Context;

    fn transition(&self, state: &SVector<f64, N>, context: &Self::Context, dt: f64) -> SVector<f64, N>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointObservation {
    pub position: Vector2<f64>,
    pub raw_depth: f64,
    /// Calibration reference. Only root joints read it; children use their
    /// parent's depth instead.
    pub reference_depth: f64,
}

impl JointObservation {
    pub fn new(x: f64, y: f64, raw_depth: f64, reference_depth: f64) -> Self {
        Self { position: Vector2::new(x, y), raw_depth, reference_depth }
    }

    fn check(&self, joint: Joint) -> Result<(), FilterError> {
        let fields = [
            ("x", self.position.x),
            ("y", self.position.y),
            ("raw depth", self.raw_depth),
            ("reference depth", self.reference_depth),
        ];
        match fields.into_iter().find(|(_, value)| !value.is_finite()) {
            Some((field, _)) => Err(FilterError::NonFiniteObservation { joint, field }),
            None => Ok(()),
        }
    }
}

/// Everything the transition needs from one video frame, one entry per joint.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementFrame {
    joints: [JointObservation; JOINT_COUNT],
}

impl MeasurementFrame {
    pub fn new(joints: [JointObservation; JOINT_COUNT]) -> Self {
        Self { joints }
    }

    pub fn observations(&self) -> &[JointObservation; JOINT_COUNT] {
        &self.joints
    }

    /// The measurement vector `z` for the update step.
    pub fn raw_depths(&self) -> DepthVector {
        DepthVector::from_fn(|i, _| self.joints[i].raw_depth)
    }

    /// Fails on the first joint carrying a NaN or infinite value.
    pub fn validate(&self) -> Result<(), FilterError> {
        Joint::ALL
            .into_iter()
            .try_for_each(|joint| self[joint].check(joint))
    }
}

impl Index<Joint> for MeasurementFrame {
    type Output = JointObservation;

    fn index(&self, joint: Joint) -> &JointObservation {
        &self.joints[joint.index()]
    }
}

/// What the transition did for a single joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointStep {
    pub joint: Joint,
    pub projected: Vector2<f64>,
    pub delta_sq: f64,
    pub reference: f64,
    pub previous: f64,
    pub depth: f64,
}

#[derive(Debug, Clone)]
pub struct ConstrainedTransition {
    topology: Topology,
    policy: SmoothingPolicy,
}

impl ConstrainedTransition {
    pub fn new(topology: Topology, policy: SmoothingPolicy) -> Self {
        Self { topology, policy }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Runs the transition and records one [`JointStep`] per joint, in the
    /// order the joints were processed.
    pub fn advance_traced(
        &self,
        state: &DepthVector,
        frame: &MeasurementFrame,
        trace: &mut Vec<JointStep>,
    ) -> DepthVector {
        self.advance(state, frame, Some(trace))
    }

    fn advance(
        &self,
        state: &DepthVector,
        frame: &MeasurementFrame,
        mut trace: Option<&mut Vec<JointStep>>,
    ) -> DepthVector {
        let mut next = *state;

        for &joint in self.topology.processing_order() {
            let bone = self.topology.bone(joint);
            let observation = &frame[joint];

            let (center, reference) = match bone.anchor {
                Anchor::Root => (Vector2::zeros(), observation.reference_depth),
                // The parent was already processed, so `next` holds its new depth.
                Anchor::Parent(parent) => (frame[parent].position, next[parent.index()]),
            };

            let projected = project_to_sphere(observation.position, center, bone.radius);
            let delta_sq = (bone.radius * bone.radius - (projected - center).norm_squared()).max(0.0);

            let previous = next[joint.index()];
            let depth = self
                .policy
                .smooth_transition(previous, delta_sq, reference, observation.raw_depth);
            next[joint.index()] = depth;

            if let Some(trace) = trace.as_deref_mut() {
                trace.push(JointStep { joint, projected, delta_sq, reference, previous, depth });
            }
        }

        next
    }
}

impl TransitionModel<JOINT_COUNT> for ConstrainedTransition {
    type Context = MeasurementFrame;

    // The motion model has no velocity term, so `dt` does not enter it.
    fn transition(&self, state: &DepthVector, frame: &MeasurementFrame, _dt: f64) -> DepthVector {
        self.advance(state, frame, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoneRadii;
    use crate::skeleton::Bone;
    use approx::assert_abs_diff_eq;
    use Joint::*;

    fn uniform_frame(x: f64, y: f64, raw: f64, reference: f64) -> MeasurementFrame {
        MeasurementFrame::new([JointObservation::new(x, y, raw, reference); JOINT_COUNT])
    }

    fn all_roots(radius: f64) -> ConstrainedTransition {
        let topology = Topology::new([Bone::root(radius); JOINT_COUNT]).unwrap();
        ConstrainedTransition::new(topology, SmoothingPolicy::default())
    }

    fn human() -> ConstrainedTransition {
        let topology = Topology::human(&BoneRadii::default()).unwrap();
        ConstrainedTransition::new(topology, SmoothingPolicy::default())
    }

    // Deterministic xorshift so the property checks do not need a rand crate.
    struct Noise(u64);

    impl Noise {
        fn next(&mut self, lo: f64, hi: f64) -> f64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            lo + (hi - lo) * (self.0 % 1_000_000) as f64 / 1_000_000.0
        }

        fn frame(&mut self) -> MeasurementFrame {
            let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
            for joint in joints.iter_mut() {
                *joint = JointObservation::new(
                    self.next(-1.5, 1.5),
                    self.next(-1.5, 1.5),
                    self.next(-1.0, 1.0),
                    self.next(-1.0, 1.0),
                );
            }
            MeasurementFrame::new(joints)
        }
    }

    #[test]
    fn root_on_boundary_predicts_reference() {
        let transition = all_roots(1.0);
        let frame = uniform_frame(0.6, 0.8, 0.7, 0.25);
        let state = DepthVector::repeat(0.25);

        let mut trace = Vec::new();
        let next = transition.advance_traced(&state, &frame, &mut trace);

        for step in &trace {
            assert_abs_diff_eq!(step.delta_sq, 0.0, epsilon = 1e-12);
        }
        for depth in next.iter() {
            assert_abs_diff_eq!(*depth, 0.25, epsilon = 1e-12);
        }
    }

    #[test]
    fn root_outside_radius_is_projected() {
        let transition = all_roots(1.0);
        let frame = uniform_frame(2.0, 0.0, 0.0, 0.0);
        let mut trace = Vec::new();
        transition.advance_traced(&DepthVector::zeros(), &frame, &mut trace);

        for step in &trace {
            assert_abs_diff_eq!(step.projected.x, 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(step.projected.y, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(step.delta_sq, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn child_uses_parent_center_and_updated_depth() {
        let transition = human();
        let radii = BoneRadii::default();
        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        joints[LeftHip.index()] = JointObservation::new(0.1, 0.0, 0.5, 0.5);
        joints[LeftShoulder.index()] = JointObservation::new(0.1, 0.3, 0.9, 0.0);
        let frame = MeasurementFrame::new(joints);

        let mut trace = Vec::new();
        transition.advance_traced(&DepthVector::zeros(), &frame, &mut trace);

        let hip = trace.iter().find(|s| s.joint == LeftHip).unwrap();
        let shoulder = trace.iter().find(|s| s.joint == LeftShoulder).unwrap();
        assert_eq!(shoulder.reference, hip.depth);
        // 0.3 above the hip inside a bone of radius `left_torso`
        let expected = radii.left_torso * radii.left_torso - 0.3 * 0.3;
        assert_abs_diff_eq!(shoulder.delta_sq, expected, epsilon = 1e-12);
    }

    #[test]
    fn parents_are_processed_before_children_on_reversed_chain() {
        // Nose <- LeftShoulder <- ... <- RightAnkle (root): every parent has a
        // higher index than its child, so index order would be wrong.
        let mut bones = [Bone::root(1.0); JOINT_COUNT];
        for i in 0..JOINT_COUNT - 1 {
            bones[i] = Bone::child_of(Joint::ALL[i + 1], 0.5);
        }
        let topology = Topology::new(bones).unwrap();
        let transition = ConstrainedTransition::new(topology, SmoothingPolicy::default());

        let mut trace = Vec::new();
        transition.advance_traced(&DepthVector::zeros(), &uniform_frame(0.1, 0.1, 0.3, 0.2), &mut trace);

        let visited: Vec<Joint> = trace.iter().map(|s| s.joint).collect();
        let expected: Vec<Joint> = Joint::ALL.iter().rev().copied().collect();
        assert_eq!(visited, expected);

        for pair in trace.windows(2) {
            // each child reads the depth its parent was just given
            assert_eq!(pair[1].reference, pair[0].depth);
        }
    }

    #[test]
    fn delta_is_non_negative_and_steps_are_rate_limited() {
        let transition = human();
        let mut noise = Noise(0x9e37_79b9_7f4a_7c15);
        let mut state = DepthVector::zeros();

        for _ in 0..200 {
            let frame = noise.frame();
            let mut trace = Vec::new();
            let next = transition.advance_traced(&state, &frame, &mut trace);

            assert_eq!(trace.len(), JOINT_COUNT);
            for step in &trace {
                assert!(step.delta_sq >= 0.0);
                assert_eq!(step.previous, state[step.joint.index()]);
            }
            for (old, new) in state.iter().zip(next.iter()) {
                assert!((new - old).abs() <= 0.05 + 1e-12);
            }
            state = next;
        }
    }

    #[test]
    fn zero_residual_converges_to_root_references_without_overshoot() {
        let transition = human();
        let topology = transition.topology().clone();
        let references = [(Nose, 0.4), (LeftHip, -0.2), (RightHip, 0.1)];

        // Every joint sits well outside its bone, so every delta_sq is zero.
        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        for &joint in topology.processing_order() {
            let position = match topology.parent(joint) {
                None => Vector2::new(2.0, 0.0),
                Some(parent) => joints[parent.index()].position + Vector2::new(1.0, 1.0),
            };
            let reference = references
                .iter()
                .find(|(root, _)| *root == joint)
                .map(|(_, r)| *r)
                .unwrap_or(0.0);
            joints[joint.index()] = JointObservation {
                position,
                raw_depth: reference,
                reference_depth: reference,
            };
        }
        let frame = MeasurementFrame::new(joints);

        let mut state = DepthVector::zeros();
        for _ in 0..300 {
            let next = transition.transition(&state, &frame, 1.0);
            for (root, reference) in references {
                let before = state[root.index()] - reference;
                let after = next[root.index()] - reference;
                assert!(after.abs() <= before.abs() + 1e-12);
                assert!(after * before >= 0.0, "{root} overshot its reference");
            }
            state = next;
        }

        let root_of = |mut joint: Joint| {
            while let Some(parent) = topology.parent(joint) {
                joint = parent;
            }
            joint
        };
        for joint in Joint::ALL {
            let root = root_of(joint);
            let (_, reference) = references.iter().find(|(r, _)| *r == root).unwrap();
            assert_abs_diff_eq!(state[joint.index()], *reference, epsilon = 1e-6);
        }
    }

    #[test]
    fn validate_reports_first_non_finite_field() {
        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        joints[RightKnee.index()].raw_depth = f64::NAN;
        let frame = MeasurementFrame::new(joints);
        assert_eq!(
            frame.validate(),
            Err(FilterError::NonFiniteObservation { joint: RightKnee, field: "raw depth" })
        );
        assert!(uniform_frame(0.0, 0.0, 0.0, 0.0).validate().is_ok());
    }

    #[test]
    fn raw_depths_follow_joint_order() {
        let mut joints = [JointObservation::new(0.0, 0.0, 0.0, 0.0); JOINT_COUNT];
        for (i, joint) in joints.iter_mut().enumerate() {
            joint.raw_depth = i as f64 * 0.1;
        }
        let z = MeasurementFrame::new(joints).raw_depths();
        assert_abs_diff_eq!(z[RightAnkle.index()], 1.2, epsilon = 1e-12);
    }
}
