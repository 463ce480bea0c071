// src/features.rs - Pose features computed from the filtered skeleton
use nalgebra::{Rotation2, Vector2, Vector3};

use crate::skeleton::{DepthVector, Joint, JOINT_COUNT};
use crate::transition::MeasurementFrame;

pub type SkeletonPoints = [Vector3<f64>; JOINT_COUNT];

const NORM_GUARD: f64 = 1e-8;

/// The normalisation scale is at least this many torso lengths.
const TORSO_SIZE_MULTIPLIER: f64 = 2.5;

/// Joints whose inner angles are measured, each with the neighbours that
/// span them. Every pair of neighbours gives one angle.
const ANGLE_VERTICES: [(Joint, &[Joint]); 8] = [
    (Joint::LeftShoulder, &[Joint::Nose, Joint::LeftElbow, Joint::LeftHip]),
    (Joint::RightShoulder, &[Joint::Nose, Joint::RightElbow, Joint::RightHip]),
    (Joint::LeftElbow, &[Joint::LeftShoulder, Joint::LeftWrist]),
    (Joint::RightElbow, &[Joint::RightShoulder, Joint::RightWrist]),
    (Joint::LeftHip, &[Joint::LeftShoulder, Joint::LeftKnee]),
    (Joint::RightHip, &[Joint::RightShoulder, Joint::RightKnee]),
    (Joint::LeftKnee, &[Joint::LeftHip, Joint::LeftAnkle]),
    (Joint::RightKnee, &[Joint::RightHip, Joint::RightAnkle]),
];

pub const ANGLE_COUNT: usize = 12;

/// Coordinates of every joint followed by the planar and spatial angles.
pub const FEATURE_COUNT: usize = JOINT_COUNT * 3 + 2 * ANGLE_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleSpace {
    /// Image plane only.
    Planar,
    /// Planar position plus depth.
    Spatial,
}

impl AngleSpace {
    fn tag(self) -> &'static str {
        match self {
            AngleSpace::Planar => "2d",
            AngleSpace::Spatial => "3d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngle {
    pub space: AngleSpace,
    pub vertex: Joint,
    pub from: Joint,
    pub to: Joint,
    pub radians: f64,
}

impl JointAngle {
    pub fn column_name(&self) -> String {
        angle_column(self.space, self.vertex, self.from, self.to)
    }
}

pub fn angle_column(space: AngleSpace, vertex: Joint, from: Joint, to: Joint) -> String {
    format!("angle_{}_{vertex}_{from}_{to}", space.tag())
}

/// `(vertex, from, to)` for every angle, in the order [`joint_angles`]
/// reports them.
pub fn angle_triples() -> impl Iterator<Item = (Joint, Joint, Joint)> {
    ANGLE_VERTICES.into_iter().flat_map(|(vertex, neighbours)| {
        neighbours.iter().enumerate().flat_map(move |(i, &from)| {
            neighbours[i + 1..].iter().map(move |&to| (vertex, from, to))
        })
    })
}

/// Planar positions from the frame joined with the filtered depths.
pub fn skeleton_points(frame: &MeasurementFrame, depths: &DepthVector) -> SkeletonPoints {
    let mut points = [Vector3::zeros(); JOINT_COUNT];
    for joint in Joint::ALL {
        let position = frame[joint].position;
        points[joint.index()] = Vector3::new(position.x, position.y, depths[joint.index()]);
    }
    points
}

/// Centres the planar coordinates on the hip midpoint and scales all three
/// axes by the larger of 2.5 torso lengths and the farthest joint from that
/// centre. A skeleton collapsed onto one point is only centred.
pub fn normalize_to_hips(points: &mut SkeletonPoints) {
    let hips = (points[Joint::LeftHip.index()].xy() + points[Joint::RightHip.index()].xy()) / 2.0;
    let shoulders =
        (points[Joint::LeftShoulder.index()].xy() + points[Joint::RightShoulder.index()].xy()) / 2.0;
    let torso = (shoulders - hips).norm();

    let scale = points
        .iter()
        .map(|p| (p.xy() - hips).norm())
        .fold(torso * TORSO_SIZE_MULTIPLIER, f64::max);

    for point in points.iter_mut() {
        point.x -= hips.x;
        point.y -= hips.y;
        if scale > NORM_GUARD {
            *point /= scale;
        }
    }
}

/// Rotates every joint about the depth axis so the left-to-right shoulder
/// line points along +x.
pub fn align_shoulders(points: &mut SkeletonPoints) {
    let left = points[Joint::LeftShoulder.index()].xy();
    let right = points[Joint::RightShoulder.index()].xy();
    let shoulder_line = right - left;
    let rotation = Rotation2::new(-shoulder_line.y.atan2(shoulder_line.x));

    for point in points.iter_mut() {
        let planar = rotation * Vector2::new(point.x, point.y);
        point.x = planar.x;
        point.y = planar.y;
    }
}

pub fn joint_angles(points: &SkeletonPoints, space: AngleSpace) -> Vec<JointAngle> {
    let project = |joint: Joint| {
        let p = points[joint.index()];
        match space {
            AngleSpace::Planar => Vector3::new(p.x, p.y, 0.0),
            AngleSpace::Spatial => p,
        }
    };

    angle_triples()
        .map(|(vertex, from, to)| {
            let center = project(vertex);
            let a = project(from) - center;
            let b = project(to) - center;
            let cosine = (a / (a.norm() + NORM_GUARD))
                .dot(&(b / (b.norm() + NORM_GUARD)))
                .clamp(-1.0, 1.0);
            JointAngle { space, vertex, from, to, radians: cosine.acos() }
        })
        .collect()
}

/// One feature row: hip-normalised, shoulder-aligned coordinates of every
/// joint, then the planar and spatial joint angles.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFeatures {
    pub points: SkeletonPoints,
    pub planar: Vec<JointAngle>,
    pub spatial: Vec<JointAngle>,
}

impl PoseFeatures {
    pub fn extract(frame: &MeasurementFrame, depths: &DepthVector) -> Self {
        let mut points = skeleton_points(frame, depths);
        normalize_to_hips(&mut points);
        align_shoulders(&mut points);
        Self {
            planar: joint_angles(&points, AngleSpace::Planar),
            spatial: joint_angles(&points, AngleSpace::Spatial),
            points,
        }
    }

    /// Column names matching [`PoseFeatures::values`].
    pub fn column_names() -> Vec<String> {
        let mut names = Vec::with_capacity(FEATURE_COUNT);
        for joint in Joint::ALL {
            names.extend(["x", "y", "z"].map(|axis| format!("{joint}_{axis}")));
        }
        for space in [AngleSpace::Planar, AngleSpace::Spatial] {
            names.extend(angle_triples().map(|(vertex, from, to)| angle_column(space, vertex, from, to)));
        }
        names
    }

    pub fn values(&self) -> Vec<f64> {
        self.points
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .chain(self.planar.iter().chain(&self.spatial).map(|a| a.radians))
            .collect()
    }
}
