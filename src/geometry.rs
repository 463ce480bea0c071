// src/geometry.rs
use nalgebra::Vector2;

/// Clamps `point` onto the disk of `radius` around `center`.
///
/// Points inside the disk come back unchanged; points outside are pulled
/// along the ray from the centre onto the boundary. A non-positive radius
/// collapses the disk to its centre.
pub fn project_to_sphere(point: Vector2<f64>, center: Vector2<f64>, radius: f64) -> Vector2<f64> {
    let radius = radius.max(0.0);
    let offset = point - center;
    let dist_sq = offset.norm_squared();
    if dist_sq > radius * radius {
        let scale = radius / dist_sq.sqrt();
        center + offset * scale
    } else {
        point
    }
}
