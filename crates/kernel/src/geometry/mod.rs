pub mod bezier;
pub mod curves;
pub mod plane;
pub mod poly_bezier;

/// A point in 3D Euclidean space.
pub type Point3d = nalgebra::Point3<f64>;

/// A vector in 3D Euclidean space.
pub type Vec3 = nalgebra::Vector3<f64>;

/// World axes used for axis snapping of lines and plane normals.
pub const ORTHO_DIRECTIONS: [Vec3; 3] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
];

/// Unit vector, or zero when `v` is too short to carry a direction.
pub fn normalize_or_zero(v: &Vec3) -> Vec3 {
    v.try_normalize(1e-12).unwrap_or_else(Vec3::zeros)
}

/// Axis from `directions` closest to `v` (up to sign), oriented like `v`,
/// when the angle between them is below `angle`.
pub fn snap_to_directions(v: &Vec3, directions: &[Vec3], angle: f64) -> Option<Vec3> {
    let unit = v.try_normalize(1e-12)?;
    let threshold = angle.cos();
    directions
        .iter()
        .map(|d| (d, unit.dot(d)))
        .filter(|(_, dot)| dot.abs() > threshold)
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(d, dot)| d.normalize() * dot.signum())
}
