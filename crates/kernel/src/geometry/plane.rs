use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};

use super::{Point3d, Vec3, snap_to_directions};

/// An oriented infinite plane (mirror planes, planarity fits).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: Point3d,
    /// Unit normal.
    pub normal: Vec3,
}

impl Plane {
    pub fn new(origin: Point3d, normal: Vec3) -> Self {
        Self {
            origin,
            normal: super::normalize_or_zero(&normal),
        }
    }

    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    pub fn distance(&self, p: &Point3d) -> f64 {
        self.signed_distance(p).abs()
    }

    pub fn project(&self, p: &Point3d) -> Point3d {
        p - self.normal * self.signed_distance(p)
    }

    pub fn mirror_point(&self, p: &Point3d) -> Point3d {
        p - self.normal * (2.0 * self.signed_distance(p))
    }

    pub fn mirror_direction(&self, v: &Vec3) -> Vec3 {
        v - self.normal * (2.0 * v.dot(&self.normal))
    }

    /// Same plane with its normal replaced by the closest axis in
    /// `directions` when within `angle`.
    pub fn snapped(&self, directions: &[Vec3], angle: f64) -> Self {
        match snap_to_directions(&self.normal, directions, angle) {
            Some(normal) => Self {
                origin: self.origin,
                normal,
            },
            None => *self,
        }
    }

    /// Least-squares plane through `points` and the largest point distance to it.
    ///
    /// Returns `None` for fewer than three points or when the points do not
    /// span a plane (all coincident or collinear).
    pub fn fit(points: &[Point3d]) -> Option<(Plane, f64)> {
        if points.len() < 3 {
            return None;
        }

        let n = points.len() as f64;
        let centroid = Point3d::from(points.iter().fold(Vec3::zeros(), |acc, p| acc + p.coords) / n);

        let mut covariance = Matrix3::zeros();
        for p in points {
            let d = p - centroid;
            covariance += d * d.transpose();
        }

        let eigen = SymmetricEigen::new(covariance);
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let largest = eigen.eigenvalues[order[2]];
        let middle = eigen.eigenvalues[order[1]];
        if largest <= 1e-18 || middle <= largest * 1e-12 {
            return None;
        }

        let normal = eigen.eigenvectors.column(order[0]).into_owned();
        let plane = Plane::new(centroid, normal);
        let max_distance = points.iter().map(|p| plane.distance(p)).fold(0.0, f64::max);
        Some((plane, max_distance))
    }
}
