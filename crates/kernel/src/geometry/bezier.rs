use serde::{Deserialize, Serialize};

use super::{Point3d, Vec3};

/// A single cubic Bezier segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicBezier {
    pub points: [Point3d; 4],
}

impl CubicBezier {
    pub fn new(p0: Point3d, p1: Point3d, p2: Point3d, p3: Point3d) -> Self {
        Self {
            points: [p0, p1, p2, p3],
        }
    }

    pub fn start(&self) -> Point3d {
        self.points[0]
    }

    pub fn end(&self) -> Point3d {
        self.points[3]
    }

    /// Evaluate at `u` in [0, 1] using the power-basis coefficients.
    pub fn evaluate(&self, u: f64) -> Point3d {
        let [p0, p1, p2, p3] = self.points.map(|p| p.coords);
        let c = (p1 - p0) * 3.0;
        let b = (p2 - p1) * 3.0 - c;
        let a = p3 - p0 - c - b;
        Point3d::from(((a * u + b) * u + c) * u + p0)
    }

    pub fn derivative(&self, u: f64) -> Vec3 {
        let [p0, p1, p2, p3] = self.points.map(|p| p.coords);
        let s = 1.0 - u;
        (p1 - p0) * (3.0 * s * s) + (p2 - p1) * (6.0 * s * u) + (p3 - p2) * (3.0 * u * u)
    }

    pub fn second_derivative(&self, u: f64) -> Vec3 {
        let [p0, p1, p2, p3] = self.points.map(|p| p.coords);
        (p2 - p1 * 2.0 + p0) * (6.0 * (1.0 - u)) + (p3 - p2 * 2.0 + p1) * (6.0 * u)
    }

    /// De Casteljau subdivision at `u`.
    pub fn split(&self, u: f64) -> (CubicBezier, CubicBezier) {
        let [p0, p1, p2, p3] = self.points;
        let p01 = p0.lerp(&p1, u);
        let p12 = p1.lerp(&p2, u);
        let p23 = p2.lerp(&p3, u);
        let p012 = p01.lerp(&p12, u);
        let p123 = p12.lerp(&p23, u);
        let mid = p012.lerp(&p123, u);
        (
            CubicBezier::new(p0, p01, p012, mid),
            CubicBezier::new(mid, p123, p23, p3),
        )
    }

    /// Control polygon has no coincident consecutive points.
    pub fn is_non_degenerate(&self, eps: f64) -> bool {
        self.points.windows(2).all(|w| nalgebra::distance(&w[0], &w[1]) > eps)
    }

    /// The segment does not collapse to a single point.
    pub fn is_non_trivial(&self, eps: f64) -> bool {
        self.points[1..].iter().any(|p| nalgebra::distance(p, &self.points[0]) > eps)
    }

    /// Arc length approximated by a polyline with `steps` chords.
    pub fn length(&self, steps: usize) -> f64 {
        let steps = steps.max(1);
        let mut prev = self.points[0];
        let mut total = 0.0;
        for i in 1..=steps {
            let p = self.evaluate(i as f64 / steps as f64);
            total += nalgebra::distance(&prev, &p);
            prev = p;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CubicBezier {
        CubicBezier::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 2.0, 0.0),
            Point3d::new(3.0, 2.0, 1.0),
            Point3d::new(4.0, 0.0, 0.0),
        )
    }

    fn bernstein(b: &CubicBezier, u: f64) -> Point3d {
        let s = 1.0 - u;
        let [p0, p1, p2, p3] = b.points.map(|p| p.coords);
        Point3d::from(p0 * (s * s * s) + p1 * (3.0 * s * s * u) + p2 * (3.0 * s * u * u) + p3 * (u * u * u))
    }

    #[test]
    fn test_evaluate_matches_bernstein_form() {
        let b = sample();
        for i in 0..=10 {
            let u = i as f64 / 10.0;
            assert!((b.evaluate(u) - bernstein(&b, u)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let b = sample();
        let h = 1e-6;
        for u in [0.1, 0.5, 0.9] {
            let fd = (b.evaluate(u + h) - b.evaluate(u - h)) / (2.0 * h);
            assert!((fd - b.derivative(u)).norm() < 1e-6);
            let fd2 = (b.derivative(u + h) - b.derivative(u - h)) / (2.0 * h);
            assert!((fd2 - b.second_derivative(u)).norm() < 1e-5);
        }
    }

    #[test]
    fn test_split_preserves_shape() {
        let b = sample();
        let (left, right) = b.split(0.3);
        assert!((left.end() - b.evaluate(0.3)).norm() < 1e-12);
        assert_eq!(left.end(), right.start());
        assert!((left.evaluate(0.5) - b.evaluate(0.15)).norm() < 1e-12);
        assert!((right.evaluate(0.5) - b.evaluate(0.65)).norm() < 1e-12);
    }

    #[test]
    fn test_degeneracy_checks() {
        let p = Point3d::new(1.0, 1.0, 1.0);
        let dot = CubicBezier::new(p, p, p, p);
        assert!(!dot.is_non_trivial(1e-5));
        assert!(!dot.is_non_degenerate(1e-5));
        let b = sample();
        assert!(b.is_non_trivial(1e-5));
        assert!(b.is_non_degenerate(1e-5));
    }
}
