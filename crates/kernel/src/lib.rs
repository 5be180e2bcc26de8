//! Geometry kernel for stroke beautification.
//!
//! Holds the curve model (straight segments and poly-Beziers), plane
//! utilities, raw stroke samples with their segmentation into G1 sections,
//! and the least-squares Bezier fitter.

pub mod fit;
pub mod geometry;
pub mod stroke;

use thiserror::Error;

pub use fit::{fit_curve, simplify};
pub use geometry::bezier::CubicBezier;
pub use geometry::curves::{Curve, LineCurve, PointOnCurve, Reparameterization};
pub use geometry::plane::Plane;
pub use geometry::poly_bezier::PolyBezier;
pub use geometry::{ORTHO_DIRECTIONS, Point3d, Vec3};
pub use stroke::{G1Config, Sample, StrokeRejection, StrokeSamples};

/// Errors raised by curve construction and editing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CurveError {
    #[error("Poly-Bezier needs 3k+1 control points with k >= 1, got {count}")]
    InvalidControlPointCount { count: usize },
    #[error("Cut at t={t} would leave an empty curve")]
    EmptyCut { t: f64 },
    #[error("Cannot fit a curve through {count} points")]
    NotEnoughPoints { count: usize },
}

/// Global tolerance configuration for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Control points closer than this are considered coincident.
    pub coincidence: f64,
    /// Parameter-space tolerance for curve evaluations.
    pub parametric: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            coincidence: 1e-5,
            parametric: 1e-6,
        }
    }
}

impl Tolerance {
    pub fn points_coincident(&self, a: &Point3d, b: &Point3d) -> bool {
        nalgebra::distance(a, b) < self.coincidence
    }

    pub fn is_zero_length(&self, length: f64) -> bool {
        length.abs() < self.coincidence
    }
}

/// Default tolerance shared by the kernel, solver and beautifier.
pub fn default_tolerance() -> Tolerance {
    Tolerance::default()
}
