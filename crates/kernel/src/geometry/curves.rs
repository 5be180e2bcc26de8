use serde::{Deserialize, Serialize};

use super::plane::Plane;
use super::poly_bezier::PolyBezier;
use super::{Point3d, Vec3, normalize_or_zero};
use crate::CurveError;

/// Beautified stroke geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Curve {
    Line(LineCurve),
    Bezier(PolyBezier),
}

/// A point on a curve together with its parameter and unit tangent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOnCurve {
    pub t: f64,
    pub position: Point3d,
    pub tangent: Vec3,
}

impl PointOnCurve {
    pub fn new(t: f64, position: Point3d, tangent: Vec3) -> Self {
        Self { t, position, tangent }
    }

    /// Reflection across `plane`; the parameter is kept.
    pub fn mirrored(&self, plane: &Plane) -> Self {
        Self {
            t: self.t,
            position: plane.mirror_point(&self.position),
            tangent: plane.mirror_direction(&self.tangent),
        }
    }
}

/// Affine map from parameters on a curve before a cut to parameters after it.
///
/// Parameters below `t0` fell into the discarded part and map to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reparameterization {
    pub t0: f64,
    pub ratio: f64,
}

impl Reparameterization {
    pub fn apply(&self, t: f64) -> f64 {
        if t < self.t0 { 0.0 } else { (t - self.t0) * self.ratio }
    }
}

/// A straight stroke between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineCurve {
    pub a: Point3d,
    pub b: Point3d,
    pub start_weight: f64,
    pub end_weight: f64,
}

impl LineCurve {
    pub fn new(a: Point3d, b: Point3d) -> Self {
        Self {
            a,
            b,
            start_weight: 1.0,
            end_weight: 1.0,
        }
    }

    pub fn with_weights(self, start_weight: f64, end_weight: f64) -> Self {
        Self {
            start_weight,
            end_weight,
            ..self
        }
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        self.a.lerp(&self.b, t)
    }

    pub fn direction(&self) -> Vec3 {
        normalize_or_zero(&(self.b - self.a))
    }

    pub fn length(&self) -> f64 {
        nalgebra::distance(&self.a, &self.b)
    }

    /// Closest point on the segment (parameter clamped to [0, 1]).
    pub fn project(&self, p: &Point3d) -> PointOnCurve {
        let ab = self.b - self.a;
        let len2 = ab.norm_squared();
        let t = if len2 < 1e-24 {
            0.0
        } else {
            ((p - self.a).dot(&ab) / len2).clamp(0.0, 1.0)
        };
        PointOnCurve::new(t, self.evaluate(t), self.direction())
    }

    /// Shorten the segment at `t`; the kept part is reparameterized to [0, 1].
    pub fn cut_at(&mut self, t: f64, discard_before: bool) -> Result<Option<Reparameterization>, CurveError> {
        let t = t.clamp(0.0, 1.0);
        let cut = self.evaluate(t);
        if discard_before {
            if t >= 1.0 - 1e-9 {
                return Err(CurveError::EmptyCut { t });
            }
            self.a = cut;
            Ok(Some(Reparameterization {
                t0: t,
                ratio: 1.0 / (1.0 - t),
            }))
        } else {
            if t <= 1e-9 {
                return Err(CurveError::EmptyCut { t });
            }
            self.b = cut;
            Ok(Some(Reparameterization { t0: 0.0, ratio: 1.0 / t }))
        }
    }

    /// Endpoints projected on `plane` and the mean endpoint displacement.
    pub fn project_on_plane(&self, plane: &Plane) -> (LineCurve, f64) {
        let a = plane.project(&self.a);
        let b = plane.project(&self.b);
        let score = 0.5 * (nalgebra::distance(&a, &self.a) + nalgebra::distance(&b, &self.b));
        (LineCurve { a, b, ..*self }, score)
    }

    pub fn mirrored(&self, plane: &Plane) -> LineCurve {
        LineCurve {
            a: plane.mirror_point(&self.a),
            b: plane.mirror_point(&self.b),
            ..*self
        }
    }
}

impl Curve {
    pub fn evaluate(&self, t: f64) -> Point3d {
        match self {
            Curve::Line(line) => line.evaluate(t),
            Curve::Bezier(poly) => poly.evaluate(t),
        }
    }

    /// Unit tangent at `t`.
    pub fn tangent(&self, t: f64) -> Vec3 {
        match self {
            Curve::Line(line) => line.direction(),
            Curve::Bezier(poly) => poly.tangent(t),
        }
    }

    pub fn point_on_curve(&self, t: f64) -> PointOnCurve {
        PointOnCurve::new(t, self.evaluate(t), self.tangent(t))
    }

    /// Pressure-derived weight, interpolated between the stroke ends.
    pub fn weight(&self, t: f64) -> f64 {
        let (start, end) = match self {
            Curve::Line(line) => (line.start_weight, line.end_weight),
            Curve::Bezier(poly) => (poly.start_weight, poly.end_weight),
        };
        start + (end - start) * t.clamp(0.0, 1.0)
    }

    pub fn start(&self) -> Point3d {
        self.evaluate(0.0)
    }

    pub fn end(&self) -> Point3d {
        self.evaluate(1.0)
    }

    pub fn project(&self, p: &Point3d) -> PointOnCurve {
        match self {
            Curve::Line(line) => line.project(p),
            Curve::Bezier(poly) => poly.project(p),
        }
    }

    /// Cut the curve at `t`, keeping the part after it when `discard_before`.
    ///
    /// Poly-Bezier cuts snap to an existing anchor within `snap_distance`.
    pub fn cut_at(
        &mut self,
        t: f64,
        discard_before: bool,
        snap_distance: f64,
    ) -> Result<Option<Reparameterization>, CurveError> {
        match self {
            Curve::Line(line) => line.cut_at(t, discard_before),
            Curve::Bezier(poly) => poly.cut_at(t, discard_before, snap_distance),
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            Curve::Line(line) => line.length(),
            Curve::Bezier(poly) => poly.length(),
        }
    }

    pub fn length_between(&self, t0: f64, t1: f64) -> f64 {
        match self {
            Curve::Line(line) => line.length() * (t1 - t0).abs(),
            Curve::Bezier(poly) => poly.length_between(t0, t1),
        }
    }

    pub fn control_points(&self) -> Vec<Point3d> {
        match self {
            Curve::Line(line) => vec![line.a, line.b],
            Curve::Bezier(poly) => poly.control_points().to_vec(),
        }
    }

    /// Non-degenerate and at least `min_length` long.
    pub fn is_valid(&self, min_length: f64) -> bool {
        match self {
            Curve::Line(line) => line.length() >= min_length,
            Curve::Bezier(poly) => poly.is_valid(min_length),
        }
    }

    /// Curve projected on `plane` and the projection error.
    pub fn project_on_plane(&self, plane: &Plane) -> (Curve, f64) {
        match self {
            Curve::Line(line) => {
                let (projected, score) = line.project_on_plane(plane);
                (Curve::Line(projected), score)
            }
            Curve::Bezier(poly) => {
                let (projected, score) = poly.project_on_plane(plane);
                (Curve::Bezier(projected), score)
            }
        }
    }

    pub fn mirrored(&self, plane: &Plane) -> Curve {
        match self {
            Curve::Line(line) => Curve::Line(line.mirrored(plane)),
            Curve::Bezier(poly) => Curve::Bezier(poly.mirrored(plane)),
        }
    }

    pub fn as_bezier(&self) -> Option<&PolyBezier> {
        match self {
            Curve::Bezier(poly) => Some(poly),
            Curve::Line(_) => None,
        }
    }

    pub fn as_line(&self) -> Option<&LineCurve> {
        match self {
            Curve::Line(line) => Some(line),
            Curve::Bezier(_) => None,
        }
    }
}
