//! Piecewise cubic Bezier curves with shared anchors.
//!
//! Control points are stored flat: segment `i` uses points `3i..=3i+3`, so
//! a curve with `k` segments has `3k + 1` points. The curve parameter is
//! uniform per segment: segment `i` covers `[i/k, (i+1)/k]`.

use serde::{Deserialize, Serialize};

use super::bezier::CubicBezier;
use super::curves::{PointOnCurve, Reparameterization};
use super::plane::Plane;
use super::{Point3d, Vec3, normalize_or_zero};
use crate::{CurveError, default_tolerance};

/// Arc-length polyline resolution per segment.
const LENGTH_STEPS_PER_SEGMENT: usize = 50;

/// Coarse samples per segment for closest-point search.
const PROJECTION_SLICES_PER_SEGMENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolyBezier {
    points: Vec<Point3d>,
    pub start_weight: f64,
    pub end_weight: f64,
}

impl PolyBezier {
    pub fn from_control_points(points: Vec<Point3d>) -> Result<Self, CurveError> {
        if points.len() < 4 || (points.len() - 1) % 3 != 0 {
            return Err(CurveError::InvalidControlPointCount { count: points.len() });
        }
        Ok(Self {
            points,
            start_weight: 1.0,
            end_weight: 1.0,
        })
    }

    /// Concatenate segments; each segment's start replaces the previous end.
    pub fn from_segments(segments: &[CubicBezier]) -> Result<Self, CurveError> {
        let Some(first) = segments.first() else {
            return Err(CurveError::InvalidControlPointCount { count: 0 });
        };
        let mut points = Vec::with_capacity(segments.len() * 3 + 1);
        points.push(first.start());
        for segment in segments {
            points.extend_from_slice(&segment.points[1..]);
        }
        Self::from_control_points(points)
    }

    pub fn with_weights(self, start_weight: f64, end_weight: f64) -> Self {
        Self {
            start_weight,
            end_weight,
            ..self
        }
    }

    pub fn control_points(&self) -> &[Point3d] {
        &self.points
    }

    /// Mutable view on the control points; the point count is fixed.
    pub fn control_points_mut(&mut self) -> &mut [Point3d] {
        &mut self.points
    }

    pub fn segment_count(&self) -> usize {
        (self.points.len() - 1) / 3
    }

    pub fn segment(&self, i: usize) -> CubicBezier {
        let s = 3 * i;
        CubicBezier::new(self.points[s], self.points[s + 1], self.points[s + 2], self.points[s + 3])
    }

    pub fn segments(&self) -> impl Iterator<Item = CubicBezier> + '_ {
        (0..self.segment_count()).map(|i| self.segment(i))
    }

    pub fn anchor(&self, i: usize) -> Point3d {
        self.points[3 * i]
    }

    pub fn anchor_parameter(&self, i: usize) -> f64 {
        i as f64 / self.segment_count() as f64
    }

    /// Unit tangent at anchor `i`.
    pub fn anchor_tangent(&self, i: usize) -> Vec3 {
        self.tangent(self.anchor_parameter(i))
    }

    /// Segment index and local parameter for curve parameter `t`.
    pub fn locate(&self, t: f64) -> (usize, f64) {
        let n = self.segment_count();
        let scaled = t.clamp(0.0, 1.0) * n as f64;
        let idx = (scaled.floor() as usize).min(n - 1);
        (idx, scaled - idx as f64)
    }

    pub fn evaluate(&self, t: f64) -> Point3d {
        let (idx, u) = self.locate(t);
        self.segment(idx).evaluate(u)
    }

    /// Unit tangent at `t`, falling back to a chord when handles coincide
    /// with their anchor.
    pub fn tangent(&self, t: f64) -> Vec3 {
        let (idx, u) = self.locate(t);
        let d = self.segment(idx).derivative(u);
        if d.norm() > 1e-9 {
            return d.normalize();
        }
        let h = 1e-3;
        let before = self.evaluate((t - h).max(0.0));
        let after = self.evaluate((t + h).min(1.0));
        normalize_or_zero(&(after - before))
    }

    pub fn point_on_curve(&self, t: f64) -> PointOnCurve {
        PointOnCurve::new(t, self.evaluate(t), self.tangent(t))
    }

    /// Closest point on the curve to `p`.
    pub fn project(&self, p: &Point3d) -> PointOnCurve {
        let slices = PROJECTION_SLICES_PER_SEGMENT * self.segment_count();
        self.point_on_curve(self.closest_parameter(p, slices))
    }

    /// Recursive slicing search: sample the current window, then shrink it
    /// around the best sample until the parameter step is negligible.
    pub fn closest_parameter(&self, p: &Point3d, slices: usize) -> f64 {
        let slices = slices.max(4);
        let tolerance = default_tolerance().parametric * 1e-4;
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        let mut best_t = 0.0;

        for _ in 0..64 {
            let step = (hi - lo) / slices as f64;
            let mut best_d = f64::INFINITY;
            for i in 0..=slices {
                let t = lo + step * i as f64;
                let d = (self.evaluate(t) - p).norm_squared();
                if d < best_d {
                    best_d = d;
                    best_t = t;
                }
            }
            if step < tolerance {
                break;
            }
            lo = (best_t - step).max(0.0);
            hi = (best_t + step).min(1.0);
        }
        best_t
    }

    /// Split segment `idx` at local parameter `u`; returns the new anchor index.
    pub fn split_at(&mut self, idx: usize, u: f64) -> usize {
        let (left, right) = self.segment(idx).split(u);
        let s = 3 * idx;
        let replacement = [
            left.points[0],
            left.points[1],
            left.points[2],
            left.points[3],
            right.points[1],
            right.points[2],
            right.points[3],
        ];
        self.points.splice(s..=s + 3, replacement);
        idx + 1
    }

    /// Cut the curve at `t`, dropping everything before it (`discard_before`)
    /// or after it.
    ///
    /// When the cut lands within `snap_distance` of an existing anchor, whole
    /// segments are dropped and the uniform parameterization of the kept
    /// part is an affine map of the old one. Otherwise a segment is split
    /// and `None` signals that old parameters must be re-projected.
    pub fn cut_at(
        &mut self,
        t: f64,
        discard_before: bool,
        snap_distance: f64,
    ) -> Result<Option<Reparameterization>, CurveError> {
        let n = self.segment_count();
        let t = t.clamp(0.0, 1.0);
        let nearest = self.nearest_anchor_index(t);
        let cut_point = self.evaluate(t);

        let (anchor, reparameterization) =
            if nalgebra::distance(&cut_point, &self.anchor(nearest)) < snap_distance {
                (nearest, true)
            } else {
                let (idx, u) = self.locate(t);
                let eps = default_tolerance().parametric;
                if u <= eps {
                    (idx, true)
                } else if u >= 1.0 - eps {
                    (idx + 1, true)
                } else {
                    (self.split_at(idx, u), false)
                }
            };

        let count = self.segment_count();
        if discard_before {
            if anchor >= count {
                return Err(CurveError::EmptyCut { t });
            }
            self.points.drain(..3 * anchor);
        } else {
            if anchor == 0 {
                return Err(CurveError::EmptyCut { t });
            }
            self.points.truncate(3 * anchor + 1);
        }

        if !reparameterization {
            return Ok(None);
        }
        let kept = self.segment_count() as f64;
        let r = if discard_before {
            Reparameterization {
                t0: anchor as f64 / n as f64,
                ratio: n as f64 / kept,
            }
        } else {
            Reparameterization {
                t0: 0.0,
                ratio: n as f64 / kept,
            }
        };
        Ok(Some(r))
    }

    pub fn nearest_anchor_index(&self, t: f64) -> usize {
        let n = self.segment_count();
        ((t.clamp(0.0, 1.0) * n as f64).round() as usize).min(n)
    }

    /// Number of segments touched between two parameters, inclusive.
    pub fn segment_count_between(&self, t0: f64, t1: f64) -> usize {
        let (a, _) = self.locate(t0.min(t1));
        let (b, _) = self.locate(t0.max(t1));
        b - a + 1
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|s| s.length(LENGTH_STEPS_PER_SEGMENT)).sum()
    }

    /// Polyline approximation of the arc length between two parameters.
    pub fn length_between(&self, t0: f64, t1: f64) -> f64 {
        let (lo, hi) = (t0.min(t1).clamp(0.0, 1.0), t0.max(t1).clamp(0.0, 1.0));
        let steps = ((hi - lo) * (LENGTH_STEPS_PER_SEGMENT * self.segment_count()) as f64).ceil() as usize;
        let steps = steps.max(1);
        let mut prev = self.evaluate(lo);
        let mut total = 0.0;
        for i in 1..=steps {
            let p = self.evaluate(lo + (hi - lo) * i as f64 / steps as f64);
            total += nalgebra::distance(&prev, &p);
            prev = p;
        }
        total
    }

    /// Control points of the sub-curve between `t0` and `t1`.
    pub fn control_points_between(&self, t0: f64, t1: f64) -> Result<Vec<Point3d>, CurveError> {
        let (lo, hi) = (t0.min(t1), t0.max(t1));
        let start = self.evaluate(lo);
        let mut sub = self.clone();
        let mut lo_on_sub = lo;
        if hi < 1.0 {
            lo_on_sub = match sub.cut_at(hi, false, 0.0)? {
                Some(r) => r.apply(lo),
                None => sub.closest_parameter(&start, PROJECTION_SLICES_PER_SEGMENT * sub.segment_count()),
            };
        }
        if lo > 0.0 {
            sub.cut_at(lo_on_sub, true, 0.0)?;
        }
        Ok(sub.points)
    }

    /// Every segment carries geometry and the curve is long enough.
    pub fn is_valid(&self, min_length: f64) -> bool {
        let eps = default_tolerance().coincidence;
        self.segments().all(|s| s.is_non_trivial(eps)) && self.length() >= min_length
    }

    /// No two consecutive control points coincide.
    pub fn is_non_degenerate(&self, eps: f64) -> bool {
        self.points.windows(2).all(|w| nalgebra::distance(&w[0], &w[1]) > eps)
    }

    /// Control points projected on `plane` and the largest displacement.
    pub fn project_on_plane(&self, plane: &Plane) -> (PolyBezier, f64) {
        let mut score = 0.0_f64;
        let points = self
            .points
            .iter()
            .map(|p| {
                let q = plane.project(p);
                score = score.max(nalgebra::distance(p, &q));
                q
            })
            .collect();
        (PolyBezier { points, ..*self }, score)
    }

    pub fn mirrored(&self, plane: &Plane) -> PolyBezier {
        PolyBezier {
            points: self.points.iter().map(|p| plane.mirror_point(p)).collect(),
            ..*self
        }
    }
}
