//! Least-squares cubic Bezier fitting with recursive splitting.
//!
//! Chord-length parameterization, closed-form handle lengths along fixed end
//! tangents, Newton-Raphson reparameterization when the fit is close, and a
//! split at the worst point otherwise.

use tracing::{debug, instrument};

use super::rdp::simplify;
use crate::CurveError;
use crate::geometry::bezier::CubicBezier;
use crate::geometry::{Point3d, Vec3, normalize_or_zero};

/// Reparameterization passes attempted before splitting.
const MAX_REPARAMETERIZATIONS: usize = 20;

/// Fits whose error is below this multiple of the tolerance are improved by
/// reparameterization instead of being split immediately.
const REPARAMETERIZE_ERROR_FACTOR: f64 = 10.0;

/// Fit a chain of cubic Beziers through `points`.
///
/// The polyline is first simplified with RDP (`rdp_error`); every returned
/// segment passes within `error` of the simplified points it covers.
#[instrument(skip(points), fields(count = points.len()))]
pub fn fit_curve(points: &[Point3d], error: f64, rdp_error: f64) -> Result<Vec<CubicBezier>, CurveError> {
    match points {
        [] | [_] => Err(CurveError::NotEnoughPoints { count: points.len() }),
        [a, b] => Ok(vec![CubicBezier::new(*a, *a, *b, *b)]),
        [a, m, b] => Ok(vec![CubicBezier::new(*a, *m, *m, *b)]),
        _ => {
            let (reduced, _) = simplify(points, rdp_error);
            let n = reduced.len();
            let chord = normalize_or_zero(&(reduced[n - 1] - reduced[0]));
            let start_tangent = unit_or(&(reduced[1] - reduced[0]), &chord);
            let end_tangent = unit_or(&(reduced[n - 2] - reduced[n - 1]), &-chord);

            let mut segments = Vec::new();
            fit_cubic(&reduced, start_tangent, end_tangent, error, &mut segments);
            debug!(segments = segments.len(), reduced = n, "fitted polyline");
            Ok(segments)
        }
    }
}

fn unit_or(v: &Vec3, fallback: &Vec3) -> Vec3 {
    v.try_normalize(1e-12).unwrap_or(*fallback)
}

/// `start_tangent` points into the curve from the first point and
/// `end_tangent` points into the curve from the last point.
fn fit_cubic(points: &[Point3d], start_tangent: Vec3, end_tangent: Vec3, error: f64, out: &mut Vec<CubicBezier>) {
    let first = points[0];
    let last = points[points.len() - 1];

    if points.len() == 2 {
        let d = nalgebra::distance(&first, &last) / 3.0;
        out.push(CubicBezier::new(first, first + start_tangent * d, last + end_tangent * d, last));
        return;
    }

    let mut u = chord_length_parameterize(points);
    let mut bezier = generate_bezier(points, &u, &start_tangent, &end_tangent);
    let (mut max_error, mut split) = compute_max_error(points, &bezier, &u);
    if max_error < error {
        out.push(bezier);
        return;
    }

    if max_error < error * REPARAMETERIZE_ERROR_FACTOR {
        for _ in 0..MAX_REPARAMETERIZATIONS {
            let u_prime = reparameterize(points, &u, &bezier);
            bezier = generate_bezier(points, &u_prime, &start_tangent, &end_tangent);
            (max_error, split) = compute_max_error(points, &bezier, &u_prime);
            if max_error < error {
                out.push(bezier);
                return;
            }
            u = u_prime;
        }
    }

    let split = split.clamp(1, points.len() - 2);
    let center = center_tangent(points, split);
    fit_cubic(&points[..=split], start_tangent, center, error, out);
    fit_cubic(&points[split..], -center, end_tangent, error, out);
}

/// Backward-pointing unit tangent at an interior split point.
fn center_tangent(points: &[Point3d], split: usize) -> Vec3 {
    let incoming = normalize_or_zero(&(points[split - 1] - points[split]));
    let outgoing = normalize_or_zero(&(points[split] - points[split + 1]));
    let average = (incoming + outgoing) * 0.5;
    average
        .try_normalize(1e-9)
        .or_else(|| (points[split - 1] - points[split + 1]).try_normalize(1e-12))
        .unwrap_or(incoming)
}

fn chord_length_parameterize(points: &[Point3d]) -> Vec<f64> {
    let mut u = Vec::with_capacity(points.len());
    u.push(0.0);
    for w in points.windows(2) {
        let prev = u[u.len() - 1];
        u.push(prev + nalgebra::distance(&w[0], &w[1]));
    }
    let total = u[u.len() - 1];
    let n = points.len();
    if total <= 0.0 {
        return (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    }
    u.iter().map(|d| d / total).collect()
}

fn generate_bezier(points: &[Point3d], u: &[f64], start_tangent: &Vec3, end_tangent: &Vec3) -> CubicBezier {
    let first = points[0];
    let last = points[points.len() - 1];

    let mut c = [[0.0_f64; 2]; 2];
    let mut x = [0.0_f64; 2];
    for (p, &t) in points.iter().zip(u) {
        let s = 1.0 - t;
        let (b0, b1, b2, b3) = (s * s * s, 3.0 * s * s * t, 3.0 * s * t * t, t * t * t);
        let a1 = start_tangent * b1;
        let a2 = end_tangent * b2;
        c[0][0] += a1.dot(&a1);
        c[0][1] += a1.dot(&a2);
        c[1][1] += a2.dot(&a2);
        let tmp = p.coords - (first.coords * (b0 + b1) + last.coords * (b2 + b3));
        x[0] += a1.dot(&tmp);
        x[1] += a2.dot(&tmp);
    }
    c[1][0] = c[0][1];

    let det_c0_c1 = c[0][0] * c[1][1] - c[1][0] * c[0][1];
    let det_c0_x = c[0][0] * x[1] - c[1][0] * x[0];
    let det_x_c1 = x[0] * c[1][1] - x[1] * c[0][1];
    let (alpha_l, alpha_r) = if det_c0_c1.abs() < 1e-12 {
        (0.0, 0.0)
    } else {
        (det_x_c1 / det_c0_c1, det_c0_x / det_c0_c1)
    };

    let segment_length = nalgebra::distance(&first, &last);
    let eps = 1e-6 * segment_length;
    let (alpha_l, alpha_r) = if alpha_l < eps || alpha_r < eps {
        (segment_length / 3.0, segment_length / 3.0)
    } else {
        (alpha_l, alpha_r)
    };

    CubicBezier::new(first, first + start_tangent * alpha_l, last + end_tangent * alpha_r, last)
}

/// One Newton-Raphson step per point towards its closest curve parameter.
fn reparameterize(points: &[Point3d], u: &[f64], bezier: &CubicBezier) -> Vec<f64> {
    points
        .iter()
        .zip(u)
        .map(|(p, &t)| {
            let diff = bezier.evaluate(t) - p;
            let d1 = bezier.derivative(t);
            let d2 = bezier.second_derivative(t);
            let numerator = diff.dot(&d1);
            let denominator = d1.dot(&d1) + diff.dot(&d2);
            if denominator.abs() < 1e-12 {
                t
            } else {
                (t - numerator / denominator).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Largest point-to-curve distance and the index where it occurs.
fn compute_max_error(points: &[Point3d], bezier: &CubicBezier, u: &[f64]) -> (f64, usize) {
    let mut max = 0.0;
    let mut split = points.len() / 2;
    for i in 1..points.len() - 1 {
        let d = nalgebra::distance(&bezier.evaluate(u[i]), &points[i]);
        if d >= max {
            max = d;
            split = i;
        }
    }
    (max, split)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::poly_bezier::PolyBezier;

    #[test]
    fn test_two_and_three_points() {
        let a = Point3d::new(0.0, 0.0, 0.0);
        let m = Point3d::new(1.0, 1.0, 0.0);
        let b = Point3d::new(2.0, 0.0, 0.0);
        assert_eq!(fit_curve(&[a, b], 0.01, 0.001).unwrap(), vec![CubicBezier::new(a, a, b, b)]);
        assert_eq!(fit_curve(&[a, m, b], 0.01, 0.001).unwrap(), vec![CubicBezier::new(a, m, m, b)]);
        assert_eq!(fit_curve(&[a], 0.01, 0.001), Err(CurveError::NotEnoughPoints { count: 1 }));
    }

    #[test]
    fn test_straight_polyline_single_segment() {
        let points: Vec<Point3d> = (0..20).map(|i| Point3d::new(i as f64 * 0.1, 0.0, 0.0)).collect();
        let fit = fit_curve(&points, 0.01, 0.001).unwrap();
        assert_eq!(fit.len(), 1);
        assert_eq!(fit[0].start(), points[0]);
        assert_eq!(fit[0].end(), points[19]);
        assert!(fit[0].is_non_degenerate(1e-5));
    }

    #[test]
    fn test_quarter_circle_within_tolerance() {
        let points: Vec<Point3d> = (0..=30)
            .map(|i| {
                let a = std::f64::consts::FRAC_PI_2 * i as f64 / 30.0;
                Point3d::new(a.cos(), a.sin(), 0.0)
            })
            .collect();
        let error = 0.01;
        let fit = fit_curve(&points, error, 0.0).unwrap();
        assert_eq!(fit.len(), 1, "a quarter circle fits a single cubic");
        let curve = PolyBezier::from_segments(&fit).unwrap();
        for p in &points {
            let d = nalgebra::distance(&curve.project(p).position, p);
            assert!(d <= error, "point {:?} is {} away", p, d);
        }
    }

    #[test]
    fn test_corner_splits_and_stays_connected() {
        let mut points: Vec<Point3d> = (0..=20).map(|i| Point3d::new(i as f64 * 0.05, 0.0, 0.0)).collect();
        points.extend((1..=20).map(|i| Point3d::new(1.0, i as f64 * 0.05, 0.0)));
        let fit = fit_curve(&points, 0.005, 0.0005).unwrap();
        assert!(fit.len() > 1);
        for w in fit.windows(2) {
            assert_eq!(w[0].end(), w[1].start());
        }
        assert_eq!(fit[0].start(), points[0]);
        assert_eq!(fit[fit.len() - 1].end(), points[points.len() - 1]);
    }
}
