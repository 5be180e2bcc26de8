//! Re-localizing intersection constraints against the fitted curve.
//!
//! Intersections are detected against the raw stroke; the fitted curve may
//! pass a little off. Each crossing is moved along the intersected curve to
//! where the fitted curve actually comes closest, and a stroke running
//! along an old curve at one of its ends is cut back to the crossing.

use stroke_kernel::{Curve, Point3d};
use stroke_solver::Constraint;
use tracing::{debug, info};

use crate::network::CurveNetwork;

/// The correction window must span at least this share of the search
/// distance to be worth sampling.
const MIN_WINDOW_RATIO: f64 = 0.1;

/// Parameters this close to 0 or 1 are endpoints of the intersected curve.
const ENDPOINT_PARAMETER: f64 = 1e-6;

/// Move every intersection constraint to the point of its intersected curve,
/// within `search_distance` of the detected crossing, that lies closest to
/// `curve`. The result is re-snapped to nearby nodes of the network.
pub fn correct_intersections<N: CurveNetwork + ?Sized>(
    constraints: &[Constraint],
    curve: &Curve,
    network: &N,
    search_distance: f64,
    steps: usize,
    snap_distance: f64,
) -> Vec<Constraint> {
    constraints
        .iter()
        .map(|constraint| {
            let Constraint::Intersection(intersection) = constraint else {
                return *constraint;
            };
            let stroke = intersection.stroke;
            let mut best = intersection.old_curve;

            let interior = best.t > ENDPOINT_PARAMETER && best.t < 1.0 - ENDPOINT_PARAMETER;
            let half = best.tangent * (0.5 * search_distance);
            let window = network
                .project(stroke, &(best.position + half))
                .zip(network.project(stroke, &(best.position - half)));

            if let (true, Some((start, end))) = (interior, window) {
                if nalgebra::distance(&start.position, &end.position) > MIN_WINDOW_RATIO * search_distance {
                    let steps = steps.max(1);
                    let step = (end.t.clamp(0.0, 1.0) - start.t.clamp(0.0, 1.0)) / steps as f64;
                    let mut min_distance = distance_to_curve(curve, &best.position);
                    for i in 0..=steps {
                        let Some(on_old) = network.point_at(stroke, start.t + step * i as f64) else {
                            continue;
                        };
                        let d = distance_to_curve(curve, &on_old.position);
                        if d < min_distance {
                            min_distance = d;
                            best = on_old;
                        }
                    }
                }
            }

            network
                .intersection_near(stroke, &best.position, snap_distance)
                .unwrap_or(*constraint)
        })
        .collect()
}

fn distance_to_curve(curve: &Curve, p: &Point3d) -> f64 {
    nalgebra::distance(&curve.project(p).position, p)
}

/// Thresholds for overlap trimming.
#[derive(Debug, Clone, Copy)]
pub struct OverlapThresholds {
    /// Maximum distance between a crossing and the stroke end.
    pub proximity: f64,
    /// Maximum angle between the two curves (radians).
    pub angle: f64,
    pub snap_to_node: f64,
    /// Cuts this close to an anchor drop whole segments.
    pub snap_to_anchor: f64,
}

/// Which ends of the curve were cut back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trimmed {
    pub start: bool,
    pub end: bool,
}

/// Cut the dangling ends of a stroke that starts or ends by running along
/// an old curve. The first (last) constraint must be an intersection close
/// to the start (end) of `curve` where both curves are nearly parallel.
pub fn trim_overlaps<N: CurveNetwork + ?Sized>(
    curve: &mut Curve,
    constraints: &mut [Constraint],
    network: &N,
    thresholds: &OverlapThresholds,
) -> Trimmed {
    let mut trimmed = Trimmed::default();
    if constraints.is_empty() {
        return trimmed;
    }
    let last = constraints.len() - 1;
    trimmed.start = trim_end(curve, &mut constraints[0], network, thresholds, true);
    trimmed.end = trim_end(curve, &mut constraints[last], network, thresholds, false);
    trimmed
}

fn trim_end<N: CurveNetwork + ?Sized>(
    curve: &mut Curve,
    constraint: &mut Constraint,
    network: &N,
    thresholds: &OverlapThresholds,
    at_start: bool,
) -> bool {
    let Constraint::Intersection(intersection) = *constraint else {
        return false;
    };
    let end = curve.point_on_curve(if at_start { 0.0 } else { 1.0 });
    let close = nalgebra::distance(&intersection.old_curve.position, &end.position) < thresholds.proximity;
    let parallel = intersection.old_curve.tangent.dot(&end.tangent).abs() > thresholds.angle.cos();
    if !(close && parallel) {
        return false;
    }

    if let Some(snapped) =
        network.intersection_near(intersection.stroke, &intersection.old_curve.position, thresholds.snap_to_node)
    {
        *constraint = snapped;
    }
    let t = curve.project(&constraint.position()).t;
    match curve.cut_at(t, at_start, thresholds.snap_to_anchor) {
        Ok(_) => {
            info!(at_start, t, "cut overlapping stroke end");
            true
        }
        Err(err) => {
            debug!(%err, at_start, "overlap cut skipped");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::StrokeNetwork;
    use stroke_kernel::{LineCurve, PolyBezier};
    use stroke_solver::StrokeId;

    fn thresholds() -> OverlapThresholds {
        OverlapThresholds {
            proximity: 0.04,
            angle: std::f64::consts::FRAC_PI_6,
            snap_to_node: 0.02,
            snap_to_anchor: 0.002,
        }
    }

    fn network_with_x_axis() -> (StrokeNetwork, StrokeId) {
        let mut network = StrokeNetwork::new();
        let id = network.insert(Curve::Line(LineCurve::new(Point3d::new(-1.0, 0.0, 0.0), Point3d::new(1.0, 0.0, 0.0))));
        (network, id)
    }

    #[test]
    fn test_correction_moves_towards_new_curve() {
        let (network, id) = network_with_x_axis();
        // The new stroke crosses the axis at x = 0.006, detection said 0.
        let curve = Curve::Line(LineCurve::new(Point3d::new(0.006, -0.3, 0.0), Point3d::new(0.006, 0.3, 0.0)));
        let detected = network.intersection_near(id, &Point3d::origin(), 0.0).unwrap();

        let corrected = correct_intersections(&[detected], &curve, &network, 0.02, 5, 0.0);
        let x = corrected[0].position().x;
        assert!((x - 0.006).abs() < 0.0021, "corrected to {}", x);
        assert!(x > 0.0);
    }

    #[test]
    fn test_search_window_bounds_the_correction() {
        let (network, id) = network_with_x_axis();
        let curve = Curve::Line(LineCurve::new(Point3d::new(0.018, -0.3, 0.0), Point3d::new(0.018, 0.3, 0.0)));
        let detected = network.intersection_near(id, &Point3d::origin(), 0.0).unwrap();

        // A 2cm window stops at x = 0.01, a 4cm one reaches x = 0.02.
        let narrow = correct_intersections(&[detected], &curve, &network, 0.02, 5, 0.0);
        let wide = correct_intersections(&[detected], &curve, &network, 0.04, 5, 0.0);
        assert!((narrow[0].position().x - 0.01).abs() < 1e-9, "narrow picked {}", narrow[0].position().x);
        assert!((wide[0].position().x - 0.02).abs() < 1e-9, "wide picked {}", wide[0].position().x);
    }

    #[test]
    fn test_correction_passes_other_constraints() {
        let (network, _) = network_with_x_axis();
        let curve = Curve::Line(LineCurve::new(Point3d::origin(), Point3d::new(0.0, 1.0, 0.0)));
        let p = Constraint::PositionOnly(Point3d::new(0.0, 0.5, 0.0));
        assert_eq!(correct_intersections(&[p], &curve, &network, 0.02, 5, 0.02), vec![p]);
    }

    #[test]
    fn test_trim_start_running_along_old_curve() {
        let (network, id) = network_with_x_axis();
        // Starts on the axis, runs along it, then turns away.
        let mut curve = Curve::Bezier(
            PolyBezier::from_control_points(vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(0.05, 0.0, 0.0),
                Point3d::new(0.1, 0.0, 0.0),
                Point3d::new(0.15, 0.0, 0.0),
                Point3d::new(0.2, 0.0, 0.0),
                Point3d::new(0.25, 0.1, 0.0),
                Point3d::new(0.25, 0.2, 0.0),
            ])
            .unwrap(),
        );
        let crossing = network.intersection_near(id, &Point3d::new(0.02, 0.0, 0.0), 0.0).unwrap();
        let mut constraints = vec![crossing];

        let trimmed = trim_overlaps(&mut curve, &mut constraints, &network, &thresholds());
        assert!(trimmed.start);
        assert!((curve.start() - Point3d::new(0.02, 0.0, 0.0)).norm() < 1e-6);
        assert!((curve.end() - Point3d::new(0.25, 0.2, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_no_trim_when_crossing_at_an_angle() {
        let (network, id) = network_with_x_axis();
        let mut curve = Curve::Line(LineCurve::new(Point3d::new(0.0, -0.01, 0.0), Point3d::new(0.0, 0.5, 0.0)));
        let crossing = network.intersection_near(id, &Point3d::origin(), 0.0).unwrap();
        let mut constraints = vec![crossing];
        let trimmed = trim_overlaps(&mut curve, &mut constraints, &network, &thresholds());
        assert_eq!(trimmed, Trimmed::default());
        assert!((curve.start() - Point3d::new(0.0, -0.01, 0.0)).norm() < 1e-12);
    }
}
