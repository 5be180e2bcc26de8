use approx::assert_abs_diff_eq;
use slotmap::SlotMap;

use stroke_beautifier::*;
use stroke_kernel::{Curve, LineCurve, Plane, Point3d, Sample, StrokeRejection, Vec3};
use stroke_solver::{Constraint, PatchId, StrokeId};

// ── Helpers ─────────────────────────────────────────────────────────────────

/// A stroke through `points`, one sample every `dt` seconds.
fn drawn(points: &[Point3d], dt: f64) -> InputStroke {
    InputStroke::from_samples(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| Sample::new(*p, 0.5 + 0.5 * i as f64 / points.len() as f64, i as f64 * dt)),
    )
}

fn segment(from: Point3d, to: Point3d, count: usize) -> Vec<Point3d> {
    (0..count)
        .map(|i| from + (to - from) * (i as f64 / (count - 1) as f64))
        .collect()
}

/// Arc of radius `r` around the z axis at height `z`, from angle 0 to `sweep`.
fn arc(r: f64, z: f64, sweep: f64, count: usize) -> Vec<Point3d> {
    (0..count)
        .map(|i| {
            let a = sweep * i as f64 / (count - 1) as f64;
            Point3d::new(r * a.cos(), r * a.sin(), z)
        })
        .collect()
}

fn x_axis_network() -> (StrokeNetwork, StrokeId) {
    let mut network = StrokeNetwork::new();
    let id = network.insert(Curve::Line(LineCurve::new(
        Point3d::new(-1.0, 0.0, 0.0),
        Point3d::new(1.0, 0.0, 0.0),
    )));
    (network, id)
}

/// The z = 0 floor as a single patch.
struct Floor;

impl SurfacePatches for Floor {
    fn project_on_patch(&self, _patch: PatchId, p: &Point3d) -> Option<Point3d> {
        Some(Point3d::new(p.x, p.y, 0.0))
    }

    fn bounds_patch(&self, _patch: PatchId, _stroke: StrokeId, _t: f64) -> bool {
        false
    }
}

fn beautify(stroke: &InputStroke, network: &StrokeNetwork, options: &BeautifyOptions) -> BeautifyOutcome {
    Beautifier::default().beautify(stroke, network, &NoSurfaces, options).unwrap()
}

// ── Input validation ───────────────────────────────────────────────────────

#[test]
fn single_sample_is_rejected() {
    let stroke = drawn(&[Point3d::origin()], 0.01);
    let err = Beautifier::default()
        .beautify(&stroke, &StrokeNetwork::new(), &NoSurfaces, &BeautifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, BeautifyError::InvalidStroke(StrokeRejection::TooFewSamples { count: 1 })));
}

#[test]
fn accidental_click_is_rejected() {
    let stroke = drawn(&segment(Point3d::origin(), Point3d::new(0.001, 0.0, 0.0), 5), 0.01);
    let err = Beautifier::default()
        .beautify(&stroke, &StrokeNetwork::new(), &NoSurfaces, &BeautifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, BeautifyError::InvalidStroke(StrokeRejection::TooBrief { .. })));
}

// ── Lines ──────────────────────────────────────────────────────────────────

#[test]
fn short_fast_straight_stroke_becomes_axis_line() {
    let stroke = drawn(&segment(Point3d::new(0.1, 0.2, 0.3), Point3d::new(0.4, 0.205, 0.3), 20), 0.01);
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &BeautifyOptions::default());

    let line = outcome.curve.as_line().expect("fast straight stroke should be a line");
    assert_eq!(line.a, Point3d::new(0.1, 0.2, 0.3));
    assert_abs_diff_eq!(line.b.y, 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(line.start_weight, 0.5, epsilon = 1e-12);
    assert!(outcome.applied.is_empty());
}

#[test]
fn slow_straight_stroke_stays_a_bezier() {
    let stroke = drawn(&segment(Point3d::origin(), Point3d::new(0.3, 0.0, 0.0), 20), 0.1);
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &BeautifyOptions::default());
    assert!(outcome.curve.as_bezier().is_some());
}

#[test]
fn intersection_at_existing_node_is_reported() {
    let (mut network, id) = x_axis_network();
    network.add_node(id, 0.5, 2).unwrap();

    let mut stroke = drawn(&segment(Point3d::new(0.005, -0.2, 0.0), Point3d::new(0.005, 0.2, 0.0), 20), 0.01);
    let params = BeautifierParams::default();
    let crossing = network
        .intersection_near(id, &Point3d::new(0.005, 0.0, 0.0), params.snap_to_existing_node_threshold())
        .unwrap();
    stroke.add_constraint(crossing, params.merge_constraints_threshold());

    let outcome = beautify(&stroke, &network, &BeautifyOptions::default());
    let line = outcome.curve.as_line().unwrap();
    assert_abs_diff_eq!(line.a.x, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(line.b.x, 0.0, epsilon = 1e-12);
    assert_eq!(outcome.applied.len(), 1);
    assert!(outcome.applied[0].is_intersection);
    assert!(outcome.applied[0].is_at_existing_node);
    assert_eq!(outcome.intersections.len(), 1);
}

// ── Poly-Beziers ───────────────────────────────────────────────────────────

#[test]
fn fit_only_ignores_constraints() {
    let mut stroke = drawn(&arc(0.2, 0.0, std::f64::consts::PI, 50), 0.02);
    stroke.add_constraint(Constraint::PositionOnly(Point3d::new(0.0, 0.21, 0.0)), 0.01);
    let options = BeautifyOptions {
        fit_to_constraints: false,
        mirror: None,
    };
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &options);
    assert!(outcome.curve.as_bezier().is_some());
    assert!(outcome.applied.is_empty() && outcome.rejected.is_empty());
}

#[test]
fn oversized_curve_skips_the_solver() {
    let mut stroke = drawn(&arc(0.2, 0.0, std::f64::consts::PI, 50), 0.02);
    stroke.add_constraint(Constraint::PositionOnly(Point3d::new(0.0, 0.21, 0.0)), 0.01);
    let beautifier = Beautifier::new(BeautifierParams {
        max_beziers_for_solver: 0,
        ..BeautifierParams::default()
    });

    let outcome = beautifier
        .beautify(&stroke, &StrokeNetwork::new(), &NoSurfaces, &BeautifyOptions::default())
        .unwrap();
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.curve, beautifier.fit_stroke(stroke.samples()));
}

#[test]
fn position_constraint_on_arc_is_honored() {
    let mut stroke = drawn(&arc(0.2, 0.0, std::f64::consts::PI, 50), 0.02);
    let target = Point3d::new(0.0, 0.205, 0.0);
    stroke.add_constraint(Constraint::PositionOnly(target), 0.01);

    let outcome = beautify(&stroke, &StrokeNetwork::new(), &BeautifyOptions::default());
    assert_eq!(outcome.applied.len(), 1);
    let poly = outcome.curve.as_bezier().unwrap();
    assert!((0..=poly.segment_count()).any(|i| (poly.anchor(i) - target).norm() < 1e-9));
}

#[test]
fn drawn_circle_closes() {
    let stroke = drawn(&arc(0.2, 0.1, 2.0 * std::f64::consts::PI, 80), 0.02);
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &BeautifyOptions::default());

    assert!(outcome.closed);
    let poly = outcome.curve.as_bezier().unwrap();
    assert!(poly.segment_count() > 1);
    let points = poly.control_points();
    assert_abs_diff_eq!((points[0] - points[points.len() - 1]).norm(), 0.0, epsilon = 1e-9);

    assert!(outcome.planar);
    assert_abs_diff_eq!(outcome.plane_normal.unwrap().z.abs(), 1.0, epsilon = 1e-9);
}

// ── Projections ────────────────────────────────────────────────────────────

#[test]
fn line_near_mirror_lands_on_it() {
    let stroke = drawn(&segment(Point3d::new(0.005, 0.0, 0.0), Point3d::new(0.005, 0.3, 0.0), 20), 0.01);
    let options = BeautifyOptions {
        fit_to_constraints: true,
        mirror: Some(Plane::new(Point3d::origin(), Vec3::x())),
    };
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &options);
    assert!(outcome.on_mirror);
    assert_eq!(outcome.curve.start().x, 0.0);
    assert_eq!(outcome.curve.end().x, 0.0);
}

#[test]
fn far_mirror_is_left_alone() {
    let stroke = drawn(&segment(Point3d::new(0.2, 0.0, 0.0), Point3d::new(0.2, 0.3, 0.0), 20), 0.01);
    let options = BeautifyOptions {
        fit_to_constraints: true,
        mirror: Some(Plane::new(Point3d::origin(), Vec3::x())),
    };
    let outcome = beautify(&stroke, &StrokeNetwork::new(), &options);
    assert!(!outcome.on_mirror);
    assert_abs_diff_eq!(outcome.curve.start().x, 0.2, epsilon = 1e-12);
}

#[test]
fn stroke_drawn_over_patch_lands_on_it() {
    let mut patches: SlotMap<PatchId, ()> = SlotMap::with_key();
    let floor = patches.insert(());
    let points = arc(0.2, 0.005, std::f64::consts::PI, 50);
    let mut stroke = drawn(&points, 0.02);
    stroke.enter_surface(floor, points[0]);

    let outcome = Beautifier::default()
        .beautify(&stroke, &StrokeNetwork::new(), &Floor, &BeautifyOptions::default())
        .unwrap();
    assert!(outcome.on_surface);
    let poly = outcome.curve.as_bezier().unwrap();
    assert!(poly.control_points().iter().all(|p| p.z == 0.0));
}

#[test]
fn stroke_ending_on_patch_still_lands_on_mirror() {
    let mut patches: SlotMap<PatchId, ()> = SlotMap::with_key();
    let floor = patches.insert(());
    // A hump standing just off the x = 0 plane that comes down onto the floor.
    let points: Vec<Point3d> = (0..50)
        .map(|i| {
            let s = i as f64 / 49.0;
            Point3d::new(0.005, 0.3 * s, 0.1 * (std::f64::consts::PI * s).sin())
        })
        .collect();
    let mut stroke = drawn(&points, 0.1);
    stroke.enter_surface(floor, points[3 * points.len() / 4]);
    let options = BeautifyOptions {
        fit_to_constraints: true,
        mirror: Some(Plane::new(Point3d::origin(), Vec3::x())),
    };

    let outcome = Beautifier::default()
        .beautify(&stroke, &StrokeNetwork::new(), &Floor, &options)
        .unwrap();
    assert!(outcome.curve.as_bezier().is_some());
    assert!(!outcome.on_surface);
    assert!(outcome.on_mirror);
    assert_eq!(outcome.curve.start().x, 0.0);
}

#[test]
fn surface_projection_can_be_disabled() {
    let mut patches: SlotMap<PatchId, ()> = SlotMap::with_key();
    let floor = patches.insert(());
    let points = arc(0.2, 0.005, std::f64::consts::PI, 50);
    let mut stroke = drawn(&points, 0.02);
    stroke.enter_surface(floor, points[0]);

    let beautifier = Beautifier::new(BeautifierParams {
        project_on_surface: false,
        ..BeautifierParams::default()
    });
    let outcome = beautifier
        .beautify(&stroke, &StrokeNetwork::new(), &Floor, &BeautifyOptions::default())
        .unwrap();
    assert!(!outcome.on_surface);
}

// ── Configuration ──────────────────────────────────────────────────────────

#[test]
fn params_survive_json() {
    let params = BeautifierParams {
        scale: 3.0,
        max_beziers_for_solver: 4,
        ..BeautifierParams::default()
    };
    let loaded = BeautifierParams::from_json(&params.to_json().unwrap()).unwrap();
    assert_eq!(loaded.scale, 3.0);
    assert_eq!(loaded.max_beziers_for_solver, 4);
    assert_abs_diff_eq!(loaded.proximity_threshold(), params.proximity_threshold(), epsilon = 1e-12);
}
