//! Constraining straight strokes.
//!
//! A line has two degrees of freedom worth editing, so it honors at most
//! two constraints: its endpoints snap onto them, or it is translated to
//! pass through a single one. Unconstrained directions snap to the world
//! axes when that barely moves the line.

use stroke_kernel::geometry::snap_to_directions;
use stroke_kernel::{Curve, LineCurve, Point3d, Vec3};
use stroke_solver::{Constraint, ConstraintReport, ProjectedConstraint};
use tracing::debug;

/// Constraints closer than this share of the proximity threshold are one.
const COINCIDENT_RATIO: f64 = 0.1;

/// What a line ended up honoring.
#[derive(Debug, Clone, Default)]
pub struct LineConstraints {
    pub intersections: Vec<ProjectedConstraint>,
    pub mirror_crossings: Vec<ProjectedConstraint>,
    pub applied: Vec<ConstraintReport>,
    pub rejected: Vec<ConstraintReport>,
}

/// Snap `line` to `constraints`, and to one of `directions` within `angle`
/// when the endpoints move less than `proximity`.
pub fn constrain_line(
    line: &mut LineCurve,
    constraints: &[Constraint],
    directions: &[Vec3],
    angle: f64,
    proximity: f64,
) -> LineConstraints {
    let constraints: Vec<Constraint> = constraints
        .iter()
        .filter(|c| !matches!(c, Constraint::Surface(_)))
        .copied()
        .collect();
    let mut result = LineConstraints::default();
    let mut honored: Vec<Constraint> = Vec::new();
    let mut dropped: Vec<Constraint> = Vec::new();

    match constraints.as_slice() {
        [] => {
            if let Some(direction) = snap_to_directions(&line.direction(), directions, angle) {
                let b = line.a + direction * line.length();
                if nalgebra::distance(&b, &line.b) < proximity {
                    line.b = b;
                }
            }
        }
        [only] => {
            constrain_to_one(line, &only.position(), directions, angle, proximity);
            honored.push(*only);
        }
        [first, rest @ ..] => {
            // The first constraint and the one farthest from it.
            let (far_index, far) = rest
                .iter()
                .enumerate()
                .map(|(i, c)| (i + 1, c))
                .max_by(|a, b| {
                    nalgebra::distance(&first.position(), &a.1.position())
                        .total_cmp(&nalgebra::distance(&first.position(), &b.1.position()))
                })
                .unwrap_or((1, &rest[0]));
            let (keep_first, keep_far) = constrain_to_two(line, first, far, directions, angle, proximity);
            debug!(count = constraints.len(), keep_first, keep_far, "constrained line ends");

            for (i, c) in constraints.iter().enumerate() {
                let kept = (i == 0 && keep_first) || (i == far_index && keep_far);
                if kept {
                    honored.push(*c);
                } else {
                    dropped.push(*c);
                }
            }
        }
    }

    let curve = Curve::Line(*line);
    let near_end = |c: &Constraint| {
        let p = c.position();
        let tolerance = COINCIDENT_RATIO * proximity;
        nalgebra::distance(&p, &line.a) < tolerance || nalgebra::distance(&p, &line.b) < tolerance
    };
    result.applied = honored
        .iter()
        .map(|c| ConstraintReport::accepted(c, near_end(c), false))
        .collect();
    result.rejected = dropped
        .iter()
        .map(|c| ConstraintReport::rejected(c, near_end(c)))
        .collect();

    let direction = line.direction();
    for c in &constraints {
        let p = c.position();
        let on_line = project_on_line(&line.a, &direction, &p);
        if nalgebra::distance(&on_line, &p) >= COINCIDENT_RATIO * proximity {
            continue;
        }
        match c {
            Constraint::Intersection(_) => result.intersections.push(ProjectedConstraint::project(*c, &curve)),
            Constraint::MirrorPlane(_) => result.mirror_crossings.push(ProjectedConstraint::project(*c, &curve)),
            _ => {}
        }
    }
    result
}

fn project_on_line(origin: &Point3d, direction: &Vec3, p: &Point3d) -> Point3d {
    origin + direction * (p - origin).dot(direction)
}

fn constrain_to_one(line: &mut LineCurve, p: &Point3d, directions: &[Vec3], angle: f64, proximity: f64) {
    let direction = line.direction();
    let length = line.length();

    if (p - line.a).dot(&direction) < 0.0 || nalgebra::distance(p, &line.a) < proximity {
        line.a = *p;
        if let Some(d) = snap_to_directions(&line.direction(), directions, angle) {
            let b = line.a + d * length;
            if nalgebra::distance(&b, &line.b) < proximity {
                line.b = b;
            }
        }
    } else if (p - line.b).dot(&direction) > 0.0 || nalgebra::distance(p, &line.b) < proximity {
        line.b = *p;
        if let Some(d) = snap_to_directions(&line.direction(), directions, angle) {
            let a = line.b - d * length;
            if nalgebra::distance(&a, &line.a) < proximity {
                line.a = a;
            }
        }
    } else {
        let offset = p - line.a;
        let translation = offset - direction * offset.dot(&direction);
        line.a += translation;
        line.b += translation;
        if let Some(d) = snap_to_directions(&line.direction(), directions, angle) {
            let a = p - d * nalgebra::distance(p, &line.a);
            let b = p + d * nalgebra::distance(p, &line.b);
            if nalgebra::distance(&a, &line.a) < proximity && nalgebra::distance(&b, &line.b) < proximity {
                line.a = a;
                line.b = b;
            }
        }
    }
}

/// Move the start onto `first` and the end onto `second`. Returns which of
/// the two were honored: only one when they nearly coincide, preferring an
/// intersection.
fn constrain_to_two(
    line: &mut LineCurve,
    first: &Constraint,
    second: &Constraint,
    directions: &[Vec3],
    angle: f64,
    proximity: f64,
) -> (bool, bool) {
    let (p1, p2) = (first.position(), second.position());
    if nalgebra::distance(&p1, &p2) < COINCIDENT_RATIO * proximity {
        if !first.is_intersection() && second.is_intersection() {
            constrain_to_one(line, &p2, directions, angle, proximity);
            return (false, true);
        }
        constrain_to_one(line, &p1, directions, angle, proximity);
        return (true, false);
    }

    let direction = line.direction();
    if (p1 - line.a).dot(&direction) < 0.0 || nalgebra::distance(&p1, &line.a) < proximity {
        line.a = p1;
    } else {
        let towards_end = (line.b - p1).normalize();
        line.a = project_on_line(&p1, &towards_end, &line.a);
    }

    if (p2 - line.b).dot(&direction) > 0.0 || nalgebra::distance(&p2, &line.b) < proximity {
        line.b = p2;
    } else {
        let towards_end = (p2 - line.a).normalize();
        line.b = project_on_line(&line.a, &towards_end, &line.b);
    }
    (true, true)
}
