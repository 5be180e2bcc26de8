//! Snapping a beautified curve onto surface patches and the mirror plane.
//!
//! Both projections are opportunistic. When the curve cannot be moved
//! without breaking a constraint it already honors, or the move would be
//! too large, the curve is left as it is.

use stroke_kernel::{Curve, Plane, Point3d, PolyBezier};
use stroke_solver::{ProjectedConstraint, SurfaceConstraint};
use tracing::debug;

use crate::network::SurfacePatches;

/// Distances governing surface projection.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceThresholds {
    /// A point within this distance of a patch is already on it.
    pub on_patch: f64,
    /// Largest distance a control point may move onto a patch.
    pub max_projection: f64,
    /// Minimum size of the projected curve.
    pub min_size: f64,
}

/// Project the parts of `input` drawn over surface patches onto them.
///
/// Returns the projected curve and whether any part of it landed on a
/// patch. An invalid projection gives back `input` unchanged.
pub fn project_on_surfaces<P: SurfacePatches + ?Sized>(
    input: &PolyBezier,
    surfaces: &[SurfaceConstraint],
    intersections: &[ProjectedConstraint],
    constrained_anchors: &[usize],
    closed: bool,
    patches: &P,
    thresholds: &SurfaceThresholds,
) -> (PolyBezier, bool) {
    let mut curve = input.clone();
    let last = curve.segment_count();
    let mut on_surface = false;
    let mut previous_end = 0;

    for surface in surfaces {
        let start = curve
            .nearest_anchor_index(curve.project(&surface.start_position).t)
            .max(previous_end);
        let end = match surface.exit_position {
            Some(exit) => curve.nearest_anchor_index(curve.project(&exit).t).max(start),
            None => last,
        };
        previous_end = end;
        let free = |anchor: usize| !constrained_anchors.contains(&anchor);

        // Only whole spans are reshaped; partial ones just land an end.
        if start == end || start != 0 || end != last {
            let single_end = if start == end {
                Some(start).filter(|&a| (a == 0 || a == last) && free(a))
            } else if start != 0 {
                Some(last).filter(|&a| end == last && free(a))
            } else {
                Some(0).filter(|&a| free(a))
            };
            if let Some(anchor) = single_end {
                let index = 3 * anchor;
                if let Some(q) = try_project(patches, surface, &curve.control_points()[index], thresholds) {
                    curve.control_points_mut()[index] = q;
                }
            }
            continue;
        }

        let anchored_off_patch = constrained_anchors.iter().any(|&a| {
            let p = curve.anchor(a);
            patches
                .project_on_patch(surface.patch, &p)
                .is_none_or(|q| nalgebra::distance(&p, &q) > thresholds.on_patch)
        });
        if anchored_off_patch {
            debug!("constrained anchor off the patch, skipping surface projection");
            continue;
        }
        let bounding = intersections
            .iter()
            .filter_map(|c| c.constraint.as_intersection())
            .filter(|i| patches.bounds_patch(surface.patch, i.stroke, i.old_curve.t))
            .count();
        if bounding > 1 {
            debug!(bounding, "stroke crosses several patch boundaries, skipping surface projection");
            continue;
        }

        let projected: Option<Vec<Point3d>> = curve.control_points()[3 * start..=3 * end]
            .iter()
            .map(|p| try_project(patches, surface, p, thresholds))
            .collect();
        if let Some(projected) = projected {
            curve.control_points_mut()[3 * start..=3 * end].copy_from_slice(&projected);
            on_surface = true;
        }
    }

    if closed {
        let first = curve.control_points()[0];
        if let Some(p) = curve.control_points_mut().last_mut() {
            *p = first;
        }
    }
    if !curve.is_valid(thresholds.min_size) {
        debug!("surface projection degenerated the curve, reverting");
        return (input.clone(), false);
    }
    (curve, on_surface)
}

fn try_project<P: SurfacePatches + ?Sized>(
    patches: &P,
    surface: &SurfaceConstraint,
    p: &Point3d,
    thresholds: &SurfaceThresholds,
) -> Option<Point3d> {
    patches
        .project_on_patch(surface.patch, p)
        .filter(|q| nalgebra::distance(p, q) < thresholds.max_projection)
}

/// Flatten `curve` onto the mirror `plane`.
///
/// Every accepted intersection must already lie within `on_plane` of the
/// plane, and neither end may leave the plane at an angle steeper than
/// `small_angle` from its normal. Returns the projected curve when it moved
/// less than `max_error`.
pub fn project_on_mirror(
    curve: &Curve,
    plane: &Plane,
    intersections: &[ProjectedConstraint],
    on_plane: f64,
    small_angle: f64,
    max_error: f64,
) -> Option<Curve> {
    if intersections
        .iter()
        .any(|c| plane.distance(&c.on_new_curve.position) > on_plane)
    {
        return None;
    }
    let limit = small_angle.cos();
    if plane.normal.dot(&curve.tangent(0.0)).abs() > limit || plane.normal.dot(&curve.tangent(1.0)).abs() > limit {
        return None;
    }

    let (projected, error) = curve.project_on_plane(plane);
    debug!(error, max_error, "mirror projection");
    (error < max_error).then_some(projected)
}
