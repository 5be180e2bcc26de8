//! Beautification of one finished stroke.
//!
//! The raw samples are fitted with a line or a poly-Bezier, the detected
//! intersections are re-localized against the fit, and the curve is then
//! deformed to honor the best subset of its constraints. Surface and mirror
//! projections run last.

use serde::{Deserialize, Serialize};
use stroke_kernel::{
    Curve, CubicBezier, LineCurve, ORTHO_DIRECTIONS, Plane, Point3d, PolyBezier, StrokeSamples, Vec3,
    default_tolerance, fit_curve,
};
use stroke_solver::{Constraint, ConstraintCandidate, ConstraintReport, ConstraintSolver, ProjectedConstraint};
use tracing::{debug, error, info, instrument, warn};

use crate::correction::{OverlapThresholds, correct_intersections, trim_overlaps};
use crate::error::BeautifyError;
use crate::input::InputStroke;
use crate::line::constrain_line;
use crate::network::{CurveNetwork, SurfacePatches};
use crate::params::BeautifierParams;
use crate::projection::{SurfaceThresholds, project_on_mirror, project_on_surfaces};

/// Per-call switches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeautifyOptions {
    /// When false the stroke is only fitted.
    pub fit_to_constraints: bool,
    /// Mirror plane the curve may be flattened onto.
    pub mirror: Option<Plane>,
}

impl Default for BeautifyOptions {
    fn default() -> Self {
        Self {
            fit_to_constraints: true,
            mirror: None,
        }
    }
}

/// The beautified curve and what it honors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeautifyOutcome {
    pub curve: Curve,
    pub intersections: Vec<ProjectedConstraint>,
    pub mirror_crossings: Vec<ProjectedConstraint>,
    pub applied: Vec<ConstraintReport>,
    pub rejected: Vec<ConstraintReport>,
    pub planar: bool,
    pub plane_normal: Option<Vec3>,
    pub on_surface: bool,
    pub on_mirror: bool,
    pub closed: bool,
}

impl BeautifyOutcome {
    fn fitted(curve: Curve) -> Self {
        Self {
            curve,
            intersections: Vec::new(),
            mirror_crossings: Vec::new(),
            applied: Vec::new(),
            rejected: Vec::new(),
            planar: false,
            plane_normal: None,
            on_surface: false,
            on_mirror: false,
            closed: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Beautifier {
    params: BeautifierParams,
}

impl Beautifier {
    pub fn new(params: BeautifierParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BeautifierParams {
        &self.params
    }

    /// Beautify `stroke` against the curves of `network` and the patches of
    /// `patches`.
    ///
    /// Only an invalid stroke is an error. Any later failure leaves the
    /// curve at its last good state and is visible in the outcome flags.
    #[instrument(skip(self, stroke, network, patches), fields(samples = stroke.samples().len()))]
    pub fn beautify<N, P>(
        &self,
        stroke: &InputStroke,
        network: &N,
        patches: &P,
        options: &BeautifyOptions,
    ) -> Result<BeautifyOutcome, BeautifyError>
    where
        N: CurveNetwork + ?Sized,
        P: SurfacePatches + ?Sized,
    {
        let params = &self.params;
        stroke.validate(params.min_stroke_action_time, params.min_stroke_size())?;

        let mut curve = self.fit_stroke(stroke.samples());
        if !options.fit_to_constraints {
            return Ok(BeautifyOutcome::fitted(curve));
        }

        let mut constraints = correct_intersections(
            stroke.constraints(),
            &curve,
            network,
            params.small_distance(),
            params.intersection_search_steps,
            params.snap_to_existing_node_threshold(),
        );

        let closed = self.is_closed_loop(&curve);
        if closed {
            info!("stroke closes on itself");
        } else {
            let trimmed = trim_overlaps(
                &mut curve,
                &mut constraints,
                network,
                &OverlapThresholds {
                    proximity: params.proximity_threshold(),
                    angle: params.small_angle,
                    snap_to_node: params.snap_to_existing_node_threshold(),
                    snap_to_anchor: params.on_target_tolerance(),
                },
            );
            debug!(start = trimmed.start, end = trimmed.end, "overlap trimming");
        }

        let mut outcome = match curve {
            Curve::Line(mut line) => {
                // Lines snap to the constraints as detected on the raw stroke.
                let result = constrain_line(
                    &mut line,
                    stroke.constraints(),
                    &ORTHO_DIRECTIONS,
                    params.small_angle,
                    params.proximity_threshold(),
                );
                BeautifyOutcome {
                    intersections: result.intersections,
                    mirror_crossings: result.mirror_crossings,
                    applied: result.applied,
                    rejected: result.rejected,
                    ..BeautifyOutcome::fitted(Curve::Line(line))
                }
            }
            Curve::Bezier(poly) => self.solve(poly, &constraints, closed, stroke, patches),
        };

        if let Some(plane) = options.mirror.filter(|_| !outcome.on_surface) {
            if let Some(projected) = project_on_mirror(
                &outcome.curve,
                &plane,
                &outcome.intersections,
                params.on_target_tolerance(),
                params.small_angle,
                params.project_to_mirror_distance_threshold(),
            ) {
                outcome.curve = projected;
                outcome.on_mirror = true;
                relocate(&mut outcome.intersections, &outcome.curve);
                relocate(&mut outcome.mirror_crossings, &outcome.curve);
            }
        }

        info!(
            line = outcome.curve.as_line().is_some(),
            applied = outcome.applied.len(),
            rejected = outcome.rejected.len(),
            planar = outcome.planar,
            closed = outcome.closed,
            on_surface = outcome.on_surface,
            on_mirror = outcome.on_mirror,
            "beautified stroke"
        );
        Ok(outcome)
    }

    /// Fit the raw samples with a line when the stroke is short, or straight
    /// and drawn fast; with a poly-Bezier otherwise.
    #[instrument(skip_all, fields(samples = samples.len()))]
    pub fn fit_stroke(&self, samples: &StrokeSamples) -> Curve {
        let params = &self.params;
        let positions = samples.positions();
        let pressures = samples.pressures();
        let (Some(&first), Some(&last)) = (positions.first(), positions.last()) else {
            return Curve::Line(LineCurve::new(Point3d::origin(), Point3d::origin()));
        };
        let start_weight = pressures.first().copied().unwrap_or(1.0);
        let end_weight = pressures.last().copied().unwrap_or(1.0);
        let line = Curve::Line(LineCurve::new(first, last).with_weights(start_weight, end_weight));

        let path = samples.length();
        let chord = nalgebra::distance(&first, &last);
        let straight = chord > 0.0 && (path - chord).abs() / chord < params.line_straightness_tolerance;
        if path < params.small_distance() || (straight && samples.average_speed() > params.line_drawing_speed()) {
            info!(path, chord, "fitted a line");
            return line;
        }

        let mut segments: Vec<CubicBezier> = Vec::new();
        for section in samples.g1_sections(&params.g1_config()) {
            match fit_curve(&section, params.bezier_fitting_error(), params.rdp_error()) {
                Ok(fitted) => segments.extend(fitted),
                Err(err) => warn!(%err, points = section.len(), "skipped a section"),
            }
        }
        match PolyBezier::from_segments(&segments) {
            Ok(poly) => {
                info!(segments = poly.segment_count(), "fitted a poly-Bezier");
                Curve::Bezier(poly.with_weights(start_weight, end_weight))
            }
            Err(err) => {
                error!(%err, "Bezier fit failed, falling back to a line");
                line
            }
        }
    }

    /// A poly-Bezier whose ends meet without folding back on each other.
    fn is_closed_loop(&self, curve: &Curve) -> bool {
        let Some(poly) = curve.as_bezier() else {
            return false;
        };
        poly.segment_count() > 1
            && nalgebra::distance(&poly.evaluate(0.0), &poly.evaluate(1.0)) < self.params.proximity_threshold()
            && poly.tangent(0.0).dot(&poly.tangent(1.0)) > -self.params.small_angle.cos()
    }

    fn solve<P: SurfacePatches + ?Sized>(
        &self,
        poly: PolyBezier,
        constraints: &[Constraint],
        closed: bool,
        stroke: &InputStroke,
        patches: &P,
    ) -> BeautifyOutcome {
        let params = &self.params;
        let skipped = |curve: PolyBezier| BeautifyOutcome {
            rejected: constraints
                .iter()
                .map(|c| {
                    ConstraintCandidate::locate(
                        *c,
                        &curve,
                        params.small_angle,
                        params.min_distance_between_anchors(),
                        &params.score_weights,
                    )
                    .report(false)
                })
                .collect(),
            ..BeautifyOutcome::fitted(Curve::Bezier(curve))
        };

        let segments = poly.segment_count_between(0.0, 1.0);
        if segments > params.max_beziers_for_solver {
            warn!(segments, max = params.max_beziers_for_solver, "curve too large for the solver");
            return skipped(poly);
        }
        if !poly.is_non_degenerate(default_tolerance().coincidence) {
            error!(segments, "degenerate control polygon, skipping the solver");
            return skipped(poly);
        }

        let solver = ConstraintSolver::new(poly, constraints, closed, true, params.solver_params());
        let solved = solver.get_best_fit();

        let mut curve = solved.curve;
        let mut intersections = solved.intersections;
        let mut mirror_crossings = solved.mirror_crossings;
        let mut on_surface = false;
        if params.project_on_surface && !stroke.surface_constraints().is_empty() {
            let (projected, landed) = project_on_surfaces(
                &curve,
                stroke.surface_constraints(),
                &intersections,
                &solved.constrained_anchors,
                solved.closed,
                patches,
                &SurfaceThresholds {
                    on_patch: params.on_target_tolerance(),
                    max_projection: params.project_to_surface_distance_threshold(),
                    min_size: params.min_stroke_size(),
                },
            );
            curve = projected;
            on_surface = landed;
            let reshaped = Curve::Bezier(curve.clone());
            relocate(&mut intersections, &reshaped);
            relocate(&mut mirror_crossings, &reshaped);
        }

        let curve = Curve::Bezier(curve);
        BeautifyOutcome {
            curve,
            intersections,
            mirror_crossings,
            applied: solved.applied,
            rejected: solved.rejected,
            planar: solved.planar,
            plane_normal: solved.plane_normal,
            on_surface,
            on_mirror: false,
            closed: solved.closed,
        }
    }
}

/// Move projected constraints along with a reshaped curve, keeping their
/// parameters.
fn relocate(constraints: &mut [ProjectedConstraint], curve: &Curve) {
    for c in constraints {
        c.on_new_curve = curve.point_on_curve(c.on_new_curve.t);
    }
}
