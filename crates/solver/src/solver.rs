//! Constraint subset search and constrained curve fitting.
//!
//! Every candidate subset is scored by deforming the base curve until it
//! honors the subset, then trading the deformation's fidelity energy
//! against the importance of the constraints left out. The search is a
//! greedy backward elimination: drop the single constraint whose removal
//! lowers the energy most, and stop once no removal helps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stroke_kernel::{ORTHO_DIRECTIONS, Plane, PointOnCurve, PolyBezier, Point3d, Vec3};
use tracing::{debug, error, info, instrument};

use crate::candidate::{ActiveSet, ConstraintCandidate, ScoreWeights};
use crate::constraint::{Constraint, ConstraintReport, ProjectedConstraint};
use crate::energy::{FidelityEnergy, FidelityWeights};
use crate::split::split_for_constraints;
use crate::system::solve_displacements;
use crate::terms::{HardConstraint, SoftConstraint};

/// Start and end tangents agreeing above this get a continuity term when
/// the curve closes.
const CLOSURE_TANGENT_AGREEMENT: f64 = 0.5;

/// Tuning of the constrained fit and the subset search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Trade-off between fidelity (1) and honoring constraints (0).
    pub mu_fidelity: f64,
    /// Displacement normalizer and planarity distance bound.
    pub proximity_threshold: f64,
    /// Tangent alignment and axis snapping angle (rad).
    pub angular_threshold: f64,
    pub min_distance_between_anchors: f64,
    pub fidelity: FidelityWeights,
    pub score_weights: ScoreWeights,
    /// Squared edge length below which polygon edges carry no term.
    pub eps: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            mu_fidelity: 0.6,
            proximity_threshold: 0.04,
            angular_threshold: std::f64::consts::PI / 6.0,
            min_distance_between_anchors: 0.02,
            fidelity: FidelityWeights::default(),
            score_weights: ScoreWeights::default(),
            eps: 1e-5,
        }
    }
}

/// A constrained fit for one candidate subset.
#[derive(Debug, Clone)]
pub struct CurveFitCandidate {
    pub control_points: Vec<Point3d>,
    pub energy: f64,
    /// Anchor index to the candidate bound there.
    pub bound: BTreeMap<usize, usize>,
    pub planar: bool,
    pub plane_normal: Option<Vec3>,
    pub closed: bool,
}

/// Final curve of the search and what it honors.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub curve: PolyBezier,
    pub intersections: Vec<ProjectedConstraint>,
    pub mirror_crossings: Vec<ProjectedConstraint>,
    pub applied: Vec<ConstraintReport>,
    pub rejected: Vec<ConstraintReport>,
    /// Anchors bound to an accepted constraint.
    pub constrained_anchors: Vec<usize>,
    pub planar: bool,
    pub plane_normal: Option<Vec3>,
    pub closed: bool,
    /// Energies of the adopted subsets, first to last.
    pub energy_trace: Vec<f64>,
}

pub struct ConstraintSolver {
    curve: PolyBezier,
    candidates: Vec<ConstraintCandidate>,
    closed: bool,
    allow_planarity: bool,
    params: SolverParams,
    all_score: f64,
}

impl ConstraintSolver {
    /// Locate and score `constraints` on `curve`. Surface constraints are
    /// handled after the solve and are skipped here.
    #[instrument(skip(curve, constraints, params), fields(constraints = constraints.len()))]
    pub fn new(
        curve: PolyBezier,
        constraints: &[Constraint],
        closed: bool,
        allow_planarity: bool,
        params: SolverParams,
    ) -> Self {
        let mut candidates: Vec<ConstraintCandidate> = constraints
            .iter()
            .filter(|c| !matches!(c, Constraint::Surface(_)))
            .map(|c| {
                ConstraintCandidate::locate(
                    *c,
                    &curve,
                    params.angular_threshold,
                    params.min_distance_between_anchors,
                    &params.score_weights,
                )
            })
            .collect();
        candidates.sort_by(|a, b| a.t.total_cmp(&b.t));
        let all_score = candidates.iter().map(|c| c.score).sum();
        debug!(candidates = candidates.len(), all_score, "located constraint candidates");

        Self {
            curve,
            candidates,
            closed,
            allow_planarity,
            params,
            all_score,
        }
    }

    /// Candidates in ascending parameter order.
    pub fn candidates(&self) -> &[ConstraintCandidate] {
        &self.candidates
    }

    /// Deform the base curve to honor the `active` candidates.
    pub fn fit_for_constraints(&self, active: &ActiveSet) -> CurveFitCandidate {
        let split = split_for_constraints(
            &self.curve,
            &self.candidates,
            active,
            self.closed,
            self.params.min_distance_between_anchors,
        );
        let curve = split.curve;
        let bound = split.bound;
        let points = curve.control_points();
        let eps = self.params.eps;
        let last_anchor = curve.segment_count();
        let last_point = points.len() - 1;

        let mut hard = Vec::new();
        let mut soft = Vec::new();
        let mut start_direction = curve.anchor_tangent(0);
        let mut end_direction = curve.anchor_tangent(last_anchor);

        for (&anchor, &index) in &bound {
            let candidate = &self.candidates[index];
            let point = 3 * anchor;
            hard.push(HardConstraint::Position {
                index: point,
                displacement: candidate.constraint.position() - points[point],
            });
            if !candidate.align_tangent {
                continue;
            }
            let Some(direction) = candidate.constraint.reference_direction() else { continue };
            soft.extend(SoftConstraint::tangent(points, point, &direction, eps));
            if anchor == 0 {
                start_direction = direction;
            } else if anchor == last_anchor {
                end_direction = direction;
            }
        }

        let closed = self.closed && last_anchor > 1;
        if closed && !(bound.contains_key(&0) && bound.contains_key(&last_anchor)) {
            hard.push(HardConstraint::SelfIntersection {
                first: 0,
                last: last_point,
                gap: points[last_point] - points[0],
            });
            if start_direction.dot(&end_direction).abs() > CLOSURE_TANGENT_AGREEMENT {
                soft.extend(SoftConstraint::tangent(points, last_point, &start_direction, eps));
            }
        }

        if points.len() > 4 {
            hard.extend(HardConstraint::g1(points, eps));
        }

        let mut plane_normal = None;
        if self.allow_planarity {
            if let Some((plane, max_distance)) = Plane::fit(points) {
                if max_distance < self.params.proximity_threshold {
                    let plane = plane.snapped(&ORTHO_DIRECTIONS, self.params.angular_threshold);
                    soft.push(SoftConstraint::planarity(points, &plane.normal, eps));
                    plane_normal = Some(plane.normal);
                }
            }
        }

        let fidelity = FidelityEnergy::new(points, &self.params.fidelity, self.params.proximity_threshold, eps);
        let (mut control_points, fidelity_energy) = match solve_displacements(points.len(), &fidelity, &hard, &soft) {
            Ok(solution) => (solution.apply(points), solution.fidelity_energy),
            Err(err) => {
                error!(%err, active = active.len(), "constrained solve failed");
                (points.to_vec(), f64::INFINITY)
            }
        };
        if closed {
            control_points[last_point] = control_points[0];
        }

        let kept: f64 = bound.values().map(|&i| self.candidates[i].score).sum();
        let rejection = if self.all_score > 0.0 {
            (-(kept * kept) / (self.all_score * self.all_score)).exp()
        } else {
            0.0
        };
        let mu = self.params.mu_fidelity;
        let energy = if fidelity_energy.is_finite() {
            mu * fidelity_energy + (1.0 - mu) * rejection
        } else {
            f64::INFINITY
        };
        debug!(active = active.len(), bound = bound.len(), fidelity_energy, rejection, energy, "evaluated subset");

        CurveFitCandidate {
            control_points,
            energy,
            bound,
            planar: plane_normal.is_some(),
            plane_normal,
            closed,
        }
    }

    /// Lowest-energy fit among those dropping one bound candidate of `fit`.
    fn best_subset(&self, active: &ActiveSet, fit: &CurveFitCandidate) -> Option<(ActiveSet, CurveFitCandidate)> {
        fit.bound
            .values()
            .map(|&index| {
                let subset = active.without(index);
                let candidate = self.fit_for_constraints(&subset);
                (subset, candidate)
            })
            .min_by(|a, b| a.1.energy.total_cmp(&b.1.energy))
    }

    /// Greedy backward elimination starting from every candidate.
    #[instrument(skip(self), fields(candidates = self.candidates.len()))]
    pub fn get_best_fit(&self) -> SolverOutcome {
        let mut active = ActiveSet::all(self.candidates.len());
        let mut best = self.fit_for_constraints(&active);
        let mut energy_trace = vec![best.energy];

        while let Some((subset, fit)) = self.best_subset(&active, &best) {
            if fit.energy >= best.energy || fit.energy.is_nan() {
                break;
            }
            debug!(from = best.energy, to = fit.energy, remaining = subset.len(), "dropped a constraint");
            active = subset;
            best = fit;
            energy_trace.push(best.energy);
        }

        info!(
            kept = best.bound.len(),
            candidates = self.candidates.len(),
            energy = best.energy,
            planar = best.planar,
            closed = best.closed,
            "selected constraint subset"
        );
        self.outcome(best, energy_trace)
    }

    fn outcome(&self, best: CurveFitCandidate, energy_trace: Vec<f64>) -> SolverOutcome {
        let finite = best.control_points.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
        let curve = match PolyBezier::from_control_points(best.control_points) {
            Ok(curve) if finite && best.energy.is_finite() => {
                curve.with_weights(self.curve.start_weight, self.curve.end_weight)
            }
            _ => {
                error!("no finite constrained fit, keeping the unconstrained curve");
                return self.unconstrained(energy_trace);
            }
        };

        let mut intersections = Vec::new();
        let mut mirror_crossings = Vec::new();
        let mut applied = Vec::new();
        for (&anchor, &index) in &best.bound {
            let candidate = &self.candidates[index];
            let t = curve.anchor_parameter(anchor);
            let projected = ProjectedConstraint {
                constraint: candidate.constraint,
                on_new_curve: PointOnCurve::new(t, curve.anchor(anchor), curve.anchor_tangent(anchor)),
            };
            match candidate.constraint {
                Constraint::Intersection(_) => intersections.push(projected),
                Constraint::MirrorPlane(_) => mirror_crossings.push(projected),
                _ => {}
            }
            applied.push(candidate.report(true));
        }
        let accepted: Vec<usize> = best.bound.values().copied().collect();
        let rejected = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| !accepted.contains(i))
            .map(|(_, c)| c.report(false))
            .collect();

        SolverOutcome {
            curve,
            intersections,
            mirror_crossings,
            applied,
            rejected,
            constrained_anchors: best.bound.keys().copied().collect(),
            planar: best.planar,
            plane_normal: best.plane_normal,
            closed: best.closed,
            energy_trace,
        }
    }

    fn unconstrained(&self, energy_trace: Vec<f64>) -> SolverOutcome {
        SolverOutcome {
            curve: self.curve.clone(),
            intersections: Vec::new(),
            mirror_crossings: Vec::new(),
            applied: Vec::new(),
            rejected: self.candidates.iter().map(|c| c.report(false)).collect(),
            constrained_anchors: Vec::new(),
            planar: false,
            plane_normal: None,
            closed: false,
            energy_trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump() -> PolyBezier {
        PolyBezier::from_control_points(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.1, 0.05, 0.0),
            Point3d::new(0.2, 0.05, 0.0),
            Point3d::new(0.3, 0.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_no_constraints_keeps_curve() {
        let solver = ConstraintSolver::new(bump(), &[], false, false, SolverParams::default());
        let outcome = solver.get_best_fit();
        assert_eq!(outcome.curve, bump());
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.energy_trace, vec![0.0]);
    }

    #[test]
    fn test_single_constraint_is_accepted() {
        let target = Point3d::new(0.15, 0.045, 0.0);
        let solver = ConstraintSolver::new(bump(), &[Constraint::PositionOnly(target)], false, false, SolverParams::default());
        let outcome = solver.get_best_fit();
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.curve.segment_count(), 2);
        assert_eq!(outcome.constrained_anchors, vec![1]);
        assert!((outcome.curve.anchor(1) - target).norm() < 1e-9);
    }

    #[test]
    fn test_surface_constraints_are_not_candidates() {
        use crate::constraint::{PatchId, SurfaceConstraint};
        use slotmap::SlotMap;
        let mut patches: SlotMap<PatchId, ()> = SlotMap::with_key();
        let surface = Constraint::Surface(SurfaceConstraint::new(patches.insert(()), Point3d::origin()));
        let solver = ConstraintSolver::new(bump(), &[surface], false, false, SolverParams::default());
        assert!(solver.candidates().is_empty());
    }

    #[test]
    fn test_far_constraint_is_dropped() {
        let params = SolverParams {
            mu_fidelity: 0.99,
            ..SolverParams::default()
        };
        let far = Point3d::new(0.15, 0.5, 0.0);
        let solver = ConstraintSolver::new(bump(), &[Constraint::PositionOnly(far)], false, false, params);
        let outcome = solver.get_best_fit();
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.energy_trace.len(), 2);
        assert!(outcome.energy_trace[1] < outcome.energy_trace[0]);
    }
}
