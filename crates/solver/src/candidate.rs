//! Constraint candidates and the active subsets explored by the search.

use serde::{Deserialize, Serialize};
use stroke_kernel::PolyBezier;

use crate::constraint::{Constraint, ConstraintReport};

/// Heuristic importance of each kind of candidate.
///
/// Higher scores make a constraint more costly to drop during the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub node_intersection: f64,
    pub segment_intersection: f64,
    pub other: f64,
    /// Lower bound for candidates close to the stroke endpoints.
    pub near_endpoint_floor: f64,
    pub tangent_alignment_bonus: f64,
    /// Allow tangent alignment with an old curve crossed at a node when
    /// both run in the same direction.
    pub align_through_nodes: bool,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            node_intersection: 2.0,
            segment_intersection: 1.5,
            other: 1.0,
            near_endpoint_floor: 1.25,
            tangent_alignment_bonus: 0.5,
            align_through_nodes: false,
        }
    }
}

/// Offset in the likelihood denominator so exact hits stay finite.
const LIKELIHOOD_OFFSET: f64 = 1e-4;

/// Minimum closest-point slices used to locate a candidate on the curve.
const CANDIDATE_SLICES: usize = 15;

/// A constraint located on the curve being beautified.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintCandidate {
    pub constraint: Constraint,
    /// Closest parameter on the unconstrained curve.
    pub t: f64,
    /// Inverse distance between the constraint and the curve.
    pub likelihood: f64,
    pub score: f64,
    pub close_to_endpoint: bool,
    pub align_tangent: bool,
}

impl ConstraintCandidate {
    pub fn locate(
        constraint: Constraint,
        curve: &PolyBezier,
        angular_threshold: f64,
        endpoint_distance: f64,
        weights: &ScoreWeights,
    ) -> Self {
        let target = constraint.position();
        let slices = CANDIDATE_SLICES.max(10 * curve.segment_count());
        let t = curve.closest_parameter(&target, slices);
        let on_curve = curve.evaluate(t);
        let likelihood = 1.0 / (LIKELIHOOD_OFFSET + nalgebra::distance(&on_curve, &target));

        let last = curve.segment_count();
        let close_to_endpoint = nalgebra::distance(&on_curve, &curve.anchor(0)) < endpoint_distance
            || nalgebra::distance(&on_curve, &curve.anchor(last)) < endpoint_distance;

        let tangent = curve.tangent(t);
        let align_tangent = match constraint.reference_direction() {
            Some(reference) if reference.norm() > 0.9 && tangent.norm() > 0.9 => {
                let dot = reference.dot(&tangent);
                let continues_through_node = constraint.is_at_node() && dot > 0.0;
                (weights.align_through_nodes || !continues_through_node) && dot.abs() > angular_threshold.cos()
            }
            _ => false,
        };

        let mut score = match &constraint {
            Constraint::Intersection(c) if c.at_node => weights.node_intersection,
            Constraint::Intersection(_) => weights.segment_intersection,
            _ => weights.other,
        };
        if close_to_endpoint {
            score = score.max(weights.near_endpoint_floor);
        }
        if align_tangent {
            score += weights.tangent_alignment_bonus;
        }

        Self {
            constraint,
            t,
            likelihood,
            score,
            close_to_endpoint,
            align_tangent,
        }
    }

    pub fn report(&self, accepted: bool) -> ConstraintReport {
        if accepted {
            ConstraintReport::accepted(&self.constraint, self.close_to_endpoint, self.align_tangent)
        } else {
            ConstraintReport::rejected(&self.constraint, self.close_to_endpoint)
        }
    }
}

/// Sorted indices of the candidates currently enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSet(Vec<usize>);

impl ActiveSet {
    pub fn all(count: usize) -> Self {
        Self((0..count).collect())
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut v: Vec<usize> = indices.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        Self(v)
    }

    /// This set minus one candidate.
    pub fn without(&self, index: usize) -> Self {
        Self(self.0.iter().copied().filter(|&i| i != index).collect())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
