//! Re-splitting the base curve so every active candidate owns an anchor.

use std::collections::BTreeMap;

use stroke_kernel::PolyBezier;

use crate::candidate::{ActiveSet, ConstraintCandidate};

/// Local parameters this close to a segment end snap onto its anchor.
const ANCHOR_PARAMETER_SNAP: f64 = 1e-9;

/// Base curve split at the active candidates.
#[derive(Debug, Clone)]
pub struct SplitCurve {
    pub curve: PolyBezier,
    /// Anchor index to the index of the candidate bound there.
    pub bound: BTreeMap<usize, usize>,
}

/// Split `base` so each active candidate lands on an anchor.
///
/// Candidate parameters refer to `base`. The parameters of the current
/// anchors are tracked on `base` as well, so earlier splits do not move
/// later lookups. A candidate closer than `min_distance` to an existing
/// anchor is collapsed onto it. When two candidates compete for one anchor
/// the higher likelihood wins; for a `closed` curve the first and last
/// anchors count as the same slot.
pub fn split_for_constraints(
    base: &PolyBezier,
    candidates: &[ConstraintCandidate],
    active: &ActiveSet,
    closed: bool,
    min_distance: f64,
) -> SplitCurve {
    let mut curve = base.clone();
    let n = base.segment_count();
    let mut anchor_params: Vec<f64> = (0..=n).map(|i| i as f64 / n as f64).collect();
    let mut bound: BTreeMap<usize, usize> = BTreeMap::new();

    for index in active.iter() {
        let candidate = &candidates[index];
        let t = candidate.t.clamp(0.0, 1.0);

        let segment = anchor_params
            .partition_point(|&p| p <= t)
            .saturating_sub(1)
            .min(anchor_params.len() - 2);
        let (lo, hi) = (anchor_params[segment], anchor_params[segment + 1]);
        let u = if hi > lo { (t - lo) / (hi - lo) } else { 0.0 };

        let position = curve.segment(segment).evaluate(u);
        let before = nalgebra::distance(&position, &curve.anchor(segment));
        let after = nalgebra::distance(&position, &curve.anchor(segment + 1));

        let snaps = before.min(after) < min_distance
            || u <= ANCHOR_PARAMETER_SNAP
            || u >= 1.0 - ANCHOR_PARAMETER_SNAP;
        let anchor = if snaps {
            if before <= after { segment } else { segment + 1 }
        } else {
            let inserted = curve.split_at(segment, u);
            anchor_params.insert(inserted, t);
            bound = bound
                .into_iter()
                .map(|(a, c)| if a >= inserted { (a + 1, c) } else { (a, c) })
                .collect();
            inserted
        };

        let last = anchor_params.len() - 1;
        let slot_owner = [Some(anchor), closed_alias(anchor, last, closed)]
            .into_iter()
            .flatten()
            .find(|a| bound.contains_key(a));
        match slot_owner {
            Some(owner) if candidates[bound[&owner]].likelihood >= candidate.likelihood => {}
            Some(owner) => {
                bound.remove(&owner);
                bound.insert(anchor, index);
            }
            None => {
                bound.insert(anchor, index);
            }
        }
    }

    SplitCurve { curve, bound }
}

/// The other index of the shared first/last anchor of a closed curve.
fn closed_alias(anchor: usize, last: usize, closed: bool) -> Option<usize> {
    match (closed, anchor) {
        (true, 0) => Some(last),
        (true, a) if a == last => Some(0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ScoreWeights;
    use crate::constraint::Constraint;
    use stroke_kernel::Point3d;

    fn straight(segments: usize) -> PolyBezier {
        let points = (0..=3 * segments).map(|i| Point3d::new(i as f64, 0.0, 0.0)).collect();
        PolyBezier::from_control_points(points).unwrap()
    }

    fn loop_curve() -> PolyBezier {
        PolyBezier::from_control_points(vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, -0.5, 0.0),
            Point3d::new(2.0, -0.5, 0.0),
            Point3d::new(2.0, 0.5, 0.0),
            Point3d::new(2.0, 1.5, 0.0),
            Point3d::new(1.0, 1.5, 0.0),
            Point3d::new(0.5, 1.0, 0.0),
            Point3d::new(0.0, 0.5, 0.0),
            Point3d::new(-0.2, 0.2, 0.0),
            Point3d::new(0.0, 0.01, 0.0),
        ])
        .unwrap()
    }

    fn candidates(curve: &PolyBezier, targets: &[Point3d]) -> Vec<ConstraintCandidate> {
        targets
            .iter()
            .map(|p| ConstraintCandidate::locate(Constraint::PositionOnly(*p), curve, 0.5, 0.02, &ScoreWeights::default()))
            .collect()
    }

    #[test]
    fn test_splits_keep_earlier_bindings_in_place() {
        let base = straight(1);
        let cs = candidates(&base, &[Point3d::new(0.9, 0.1, 0.0), Point3d::new(2.1, 0.1, 0.0)]);
        let split = split_for_constraints(&base, &cs, &ActiveSet::all(2), false, 0.02);

        assert_eq!(split.curve.segment_count(), 3);
        assert_eq!(split.bound.len(), 2);
        for (&anchor, &c) in &split.bound {
            let at = split.curve.anchor(anchor);
            assert!((at.x - cs[c].constraint.position().x).abs() < 1e-6, "anchor {} at {}", anchor, at);
        }
        assert_eq!(split.bound.get(&1), Some(&0));
        assert_eq!(split.bound.get(&2), Some(&1));
    }

    #[test]
    fn test_near_anchor_collapses_and_keeps_best_likelihood() {
        let base = straight(2);
        let cs = candidates(&base, &[Point3d::new(3.01, 0.05, 0.0), Point3d::new(2.995, 0.0, 0.0)]);
        let split = split_for_constraints(&base, &cs, &ActiveSet::all(2), false, 0.02);
        assert_eq!(split.curve.segment_count(), 2);
        assert_eq!(split.bound.len(), 1);
        assert_eq!(split.bound.get(&1), Some(&1));
    }

    #[test]
    fn test_closed_curve_shares_end_slot() {
        let base = loop_curve();
        let cs = candidates(&base, &[Point3d::new(0.0, 0.0, 0.0), Point3d::new(0.0, 0.01, 0.0)]);
        let split = split_for_constraints(&base, &cs, &ActiveSet::all(2), true, 0.02);
        assert_eq!(split.bound.len(), 1);

        let open = split_for_constraints(&base, &cs, &ActiveSet::all(2), false, 0.02);
        assert_eq!(open.bound.len(), 2);
    }

    #[test]
    fn test_inactive_candidates_are_ignored() {
        let base = straight(1);
        let cs = candidates(&base, &[Point3d::new(1.5, 0.0, 0.0)]);
        let split = split_for_constraints(&base, &cs, &ActiveSet::default(), false, 0.02);
        assert!(split.bound.is_empty());
        assert_eq!(split.curve, base);
    }
}
