//! Queries into the curves and surface patches already placed in the scene.
//!
//! The beautifier only reads from these collaborators. `StrokeNetwork` is a
//! minimal in-memory curve network; applications with their own scene graph
//! implement the traits directly.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use stroke_kernel::{Curve, Point3d, PointOnCurve};
use stroke_solver::{Constraint, IntersectionConstraint, PatchId, StrokeId};

/// A point where curves of the network meet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub position: Point3d,
    /// Parameter of the node on the queried curve.
    pub t: f64,
    /// Number of curves meeting at the node.
    pub incident_count: usize,
}

pub trait CurveNetwork {
    /// Closest point on `stroke` to `p`.
    fn project(&self, stroke: StrokeId, p: &Point3d) -> Option<PointOnCurve>;

    fn point_at(&self, stroke: StrokeId, t: f64) -> Option<PointOnCurve>;

    /// Node of `stroke` closest to `p`.
    fn nearest_node(&self, stroke: StrokeId, p: &Point3d) -> Option<NetworkNode>;

    /// Intersection constraint with `stroke` near `p`.
    ///
    /// The crossing snaps to an existing node within `snap_distance`, and
    /// counts as at a node only when that node joins two or more curves.
    fn intersection_near(&self, stroke: StrokeId, p: &Point3d, snap_distance: f64) -> Option<Constraint> {
        let mut old_curve = self.project(stroke, p)?;
        let mut at_node = false;
        if let Some(node) = self.nearest_node(stroke, &old_curve.position) {
            if nalgebra::distance(&node.position, &old_curve.position) < snap_distance {
                old_curve = self.point_at(stroke, node.t).unwrap_or(old_curve);
                at_node = node.incident_count > 1;
            }
        }
        Some(Constraint::Intersection(IntersectionConstraint {
            stroke,
            old_curve,
            at_node,
        }))
    }
}

pub trait SurfacePatches {
    /// Projection of `p` on `patch`, if it lands inside the patch.
    fn project_on_patch(&self, patch: PatchId, p: &Point3d) -> Option<Point3d>;

    /// Whether the portion of `stroke` around parameter `t` bounds `patch`.
    fn bounds_patch(&self, patch: PatchId, stroke: StrokeId, t: f64) -> bool;
}

/// A scene without surface patches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSurfaces;

impl SurfacePatches for NoSurfaces {
    fn project_on_patch(&self, _patch: PatchId, _p: &Point3d) -> Option<Point3d> {
        None
    }

    fn bounds_patch(&self, _patch: PatchId, _stroke: StrokeId, _t: f64) -> bool {
        false
    }
}

/// A curve placed in the network and its nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedStroke {
    pub curve: Curve,
    pub nodes: Vec<NetworkNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrokeNetwork {
    strokes: SlotMap<StrokeId, PlacedStroke>,
}

impl StrokeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, curve: Curve) -> StrokeId {
        self.strokes.insert(PlacedStroke {
            curve,
            nodes: Vec::new(),
        })
    }

    pub fn remove(&mut self, stroke: StrokeId) -> Option<PlacedStroke> {
        self.strokes.remove(stroke)
    }

    pub fn get(&self, stroke: StrokeId) -> Option<&PlacedStroke> {
        self.strokes.get(stroke)
    }

    /// Record a node at parameter `t` of `stroke`. Returns the node, or
    /// `None` for an unknown stroke.
    pub fn add_node(&mut self, stroke: StrokeId, t: f64, incident_count: usize) -> Option<NetworkNode> {
        let placed = self.strokes.get_mut(stroke)?;
        let node = NetworkNode {
            position: placed.curve.evaluate(t),
            t,
            incident_count,
        };
        placed.nodes.push(node);
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StrokeId, &PlacedStroke)> {
        self.strokes.iter()
    }
}

impl CurveNetwork for StrokeNetwork {
    fn project(&self, stroke: StrokeId, p: &Point3d) -> Option<PointOnCurve> {
        self.strokes.get(stroke).map(|s| s.curve.project(p))
    }

    fn point_at(&self, stroke: StrokeId, t: f64) -> Option<PointOnCurve> {
        self.strokes.get(stroke).map(|s| s.curve.point_on_curve(t))
    }

    fn nearest_node(&self, stroke: StrokeId, p: &Point3d) -> Option<NetworkNode> {
        self.strokes.get(stroke)?.nodes.iter().copied().min_by(|a, b| {
            nalgebra::distance(&a.position, p).total_cmp(&nalgebra::distance(&b.position, p))
        })
    }
}
