use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use stroke_kernel::{Curve, Point3d, PointOnCurve, Reparameterization, Vec3};

new_key_type! {
    /// Identifies a curve owned by the caller's curve network.
    pub struct StrokeId;
    /// Identifies a surface patch owned by the caller.
    pub struct PatchId;
}

/// Crossing with a previously drawn curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntersectionConstraint {
    pub stroke: StrokeId,
    /// Crossing point on the intersected curve.
    pub old_curve: PointOnCurve,
    /// The crossing sits on a node shared by two or more curves.
    pub at_node: bool,
}

/// Crossing with the mirror plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MirrorPlaneConstraint {
    pub position: Point3d,
    pub plane_normal: Vec3,
}

/// Portion of the stroke drawn on a surface patch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConstraint {
    pub patch: PatchId,
    pub start_position: Point3d,
    /// Where the stroke left the patch, if it did before the stroke ended.
    pub exit_position: Option<Point3d>,
}

impl SurfaceConstraint {
    pub fn new(patch: PatchId, start_position: Point3d) -> Self {
        Self {
            patch,
            start_position,
            exit_position: None,
        }
    }

    pub fn leave(&mut self, position: Point3d) {
        self.exit_position = Some(position);
    }

    pub fn left_mid_stroke(&self) -> bool {
        self.exit_position.is_some()
    }
}

/// A geometric constraint detected while the stroke was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// A target position with no extra semantics (grid point, anchor).
    PositionOnly(Point3d),
    Intersection(IntersectionConstraint),
    MirrorPlane(MirrorPlaneConstraint),
    Surface(SurfaceConstraint),
}

impl Constraint {
    /// Target position; the entry point for surface constraints.
    pub fn position(&self) -> Point3d {
        match self {
            Constraint::PositionOnly(p) => *p,
            Constraint::Intersection(c) => c.old_curve.position,
            Constraint::MirrorPlane(c) => c.position,
            Constraint::Surface(c) => c.start_position,
        }
    }

    pub fn is_intersection(&self) -> bool {
        matches!(self, Constraint::Intersection(_))
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self, Constraint::MirrorPlane(_))
    }

    pub fn is_at_node(&self) -> bool {
        matches!(self, Constraint::Intersection(c) if c.at_node)
    }

    pub fn as_intersection(&self) -> Option<&IntersectionConstraint> {
        match self {
            Constraint::Intersection(c) => Some(c),
            _ => None,
        }
    }

    /// Direction the new curve may align its tangent with.
    pub fn reference_direction(&self) -> Option<Vec3> {
        match self {
            Constraint::Intersection(c) => Some(c.old_curve.tangent),
            Constraint::MirrorPlane(c) => Some(c.plane_normal),
            _ => None,
        }
    }
}

/// A constraint together with its location on the beautified curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedConstraint {
    pub constraint: Constraint,
    pub on_new_curve: PointOnCurve,
}

impl ProjectedConstraint {
    pub fn project(constraint: Constraint, curve: &Curve) -> Self {
        Self {
            on_new_curve: curve.project(&constraint.position()),
            constraint,
        }
    }

    /// Follow the new curve through a cut. Without an affine parameter map
    /// the stored position is projected again.
    pub fn reparameterize(&mut self, reparameterization: Option<Reparameterization>, curve: &Curve) {
        self.on_new_curve = match reparameterization {
            Some(r) => curve.point_on_curve(r.apply(self.on_new_curve.t).clamp(0.0, 1.0)),
            None => curve.project(&self.on_new_curve.position),
        };
    }
}

/// Serializable summary of one accepted or rejected constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintReport {
    pub position: Point3d,
    pub is_intersection: bool,
    pub is_at_existing_node: bool,
    pub is_at_new_endpoint: bool,
    pub align_tangents: bool,
}

impl ConstraintReport {
    /// Report for a constraint the curve honors. `near_endpoint` says
    /// whether it sits at one end of the new curve.
    pub fn accepted(constraint: &Constraint, near_endpoint: bool, align_tangents: bool) -> Self {
        Self {
            position: constraint.position(),
            is_intersection: constraint.is_intersection(),
            is_at_existing_node: constraint.is_at_node(),
            is_at_new_endpoint: near_endpoint,
            align_tangents,
        }
    }

    pub fn rejected(constraint: &Constraint, near_endpoint: bool) -> Self {
        Self {
            align_tangents: false,
            ..Self::accepted(constraint, near_endpoint, false)
        }
    }
}
