//! Hard and soft constraint terms of the displacement solve.
//!
//! Unknowns are laid out as `[x_0, y_0, z_0, x_1, ...]`, one displacement
//! per control point. Hard constraints become rows of the Lagrange block,
//! soft constraints add quadratic penalties to the energy.

use nalgebra::{DMatrix, DVector, Matrix3};
use stroke_kernel::{Point3d, Vec3};

/// Cross product magnitude below which adjacent polygon edges are collinear.
const G1_COLLINEARITY: f64 = 1e-5;

/// One G1 joint: the anchor index and inverse lengths of its two handles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct G1Joint {
    pub anchor: usize,
    pub inv_left: f64,
    pub inv_right: f64,
}

/// Linear equations enforced exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum HardConstraint {
    /// `x_index = displacement`
    Position { index: usize, displacement: Vec3 },
    /// `x_first - x_last = gap`, closing the curve onto itself.
    SelfIntersection { first: usize, last: usize, gap: Vec3 },
    /// `(1/l + 1/r) x_a - x_{a-1}/l - x_{a+1}/r = 0` for each joint.
    G1 { joints: Vec<G1Joint> },
}

impl HardConstraint {
    /// G1 rows for every interior anchor whose handles are collinear and
    /// point in opposite directions. `None` when no joint qualifies.
    pub fn g1(points: &[Point3d], eps: f64) -> Option<Self> {
        let joints: Vec<G1Joint> = (3..points.len().saturating_sub(1))
            .step_by(3)
            .filter_map(|a| {
                let left = points[a] - points[a - 1];
                let right = points[a + 1] - points[a];
                let (l, r) = (left.norm(), right.norm());
                let smooth = l > eps && r > eps && left.cross(&right).norm() <= G1_COLLINEARITY && left.dot(&right) > 0.0;
                smooth.then(|| G1Joint {
                    anchor: a,
                    inv_left: 1.0 / l,
                    inv_right: 1.0 / r,
                })
            })
            .collect();
        (!joints.is_empty()).then_some(HardConstraint::G1 { joints })
    }

    pub fn rows(&self) -> usize {
        match self {
            HardConstraint::Position { .. } | HardConstraint::SelfIntersection { .. } => 3,
            HardConstraint::G1 { joints } => 3 * joints.len(),
        }
    }

    /// Write this constraint's rows, starting at absolute row `row`, into
    /// the symmetric saddle-point matrix and its right-hand side.
    pub fn write(&self, kkt: &mut DMatrix<f64>, rhs: &mut DVector<f64>, row: usize) {
        let mut set = |r: usize, c: usize, v: f64| {
            kkt[(r, c)] = v;
            kkt[(c, r)] = v;
        };
        match self {
            HardConstraint::Position { index, displacement } => {
                for k in 0..3 {
                    set(row + k, 3 * index + k, 1.0);
                    rhs[row + k] = displacement[k];
                }
            }
            HardConstraint::SelfIntersection { first, last, gap } => {
                for k in 0..3 {
                    set(row + k, 3 * first + k, 1.0);
                    set(row + k, 3 * last + k, -1.0);
                    rhs[row + k] = gap[k];
                }
            }
            HardConstraint::G1 { joints } => {
                for (j, joint) in joints.iter().enumerate() {
                    for k in 0..3 {
                        let r = row + 3 * j + k;
                        set(r, 3 * joint.anchor + k, joint.inv_left + joint.inv_right);
                        set(r, 3 * (joint.anchor - 1) + k, -joint.inv_left);
                        set(r, 3 * (joint.anchor + 1) + k, -joint.inv_right);
                        rhs[r] = 0.0;
                    }
                }
            }
        }
    }

    /// Largest violation of the equations by `displacements`.
    pub fn residual(&self, displacements: &[Vec3]) -> f64 {
        match self {
            HardConstraint::Position { index, displacement } => (displacements[*index] - displacement).norm(),
            HardConstraint::SelfIntersection { first, last, gap } => {
                (displacements[*first] - displacements[*last] - gap).norm()
            }
            HardConstraint::G1 { joints } => joints
                .iter()
                .map(|j| {
                    (displacements[j.anchor] * (j.inv_left + j.inv_right)
                        - displacements[j.anchor - 1] * j.inv_left
                        - displacements[j.anchor + 1] * j.inv_right)
                        .norm()
                })
                .fold(0.0, f64::max),
        }
    }
}

/// Quadratic penalties `w * |M (base + x_j - x_i)|^2`-style terms on
/// control polygon edges.
#[derive(Debug, Clone, PartialEq)]
pub enum SoftConstraint {
    /// Pull the edge at a control point towards a direction.
    Tangent(EdgeTerm),
    /// Pull every polygon edge into a plane.
    Planarity(Vec<EdgeTerm>),
}

/// `weight * (base + x_j - x_i)^T M (base + x_j - x_i)` with `M` a
/// symmetric projector.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTerm {
    pub i: usize,
    pub j: usize,
    pub base: Vec3,
    pub projector: Matrix3<f64>,
    pub weight: f64,
}

impl EdgeTerm {
    fn accumulate(&self, a: &mut DMatrix<f64>, b: &mut DVector<f64>) {
        let block = self.projector * (2.0 * self.weight);
        let pull = block * self.base;
        for r in 0..3 {
            for c in 0..3 {
                let v = block[(r, c)];
                a[(3 * self.i + r, 3 * self.i + c)] += v;
                a[(3 * self.j + r, 3 * self.j + c)] += v;
                a[(3 * self.i + r, 3 * self.j + c)] -= v;
                a[(3 * self.j + r, 3 * self.i + c)] -= v;
            }
            b[3 * self.i + r] += pull[r];
            b[3 * self.j + r] -= pull[r];
        }
    }

    fn energy(&self, displacements: &[Vec3]) -> f64 {
        let e = self.base + displacements[self.j] - displacements[self.i];
        self.weight * e.dot(&(self.projector * e))
    }
}

impl SoftConstraint {
    /// Penalize the component of the polygon edge at control point `index`
    /// orthogonal to `direction`. `None` for a degenerate edge.
    pub fn tangent(points: &[Point3d], index: usize, direction: &Vec3, eps: f64) -> Option<Self> {
        let (i, j) = if index + 1 < points.len() { (index, index + 1) } else { (index - 1, index) };
        let base = points[j] - points[i];
        let norm = base.norm_squared();
        let unit = direction.try_normalize(1e-12)?;
        (norm > eps).then(|| {
            SoftConstraint::Tangent(EdgeTerm {
                i,
                j,
                base,
                projector: Matrix3::identity() - unit * unit.transpose(),
                weight: 1.0 / norm,
            })
        })
    }

    /// Penalize every polygon edge's component along `normal`.
    pub fn planarity(points: &[Point3d], normal: &Vec3, eps: f64) -> Self {
        let projector = normal * normal.transpose();
        let per_edge = 1.0 / (points.len() as f64 - 1.0);
        let edges = points
            .windows(2)
            .enumerate()
            .filter_map(|(k, w)| {
                let base = w[1] - w[0];
                let norm = base.norm_squared();
                (norm > eps).then(|| EdgeTerm {
                    i: k,
                    j: k + 1,
                    base,
                    projector,
                    weight: per_edge / norm,
                })
            })
            .collect();
        SoftConstraint::Planarity(edges)
    }

    fn terms(&self) -> &[EdgeTerm] {
        match self {
            SoftConstraint::Tangent(term) => std::slice::from_ref(term),
            SoftConstraint::Planarity(terms) => terms,
        }
    }

    /// Add the penalty's Hessian to `a` and its linear part to `b`, so that
    /// the minimizer solves `a x = b`.
    pub fn accumulate(&self, a: &mut DMatrix<f64>, b: &mut DVector<f64>) {
        for term in self.terms() {
            term.accumulate(a, b);
        }
    }

    pub fn energy(&self, displacements: &[Vec3]) -> f64 {
        self.terms().iter().map(|t| t.energy(displacements)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<Point3d> {
        vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(2.0, 1.0, 0.1),
            Point3d::new(3.0, 0.0, 0.0),
        ]
    }

    #[test]
    fn test_g1_detects_smooth_joints_only() {
        let mut points = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 0.0),
            Point3d::new(2.0, 1.0, 0.0),
            Point3d::new(3.0, 1.0, 0.0),
            Point3d::new(5.0, 1.0, 0.0),
            Point3d::new(6.0, 0.0, 0.0),
            Point3d::new(7.0, 0.0, 0.0),
        ];
        let Some(HardConstraint::G1 { joints }) = HardConstraint::g1(&points, 1e-5) else {
            panic!("expected a G1 joint");
        };
        assert_eq!(joints.len(), 1);
        assert_eq!(joints[0].anchor, 3);
        assert!((joints[0].inv_left - 1.0).abs() < 1e-12);
        assert!((joints[0].inv_right - 0.5).abs() < 1e-12);

        // A cusp: both handles on the same side.
        points[4] = Point3d::new(2.5, 1.0, 0.0);
        assert!(HardConstraint::g1(&points, 1e-5).is_none());
        assert!(HardConstraint::g1(&points[..4], 1e-5).is_none());
    }

    #[test]
    fn test_soft_terms_quadratic_form() {
        let points = zigzag();
        let terms = [
            SoftConstraint::tangent(&points, 3, &Vec3::new(1.0, 0.0, 0.0), 1e-5).unwrap(),
            SoftConstraint::planarity(&points, &Vec3::new(0.0, 0.0, 1.0), 1e-5),
        ];
        let x: Vec<Vec3> = (0..4).map(|i| Vec3::new(0.02 * i as f64, 0.01, -0.03 * i as f64)).collect();
        let flat = DVector::from_iterator(12, x.iter().flat_map(|v| [v.x, v.y, v.z]));
        let zero = vec![Vec3::zeros(); 4];

        for term in &terms {
            let mut a = DMatrix::zeros(12, 12);
            let mut b = DVector::zeros(12);
            term.accumulate(&mut a, &mut b);
            assert!((&a - a.transpose()).norm() < 1e-12);
            // E(x) = E(0) + 1/2 x^T A x - b^T x
            let predicted = term.energy(&zero) + 0.5 * flat.dot(&(&a * &flat)) - b.dot(&flat);
            assert!((predicted - term.energy(&x)).abs() < 1e-10, "{} vs {}", predicted, term.energy(&x));
        }
    }

    #[test]
    fn test_tangent_last_point_uses_previous_edge() {
        let points = zigzag();
        let Some(SoftConstraint::Tangent(term)) = SoftConstraint::tangent(&points, 3, &Vec3::x(), 1e-5) else {
            panic!("expected a tangent term");
        };
        assert_eq!((term.i, term.j), (2, 3));
        assert!(SoftConstraint::tangent(&points, 0, &Vec3::zeros(), 1e-5).is_none());
    }

    #[test]
    fn test_residuals() {
        let c = HardConstraint::SelfIntersection {
            first: 0,
            last: 3,
            gap: Vec3::new(1.0, 0.0, 0.0),
        };
        let mut x = vec![Vec3::zeros(); 4];
        x[0] = Vec3::new(1.0, 0.0, 0.0);
        assert!(c.residual(&x) < 1e-12);
        assert_eq!(c.rows(), 3);
        let p = HardConstraint::Position {
            index: 2,
            displacement: Vec3::new(0.0, 2.0, 0.0),
        };
        assert!((p.residual(&x) - 2.0).abs() < 1e-12);
    }
}
