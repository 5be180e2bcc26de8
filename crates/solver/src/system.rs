//! Saddle-point assembly and solve.
//!
//! Minimizes the fidelity energy plus soft penalties subject to the hard
//! equations `C x = d`:
//!
//! ```text
//! [ A  C^T ] [ x ]   [ b ]
//! [ C   0  ] [ l ] = [ d ]
//! ```
//!
//! assembled into a single dense buffer. Without hard rows the system
//! reduces to `A x = b`.

use nalgebra::{DMatrix, DVector};
use stroke_kernel::{Point3d, Vec3};
use thiserror::Error;
use tracing::debug;

use crate::energy::FidelityEnergy;
use crate::terms::{HardConstraint, SoftConstraint};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("Saddle-point system of size {size} is singular")]
    Singular { size: usize },
    #[error("Solution contains non-finite values")]
    NonFinite,
}

/// Displacements minimizing the energy and the fidelity energy they reach.
#[derive(Debug, Clone)]
pub struct Solution {
    pub displacements: Vec<Vec3>,
    pub fidelity_energy: f64,
}

impl Solution {
    /// `points` moved by the displacements.
    pub fn apply(&self, points: &[Point3d]) -> Vec<Point3d> {
        points.iter().zip(&self.displacements).map(|(p, x)| p + x).collect()
    }
}

pub fn solve_displacements(
    point_count: usize,
    fidelity: &FidelityEnergy,
    hard: &[HardConstraint],
    soft: &[SoftConstraint],
) -> Result<Solution, SolveError> {
    if hard.is_empty() && soft.is_empty() {
        return Ok(Solution {
            displacements: vec![Vec3::zeros(); point_count],
            fidelity_energy: 0.0,
        });
    }

    let n = 3 * point_count;
    let m: usize = hard.iter().map(HardConstraint::rows).sum();
    let size = n + m;

    let mut kkt = DMatrix::zeros(size, size);
    let mut rhs = DVector::zeros(size);

    fidelity.add_hessian(&mut kkt);
    for term in soft {
        term.accumulate(&mut kkt, &mut rhs);
    }
    let mut row = n;
    for constraint in hard {
        constraint.write(&mut kkt, &mut rhs, row);
        row += constraint.rows();
    }
    debug!(unknowns = n, hard_rows = m, soft_terms = soft.len(), "assembled saddle-point system");

    let solution = kkt.lu().solve(&rhs).ok_or(SolveError::Singular { size })?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }

    let displacements: Vec<Vec3> = (0..point_count)
        .map(|i| Vec3::new(solution[3 * i], solution[3 * i + 1], solution[3 * i + 2]))
        .collect();
    let fidelity_energy = fidelity.energy(&displacements);
    Ok(Solution {
        displacements,
        fidelity_energy,
    })
}
