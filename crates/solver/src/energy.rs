//! Fidelity energy: keeps the solved curve close to the fitted one.
//!
//! With displacements `x_i` of the `N` control points `B_i`:
//!
//! ```text
//! E = p * sum |x_i|^2 + t * sum |x_i - x_{i+1}|^2 / |B_i - B_{i+1}|^2
//! p = w_p / (N * r^2),  t = w_t / (N - 1)
//! ```
//!
//! where `r` normalizes displacements (the proximity threshold). Polygon
//! edges shorter than the coincidence tolerance carry no tangent term.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use stroke_kernel::{Point3d, Vec3};

/// Relative weights of the two fidelity terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FidelityWeights {
    pub position: f64,
    pub tangent: f64,
}

impl Default for FidelityWeights {
    fn default() -> Self {
        Self {
            position: 0.5,
            tangent: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FidelityEnergy {
    position_factor: f64,
    tangent_factor: f64,
    /// Squared control polygon edge lengths; `None` for skipped edges.
    edge_norms: Vec<Option<f64>>,
}

impl FidelityEnergy {
    pub fn new(control_points: &[Point3d], weights: &FidelityWeights, normalizer: f64, eps: f64) -> Self {
        let n = control_points.len() as f64;
        let edge_norms = control_points
            .windows(2)
            .map(|w| {
                let d = (w[0] - w[1]).norm_squared();
                (d > eps).then_some(d)
            })
            .collect();
        Self {
            position_factor: weights.position / n / (normalizer * normalizer),
            tangent_factor: weights.tangent / (n - 1.0),
            edge_norms,
        }
    }

    /// Number of scalar unknowns.
    pub fn dimension(&self) -> usize {
        3 * (self.edge_norms.len() + 1)
    }

    /// Add the (constant) Hessian to the top-left block of `a`.
    pub fn add_hessian(&self, a: &mut DMatrix<f64>) {
        let count = self.edge_norms.len() + 1;
        for i in 0..count {
            for k in 0..3 {
                a[(3 * i + k, 3 * i + k)] += 2.0 * self.position_factor;
            }
        }
        for (i, norm) in self.edge_norms.iter().enumerate() {
            let Some(norm) = norm else { continue };
            let c = 2.0 * self.tangent_factor / norm;
            for k in 0..3 {
                let (r, s) = (3 * i + k, 3 * (i + 1) + k);
                a[(r, r)] += c;
                a[(s, s)] += c;
                a[(r, s)] -= c;
                a[(s, r)] -= c;
            }
        }
    }

    pub fn energy(&self, displacements: &[Vec3]) -> f64 {
        let position: f64 = displacements.iter().map(|x| x.norm_squared()).sum();
        let tangent: f64 = self
            .edge_norms
            .iter()
            .zip(displacements.windows(2))
            .filter_map(|(norm, w)| norm.map(|n| (w[0] - w[1]).norm_squared() / n))
            .sum();
        self.position_factor * position + self.tangent_factor * tangent
    }
}
