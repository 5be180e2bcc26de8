//! Constrained curve fitting.
//!
//! Locates geometric constraints on a fitted poly-Bezier, searches for the
//! subset worth honoring and deforms the control points to satisfy it with
//! a Lagrange-multiplier least-squares solve.

pub mod candidate;
pub mod constraint;
pub mod energy;
pub mod solver;
pub mod split;
pub mod system;
pub mod terms;

pub use candidate::{ActiveSet, ConstraintCandidate, ScoreWeights};
pub use constraint::*;
pub use energy::{FidelityEnergy, FidelityWeights};
pub use solver::*;
pub use split::{SplitCurve, split_for_constraints};
pub use system::{SolveError, Solution, solve_displacements};
pub use terms::{EdgeTerm, G1Joint, HardConstraint, SoftConstraint};
