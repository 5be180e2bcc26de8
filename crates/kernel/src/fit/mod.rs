//! Polyline simplification and least-squares Bezier fitting.

mod bezier_fit;
mod rdp;

pub use bezier_fit::fit_curve;
pub use rdp::simplify;
