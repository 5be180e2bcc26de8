//! Stroke beautification.
//!
//! Turns a freshly drawn stroke into a clean line or poly-Bezier that snaps
//! onto the curves already in the scene, closes accidental loops, and lands
//! on mirror planes and surface patches when it was drawn close to them.

pub mod beautifier;
pub mod correction;
pub mod error;
pub mod input;
pub mod line;
pub mod network;
pub mod params;
pub mod projection;

pub use beautifier::{BeautifyOptions, BeautifyOutcome, Beautifier};
pub use correction::{OverlapThresholds, Trimmed, correct_intersections, trim_overlaps};
pub use error::BeautifyError;
pub use input::InputStroke;
pub use line::{LineConstraints, constrain_line};
pub use network::{CurveNetwork, NetworkNode, NoSurfaces, PlacedStroke, StrokeNetwork, SurfacePatches};
pub use params::BeautifierParams;
pub use projection::{SurfaceThresholds, project_on_mirror, project_on_surfaces};
