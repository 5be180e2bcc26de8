//! The stroke being drawn and the constraints detected along it.

use serde::{Deserialize, Serialize};
use stroke_kernel::{Point3d, Sample, StrokeRejection, StrokeSamples};
use stroke_solver::{Constraint, PatchId, SurfaceConstraint};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputStroke {
    samples: StrokeSamples,
    constraints: Vec<Constraint>,
    surface_constraints: Vec<SurfaceConstraint>,
}

impl InputStroke {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            samples: StrokeSamples::from_samples(samples),
            ..Self::default()
        }
    }

    pub fn push_sample(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &StrokeSamples {
        &self.samples
    }

    /// Constraints in the order they were met while drawing.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn surface_constraints(&self) -> &[SurfaceConstraint] {
        &self.surface_constraints
    }

    pub fn validate(&self, min_duration: f64, min_size: f64) -> Result<(), StrokeRejection> {
        self.samples.validate(min_duration, min_size)
    }

    /// Record a constraint, merging it with the previous one when both are
    /// within `merge_threshold`.
    ///
    /// Of two nearby constraints the new one wins, unless the old one is an
    /// intersection and the new one is not, or the old one sits on a node
    /// and the new one does not.
    pub fn add_constraint(&mut self, constraint: Constraint, merge_threshold: f64) {
        if let Constraint::Surface(surface) = constraint {
            self.enter_surface(surface.patch, surface.start_position);
            if let Some(exit) = surface.exit_position {
                self.leave_surface(surface.patch, exit);
            }
            return;
        }

        if let Some(old) = self.constraints.last() {
            let distance = nalgebra::distance(&old.position(), &constraint.position());
            if distance < merge_threshold {
                let keep_old = match (old, &constraint) {
                    (Constraint::Intersection(_), c) if !c.is_intersection() => true,
                    (Constraint::Intersection(o), Constraint::Intersection(c)) => o.at_node && !c.at_node,
                    _ => false,
                };
                if keep_old {
                    debug!(distance, "dropping redundant constraint");
                    return;
                }
                self.constraints.pop();
            } else if distance < 2.0 * merge_threshold && old.is_mirror() && constraint.is_mirror() {
                self.constraints.pop();
            }
        }
        self.constraints.push(constraint);
    }

    /// The stroke entered `patch` at `position`. Re-entering the patch it
    /// is still drawing on is ignored.
    pub fn enter_surface(&mut self, patch: PatchId, position: Point3d) {
        if self
            .surface_constraints
            .last()
            .is_some_and(|s| s.patch == patch && !s.left_mid_stroke())
        {
            return;
        }
        self.surface_constraints.push(SurfaceConstraint::new(patch, position));
    }

    /// The stroke left `patch` at `position`.
    pub fn leave_surface(&mut self, patch: PatchId, position: Point3d) {
        if let Some(last) = self.surface_constraints.last_mut().filter(|s| s.patch == patch) {
            last.leave(position);
        }
    }
}
