//! Beautification thresholds.
//!
//! Distances are stored relative to the small distance, which itself
//! shrinks as the user zooms in: `small = default_small_distance / scale`.
//! Accessors return absolute values for the current zoom.

use serde::{Deserialize, Serialize};
use stroke_kernel::G1Config;
use stroke_solver::{FidelityWeights, ScoreWeights, SolverParams};

use crate::error::BeautifyError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeautifierParams {
    /// Base distance unit at zoom 1.
    pub default_small_distance: f64,
    /// User zoom factor.
    pub scale: f64,
    /// Angular proximity (radians).
    pub small_angle: f64,

    // Input sampling and pre-processing.
    pub min_sampling_distance: f64,
    pub min_stroke_size: f64,
    /// Seconds.
    pub min_stroke_action_time: f64,
    /// Seconds trimmed at each end of the stroke.
    pub samples_ablation_duration: f64,
    pub min_g1_section_length: f64,
    pub max_hook_section_length: f64,
    pub max_hook_section_stroke_ratio: f64,
    pub bezier_fitting_error: f64,
    pub rdp_error: f64,
    /// Corner threshold (radians).
    pub max_angular_variation_in_g1_section: f64,
    /// Lines must be drawn faster than `small / line_speed_window`.
    pub line_speed_window: f64,
    /// Largest relative path/chord length deviation of a line.
    pub line_straightness_tolerance: f64,

    // Constraint detection.
    pub proximity_threshold: f64,
    pub merge_constraints_threshold: f64,
    pub snap_to_existing_node_threshold: f64,
    pub intersection_search_steps: usize,

    // Projection on mirror and surfaces.
    pub project_to_mirror_distance_threshold: f64,
    pub project_on_surface: bool,
    pub project_to_surface_distance_threshold: f64,

    // Constrained fit.
    pub mu_fidelity: f64,
    pub min_distance_between_anchors: f64,
    pub max_beziers_for_solver: usize,
    pub position_weight: f64,
    pub tangent_weight: f64,
    pub score_weights: ScoreWeights,
}

impl Default for BeautifierParams {
    fn default() -> Self {
        Self {
            default_small_distance: 0.02,
            scale: 1.0,
            small_angle: std::f64::consts::FRAC_PI_6,
            min_sampling_distance: 0.1,
            min_stroke_size: 0.5,
            min_stroke_action_time: 0.2,
            samples_ablation_duration: 0.02,
            min_g1_section_length: 1.0,
            max_hook_section_length: 3.0,
            max_hook_section_stroke_ratio: 0.15,
            bezier_fitting_error: 0.5,
            rdp_error: 0.1,
            max_angular_variation_in_g1_section: std::f64::consts::FRAC_PI_4,
            line_speed_window: 0.05,
            line_straightness_tolerance: 0.02,
            proximity_threshold: 2.0,
            merge_constraints_threshold: 0.5,
            snap_to_existing_node_threshold: 1.0,
            intersection_search_steps: 5,
            project_to_mirror_distance_threshold: 1.25,
            project_on_surface: true,
            project_to_surface_distance_threshold: 2.5,
            mu_fidelity: 0.6,
            min_distance_between_anchors: 1.0,
            max_beziers_for_solver: 15,
            position_weight: 0.5,
            tangent_weight: 0.5,
            score_weights: ScoreWeights::default(),
        }
    }
}

impl BeautifierParams {
    pub fn from_json(json: &str) -> Result<Self, BeautifyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, BeautifyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Same thresholds at another zoom level.
    pub fn with_scale(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    pub fn small_distance(&self) -> f64 {
        self.default_small_distance / self.scale
    }

    pub fn min_sampling_distance(&self) -> f64 {
        self.small_distance() * self.min_sampling_distance
    }

    pub fn min_stroke_size(&self) -> f64 {
        self.small_distance() * self.min_stroke_size
    }

    pub fn min_g1_section_length(&self) -> f64 {
        self.small_distance() * self.min_g1_section_length
    }

    pub fn max_hook_section_length(&self) -> f64 {
        self.small_distance() * self.max_hook_section_length
    }

    pub fn bezier_fitting_error(&self) -> f64 {
        self.small_distance() * self.bezier_fitting_error
    }

    pub fn rdp_error(&self) -> f64 {
        self.small_distance() * self.rdp_error
    }

    /// Average drawing speed above which a straight stroke becomes a line.
    pub fn line_drawing_speed(&self) -> f64 {
        self.small_distance() / self.line_speed_window
    }

    pub fn proximity_threshold(&self) -> f64 {
        self.small_distance() * self.proximity_threshold
    }

    /// Proximity threshold at zoom 1.
    pub fn default_scale_proximity_threshold(&self) -> f64 {
        self.default_small_distance * self.proximity_threshold
    }

    pub fn merge_constraints_threshold(&self) -> f64 {
        self.small_distance() * self.merge_constraints_threshold
    }

    pub fn snap_to_existing_node_threshold(&self) -> f64 {
        self.small_distance() * self.snap_to_existing_node_threshold
    }

    pub fn project_to_mirror_distance_threshold(&self) -> f64 {
        self.small_distance() * self.project_to_mirror_distance_threshold
    }

    pub fn project_to_surface_distance_threshold(&self) -> f64 {
        self.small_distance() * self.project_to_surface_distance_threshold
    }

    pub fn min_distance_between_anchors(&self) -> f64 {
        self.small_distance() * self.min_distance_between_anchors
    }

    /// Distance under which a point already lies on a plane or patch.
    pub fn on_target_tolerance(&self) -> f64 {
        self.small_distance() * 0.1
    }

    pub fn g1_config(&self) -> G1Config {
        G1Config {
            corner_angle: self.max_angular_variation_in_g1_section,
            hook_angle: self.small_angle,
            min_section_length: self.min_g1_section_length(),
            max_hook_length: self.max_hook_section_length(),
            max_hook_ratio: self.max_hook_section_stroke_ratio,
            ablation_duration: self.samples_ablation_duration,
        }
    }

    pub fn solver_params(&self) -> SolverParams {
        SolverParams {
            mu_fidelity: self.mu_fidelity,
            proximity_threshold: self.proximity_threshold(),
            angular_threshold: self.small_angle,
            min_distance_between_anchors: self.min_distance_between_anchors(),
            fidelity: FidelityWeights {
                position: self.position_weight,
                tangent: self.tangent_weight,
            },
            score_weights: self.score_weights,
            ..SolverParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distances_scale_with_zoom() {
        let params = BeautifierParams::default();
        assert!((params.small_distance() - 0.02).abs() < 1e-12);
        assert!((params.proximity_threshold() - 0.04).abs() < 1e-12);
        assert!((params.line_drawing_speed() - 0.4).abs() < 1e-12);

        let zoomed = params.with_scale(2.0);
        assert!((zoomed.small_distance() - 0.01).abs() < 1e-12);
        assert!((zoomed.proximity_threshold() - 0.02).abs() < 1e-12);
        assert!((zoomed.default_scale_proximity_threshold() - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params = BeautifierParams::from_json(r#"{ "mu_fidelity": 0.9, "scale": 4.0 }"#).unwrap();
        assert_eq!(params.mu_fidelity, 0.9);
        assert_eq!(params.max_beziers_for_solver, 15);
        assert!((params.min_distance_between_anchors() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn test_bad_json_is_a_config_error() {
        let err = BeautifierParams::from_json("{ \"scale\": \"big\" }").unwrap_err();
        assert!(matches!(err, BeautifyError::ConfigError(_)));
    }

    #[test]
    fn test_solver_params_are_absolute() {
        let solver = BeautifierParams::default().with_scale(0.5).solver_params();
        assert!((solver.proximity_threshold - 0.08).abs() < 1e-12);
        assert!((solver.min_distance_between_anchors - 0.04).abs() < 1e-12);
        assert_eq!(solver.eps, SolverParams::default().eps);
        let g1 = BeautifierParams::default().g1_config();
        assert!((g1.max_hook_length - 0.06).abs() < 1e-12);
    }
}
