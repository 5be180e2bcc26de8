//! Raw stroke samples and their segmentation into G1 sections.
//!
//! A G1 section is a maximal run of samples without a corner. Short hooks
//! at either end of the stroke (the flick of the controller when the
//! trigger is pressed or released) are trimmed before segmentation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geometry::{Point3d, normalize_or_zero};

/// One recorded controller sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub position: Point3d,
    pub pressure: f64,
    /// Creation time in seconds.
    pub timestamp: f64,
}

impl Sample {
    pub fn new(position: Point3d, pressure: f64, timestamp: f64) -> Self {
        Self {
            position,
            pressure,
            timestamp,
        }
    }
}

/// Reasons a stroke is rejected before fitting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrokeRejection {
    #[error("Stroke has {count} samples, at least 2 are required")]
    TooFewSamples { count: usize },
    #[error("Stroke lasted {duration}s and moved {extent}, looks like an accidental click")]
    TooBrief { duration: f64, extent: f64 },
    #[error("Stroke extent {extent} is below the minimum size {min_size}")]
    TooSmall { extent: f64, min_size: f64 },
}

/// Thresholds for G1 segmentation.
#[derive(Debug, Clone, Copy)]
pub struct G1Config {
    /// Direction change (radians) that splits the stroke at a corner.
    pub corner_angle: f64,
    /// Direction change (radians) that marks the end of a hook.
    pub hook_angle: f64,
    pub min_section_length: f64,
    pub max_hook_length: f64,
    /// Hooks are also bounded by this share of the stroke length.
    pub max_hook_ratio: f64,
    /// Seconds trimmed at each end before segmentation.
    pub ablation_duration: f64,
}

impl Default for G1Config {
    fn default() -> Self {
        Self {
            corner_angle: std::f64::consts::FRAC_PI_4,
            hook_angle: std::f64::consts::FRAC_PI_6,
            min_section_length: 0.02,
            max_hook_length: 0.06,
            max_hook_ratio: 0.15,
            ablation_duration: 0.02,
        }
    }
}

/// Ordered samples of one stroke with their accumulated path length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeSamples {
    samples: Vec<Sample>,
    length: f64,
}

impl StrokeSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut stroke = Self::new();
        for s in samples {
            stroke.push(s);
        }
        stroke
    }

    pub fn push(&mut self, sample: Sample) {
        if let Some(last) = self.samples.last() {
            self.length += nalgebra::distance(&last.position, &sample.position);
        }
        self.samples.push(sample);
    }

    /// Whether a controller position is far enough from the last sample to
    /// be recorded.
    pub fn should_sample(&self, candidate: &Point3d, sampling_distance: f64) -> bool {
        self.samples
            .last()
            .is_none_or(|last| nalgebra::distance(&last.position, candidate) > sampling_distance)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Path length through all samples.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn duration(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Path length per second, 0 for strokes without duration.
    pub fn average_speed(&self) -> f64 {
        let time = self.duration();
        if self.samples.len() < 2 || time <= 1e-7 {
            return 0.0;
        }
        self.length / time
    }

    pub fn positions(&self) -> Vec<Point3d> {
        self.samples.iter().map(|s| s.position).collect()
    }

    pub fn pressures(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.pressure).collect()
    }

    /// Reject accidental clicks and strokes too small to beautify.
    pub fn validate(&self, min_duration: f64, min_size: f64) -> Result<(), StrokeRejection> {
        let [first, .., last] = self.samples.as_slice() else {
            return Err(StrokeRejection::TooFewSamples {
                count: self.samples.len(),
            });
        };

        let duration = last.timestamp - first.timestamp;
        let extent = nalgebra::distance(&first.position, &last.position);
        if duration < min_duration && extent < min_size {
            return Err(StrokeRejection::TooBrief { duration, extent });
        }

        let max_extent = self.samples[1..]
            .iter()
            .map(|s| nalgebra::distance(&first.position, &s.position))
            .fold(0.0, f64::max);
        if max_extent < min_size {
            return Err(StrokeRejection::TooSmall {
                extent: max_extent,
                min_size,
            });
        }
        Ok(())
    }

    /// Positions without the samples recorded during the first and last
    /// `ablation` seconds. The first and last samples are always kept.
    pub fn safe_points(&self, ablation: f64) -> Vec<Point3d> {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return Vec::new();
        };
        let (start, end) = (first.timestamp, last.timestamp);
        if start + ablation * 2.0 >= end {
            return self.positions();
        }

        self.samples
            .iter()
            .filter(|s| {
                s.timestamp == start
                    || s.timestamp == end
                    || (s.timestamp > start + ablation && s.timestamp < end - ablation)
            })
            .map(|s| s.position)
            .collect()
    }

    /// Split the stroke at corners into sections to be fitted independently.
    pub fn g1_sections(&self, config: &G1Config) -> Vec<Vec<Point3d>> {
        let mut points = self.safe_points(config.ablation_duration);
        if points.len() <= 4 {
            return vec![points];
        }

        let cos_corner = config.corner_angle.cos();
        let cos_hook = config.hook_angle.cos();
        let max_hook = config.max_hook_length.min(self.length * config.max_hook_ratio);
        let n = points.len();

        let mut walked = nalgebra::distance(&points[0], &points[1]);
        let mut start = 0;
        let mut i = 2;
        while walked < max_hook && i + 2 < n {
            walked += nalgebra::distance(&points[i], &points[i - 1]);
            if turn_cosine(&points, i) < cos_hook {
                start = i;
            }
            i += 1;
        }

        let mut walked = nalgebra::distance(&points[n - 1], &points[n - 2]);
        let mut end = n - 1;
        let mut i = n - 3;
        while walked < max_hook && i >= 2 {
            walked += nalgebra::distance(&points[i], &points[i + 1]);
            if turn_cosine(&points, i) < cos_hook {
                end = i;
            }
            i -= 1;
        }

        if end > start + 4 {
            if start > 0 || end < n - 1 {
                debug!(start, end, "trimmed stroke hooks");
            }
            points = points[start..=end].to_vec();
        }

        let n = points.len();
        let mut sections = Vec::new();
        let mut current = vec![points[0], points[1]];
        let mut current_length = nalgebra::distance(&points[0], &points[1]);

        for i in 2..n - 2 {
            current.push(points[i]);
            current_length += nalgebra::distance(&points[i], &points[i - 1]);

            if turn_cosine(&points, i) < cos_corner
                && current.len() >= 4
                && current_length > config.min_section_length
            {
                sections.push(std::mem::replace(&mut current, vec![points[i]]));
                current_length = 0.0;
            }
        }
        current.push(points[n - 2]);
        current.push(points[n - 1]);
        current_length += nalgebra::distance(&points[n - 2], &points[n - 1]);

        if sections.is_empty() || (current.len() >= 4 && current_length > config.min_section_length) {
            sections.push(current);
        }
        debug!(sections = sections.len(), "segmented stroke");
        sections
    }
}

/// Cosine of the smoothed direction change at interior point `i`.
fn turn_cosine(points: &[Point3d], i: usize) -> f64 {
    let incoming = (normalize_or_zero(&(points[i] - points[i - 2])) + normalize_or_zero(&(points[i] - points[i - 1]))) * 0.5;
    let outgoing = (normalize_or_zero(&(points[i + 2] - points[i])) + normalize_or_zero(&(points[i + 1] - points[i]))) * 0.5;
    incoming.dot(&outgoing)
}
