use stroke_kernel::StrokeRejection;
use thiserror::Error;

/// Errors surfaced by the beautifier.
///
/// Geometric trouble during beautification is not an error: the stroke
/// falls back to its unconstrained fit and the outcome flags say so.
#[derive(Debug, Error)]
pub enum BeautifyError {
    #[error("Invalid stroke: {0}")]
    InvalidStroke(#[from] StrokeRejection),
    #[error("Invalid parameters: {0}")]
    ConfigError(#[from] serde_json::Error),
}
