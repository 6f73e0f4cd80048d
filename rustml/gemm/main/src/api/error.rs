use rustml_core::CoreError;
use thiserror::Error;

pub type GemmResult<T> = Result<T, GemmError>;

#[derive(Debug, Error)]
pub enum GemmError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Dimension {dim} exceeds the packable maximum {max}")]
    DimensionTooLarge { dim: usize, max: usize },

    #[error("Buffer too small for {what}: need {required}, got {actual}")]
    BufferTooSmall { what: &'static str, required: usize, actual: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[error("Packed layout error: {0}")]
    PackedLayout(String),
}
