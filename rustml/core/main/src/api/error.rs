//! Error types for core operations

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by shape handling and runtime configuration
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Shape overflow: element count of {dims:?} does not fit in usize")]
    ShapeOverflow { dims: Vec<usize> },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
