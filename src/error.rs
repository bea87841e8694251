//! Error taxonomy surfaced at the crate boundary.
//!
//! Input-driven failures (unknown index, bad dimension, ...) are always
//! returned as `Result`, never panics. Internal invariant violations inside
//! a container or engine are programming defects and use `debug_assert!`/
//! `panic!` on the hot paths that would otherwise silently corrupt state.

use thiserror::Error;

/// Errors surfaced by [`crate::VectorDb`] and [`crate::IndexManager`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorDbError {
    #[error("index not found: {0}")]
    NotFound(String),

    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid index spec: {0}")]
    InvalidSpec(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VectorDbError>;

/// Errors internal to an engine's `build`/`search` body.
///
/// Never crosses the public boundary directly — [`crate::manager::IndexManager`]
/// maps it onto [`VectorDbError`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine build cancelled")]
    Cancelled,

    #[error("engine dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<EngineError> for VectorDbError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => VectorDbError::Cancelled,
            EngineError::DimensionMismatch { expected, actual } => {
                VectorDbError::DimensionMismatch { expected, actual }
            }
        }
    }
}
