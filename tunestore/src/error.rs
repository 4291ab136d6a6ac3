//! Error types for the content store

use thiserror::Error;

/// Errors raised by a [`crate::ContentStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named file is not in the store
    #[error("File not found: {0}")]
    NotFound(String),

    /// The name is not a single safe path component
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised while resolving a `Range` header against a resource size
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    /// The header is not a single `bytes=start-end` expression
    #[error("Malformed range header: {0}")]
    Malformed(String),

    /// The range lies outside of the resource
    #[error("Range not satisfiable for a resource of {size} bytes")]
    Unsatisfiable { size: u64 },
}
