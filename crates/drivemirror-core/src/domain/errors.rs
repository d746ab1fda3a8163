//! Domain error types
//!
//! Validation failures for identifiers and paths, plus structural errors
//! raised by the namespace tree.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid drive-relative path
    #[error("Invalid drive path: {0}")]
    InvalidPath(String),

    /// Invalid checksum format (expected 32 hex digits)
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// Path is not within the configured mirror directory
    #[error("Path not within mirror directory: {0}")]
    PathNotInMirror(String),

    /// Attempted to attach a node under a parent the tree does not hold
    #[error("Parent {parent} not present in namespace tree (inserting {child})")]
    ParentMissing {
        /// The requested parent id
        parent: String,
        /// The node being inserted
        child: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
