//! DriveMirror Drive - Google Drive REST adapter
//!
//! Implements the `IRemoteStore` port over the Drive v2 files API:
//! folder listing with pagination, metadata and multipart creation,
//! metadata patches, trash and media download.
//!
//! ## Modules
//!
//! - [`client`] - authenticated HTTP client and response classification
//! - [`provider`] - `IRemoteStore` implementation and wire DTOs

pub mod client;
pub mod provider;

use drivemirror_core::ports::StoreError;
use thiserror::Error;

/// Errors that can occur when talking to the Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// Access token missing, invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The requested file does not exist (or is not visible to the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A per-user rate limit or the project quota was hit
    #[error("Rate limited ({reason}): {message}")]
    RateLimited {
        /// Drive error reason, e.g. `userRateLimitExceeded`
        reason: String,
        message: String,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other 4xx
    #[error("Request rejected {status}: {message}")]
    Rejected { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<DriveError> for StoreError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::RateLimited { .. } => StoreError::RateLimited(err.to_string()),
            DriveError::NotFound(_) => StoreError::NotFound(err.to_string()),
            other => StoreError::Other(other.to_string()),
        }
    }
}
