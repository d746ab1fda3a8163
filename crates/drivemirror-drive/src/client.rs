//! Google Drive API client
//!
//! A thin authenticated wrapper around `reqwest::Client`: builds request URLs
//! from a base URL, attaches the bearer token, and turns error responses into
//! classified [`DriveError`]s.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use drivemirror_drive::client::DriveClient;
//! use drivemirror_drive::provider::DriveRemoteStore;
//!
//! let client = DriveClient::new("access-token-here");
//! let store = DriveRemoteStore::new(client);
//! ```

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::DriveError;

/// Production endpoint
const DRIVE_BASE_URL: &str = "https://www.googleapis.com";

/// Error reasons Drive uses for throttling, returned with 403 or 429
const RATE_LIMIT_REASONS: &[&str] = &[
    "userRateLimitExceeded",
    "rateLimitExceeded",
    "quotaExceeded",
    "dailyLimitExceeded",
];

// ============================================================================
// Error body
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Drive API calls
pub struct DriveClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl DriveClient {
    /// Client against the production endpoint
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DRIVE_BASE_URL)
    }

    /// Client against a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Replace the underlying client with one enforcing a per-request timeout
    ///
    /// # Errors
    /// Fails if the TLS backend cannot be initialised.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, DriveError> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Authenticated request builder for `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
    }

    /// Send `request`, classify error statuses and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DriveError> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| DriveError::InvalidResponse(e.to_string()))
    }

    /// Send `request` and classify error statuses, returning the raw response
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, DriveError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(classify_error(response).await)
    }
}

/// Map a non-success response to a [`DriveError`]
async fn classify_error(response: Response) -> DriveError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let (message, reason) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let reason = envelope
                .error
                .errors
                .into_iter()
                .next()
                .map(|d| d.reason)
                .unwrap_or_default();
            (envelope.error.message, reason)
        }
        Err(_) => (body, String::new()),
    };

    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && RATE_LIMIT_REASONS.contains(&reason.as_str()));

    if throttled {
        warn!(status = status.as_u16(), reason = %reason, "Drive request throttled");
        return DriveError::RateLimited { reason, message };
    }

    match status {
        StatusCode::NOT_FOUND => DriveError::NotFound(message),
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        s if s.is_server_error() => DriveError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => DriveError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}
