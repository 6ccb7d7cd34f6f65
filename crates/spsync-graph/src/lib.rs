//! spsync Graph - Microsoft Graph adapter for SharePoint document libraries
//!
//! Provides the async client and the [`IRemoteLibrary`] implementation used
//! by the sync engine:
//! - App-only authentication (OAuth2 client credentials)
//! - Transport retry for 429, 5xx, 409 and network errors
//! - Throttle telemetry from SharePoint response headers
//! - Site, list and drive resolution
//! - Fingerprint column management and field-name resolution
//! - Existence probes, folder operations, simple and resumable uploads
//! - Single and `$batch` fingerprint writes
//!
//! ## Modules
//!
//! - [`auth`] - Access token sources
//! - [`client`] - Microsoft Graph API HTTP client with transport retry
//! - [`rate_limit`] - Throttle telemetry monitor
//! - [`site`] - Site, library and drive resolution
//! - [`columns`] - Custom column capability manager
//! - [`probe`] - Remote item lookup with custom fields
//! - [`items`] - Folder listing, creation and deletion
//! - [`upload`] - File upload operations (small and resumable)
//! - [`batch`] - Fingerprint write-back
//! - [`provider`] - `GraphLibrary`, the `IRemoteLibrary` implementation
//!
//! [`IRemoteLibrary`]: spsync_core::ports::IRemoteLibrary

pub mod auth;
pub mod batch;
pub mod client;
pub mod columns;
pub mod items;
pub mod probe;
pub mod provider;
pub mod rate_limit;
pub mod site;
pub mod upload;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict was detected (e.g., an item with the same name)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded and the retry budget is spent
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration the server asked for on the last response
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The token endpoint refused to issue an access token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Maps a non-success status and body to the matching variant.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 => Self::Unauthorized(body),
            403 => Self::Forbidden(body),
            404 => Self::NotFound(body),
            409 => Self::Conflict(body),
            500..=599 => Self::ServerError(format!("{status}: {body}")),
            _ => Self::InvalidResponse(format!("{status}: {body}")),
        }
    }
}

/// Reads an error response into a [`GraphError`].
pub(crate) async fn error_from_response(response: reqwest::Response) -> GraphError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    GraphError::from_status(status, body)
}

/// Percent-encodes one path segment for use in a Graph item-by-path URL.
pub(crate) fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
