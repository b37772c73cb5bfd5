//! Error types for the gateway core.
//!
//! Two layers: [`ProviderError`] covers a single upstream call (transport
//! failure vs. an HTTP status the provider itself returned), and
//! [`GatewayError`] covers everything above that — routing, persistence,
//! encryption, validation. [`ProviderError`] converts into [`GatewayError`]
//! via `#[from]` so pipeline code can use `?` across both layers.

use thiserror::Error;

/// Errors from a single call to a provider adapter.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP client itself failed (DNS, connect, TLS, timeout) — no
    /// response was ever received.
    #[error("transport error calling provider: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status. `status` drives the
    /// pipeline's abort-on-4xx / continue-on-5xx retry rule (§4.F).
    #[error("provider returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The provider's response body didn't parse into the shape the adapter
    /// expected.
    #[error("failed to parse provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// §4.F: 4xx is treated as non-retryable (request itself is bad),
    /// everything else (5xx, transport failures) is retried against the
    /// next candidate node.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.status_code(), Some(400..=499))
    }
}

/// Top-level gateway error, mapped to an HTTP response by
/// `gateway-server`'s `IntoResponse` impl (§7).
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("{resource} '{name}' already exists")]
    Conflict { resource: String, name: String },

    #[error("validation failed for field '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("route '{route}' is not active")]
    RouteInactive { route: String },

    #[error("no active provider available for route '{route}'")]
    NoActiveProvider { route: String },

    #[error("no models available for route '{route}'")]
    NoModelsAvailable { route: String },

    #[error("model '{model}' not found on route '{route}'")]
    ModelNotFound { route: String, model: String },

    #[error("failed to decrypt stored credential")]
    DecryptionFailed,

    #[error("backup file missing or unreadable: {path}")]
    BackupMissing { path: String },

    #[error("routing service error: {message}")]
    RouteServiceError { message: String },

    #[error("route validation error: {message}")]
    RouteValidationError { message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
