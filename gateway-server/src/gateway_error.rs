//! HTTP-boundary error mapping (§7). Every [`GatewayError`] the core
//! produces converts here into a `{detail: "..."}` JSON body with the
//! status code the error table prescribes; no internal detail (stack
//! traces, SQL text) ever leaks past this boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::{GatewayError, ProviderError};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Wraps a [`GatewayError`] so it can be returned directly from an axum
/// handler via `Result<_, ApiError>`.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = status_and_detail(&self.0);
        if status.is_server_error() {
            tracing::error!("gateway error: {}", self.0);
        } else {
            tracing::warn!("gateway error: {}", self.0);
        }
        (status, Json(ErrorBody { detail })).into_response()
    }
}

fn status_and_detail(err: &GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        GatewayError::BackupMissing { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        GatewayError::Conflict { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        GatewayError::ValidationError { .. } => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        GatewayError::RouteValidationError { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        GatewayError::RouteInactive { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        GatewayError::NoActiveProvider { .. }
        | GatewayError::NoModelsAvailable { .. }
        | GatewayError::ModelNotFound { .. }
        | GatewayError::RouteServiceError { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        GatewayError::DecryptionFailed => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal encryption error".to_string(),
        ),
        GatewayError::Provider(provider_err) => provider_status_and_detail(provider_err),
        GatewayError::Database(_) | GatewayError::Serialization(_) | GatewayError::Io(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
        GatewayError::Http(_) => (
            StatusCode::BAD_GATEWAY,
            "upstream transport error".to_string(),
        ),
    }
}

/// §7: 4xx from a provider passes through as-is; 5xx/transport surfaces as
/// 502 once the pipeline's retry envelope is exhausted (the pipeline itself
/// only reaches this conversion after retries are spent).
fn provider_status_and_detail(err: &ProviderError) -> (StatusCode, String) {
    match err.status_code() {
        Some(status @ 400..=499) => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
            (code, err.to_string())
        }
        _ => (StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = GatewayError::NotFound {
            resource: "route".to_string(),
            id: "r".to_string(),
        };
        assert_eq!(status_and_detail(&err).0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_4xx_passes_through_status() {
        let err = GatewayError::Provider(ProviderError::Http {
            status: 401,
            message: "bad key".to_string(),
        });
        assert_eq!(status_and_detail(&err).0, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn provider_5xx_becomes_502() {
        let err = GatewayError::Provider(ProviderError::Http {
            status: 503,
            message: "down".to_string(),
        });
        assert_eq!(status_and_detail(&err).0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn decryption_failure_is_internal_error() {
        assert_eq!(
            status_and_detail(&GatewayError::DecryptionFailed).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
