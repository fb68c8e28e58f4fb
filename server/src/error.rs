//! Transport-level failures.
//!
//! Tool and file operations report their failures in an `OpResult` body with
//! status 200. Only requests the server cannot act on at all end up here.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use quire_config::SettingsError;
use quire_engine::TurnError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Turn(
                TurnError::UnknownModel(_)
                | TurnError::MissingApiKey(_)
                | TurnError::EmptyConversation,
            )
            | Self::Settings(SettingsError::Invalid(_))
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Turn(TurnError::PermissionPending) => StatusCode::CONFLICT,
            Self::Turn(TurnError::Provider(_)) => StatusCode::BAD_GATEWAY,
            Self::Settings(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {self}");
        }
        let body = serde_json::json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::http::StatusCode;
    use quire_config::SettingsError;
    use quire_engine::TurnError;
    use quire_types::Provider;

    #[test]
    fn request_errors_are_bad_requests() {
        for err in [
            ApiError::Turn(TurnError::UnknownModel("gpt-2".into())),
            ApiError::Turn(TurnError::MissingApiKey(Provider::Gemini)),
            ApiError::Settings(SettingsError::Invalid("root must be absolute".into())),
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{err}");
        }
        assert_eq!(
            ApiError::Internal("join".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
