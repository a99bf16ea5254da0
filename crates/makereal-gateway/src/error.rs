//! Mapping of pipeline errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use makereal_core::error::MakeRealError;

/// Error returned by API handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError(pub MakeRealError);

impl From<MakeRealError> for ApiError {
    fn from(e: MakeRealError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MakeRealError::NothingSelected | MakeRealError::Json(_) | MakeRealError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            MakeRealError::ShapeNotFound(_) => StatusCode::NOT_FOUND,
            MakeRealError::GenerationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            MakeRealError::ProviderUnavailable(_) | MakeRealError::Provider(_) => {
                StatusCode::BAD_GATEWAY
            }
            MakeRealError::Export(_) | MakeRealError::Io(_) | MakeRealError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = ?self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use makereal_core::types::ShapeId;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(MakeRealError::NothingSelected).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(MakeRealError::ShapeNotFound(ShapeId::from("shape:x"))).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(MakeRealError::Provider("bad key...".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(MakeRealError::GenerationFailed).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
