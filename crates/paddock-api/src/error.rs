use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use paddock_db::StoreError;

/// Run a blocking store call off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("task join error")
        })?
        .map_err(ApiError::from)
}

/// HTTP wrapper for the store's typed errors. The denial reasons stay
/// granular all the way to the wire so the client can tell the user what
/// to do next instead of rendering a generic "forbidden".
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn internal(context: &'static str) -> Self {
        Self(StoreError::Db(anyhow::anyhow!(context)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            StoreError::UserNotFound
            | StoreError::ConnectionNotFound
            | StoreError::MessageNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": "NotFound", "detail": self.0.to_string() }),
            ),
            StoreError::SelfConnection => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "SelfConnection", "detail": self.0.to_string() }),
            ),
            StoreError::InvalidInput(detail) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "InvalidInput", "detail": detail }),
            ),
            StoreError::AlreadyExists { status } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "AlreadyExists",
                    "detail": self.0.to_string(),
                    "status": status,
                }),
            ),
            StoreError::RoleMismatch => (
                StatusCode::FORBIDDEN,
                json!({ "error": "RoleMismatch", "detail": self.0.to_string() }),
            ),
            StoreError::MessagingNotAllowed(reason) => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": "MessagingNotAllowed",
                    "reason": reason.as_str(),
                    "detail": reason.detail(),
                }),
            ),
            StoreError::Unauthorized => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Unauthorized", "detail": self.0.to_string() }),
            ),
            StoreError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Forbidden", "detail": self.0.to_string() }),
            ),
            StoreError::Db(e) => {
                error!("Store error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal", "detail": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
