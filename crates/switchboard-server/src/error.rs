use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use switchboard_bus::BusError;
use switchboard_shared::ProtocolError;
use switchboard_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Courier error: {0}")]
    Bus(#[from] BusError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::UnknownSession(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) | ServerError::Protocol(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Store(StoreError::InvalidTransition(_)) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ServerError::Bus(BusError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            ServerError::Store(_) | ServerError::Bus(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
