use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cinema_core::BookingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Booking(#[from] BookingError),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Booking(err) => match err {
                BookingError::Conflict => (StatusCode::CONFLICT, "seat_conflict"),
                BookingError::LockExpired => (StatusCode::CONFLICT, "lock_expired"),
                BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
                BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                BookingError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                BookingError::AlreadyFinalized { .. } => (StatusCode::CONFLICT, "already_finalized"),
                BookingError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Booking(BookingError::Transient(err)) => {
                tracing::error!("Store failure: {}", err);
                "Service temporarily unavailable, retry later".to_string()
            }
            AppError::Booking(err) if err.is_routine() => {
                tracing::debug!("{}", err);
                err.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
