use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub status: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/bookings/confirm", post(confirm_booking))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    extract::Json(req): extract::Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let booking = state.bookings.confirm(req.booking_id, &claims.sub).await?;
    info!("Payment confirmed for booking {}", booking.id);

    Ok(Json(ConfirmResponse {
        status: "confirmed".to_string(),
    }))
}
