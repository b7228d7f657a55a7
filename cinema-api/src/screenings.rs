use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use cinema_booking::SeatDetails;
use cinema_core::{LockToken, Seat};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract;
use crate::middleware::Claims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LockSeatRequest {
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockSeatResponse {
    pub booking_id: Uuid,
    pub lock_id: LockToken,
    pub expires_in_seconds: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/screenings/{id}/lock", post(lock_seat))
        .route("/api/screenings/{id}/seats", get(seat_map))
        .route("/api/screenings/{id}/seats/{row}/{col}", get(seat))
        .route("/api/screenings/{id}/seat-details", get(seat_details))
}

async fn lock_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    extract::Path(screening_id): extract::Path<String>,
    extract::Json(req): extract::Json<LockSeatRequest>,
) -> Result<Json<LockSeatResponse>, AppError> {
    let reservation = state
        .bookings
        .reserve(&screening_id, req.row, req.col, &claims.sub)
        .await?;

    Ok(Json(LockSeatResponse {
        booking_id: reservation.booking_id,
        lock_id: reservation.lock.token,
        expires_in_seconds: reservation.lock.expires_in_seconds,
    }))
}

async fn seat_map(
    State(state): State<AppState>,
    extract::Path(screening_id): extract::Path<String>,
) -> Result<Json<Vec<Vec<Seat>>>, AppError> {
    Ok(Json(state.bookings.seat_map(&screening_id).await?))
}

async fn seat(
    State(state): State<AppState>,
    extract::Path((screening_id, row, col)): extract::Path<(String, u32, u32)>,
) -> Result<Json<Seat>, AppError> {
    let view = state.bookings.compute_seat_view(&screening_id, row, col).await?;
    Ok(Json(Seat::new(row, col, &view)))
}

async fn seat_details(
    State(state): State<AppState>,
    extract::Path(screening_id): extract::Path<String>,
) -> Result<Json<SeatDetails>, AppError> {
    Ok(Json(state.bookings.seat_details(&screening_id).await?))
}
