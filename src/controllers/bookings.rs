use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{Booking, HolderId};
use crate::services::Purchase;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_holder_bookings))
        .route("/bookings/{booking_id}", get(get_booking))
}

/* ---------- BOOKINGS ---------- */

// GET /api/bookings
async fn get_holder_bookings(
    State(state): State<Arc<AppState>>,
    holder: HolderId,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state.bookings.bookings_for(&holder).await?;
    Ok(Json(bookings))
}

// GET /api/bookings/{booking_id}
// Чужая бронь отдаётся как несуществующая
async fn get_booking(
    State(state): State<Arc<AppState>>,
    holder: HolderId,
    Path(booking_id): Path<String>,
) -> Result<Json<Purchase>, ApiError> {
    match state.bookings.booking(&booking_id).await? {
        Some(purchase) if purchase.booking.holder == holder => Ok(Json(purchase)),
        _ => Err(ApiError::not_found(format!("Бронь {} не найдена", booking_id))),
    }
}
