use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::{validated, MAX_SEATS_PER_REQUEST};
use crate::engine::HeldSeat;
use crate::error::ApiError;
use crate::models::{HolderId, PaymentOutcome, SeatRef};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows/{show_id}/hold", post(hold_seats))
        .route("/shows/{show_id}/release", post(release_seats))
        .route("/shows/{show_id}/purchase", post(purchase_seats))
}

/* ---------- HOLD ---------- */

// POST /api/shows/{show_id}/hold
#[derive(Debug, Deserialize, Validate)]
pub struct HoldRequest {
    #[validate(length(min = 1, max = MAX_SEATS_PER_REQUEST))]
    pub seats: Vec<SeatRef>,
}

#[derive(Debug, Serialize)]
struct HoldResponse {
    show_id: i64,
    expires_at: DateTime<Utc>,
    seats: Vec<HeldSeat>,
    subtotal: i64,
}

async fn hold_seats(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    holder: HolderId,
    Json(req): Json<HoldRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = validated(req)?;
    let ttl = state.config.reservation.hold_ttl();

    let held = state.engine.hold(show_id, &req.seats, &holder, ttl).await?;
    let subtotal = held.total();

    Ok(Json(HoldResponse {
        show_id,
        expires_at: held.expires_at,
        seats: held.seats,
        subtotal,
    }))
}

/* ---------- RELEASE ---------- */

// POST /api/shows/{show_id}/release
#[derive(Debug, Deserialize, Validate)]
pub struct ReleaseRequest {
    #[validate(length(max = MAX_SEATS_PER_REQUEST))]
    pub seats: Vec<SeatRef>,
}

#[derive(Debug, Serialize)]
struct ReleaseResponse {
    released: usize,
}

async fn release_seats(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    holder: HolderId,
    Json(req): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = validated(req)?;
    let released = state.engine.release(show_id, &req.seats, &holder).await?;
    Ok(Json(ReleaseResponse { released }))
}

/* ---------- PURCHASE ---------- */

// POST /api/shows/{show_id}/purchase
#[derive(Debug, Deserialize, Validate)]
pub struct PurchaseRequest {
    #[validate(length(min = 1, max = MAX_SEATS_PER_REQUEST))]
    pub seats: Vec<SeatRef>,
    pub payment: PaymentOutcome,
}

#[derive(Debug, Serialize)]
struct PurchaseResponse {
    booking_id: String,
    ticket_ids: Vec<String>,
    subtotal: i64,
    convenience_fee: i64,
    total: i64,
}

async fn purchase_seats(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    holder: HolderId,
    Json(req): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = validated(req)?;
    let purchase = state
        .bookings
        .purchase(show_id, &req.seats, &holder, req.payment)
        .await?;

    let booking = purchase.booking;
    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            booking_id: booking.booking_id,
            ticket_ids: purchase.tickets.into_iter().map(|t| t.ticket_id).collect(),
            subtotal: booking.subtotal,
            convenience_fee: booking.convenience_fee,
            total: booking.total,
        }),
    ))
}
