use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::{Validate, ValidationError};

use super::validated;
use crate::error::ApiError;
use crate::models::{HolderId, Seat, SeatRef, Show};
use crate::seat_map::{SeatLayout, MAX_ROWS, MAX_SEATS_PER_ROW, MAX_SEATS_PER_SHOW, MAX_SEAT_PRICE};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shows", post(configure_show).get(list_shows))
        .route("/shows/{show_id}/seats", get(list_seats))
        .route("/shows/{show_id}/seats/{seat}/price", patch(correct_price))
        .route("/shows/{show_id}/availability", get(availability))
}

fn default_active() -> bool {
    true
}

/* ---------- SHOWS ---------- */

// POST /api/shows
#[derive(Debug, Deserialize, Validate)]
pub struct ConfigureShowRequest {
    #[validate(range(min = 1))]
    pub id: i64,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub show_date: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    #[validate(range(min = 0, max = MAX_SEAT_PRICE))]
    pub base_price: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[validate(custom(function = layout_within_limits))]
    pub layout: SeatLayout,
}

fn layout_within_limits(layout: &SeatLayout) -> Result<(), ValidationError> {
    let price_ok = |price: i64| (0..=MAX_SEAT_PRICE).contains(&price);
    let within = layout.seat_count().is_some_and(|n| n <= MAX_SEATS_PER_SHOW)
        && match layout {
            SeatLayout::Rows { rows, seats_per_row, tiers } => {
                rows.len() <= MAX_ROWS
                    && (1..=MAX_SEATS_PER_ROW).contains(seats_per_row)
                    && tiers.iter().all(|t| price_ok(t.price))
            }
            SeatLayout::Explicit { seats } => seats.iter().all(|s| price_ok(s.price)),
        };
    if within {
        Ok(())
    } else {
        Err(ValidationError::new("layout_limits"))
    }
}

#[derive(Debug, Serialize)]
struct ConfigureShowResponse {
    show: Show,
    seats: usize,
}

async fn configure_show(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfigureShowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let req = validated(req)?;
    if req.ends_at <= req.starts_at {
        return Err(ApiError::bad_request("Сеанс должен заканчиваться позже начала"));
    }

    let show = Show {
        id: req.id,
        title: req.title,
        show_date: req.show_date,
        starts_at: req.starts_at,
        ends_at: req.ends_at,
        base_price: req.base_price,
        is_active: req.is_active,
    };
    let map = state.engine.configure_show(show, &req.layout).await?;

    Ok((
        StatusCode::CREATED,
        Json(ConfigureShowResponse {
            show: map.show.clone(),
            seats: map.len(),
        }),
    ))
}

// GET /api/shows
async fn list_shows(State(state): State<Arc<AppState>>) -> Json<Vec<Show>> {
    Json(state.engine.shows())
}

/* ---------- SEATS ---------- */

// GET /api/shows/{show_id}/seats
async fn list_seats(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<Seat>>, ApiError> {
    Ok(Json(state.engine.list_seats(show_id)?))
}

// PATCH /api/shows/{show_id}/seats/{seat}/price
#[derive(Debug, Deserialize, Validate)]
pub struct CorrectPriceRequest {
    #[validate(range(min = 0, max = MAX_SEAT_PRICE))]
    pub price: i64,
}

async fn correct_price(
    State(state): State<Arc<AppState>>,
    Path((show_id, seat)): Path<(i64, String)>,
    Json(req): Json<CorrectPriceRequest>,
) -> Result<Json<Seat>, ApiError> {
    let req = validated(req)?;
    let seat: SeatRef = seat
        .parse()
        .map_err(|e: crate::error::SeatRefError| ApiError::bad_request(e.to_string()))?;

    let map = state.engine.correct_price(show_id, &seat, req.price).await?;
    let updated = map
        .seat(&seat)
        .cloned()
        .ok_or_else(|| ApiError::not_found(format!("Места {} нет в схеме зала", seat)))?;
    Ok(Json(updated))
}

// GET /api/shows/{show_id}/availability
async fn availability(
    State(state): State<Arc<AppState>>,
    Path(show_id): Path<i64>,
    viewer: Option<HolderId>,
) -> Result<impl IntoResponse, ApiError> {
    let seats = state.engine.availability(show_id, viewer.as_ref())?;
    Ok(Json(seats))
}
