use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::Ticket;
use crate::services::TicketDetails;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tickets/{ticket_id}", get(verify_ticket))
        .route("/tickets/{ticket_id}/redeem", post(redeem_ticket))
}

// GET /api/tickets/{ticket_id}
async fn verify_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<TicketDetails>, ApiError> {
    Ok(Json(state.tickets.verify(&ticket_id).await?))
}

// POST /api/tickets/{ticket_id}/redeem
async fn redeem_ticket(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets.redeem(&ticket_id).await?))
}
