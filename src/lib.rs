pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod engine;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod seat_map;
pub mod services;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::engine::ReservationEngine;
use crate::repository::SalesRepository;
use crate::services::{BookingAggregator, BookingNotifier, TicketOffice};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub bookings: Arc<BookingAggregator>,
    pub tickets: Arc<TicketOffice>,
    pub notifier: BookingNotifier,
    pub repository: Arc<dyn SalesRepository>,
    pub db: Option<database::Database>,
    pub config: config::Config,
}

impl AppState {
    pub fn new(
        config: config::Config,
        repository: Arc<dyn SalesRepository>,
        clock: Arc<dyn Clock>,
        db: Option<database::Database>,
    ) -> Arc<Self> {
        let engine = Arc::new(ReservationEngine::new(
            repository.clone(),
            clock.clone(),
            config.reservation.lock_timeout(),
        ));
        let notifier = BookingNotifier::new();
        let bookings = Arc::new(BookingAggregator::new(
            engine.clone(),
            repository.clone(),
            notifier.clone(),
            config.reservation.convenience_fee_bps,
        ));
        let tickets = Arc::new(TicketOffice::new(repository.clone(), clock));

        Arc::new(Self {
            engine,
            bookings,
            tickets,
            notifier,
            repository,
            db,
            config,
        })
    }
}

// GET /health
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let storage = match &state.db {
        Some(db) => {
            if !db.ping().await {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "status": "degraded", "storage": "postgres" })),
                );
            }
            "postgres"
        }
        None => "memory",
    };
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "storage": storage, "shows": state.engine.shows().len() })),
    )
}

/// Полный HTTP-роутер сервиса.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
