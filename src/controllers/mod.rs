pub mod bookings;
pub mod reservations;
pub mod shows;
pub mod tickets;

use axum::Router;
use std::sync::Arc;
use validator::Validate;

use crate::error::ApiError;

/// Максимум мест в одном запросе.
pub const MAX_SEATS_PER_REQUEST: u64 = 50;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(shows::routes())
        .merge(reservations::routes())
        .merge(bookings::routes())
        .merge(tickets::routes())
}

// Ошибки validator превращаются в 400 с перечнем полей
fn validated<T: Validate>(req: T) -> Result<T, ApiError> {
    match req.validate() {
        Ok(()) => Ok(req),
        Err(errors) => {
            let mut fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
            fields.sort_unstable();
            Err(ApiError::bad_request(format!(
                "Некорректный запрос: {}",
                fields.join(", ")
            )))
        }
    }
}
