//! Ошибки ядра бронирования и их отображение в HTTP-ответы.
//!
//! Конфликты (место уже занято, удержание истекло) — штатная ситуация,
//! клиенту отдаётся понятное сообщение и код 4xx. Инфраструктурные сбои
//! (таймаут блокировки, БД) отдаются как 503: все операции атомарны,
//! повтор безопасен.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SeatRef;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed seat reference '{0}'")]
pub struct SeatRefError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SeatMapError {
    #[error("layout contains no seats")]
    EmptyLayout,
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("seat {0} appears twice in the layout")]
    DuplicateSeat(SeatRef),
    #[error("show {0} is not configured")]
    UnknownShow(i64),
    #[error("seat {0} is not part of the show")]
    UnknownSeat(SeatRef),
    #[error("show {0} already has reservations, refusing to reconfigure")]
    ReservationsExist(i64),
    #[error("seat {0} is already sold")]
    SeatSold(SeatRef),
    #[error("timed out waiting for seat locks")]
    Busy,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HoldError {
    #[error("no seats requested")]
    EmptyRequest,
    #[error("seat {0} requested twice")]
    DuplicateSeat(SeatRef),
    #[error("hold ttl must be positive")]
    InvalidTtl,
    #[error("show {0} is not configured")]
    UnknownShow(i64),
    #[error("show {0} is not on sale")]
    ShowInactive(i64),
    #[error("seat {0} is not part of the show")]
    InvalidSeat(SeatRef),
    #[error("seat {0} is unavailable")]
    SeatUnavailable(SeatRef),
    #[error("order amount is out of range")]
    AmountOverflow,
    #[error("timed out waiting for seat locks")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseError {
    #[error("show {0} is not configured")]
    UnknownShow(i64),
    #[error("seat {0} is not part of the show")]
    InvalidSeat(SeatRef),
    #[error("timed out waiting for seat locks")]
    Busy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfirmError {
    #[error("no seats requested")]
    EmptyRequest,
    #[error("seat {0} requested twice")]
    DuplicateSeat(SeatRef),
    #[error("show {0} is not configured")]
    UnknownShow(i64),
    #[error("seat {0} is not part of the show")]
    InvalidSeat(SeatRef),
    #[error("seat {0} is not held by the caller")]
    NotHeld(SeatRef),
    #[error("hold on seat {0} has expired")]
    Expired(SeatRef),
    #[error("order amount is out of range")]
    AmountOverflow,
    #[error("timed out waiting for seat locks")]
    Busy,
    #[error("could not persist the sale: {0}")]
    Store(#[from] RepositoryError),
}

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    #[error("payment declined")]
    PaymentDeclined { reason: Option<String> },
    #[error(transparent)]
    Confirm(#[from] ConfirmError),
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("malformed ticket id '{0}'")]
    Malformed(String),
    #[error("ticket {0} not found")]
    NotFound(String),
    #[error("ticket {ticket_id} was already used at {used_at}")]
    AlreadyUsed {
        ticket_id: String,
        used_at: DateTime<Utc>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/* ---------- HTTP ---------- */

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Ошибка обработчика: код ответа, машинный код и сообщение для пользователя.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "TRY_AGAIN", message)
    }

    fn amount_overflow() -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "AMOUNT_OUT_OF_RANGE",
            "Сумма заказа вне допустимого диапазона",
        )
    }

    fn storage(err: &RepositoryError) -> Self {
        tracing::error!("storage failure: {:?}", err);
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "STORE_UNAVAILABLE",
            "Хранилище временно недоступно, повторите попытку",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<HoldError> for ApiError {
    fn from(err: HoldError) -> Self {
        match err {
            HoldError::EmptyRequest => ApiError::bad_request("Не выбрано ни одного места"),
            HoldError::DuplicateSeat(seat) => {
                ApiError::bad_request(format!("Место {} указано дважды", seat))
            }
            HoldError::InvalidTtl => ApiError::bad_request("Некорректный срок удержания"),
            HoldError::UnknownShow(id) => ApiError::not_found(format!("Сеанс {} не найден", id)),
            HoldError::ShowInactive(id) => ApiError::new(
                StatusCode::CONFLICT,
                "SHOW_INACTIVE",
                format!("Продажа на сеанс {} закрыта", id),
            ),
            HoldError::InvalidSeat(seat) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_SEAT",
                format!("Места {} нет в схеме зала", seat),
            ),
            HoldError::SeatUnavailable(seat) => ApiError::new(
                StatusCode::CONFLICT,
                "SEAT_UNAVAILABLE",
                format!("Место {} только что заняли, выберите другое", seat),
            ),
            HoldError::AmountOverflow => ApiError::amount_overflow(),
            HoldError::Busy => ApiError::unavailable("Места сейчас обрабатываются, повторите попытку"),
        }
    }
}

impl From<ReleaseError> for ApiError {
    fn from(err: ReleaseError) -> Self {
        match err {
            ReleaseError::UnknownShow(id) => ApiError::not_found(format!("Сеанс {} не найден", id)),
            ReleaseError::InvalidSeat(seat) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_SEAT",
                format!("Места {} нет в схеме зала", seat),
            ),
            ReleaseError::Busy => ApiError::unavailable("Места сейчас обрабатываются, повторите попытку"),
        }
    }
}

impl From<ConfirmError> for ApiError {
    fn from(err: ConfirmError) -> Self {
        match err {
            ConfirmError::EmptyRequest => ApiError::bad_request("Не выбрано ни одного места"),
            ConfirmError::DuplicateSeat(seat) => {
                ApiError::bad_request(format!("Место {} указано дважды", seat))
            }
            ConfirmError::UnknownShow(id) => ApiError::not_found(format!("Сеанс {} не найден", id)),
            ConfirmError::InvalidSeat(seat) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_SEAT",
                format!("Места {} нет в схеме зала", seat),
            ),
            ConfirmError::NotHeld(seat) => ApiError::new(
                StatusCode::CONFLICT,
                "SEAT_NOT_HELD",
                format!("Место {} не закреплено за вами, выберите места заново", seat),
            ),
            ConfirmError::Expired(seat) => ApiError::new(
                StatusCode::GONE,
                "HOLD_EXPIRED",
                format!("Время удержания места {} истекло, выберите места заново", seat),
            ),
            ConfirmError::AmountOverflow => ApiError::amount_overflow(),
            ConfirmError::Busy => ApiError::unavailable("Места сейчас обрабатываются, повторите попытку"),
            ConfirmError::Store(e) => ApiError::storage(&e),
        }
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        match err {
            PurchaseError::PaymentDeclined { reason } => ApiError::new(
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_DECLINED",
                match reason {
                    Some(r) => format!("Оплата отклонена: {}. Места освобождены", r),
                    None => "Оплата отклонена. Места освобождены".to_string(),
                },
            ),
            PurchaseError::Confirm(e) => e.into(),
        }
    }
}

impl From<SeatMapError> for ApiError {
    fn from(err: SeatMapError) -> Self {
        match err {
            SeatMapError::EmptyLayout => ApiError::bad_request("Схема зала не содержит мест"),
            SeatMapError::InvalidLayout(msg) => {
                ApiError::bad_request(format!("Некорректная схема зала: {}", msg))
            }
            SeatMapError::DuplicateSeat(seat) => {
                ApiError::bad_request(format!("Место {} указано в схеме дважды", seat))
            }
            SeatMapError::UnknownShow(id) => ApiError::not_found(format!("Сеанс {} не найден", id)),
            SeatMapError::UnknownSeat(seat) => {
                ApiError::not_found(format!("Места {} нет в схеме зала", seat))
            }
            SeatMapError::ReservationsExist(id) => ApiError::new(
                StatusCode::CONFLICT,
                "RESERVATIONS_EXIST",
                format!("На сеанс {} уже есть брони, схему менять нельзя", id),
            ),
            SeatMapError::SeatSold(seat) => ApiError::new(
                StatusCode::CONFLICT,
                "SEAT_SOLD",
                format!("Место {} уже продано", seat),
            ),
            SeatMapError::Busy => ApiError::unavailable("Места сейчас обрабатываются, повторите попытку"),
            SeatMapError::Repository(e) => ApiError::storage(&e),
        }
    }
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        match err {
            TicketError::Malformed(id) => {
                ApiError::bad_request(format!("Некорректный номер билета {}", id))
            }
            TicketError::NotFound(id) => ApiError::not_found(format!("Билет {} не найден", id)),
            TicketError::AlreadyUsed { ticket_id, used_at } => ApiError::new(
                StatusCode::CONFLICT,
                "TICKET_USED",
                format!(
                    "Билет {} уже использован {}",
                    ticket_id,
                    used_at.format("%Y-%m-%d %H:%M")
                ),
            ),
            TicketError::Repository(e) => ApiError::storage(&e),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        ApiError::storage(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_map_to_client_statuses() {
        let seat = SeatRef::new("A", 1);

        let e: ApiError = HoldError::SeatUnavailable(seat.clone()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);
        assert_eq!(e.code(), "SEAT_UNAVAILABLE");

        let e: ApiError = ConfirmError::Expired(seat.clone()).into();
        assert_eq!(e.status(), StatusCode::GONE);

        let e: ApiError = PurchaseError::PaymentDeclined { reason: None }.into();
        assert_eq!(e.status(), StatusCode::PAYMENT_REQUIRED);

        let e: ApiError = HoldError::InvalidSeat(seat).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e: ApiError = ConfirmError::AmountOverflow.into();
        assert_eq!(e.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(e.code(), "AMOUNT_OUT_OF_RANGE");
    }

    #[test]
    fn transient_failures_ask_to_retry() {
        let e: ApiError = HoldError::Busy.into();
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e: ApiError = ConfirmError::Store(RepositoryError::Conflict("x".into())).into();
        assert_eq!(e.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code(), "STORE_UNAVAILABLE");
    }
}
