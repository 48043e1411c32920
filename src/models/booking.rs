use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{HolderId, SeatRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Upi,
    Card,
    Wallet,
    Netbanking,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Upi => "upi",
            PaymentMethod::Card => "card",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Netbanking => "netbanking",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upi" => Some(PaymentMethod::Upi),
            "card" => Some(PaymentMethod::Card),
            "wallet" => Some(PaymentMethod::Wallet),
            "netbanking" => Some(PaymentMethod::Netbanking),
            _ => None,
        }
    }
}

/// Итог оплаты от внешнего платёжного контура.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PaymentOutcome {
    Approved {
        method: PaymentMethod,
        #[serde(default)]
        reference: Option<String>,
    },
    Declined {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Строка брони: место и цена, зафиксированная при удержании.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLine {
    pub seat: SeatRef,
    pub price: i64,
}

/// Неизменяемая запись об успешной покупке.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub booking_id: String,
    pub holder: HolderId,
    pub show_id: i64,
    pub lines: Vec<BookingLine>,
    pub subtotal: i64,
    pub convenience_fee: i64,
    pub total: i64,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn seats(&self) -> impl Iterator<Item = &SeatRef> {
        self.lines.iter().map(|l| &l.seat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub booking_id: String,
    pub show_id: i64,
    pub seat: SeatRef,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const BOOKING_ID_PREFIX: &str = "SS";
pub const TICKET_ID_PREFIX: &str = "TKT";

fn short_code(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, hex[..10].to_uppercase())
}

pub fn new_booking_id() -> String {
    short_code(BOOKING_ID_PREFIX)
}

pub fn new_ticket_id() -> String {
    short_code(TICKET_ID_PREFIX)
}

/// Сервисный сбор в базисных пунктах, с округлением половины вверх.
/// `None`, если сумма не помещается в `i64`.
pub fn convenience_fee(subtotal: i64, fee_bps: u32) -> Option<i64> {
    subtotal
        .checked_mul(i64::from(fee_bps))?
        .checked_add(5_000)
        .map(|v| v / 10_000)
}

/// Сумма цен без переполнения.
pub fn checked_sum(prices: impl IntoIterator<Item = i64>) -> Option<i64> {
    prices.into_iter().try_fold(0i64, |acc, p| acc.checked_add(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_is_two_percent_rounded() {
        assert_eq!(convenience_fee(30_000, 200), Some(600));
        assert_eq!(convenience_fee(125, 200), Some(3)); // 2.5 -> 3
        assert_eq!(convenience_fee(124, 200), Some(2));
        assert_eq!(convenience_fee(0, 200), Some(0));
    }

    #[test]
    fn amounts_do_not_wrap() {
        assert_eq!(convenience_fee(i64::MAX / 100, 200), None);
        assert_eq!(convenience_fee(i64::MAX / 10_000, 10_000), None);
        assert_eq!(checked_sum([i64::MAX / 2 + 1, i64::MAX / 2 + 1]), None);
        assert_eq!(checked_sum([100, 250]), Some(350));
        assert_eq!(checked_sum(Vec::new()), Some(0));
    }

    #[test]
    fn generated_ids_have_expected_shape() {
        let booking = new_booking_id();
        assert!(booking.starts_with("SS"));
        assert_eq!(booking.len(), 12);
        assert!(booking[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        let ticket = new_ticket_id();
        assert!(ticket.starts_with("TKT"));
        assert_eq!(ticket.len(), 13);
        assert_ne!(ticket, new_ticket_id());
    }

    #[test]
    fn payment_outcome_is_tagged_by_status() {
        let ok: PaymentOutcome =
            serde_json::from_str(r#"{"status":"approved","method":"card"}"#).unwrap();
        assert_eq!(
            ok,
            PaymentOutcome::Approved { method: PaymentMethod::Card, reference: None }
        );

        let declined: PaymentOutcome = serde_json::from_str(r#"{"status":"declined"}"#).unwrap();
        assert_eq!(declined, PaymentOutcome::Declined { reason: None });
    }
}
