use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HolderId, SeatRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatState {
    Free,
    Held,
    Sold,
}

impl SeatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatState::Free => "free",
            SeatState::Held => "held",
            SeatState::Sold => "sold",
        }
    }
}

/// Состояние одного места сеанса. Создаётся при первом удержании;
/// место без записи считается свободным. `Sold` терминально.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub seat: SeatRef,
    pub state: SeatState,
    pub holder: Option<HolderId>,
    pub held_at: Option<DateTime<Utc>>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub sold_at: Option<DateTime<Utc>>,
    pub booking_id: Option<String>,
    // Цена на момент первого удержания, по ней считается покупка
    pub price: Option<i64>,
}

impl ReservationRecord {
    pub fn held(
        seat: SeatRef,
        holder: HolderId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        price: i64,
    ) -> Self {
        Self {
            seat,
            state: SeatState::Held,
            holder: Some(holder),
            held_at: Some(now),
            hold_expires_at: Some(expires_at),
            sold_at: None,
            booking_id: None,
            price: Some(price),
        }
    }

    /// Удержание истекло, если срок строго меньше текущего времени.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == SeatState::Held && self.hold_expires_at.is_some_and(|exp| exp < now)
    }

    /// Состояние с учётом ленивого истечения: просроченное удержание — свободно.
    pub fn effective_state(&self, now: DateTime<Utc>) -> SeatState {
        if self.is_expired(now) {
            SeatState::Free
        } else {
            self.state
        }
    }

    /// Действующее удержание именно этим держателем.
    pub fn is_live_hold_of(&self, holder: &HolderId, now: DateTime<Utc>) -> bool {
        self.state == SeatState::Held
            && !self.is_expired(now)
            && self.holder.as_ref() == Some(holder)
    }

    pub fn with_deadline(&self, expires_at: DateTime<Utc>) -> Self {
        Self {
            hold_expires_at: Some(expires_at),
            ..self.clone()
        }
    }

    pub fn sold(&self, booking_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            state: SeatState::Sold,
            sold_at: Some(now),
            hold_expires_at: None,
            booking_id,
            ..self.clone()
        }
    }

    pub fn released(&self) -> Self {
        Self {
            seat: self.seat.clone(),
            state: SeatState::Free,
            holder: None,
            held_at: None,
            hold_expires_at: None,
            sold_at: None,
            booking_id: None,
            price: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(now: DateTime<Utc>) -> ReservationRecord {
        ReservationRecord::held(
            SeatRef::new("A", 1),
            HolderId::new("x").unwrap(),
            now,
            now + Duration::seconds(10),
            1500,
        )
    }

    #[test]
    fn hold_lapses_only_after_deadline() {
        let now = Utc::now();
        let rec = record(now);

        assert_eq!(rec.effective_state(now + Duration::seconds(10)), SeatState::Held);
        assert_eq!(rec.effective_state(now + Duration::seconds(11)), SeatState::Free);
    }

    #[test]
    fn sold_record_never_expires() {
        let now = Utc::now();
        let rec = record(now).sold(Some("SS0000000001".into()), now);

        assert_eq!(rec.effective_state(now + Duration::days(365)), SeatState::Sold);
        assert_eq!(rec.price, Some(1500));
    }
}
