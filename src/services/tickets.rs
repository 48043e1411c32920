use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::TicketError;
use crate::models::booking::TICKET_ID_PREFIX;
use crate::models::{HolderId, Ticket};
use crate::repository::SalesRepository;

/// Данные билета для проверки на входе.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub booking_id: String,
    pub holder: Option<HolderId>,
    pub seat_label: String,
    pub is_used: bool,
}

/// Проверка и погашение билетов.
pub struct TicketOffice {
    repository: Arc<dyn SalesRepository>,
    clock: Arc<dyn Clock>,
}

impl TicketOffice {
    pub fn new(repository: Arc<dyn SalesRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn verify(&self, ticket_id: &str) -> Result<TicketDetails, TicketError> {
        let ticket = self.find(ticket_id).await?;
        let holder = self
            .repository
            .find_booking(&ticket.booking_id)
            .await?
            .map(|b| b.holder);

        Ok(TicketDetails {
            booking_id: ticket.booking_id.clone(),
            seat_label: ticket.seat.label(),
            is_used: ticket.is_used,
            holder,
            ticket,
        })
    }

    /// Гасит билет. Повторное погашение — `AlreadyUsed` с временем первого.
    pub async fn redeem(&self, ticket_id: &str) -> Result<Ticket, TicketError> {
        let ticket = self.find(ticket_id).await?;
        let now = self.clock.now();

        match self.repository.mark_ticket_used(&ticket.ticket_id, now).await? {
            Some(used) => {
                info!("🎫 Ticket {} redeemed for seat {}", used.ticket_id, used.seat);
                Ok(used)
            }
            None => {
                // кто-то успел погасить раньше; перечитываем время погашения
                let current = self.find(ticket_id).await?;
                Err(TicketError::AlreadyUsed {
                    used_at: current.used_at.unwrap_or(now),
                    ticket_id: current.ticket_id,
                })
            }
        }
    }

    async fn find(&self, ticket_id: &str) -> Result<Ticket, TicketError> {
        let ticket_id = ticket_id.trim();
        if !ticket_id.starts_with(TICKET_ID_PREFIX) || ticket_id.len() <= TICKET_ID_PREFIX.len() {
            return Err(TicketError::Malformed(ticket_id.to_string()));
        }
        self.repository
            .find_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(ticket_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Booking, BookingLine, PaymentMethod, SeatRef};
    use crate::repository::{MemorySalesRepository, Sale};

    async fn office_with_ticket() -> (TicketOffice, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let repository = Arc::new(MemorySalesRepository::new());
        let now = clock.now();
        let seat = SeatRef::new("D", 4);
        repository
            .save_sale(&Sale {
                booking: Booking {
                    booking_id: "SSAAAAAAAAAA".into(),
                    holder: HolderId::new("erin").unwrap(),
                    show_id: 1,
                    lines: vec![BookingLine { seat: seat.clone(), price: 100 }],
                    subtotal: 100,
                    convenience_fee: 2,
                    total: 102,
                    payment_method: PaymentMethod::Card,
                    payment_reference: None,
                    created_at: now,
                },
                tickets: vec![Ticket {
                    ticket_id: "TKTBBBBBBBBBB".into(),
                    booking_id: "SSAAAAAAAAAA".into(),
                    show_id: 1,
                    seat,
                    is_used: false,
                    used_at: None,
                    created_at: now,
                }],
                records: vec![],
            })
            .await
            .unwrap();
        (TicketOffice::new(repository, clock.clone()), clock)
    }

    #[tokio::test]
    async fn verifies_known_ticket() {
        let (office, _) = office_with_ticket().await;
        let details = office.verify("TKTBBBBBBBBBB").await.unwrap();
        assert_eq!(details.seat_label, "D4");
        assert_eq!(details.holder, HolderId::new("erin"));
        assert!(!details.is_used);
    }

    #[tokio::test]
    async fn rejects_malformed_and_unknown_ids() {
        let (office, _) = office_with_ticket().await;
        assert!(matches!(office.verify("SSAAAAAAAAAA").await, Err(TicketError::Malformed(_))));
        assert!(matches!(office.verify("TKT").await, Err(TicketError::Malformed(_))));
        assert!(matches!(office.verify("TKT0000000000").await, Err(TicketError::NotFound(_))));
    }

    #[tokio::test]
    async fn redeems_only_once() {
        let (office, clock) = office_with_ticket().await;
        let first_at = clock.now();
        let used = office.redeem("TKTBBBBBBBBBB").await.unwrap();
        assert_eq!(used.used_at, Some(first_at));

        clock.advance(chrono::Duration::minutes(5));
        match office.redeem("TKTBBBBBBBBBB").await {
            Err(TicketError::AlreadyUsed { used_at, .. }) => assert_eq!(used_at, first_at),
            other => panic!("expected AlreadyUsed, got {:?}", other),
        }
    }
}
