//! Оформление покупки: подтверждение удержанных мест, бронь и билеты.

use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::{ConfirmedSet, ReservationEngine};
use crate::error::{ConfirmError, PurchaseError, RepositoryError};
use crate::models::booking::{convenience_fee, new_booking_id, new_ticket_id};
use crate::models::{Booking, BookingLine, HolderId, PaymentMethod, PaymentOutcome, SeatRef, Ticket};
use crate::repository::{Sale, SalesRepository};
use crate::services::notifications::{BookingConfirmed, BookingNotifier};

/// Бронь вместе с выписанными по ней билетами.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Purchase {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

pub struct BookingAggregator {
    engine: Arc<ReservationEngine>,
    repository: Arc<dyn SalesRepository>,
    notifier: BookingNotifier,
    fee_bps: u32,
}

impl BookingAggregator {
    pub fn new(
        engine: Arc<ReservationEngine>,
        repository: Arc<dyn SalesRepository>,
        notifier: BookingNotifier,
        fee_bps: u32,
    ) -> Self {
        Self {
            engine,
            repository,
            notifier,
            fee_bps,
        }
    }

    /// Завершает покупку по итогу оплаты.
    ///
    /// Отказ в оплате сразу освобождает места. При успешной оплате места
    /// продаются только вместе с сохранённой бронью и билетами; если
    /// хранилище недоступно, места остаются удержанными за покупателем.
    pub async fn purchase(
        &self,
        show_id: i64,
        seats: &[SeatRef],
        holder: &HolderId,
        payment: PaymentOutcome,
    ) -> Result<Purchase, PurchaseError> {
        let (method, reference) = match payment {
            PaymentOutcome::Declined { reason } => {
                match self.engine.release(show_id, seats, holder).await {
                    Ok(released) => info!(
                        "Payment declined for {} in show {}, {} seats released",
                        holder, show_id, released
                    ),
                    Err(e) => warn!("Payment declined for {} in show {}, release failed: {}", holder, show_id, e),
                }
                return Err(PurchaseError::PaymentDeclined { reason });
            }
            PaymentOutcome::Approved { method, reference } => (method, reference),
        };

        let booking_id = new_booking_id();
        let repository = Arc::clone(&self.repository);
        let fee_bps = self.fee_bps;

        let (_, purchase) = self
            .engine
            .confirm_with(show_id, seats, holder, Some(booking_id.clone()), move |set| async move {
                let purchase = assemble(&set, booking_id, method, reference, fee_bps)?;
                let sale = Sale {
                    booking: purchase.booking.clone(),
                    tickets: purchase.tickets.clone(),
                    records: set.records().to_vec(),
                };
                repository.save_sale(&sale).await?;
                Ok::<_, ConfirmError>(purchase)
            })
            .await?;

        info!(
            "Booking {} created for {}: {} seats, total {}",
            purchase.booking.booking_id,
            holder,
            purchase.tickets.len(),
            purchase.booking.total
        );
        self.notifier.publish(BookingConfirmed {
            booking_id: purchase.booking.booking_id.clone(),
            show_id,
            holder: holder.clone(),
            seats: purchase.booking.seats().cloned().collect(),
            ticket_ids: purchase.tickets.iter().map(|t| t.ticket_id.clone()).collect(),
            total: purchase.booking.total,
        });

        Ok(purchase)
    }

    /// Брони покупателя, новые первыми.
    pub async fn bookings_for(&self, holder: &HolderId) -> Result<Vec<Booking>, RepositoryError> {
        self.repository.bookings_for(holder).await
    }

    pub async fn booking(&self, booking_id: &str) -> Result<Option<Purchase>, RepositoryError> {
        let Some(booking) = self.repository.find_booking(booking_id).await? else {
            return Ok(None);
        };
        let tickets = self.repository.tickets_for(booking_id).await?;
        Ok(Some(Purchase { booking, tickets }))
    }
}

// Сумма считается по ценам, зафиксированным при удержании
fn assemble(
    set: &ConfirmedSet,
    booking_id: String,
    method: PaymentMethod,
    reference: Option<String>,
    fee_bps: u32,
) -> Result<Purchase, ConfirmError> {
    let lines: Vec<BookingLine> = set
        .seats
        .iter()
        .map(|s| BookingLine {
            seat: s.seat.clone(),
            price: s.price,
        })
        .collect();
    let subtotal = set.subtotal();
    let fee = convenience_fee(subtotal, fee_bps).ok_or(ConfirmError::AmountOverflow)?;
    let total = subtotal.checked_add(fee).ok_or(ConfirmError::AmountOverflow)?;

    let tickets = lines
        .iter()
        .map(|line| Ticket {
            ticket_id: new_ticket_id(),
            booking_id: booking_id.clone(),
            show_id: set.show_id,
            seat: line.seat.clone(),
            is_used: false,
            used_at: None,
            created_at: set.sold_at,
        })
        .collect();

    Ok(Purchase {
        booking: Booking {
            booking_id,
            holder: set.holder.clone(),
            show_id: set.show_id,
            lines,
            subtotal,
            convenience_fee: fee,
            total,
            payment_method: method,
            payment_reference: reference,
            created_at: set.sold_at,
        },
        tickets,
    })
}
