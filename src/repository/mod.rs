//! Долговременное хранение продаж.
//!
//! Удержания живут только в памяти движка: после рестарта они считаются
//! истёкшими. Всё, что переживает рестарт (схемы залов, проданные места,
//! брони, билеты), идёт через `SalesRepository`.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::error::RepositoryError;
use crate::models::{Booking, HolderId, ReservationRecord, SeatRef, SeatState, Ticket};
use crate::seat_map::SeatMap;

pub use postgres::PgSalesRepository;

/// Всё, что записывается одной транзакцией при покупке.
#[derive(Debug, Clone)]
pub struct Sale {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
    pub records: Vec<ReservationRecord>,
}

#[async_trait]
pub trait SalesRepository: Send + Sync {
    /// Сохраняет (или заменяет) схему зала. Отказывает, если на сеанс уже есть проданные места.
    async fn save_seat_map(&self, map: &SeatMap) -> Result<(), RepositoryError>;

    async fn update_seat_price(&self, show_id: i64, seat: &SeatRef, price: i64) -> Result<(), RepositoryError>;

    async fn load_seat_maps(&self) -> Result<Vec<SeatMap>, RepositoryError>;

    /// Атомарно записывает проданные места. Повторная продажа места — `Conflict`.
    async fn save_sold_records(&self, show_id: i64, records: &[ReservationRecord]) -> Result<(), RepositoryError>;

    async fn load_sold_records(&self, show_id: i64) -> Result<Vec<ReservationRecord>, RepositoryError>;

    /// Бронь, билеты и проданные места — одной транзакцией.
    async fn save_sale(&self, sale: &Sale) -> Result<(), RepositoryError>;

    async fn find_booking(&self, booking_id: &str) -> Result<Option<Booking>, RepositoryError>;

    async fn bookings_for(&self, holder: &HolderId) -> Result<Vec<Booking>, RepositoryError>;

    async fn tickets_for(&self, booking_id: &str) -> Result<Vec<Ticket>, RepositoryError>;

    async fn find_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, RepositoryError>;

    /// Помечает билет использованным, только если он ещё не использован.
    /// `None` — билета нет или он уже погашен.
    async fn mark_ticket_used(&self, ticket_id: &str, at: DateTime<Utc>) -> Result<Option<Ticket>, RepositoryError>;
}

#[derive(Default)]
struct MemoryState {
    seat_maps: BTreeMap<i64, SeatMap>,
    sold: HashMap<i64, BTreeMap<SeatRef, ReservationRecord>>,
    bookings: Vec<Booking>,
    tickets: BTreeMap<String, Ticket>,
}

impl MemoryState {
    fn check_unsold(&self, show_id: i64, records: &[ReservationRecord]) -> Result<(), RepositoryError> {
        if let Some(sold) = self.sold.get(&show_id) {
            for rec in records {
                if sold.contains_key(&rec.seat) {
                    return Err(RepositoryError::Conflict(format!(
                        "seat {} of show {} is already sold",
                        rec.seat, show_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn insert_sold(&mut self, show_id: i64, records: &[ReservationRecord]) {
        let sold = self.sold.entry(show_id).or_default();
        for rec in records {
            sold.insert(rec.seat.clone(), rec.clone());
        }
    }
}

/// Хранилище в памяти процесса: для тестов и локального запуска без БД.
#[derive(Default)]
pub struct MemorySalesRepository {
    state: Mutex<MemoryState>,
}

impl MemorySalesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SalesRepository for MemorySalesRepository {
    async fn save_seat_map(&self, map: &SeatMap) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        if state.sold.get(&map.show_id()).is_some_and(|s| !s.is_empty()) {
            return Err(RepositoryError::Conflict(format!(
                "show {} already has sold seats",
                map.show_id()
            )));
        }
        state.seat_maps.insert(map.show_id(), map.clone());
        Ok(())
    }

    async fn update_seat_price(&self, show_id: i64, seat: &SeatRef, price: i64) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let map = state
            .seat_maps
            .get(&show_id)
            .ok_or_else(|| RepositoryError::Conflict(format!("show {} is not stored", show_id)))?;
        let next = map
            .with_price(seat, price)
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;
        state.seat_maps.insert(show_id, next);
        Ok(())
    }

    async fn load_seat_maps(&self) -> Result<Vec<SeatMap>, RepositoryError> {
        Ok(self.state.lock().await.seat_maps.values().cloned().collect())
    }

    async fn save_sold_records(&self, show_id: i64, records: &[ReservationRecord]) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_unsold(show_id, records)?;
        state.insert_sold(show_id, records);
        Ok(())
    }

    async fn load_sold_records(&self, show_id: i64) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .sold
            .get(&show_id)
            .map(|s| s.values().filter(|r| r.state == SeatState::Sold).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_sale(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let show_id = sale.booking.show_id;
        // всё проверяем до первой записи, чтобы не оставить частичного состояния
        state.check_unsold(show_id, &sale.records)?;
        if state.bookings.iter().any(|b| b.booking_id == sale.booking.booking_id) {
            return Err(RepositoryError::Conflict(format!(
                "booking {} already exists",
                sale.booking.booking_id
            )));
        }

        state.insert_sold(show_id, &sale.records);
        state.bookings.push(sale.booking.clone());
        for ticket in &sale.tickets {
            state.tickets.insert(ticket.ticket_id.clone(), ticket.clone());
        }
        Ok(())
    }

    async fn find_booking(&self, booking_id: &str) -> Result<Option<Booking>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.bookings.iter().find(|b| b.booking_id == booking_id).cloned())
    }

    async fn bookings_for(&self, holder: &HolderId) -> Result<Vec<Booking>, RepositoryError> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .iter()
            .filter(|b| &b.holder == holder)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn tickets_for(&self, booking_id: &str) -> Result<Vec<Ticket>, RepositoryError> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .values()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.seat.cmp(&b.seat));
        Ok(tickets)
    }

    async fn find_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, RepositoryError> {
        Ok(self.state.lock().await.tickets.get(ticket_id).cloned())
    }

    async fn mark_ticket_used(&self, ticket_id: &str, at: DateTime<Utc>) -> Result<Option<Ticket>, RepositoryError> {
        let mut state = self.state.lock().await;
        match state.tickets.get_mut(ticket_id) {
            Some(ticket) if !ticket.is_used => {
                ticket.is_used = true;
                ticket.used_at = Some(at);
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }
}
