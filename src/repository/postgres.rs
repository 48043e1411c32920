use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{info, warn};

use super::{SalesRepository, Sale};
use crate::database::Database;
use crate::error::RepositoryError;
use crate::models::{
    Booking, BookingLine, HolderId, PaymentMethod, ReservationRecord, Seat, SeatRef, SeatState, Show, Ticket,
};
use crate::seat_map::SeatMap;

#[derive(Clone)]
pub struct PgSalesRepository {
    pool: PgPool,
}

impl PgSalesRepository {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }
}

/* ---------- rows ---------- */

#[derive(FromRow)]
struct ShowRow {
    id: i64,
    title: String,
    show_date: NaiveDate,
    starts_at: NaiveTime,
    ends_at: NaiveTime,
    base_price: i64,
    is_active: bool,
}

#[derive(FromRow)]
struct SeatRow {
    seat_row: String,
    seat_number: i32,
    category: String,
    price: i64,
}

#[derive(FromRow)]
struct RecordRow {
    seat_row: String,
    seat_number: i32,
    state: String,
    holder: Option<String>,
    held_at: Option<DateTime<Utc>>,
    hold_expires_at: Option<DateTime<Utc>>,
    sold_at: Option<DateTime<Utc>>,
    booking_id: Option<String>,
    price: Option<i64>,
}

#[derive(FromRow)]
struct BookingRow {
    booking_id: String,
    show_id: i64,
    holder: String,
    subtotal: i64,
    convenience_fee: i64,
    total: i64,
    payment_method: String,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct LineRow {
    seat_row: String,
    seat_number: i32,
    price: i64,
}

#[derive(FromRow)]
struct TicketRow {
    ticket_id: String,
    booking_id: String,
    show_id: i64,
    seat_row: String,
    seat_number: i32,
    is_used: bool,
    used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

/* ---------- helpers ---------- */

fn seat_ref(row: String, number: i32) -> Result<SeatRef, RepositoryError> {
    match u32::try_from(number) {
        Ok(n) if n > 0 => Ok(SeatRef::new(row, n)),
        _ => Err(RepositoryError::Corrupt(format!("seat number {} in row {}", number, row))),
    }
}

fn seat_number(seat: &SeatRef) -> Result<i32, RepositoryError> {
    i32::try_from(seat.number).map_err(|_| RepositoryError::Corrupt(format!("seat number {} out of range", seat.number)))
}

fn holder(raw: String) -> Result<HolderId, RepositoryError> {
    HolderId::new(raw).ok_or_else(|| RepositoryError::Corrupt("empty holder".into()))
}

impl TryFrom<RecordRow> for ReservationRecord {
    type Error = RepositoryError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let state = match row.state.as_str() {
            "free" => SeatState::Free,
            "held" => SeatState::Held,
            "sold" => SeatState::Sold,
            other => return Err(RepositoryError::Corrupt(format!("unknown seat state '{}'", other))),
        };
        Ok(ReservationRecord {
            seat: seat_ref(row.seat_row, row.seat_number)?,
            state,
            holder: row.holder.map(holder).transpose()?,
            held_at: row.held_at,
            hold_expires_at: row.hold_expires_at,
            sold_at: row.sold_at,
            booking_id: row.booking_id,
            price: row.price,
        })
    }
}

impl TryFrom<TicketRow> for Ticket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            ticket_id: row.ticket_id,
            booking_id: row.booking_id,
            show_id: row.show_id,
            seat: seat_ref(row.seat_row, row.seat_number)?,
            is_used: row.is_used,
            used_at: row.used_at,
            created_at: row.created_at,
        })
    }
}

const TICKET_COLUMNS: &str =
    "ticket_id, booking_id, show_id, seat_row, seat_number, is_used, used_at, created_at";

// Запись места как проданного; уже проданное место не перезаписывается
async fn insert_sold(
    tx: &mut Transaction<'_, Postgres>,
    show_id: i64,
    records: &[ReservationRecord],
) -> Result<(), RepositoryError> {
    for rec in records {
        let res = sqlx::query(
            r#"
            INSERT INTO reservation_records
                (show_id, seat_row, seat_number, state, holder, held_at, hold_expires_at, sold_at, booking_id, price)
            VALUES ($1, $2, $3, 'sold', $4, $5, NULL, $6, $7, $8)
            ON CONFLICT (show_id, seat_row, seat_number) DO UPDATE
            SET state = 'sold',
                holder = EXCLUDED.holder,
                held_at = EXCLUDED.held_at,
                hold_expires_at = NULL,
                sold_at = EXCLUDED.sold_at,
                booking_id = EXCLUDED.booking_id,
                price = EXCLUDED.price
            WHERE reservation_records.state <> 'sold'
            "#,
        )
        .bind(show_id)
        .bind(&rec.seat.row)
        .bind(seat_number(&rec.seat)?)
        .bind(rec.holder.as_ref().map(|h| h.as_str()))
        .bind(rec.held_at)
        .bind(rec.sold_at)
        .bind(rec.booking_id.as_deref())
        .bind(rec.price)
        .execute(&mut **tx)
        .await?;

        if res.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "seat {} of show {} is already sold",
                rec.seat, show_id
            )));
        }
    }
    Ok(())
}

impl PgSalesRepository {
    async fn booking_lines(&self, booking_id: &str) -> Result<Vec<BookingLine>, RepositoryError> {
        let rows: Vec<LineRow> = sqlx::query_as(
            "SELECT seat_row, seat_number, price FROM booking_seats WHERE booking_id = $1 ORDER BY position",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(BookingLine {
                    seat: seat_ref(r.seat_row, r.seat_number)?,
                    price: r.price,
                })
            })
            .collect()
    }

    async fn into_booking(&self, row: BookingRow) -> Result<Booking, RepositoryError> {
        let lines = self.booking_lines(&row.booking_id).await?;
        let payment_method = PaymentMethod::parse(&row.payment_method).ok_or_else(|| {
            RepositoryError::Corrupt(format!("unknown payment method '{}'", row.payment_method))
        })?;

        Ok(Booking {
            booking_id: row.booking_id,
            holder: holder(row.holder)?,
            show_id: row.show_id,
            lines,
            subtotal: row.subtotal,
            convenience_fee: row.convenience_fee,
            total: row.total,
            payment_method,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl SalesRepository for PgSalesRepository {
    async fn save_seat_map(&self, map: &SeatMap) -> Result<(), RepositoryError> {
        let show = &map.show;
        let mut tx = self.pool.begin().await?;

        let has_sold: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservation_records WHERE show_id = $1 AND state = 'sold')",
        )
        .bind(show.id)
        .fetch_one(&mut *tx)
        .await?;

        if has_sold {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!("show {} already has sold seats", show.id)));
        }

        sqlx::query(
            r#"
            INSERT INTO shows (id, title, show_date, starts_at, ends_at, base_price, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                show_date = EXCLUDED.show_date,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                base_price = EXCLUDED.base_price,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(show.id)
        .bind(&show.title)
        .bind(show.show_date)
        .bind(show.starts_at)
        .bind(show.ends_at)
        .bind(show.base_price)
        .bind(show.is_active)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM seats WHERE show_id = $1")
            .bind(show.id)
            .execute(&mut *tx)
            .await?;

        for seat in map.list_seats() {
            sqlx::query(
                "INSERT INTO seats (show_id, seat_row, seat_number, category, price) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(show.id)
            .bind(&seat.seat.row)
            .bind(seat_number(&seat.seat)?)
            .bind(&seat.category)
            .bind(seat.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Stored seat map for show {} ({} seats)", show.id, map.len());
        Ok(())
    }

    async fn update_seat_price(&self, show_id: i64, seat: &SeatRef, price: i64) -> Result<(), RepositoryError> {
        let res = sqlx::query(
            "UPDATE seats SET price = $4 WHERE show_id = $1 AND seat_row = $2 AND seat_number = $3",
        )
        .bind(show_id)
        .bind(&seat.row)
        .bind(seat_number(seat)?)
        .bind(price)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("seat {} of show {} is not stored", seat, show_id)));
        }
        Ok(())
    }

    async fn load_seat_maps(&self) -> Result<Vec<SeatMap>, RepositoryError> {
        let shows: Vec<ShowRow> = sqlx::query_as(
            "SELECT id, title, show_date, starts_at, ends_at, base_price, is_active FROM shows ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut maps = Vec::with_capacity(shows.len());
        for row in shows {
            let show = Show {
                id: row.id,
                title: row.title,
                show_date: row.show_date,
                starts_at: row.starts_at,
                ends_at: row.ends_at,
                base_price: row.base_price,
                is_active: row.is_active,
            };

            let seat_rows: Vec<SeatRow> = sqlx::query_as(
                "SELECT seat_row, seat_number, category, price FROM seats WHERE show_id = $1 ORDER BY seat_row, seat_number",
            )
            .bind(show.id)
            .fetch_all(&self.pool)
            .await?;

            let seats = seat_rows
                .into_iter()
                .map(|r| Ok(Seat::new(show.id, seat_ref(r.seat_row, r.seat_number)?, r.category, r.price)))
                .collect::<Result<Vec<_>, RepositoryError>>()?;

            if seats.is_empty() {
                warn!("Show {} has no seats stored, skipping", show.id);
                continue;
            }
            let map = SeatMap::new(show, seats).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
            maps.push(map);
        }
        Ok(maps)
    }

    async fn save_sold_records(&self, show_id: i64, records: &[ReservationRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_sold(&mut tx, show_id, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_sold_records(&self, show_id: i64) -> Result<Vec<ReservationRecord>, RepositoryError> {
        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT seat_row, seat_number, state, holder, held_at, hold_expires_at, sold_at, booking_id, price
            FROM reservation_records
            WHERE show_id = $1 AND state = 'sold'
            "#,
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReservationRecord::try_from).collect()
    }

    async fn save_sale(&self, sale: &Sale) -> Result<(), RepositoryError> {
        let booking = &sale.booking;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bookings
                (booking_id, show_id, holder, subtotal, convenience_fee, total,
                 payment_method, payment_status, payment_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'completed', $8, $9)
            "#,
        )
        .bind(&booking.booking_id)
        .bind(booking.show_id)
        .bind(booking.holder.as_str())
        .bind(booking.subtotal)
        .bind(booking.convenience_fee)
        .bind(booking.total)
        .bind(booking.payment_method.as_str())
        .bind(booking.payment_reference.as_deref())
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in booking.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO booking_seats (booking_id, position, seat_row, seat_number, price) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&booking.booking_id)
            .bind(position as i32)
            .bind(&line.seat.row)
            .bind(seat_number(&line.seat)?)
            .bind(line.price)
            .execute(&mut *tx)
            .await?;
        }

        for ticket in &sale.tickets {
            sqlx::query(
                r#"
                INSERT INTO tickets (ticket_id, booking_id, show_id, seat_row, seat_number, is_used, created_at)
                VALUES ($1, $2, $3, $4, $5, FALSE, $6)
                "#,
            )
            .bind(&ticket.ticket_id)
            .bind(&ticket.booking_id)
            .bind(ticket.show_id)
            .bind(&ticket.seat.row)
            .bind(seat_number(&ticket.seat)?)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await?;
        }

        insert_sold(&mut tx, booking.show_id, &sale.records).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_booking(&self, booking_id: &str) -> Result<Option<Booking>, RepositoryError> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            SELECT booking_id, show_id, holder, subtotal, convenience_fee, total,
                   payment_method, payment_reference, created_at
            FROM bookings WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.into_booking(row).await?)),
            None => Ok(None),
        }
    }

    async fn bookings_for(&self, holder: &HolderId) -> Result<Vec<Booking>, RepositoryError> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            r#"
            SELECT booking_id, show_id, holder, subtotal, convenience_fee, total,
                   payment_method, payment_reference, created_at
            FROM bookings WHERE holder = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(holder.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut bookings = Vec::with_capacity(rows.len());
        for row in rows {
            bookings.push(self.into_booking(row).await?);
        }
        Ok(bookings)
    }

    async fn tickets_for(&self, booking_id: &str) -> Result<Vec<Ticket>, RepositoryError> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE booking_id = $1 ORDER BY seat_row, seat_number",
            TICKET_COLUMNS
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn find_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>, RepositoryError> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE ticket_id = $1",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Ticket::try_from).transpose()
    }

    async fn mark_ticket_used(&self, ticket_id: &str, at: DateTime<Utc>) -> Result<Option<Ticket>, RepositoryError> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "UPDATE tickets SET is_used = TRUE, used_at = $2 WHERE ticket_id = $1 AND is_used = FALSE RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(ticket_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Ticket::try_from).transpose()
    }
}
