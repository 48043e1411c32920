//! Ядро бронирования: схемы залов и состояние мест всех сеансов.
//!
//! Каждое место сеанса — отдельный слот с собственным исключением и
//! опубликованной записью (`ArcSwapOption`). Изменения записей идут только
//! под исключениями мест, чтение (`availability`) берёт снимок без блокировок.
//! Удержание истекает лениво: просроченная запись считается свободной при
//! любом чтении, фоновая очистка лишь подчищает такие записи.

pub mod arbiter;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{ConfirmError, HoldError, ReleaseError, SeatMapError};
use crate::models::booking::checked_sum;
use crate::models::{HolderId, ReservationRecord, Seat, SeatRef, SeatState, Show};
use crate::repository::SalesRepository;
use crate::seat_map::{SeatLayout, SeatMap};

pub use arbiter::{HeldLocks, LockArbiter, LockTimeout, SeatLock};

/* ---------- results ---------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldSeat {
    pub seat: SeatRef,
    pub price: i64,
}

/// Успешное удержание: общий срок и цены, зафиксированные за каждым местом.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeldSet {
    pub show_id: i64,
    pub holder: HolderId,
    pub expires_at: DateTime<Utc>,
    pub seats: Vec<HeldSeat>,
    #[serde(skip)]
    total: i64,
}

impl HeldSet {
    pub fn total(&self) -> i64 {
        self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedSeat {
    pub seat: SeatRef,
    pub price: i64,
}

/// Места, переведённые в `Sold` одной операцией.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedSet {
    pub show_id: i64,
    pub holder: HolderId,
    pub booking_id: Option<String>,
    pub sold_at: DateTime<Utc>,
    pub seats: Vec<ConfirmedSeat>,
    #[serde(skip)]
    subtotal: i64,
    #[serde(skip)]
    records: Vec<ReservationRecord>,
}

impl ConfirmedSet {
    /// Записи в том виде, в каком они будут опубликованы после фиксации.
    pub fn records(&self) -> &[ReservationRecord] {
        &self.records
    }

    /// Сумма по ценам, зафиксированным при удержании.
    pub fn subtotal(&self) -> i64 {
        self.subtotal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum SeatStatus {
    Free,
    HeldByCaller { expires_at: DateTime<Utc> },
    HeldByOther,
    Sold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatAvailability {
    pub seat: SeatRef,
    pub label: String,
    pub category: String,
    pub price: i64,
    #[serde(flatten)]
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub shows_scanned: usize,
    pub seats_released: usize,
    pub seats_skipped: usize,
}

/* ---------- ledgers ---------- */

struct SeatSlot {
    lock: SeatLock,
    record: ArcSwapOption<ReservationRecord>,
}

impl SeatSlot {
    fn new() -> Self {
        Self {
            lock: SeatLock::new(),
            record: ArcSwapOption::empty(),
        }
    }

    fn current(&self) -> Option<Arc<ReservationRecord>> {
        self.record.load_full()
    }

    fn publish(&self, record: ReservationRecord) {
        self.record.store(Some(Arc::new(record)));
    }
}

// Состояние одного сеанса. Набор слотов фиксирован на всё время жизни;
// перенастройка схемы создаёт новый ledger и помечает старый retired.
struct ShowLedger {
    seat_map: ArcSwap<SeatMap>,
    slots: BTreeMap<SeatRef, SeatSlot>,
    retired: AtomicBool,
    edit: Mutex<()>,
}

impl ShowLedger {
    fn new(map: SeatMap) -> Self {
        let slots = map.seat_refs().map(|s| (s.clone(), SeatSlot::new())).collect();
        Self {
            seat_map: ArcSwap::from_pointee(map),
            slots,
            retired: AtomicBool::new(false),
            edit: Mutex::new(()),
        }
    }

    fn map(&self) -> Arc<SeatMap> {
        self.seat_map.load_full()
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    // Err — первое место, которого нет в схеме
    fn slots_for<'a>(&'a self, seats: &'a [SeatRef]) -> Result<Vec<(&'a SeatRef, &'a SeatSlot)>, SeatRef> {
        seats
            .iter()
            .map(|seat| self.slots.get(seat).map(|slot| (seat, slot)).ok_or_else(|| seat.clone()))
            .collect()
    }

    fn has_reservations(&self, now: DateTime<Utc>) -> bool {
        self.slots
            .values()
            .any(|slot| slot.current().is_some_and(|r| r.effective_state(now) != SeatState::Free))
    }
}

fn first_duplicate(seats: &[SeatRef]) -> Option<SeatRef> {
    let mut seen = BTreeSet::new();
    seats.iter().find(|s| !seen.insert(*s)).cloned()
}

/* ---------- engine ---------- */

pub struct ReservationEngine {
    ledgers: DashMap<i64, Arc<ShowLedger>>,
    arbiter: LockArbiter,
    clock: Arc<dyn Clock>,
    repository: Arc<dyn SalesRepository>,
}

impl ReservationEngine {
    pub fn new(repository: Arc<dyn SalesRepository>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            ledgers: DashMap::new(),
            arbiter: LockArbiter::new(lock_timeout),
            clock,
            repository,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // Arc клонируется, чтобы не держать шард DashMap через await
    fn ledger(&self, show_id: i64) -> Option<Arc<ShowLedger>> {
        self.ledgers.get(&show_id).map(|e| Arc::clone(e.value()))
    }

    /// Загружает схемы залов и проданные места из хранилища.
    /// Удержания не переживают рестарт: после загрузки все непроданные места свободны.
    pub async fn restore(&self) -> Result<usize, SeatMapError> {
        let maps = self.repository.load_seat_maps().await?;
        let count = maps.len();

        for map in maps {
            let show_id = map.show_id();
            let records = self.repository.load_sold_records(show_id).await?;
            self.ledgers.insert(show_id, Arc::new(ShowLedger::new(map)));
            let sold = self.restore_sold(show_id, records)?;
            info!("Restored show {} with {} sold seats", show_id, sold);
        }
        Ok(count)
    }

    /// Публикует ранее проданные места сеанса. Записи вне схемы пропускаются.
    pub fn restore_sold(&self, show_id: i64, records: Vec<ReservationRecord>) -> Result<usize, SeatMapError> {
        let ledger = self.ledger(show_id).ok_or(SeatMapError::UnknownShow(show_id))?;
        let mut restored = 0;
        for record in records.into_iter().filter(|r| r.state == SeatState::Sold) {
            match ledger.slots.get(&record.seat) {
                Some(slot) => {
                    slot.publish(record);
                    restored += 1;
                }
                None => warn!("Sold seat {} is missing from show {} layout", record.seat, show_id),
            }
        }
        Ok(restored)
    }

    /* ---------- seat map ---------- */

    /// Создаёт сеанс или заменяет его схему. Замена запрещена, пока на сеанс
    /// есть проданные места или действующие удержания.
    pub async fn configure_show(&self, show: Show, layout: &SeatLayout) -> Result<Arc<SeatMap>, SeatMapError> {
        let map = SeatMap::from_layout(show, layout)?;
        let show_id = map.show_id();

        loop {
            let Some(old) = self.ledger(show_id) else {
                self.repository.save_seat_map(&map).await?;
                match self.ledgers.entry(show_id) {
                    Entry::Vacant(slot) => {
                        let ledger = Arc::new(ShowLedger::new(map));
                        let published = ledger.map();
                        slot.insert(ledger);
                        info!("Configured show {} with {} seats", show_id, published.len());
                        return Ok(published);
                    }
                    // параллельная настройка успела раньше, повторяем как перенастройку
                    Entry::Occupied(_) => continue,
                }
            };

            let _edit = old.edit.lock().await;
            let _locks = self
                .arbiter
                .acquire(old.slots.iter().map(|(seat, slot)| (seat, &slot.lock)))
                .await
                .map_err(|_| SeatMapError::Busy)?;
            if old.is_retired() {
                continue;
            }
            if old.has_reservations(self.clock.now()) {
                info!("Refusing to reconfigure show {}: reservations exist", show_id);
                return Err(SeatMapError::ReservationsExist(show_id));
            }

            self.repository.save_seat_map(&map).await?;
            let ledger = Arc::new(ShowLedger::new(map));
            let published = ledger.map();
            old.retired.store(true, Ordering::Release);
            self.ledgers.insert(show_id, ledger);
            info!("Reconfigured show {} with {} seats", show_id, published.len());
            return Ok(published);
        }
    }

    /// Корректировка цены места. Цены, уже зафиксированные удержаниями, не меняются.
    pub async fn correct_price(&self, show_id: i64, seat: &SeatRef, price: i64) -> Result<Arc<SeatMap>, SeatMapError> {
        let ledger = self.ledger(show_id).ok_or(SeatMapError::UnknownShow(show_id))?;
        let slot = ledger
            .slots
            .get(seat)
            .ok_or_else(|| SeatMapError::UnknownSeat(seat.clone()))?;

        let _edit = ledger.edit.lock().await;
        let _locks = self
            .arbiter
            .acquire([(seat, &slot.lock)])
            .await
            .map_err(|_| SeatMapError::Busy)?;
        if ledger.is_retired() {
            return Err(SeatMapError::Busy);
        }
        if slot.current().is_some_and(|r| r.state == SeatState::Sold) {
            return Err(SeatMapError::SeatSold(seat.clone()));
        }

        let next = Arc::new(ledger.map().with_price(seat, price)?);
        self.repository.update_seat_price(show_id, seat, price).await?;
        ledger.seat_map.store(Arc::clone(&next));
        info!("Price of seat {} in show {} corrected to {}", seat, show_id, price);
        Ok(next)
    }

    pub fn seat_map(&self, show_id: i64) -> Option<Arc<SeatMap>> {
        self.ledger(show_id).map(|l| l.map())
    }

    pub fn list_seats(&self, show_id: i64) -> Result<Vec<Seat>, SeatMapError> {
        self.seat_map(show_id)
            .map(|m| m.list_seats())
            .ok_or(SeatMapError::UnknownShow(show_id))
    }

    pub fn is_valid_seat(&self, show_id: i64, seat: &SeatRef) -> bool {
        self.seat_map(show_id).is_some_and(|m| m.is_valid_seat(seat))
    }

    pub fn shows(&self) -> Vec<Show> {
        let mut shows: Vec<Show> = self.ledgers.iter().map(|e| e.value().map().show.clone()).collect();
        shows.sort_by_key(|s| s.id);
        shows
    }

    /// Текущая запись места как есть, без учёта ленивого истечения.
    pub fn record(&self, show_id: i64, seat: &SeatRef) -> Option<ReservationRecord> {
        let ledger = self.ledger(show_id)?;
        let slot = ledger.slots.get(seat)?;
        slot.current().map(|r| (*r).clone())
    }

    /* ---------- reservations ---------- */

    /// Удерживает все места за `holder` или ни одного.
    pub async fn hold(
        &self,
        show_id: i64,
        seats: &[SeatRef],
        holder: &HolderId,
        ttl: Duration,
    ) -> Result<HeldSet, HoldError> {
        if seats.is_empty() {
            return Err(HoldError::EmptyRequest);
        }
        if let Some(dup) = first_duplicate(seats) {
            return Err(HoldError::DuplicateSeat(dup));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|d| *d > chrono::Duration::zero())
            .ok_or(HoldError::InvalidTtl)?;

        let ledger = self.ledger(show_id).ok_or(HoldError::UnknownShow(show_id))?;
        if !ledger.map().show.is_active {
            return Err(HoldError::ShowInactive(show_id));
        }
        let slots = ledger.slots_for(seats).map_err(HoldError::InvalidSeat)?;

        let _locks = self
            .arbiter
            .acquire(slots.iter().map(|&(seat, slot)| (seat, &slot.lock)))
            .await
            .map_err(|_| HoldError::Busy)?;
        if ledger.is_retired() {
            return Err(HoldError::Busy);
        }

        let now = self.clock.now();
        let expires_at = now + ttl;
        let map = ledger.map();

        let mut next = Vec::with_capacity(slots.len());
        for &(seat, slot) in &slots {
            let record = match slot.current() {
                Some(rec) if rec.state == SeatState::Sold => {
                    return Err(HoldError::SeatUnavailable(seat.clone()));
                }
                Some(rec) if rec.is_live_hold_of(holder, now) => rec.with_deadline(expires_at),
                Some(rec) if rec.effective_state(now) == SeatState::Held => {
                    return Err(HoldError::SeatUnavailable(seat.clone()));
                }
                _ => {
                    let price = map
                        .seat(seat)
                        .map(|s| s.price)
                        .ok_or_else(|| HoldError::InvalidSeat(seat.clone()))?;
                    ReservationRecord::held(seat.clone(), holder.clone(), now, expires_at, price)
                }
            };
            next.push(record);
        }
        let total =
            checked_sum(next.iter().map(|r| r.price.unwrap_or_default())).ok_or(HoldError::AmountOverflow)?;

        let held = HeldSet {
            show_id,
            holder: holder.clone(),
            expires_at,
            total,
            seats: next
                .iter()
                .map(|r| HeldSeat {
                    seat: r.seat.clone(),
                    price: r.price.unwrap_or_default(),
                })
                .collect(),
        };
        for (&(_, slot), record) in slots.iter().zip(next) {
            slot.publish(record);
        }

        debug!("Holder {} holds {} seats of show {} until {}", holder, held.seats.len(), show_id, expires_at);
        Ok(held)
    }

    /// Снимает удержания `holder` с указанных мест. Чужие, свободные и
    /// проданные места не трогает; повторный вызов безопасен.
    pub async fn release(&self, show_id: i64, seats: &[SeatRef], holder: &HolderId) -> Result<usize, ReleaseError> {
        if seats.is_empty() {
            return Ok(0);
        }
        let ledger = self.ledger(show_id).ok_or(ReleaseError::UnknownShow(show_id))?;

        let mut seats = seats.to_vec();
        seats.sort();
        seats.dedup();
        let slots = ledger.slots_for(&seats).map_err(ReleaseError::InvalidSeat)?;

        let _locks = self
            .arbiter
            .acquire(slots.iter().map(|&(seat, slot)| (seat, &slot.lock)))
            .await
            .map_err(|_| ReleaseError::Busy)?;
        if ledger.is_retired() {
            return Err(ReleaseError::Busy);
        }

        let mut released = 0;
        for &(_, slot) in &slots {
            if let Some(rec) = slot.current() {
                if rec.state == SeatState::Held && rec.holder.as_ref() == Some(holder) {
                    slot.publish(rec.released());
                    released += 1;
                }
            }
        }

        debug!("Holder {} released {} seats of show {}", holder, released, show_id);
        Ok(released)
    }

    /// Переводит удержанные `holder` места в `Sold`, сохраняя продажу в хранилище.
    pub async fn confirm(&self, show_id: i64, seats: &[SeatRef], holder: &HolderId) -> Result<ConfirmedSet, ConfirmError> {
        let repository = Arc::clone(&self.repository);
        let (confirmed, ()) = self
            .confirm_with(show_id, seats, holder, None, move |set| async move {
                repository.save_sold_records(set.show_id, set.records()).await
            })
            .await?;
        Ok(confirmed)
    }

    /// Как `confirm`, но долговременную запись выполняет `commit`. Он вызывается
    /// под исключениями всех мест; если он вернул ошибку, места остаются удержанными.
    pub async fn confirm_with<T, E, F, Fut>(
        &self,
        show_id: i64,
        seats: &[SeatRef],
        holder: &HolderId,
        booking_id: Option<String>,
        commit: F,
    ) -> Result<(ConfirmedSet, T), ConfirmError>
    where
        F: FnOnce(ConfirmedSet) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: Into<ConfirmError> + std::fmt::Display,
        T: Send,
    {
        if seats.is_empty() {
            return Err(ConfirmError::EmptyRequest);
        }
        if let Some(dup) = first_duplicate(seats) {
            return Err(ConfirmError::DuplicateSeat(dup));
        }

        let ledger = self.ledger(show_id).ok_or(ConfirmError::UnknownShow(show_id))?;
        let slots = ledger.slots_for(seats).map_err(ConfirmError::InvalidSeat)?;

        let _locks = self
            .arbiter
            .acquire(slots.iter().map(|&(seat, slot)| (seat, &slot.lock)))
            .await
            .map_err(|_| ConfirmError::Busy)?;
        if ledger.is_retired() {
            return Err(ConfirmError::Busy);
        }

        let now = self.clock.now();
        let mut sold = Vec::with_capacity(slots.len());
        for &(seat, slot) in &slots {
            match slot.current() {
                Some(rec) if rec.is_live_hold_of(holder, now) => sold.push(rec.sold(booking_id.clone(), now)),
                Some(rec) if rec.state == SeatState::Held && rec.holder.as_ref() == Some(holder) => {
                    return Err(ConfirmError::Expired(seat.clone()));
                }
                _ => return Err(ConfirmError::NotHeld(seat.clone())),
            }
        }
        let subtotal =
            checked_sum(sold.iter().map(|r| r.price.unwrap_or_default())).ok_or(ConfirmError::AmountOverflow)?;

        let confirmed = ConfirmedSet {
            show_id,
            holder: holder.clone(),
            booking_id,
            sold_at: now,
            subtotal,
            seats: sold
                .iter()
                .map(|r| ConfirmedSeat {
                    seat: r.seat.clone(),
                    price: r.price.unwrap_or_default(),
                })
                .collect(),
            records: sold.clone(),
        };

        let value = commit(confirmed.clone()).await.map_err(|e| {
            warn!("Commit of {} seats in show {} failed, seats stay held: {}", sold.len(), show_id, e);
            Into::<ConfirmError>::into(e)
        })?;

        for (&(_, slot), record) in slots.iter().zip(sold) {
            slot.publish(record);
        }

        info!("Holder {} bought {} seats of show {}", holder, confirmed.seats.len(), show_id);
        Ok((confirmed, value))
    }

    /* ---------- expiry ---------- */

    /// Освобождает просроченные удержания сеанса. Занятые в этот момент места
    /// пропускаются до следующего прохода.
    pub fn sweep_expired(&self, show_id: i64) -> usize {
        match self.ledger(show_id) {
            Some(ledger) => self.sweep_ledger(&ledger).0,
            None => 0,
        }
    }

    pub fn sweep_all(&self) -> SweepStats {
        let ledgers: Vec<Arc<ShowLedger>> = self.ledgers.iter().map(|e| Arc::clone(e.value())).collect();
        let mut stats = SweepStats::default();
        for ledger in ledgers {
            let (released, skipped) = self.sweep_ledger(&ledger);
            stats.shows_scanned += 1;
            stats.seats_released += released;
            stats.seats_skipped += skipped;
        }
        stats
    }

    fn sweep_ledger(&self, ledger: &ShowLedger) -> (usize, usize) {
        let now = self.clock.now();
        let (mut released, mut skipped) = (0, 0);

        for slot in ledger.slots.values() {
            if !slot.current().is_some_and(|r| r.is_expired(now)) {
                continue;
            }
            match slot.lock.try_acquire() {
                Some(_guard) => {
                    // перечитываем под исключением: удержание могли продлить
                    if let Some(rec) = slot.current().filter(|r| r.is_expired(now)) {
                        slot.publish(rec.released());
                        released += 1;
                    }
                }
                None => skipped += 1,
            }
        }
        (released, skipped)
    }

    /* ---------- reads ---------- */

    /// Снимок состояния мест сеанса. `viewer` видит свои удержания отдельно от чужих.
    pub fn availability(&self, show_id: i64, viewer: Option<&HolderId>) -> Result<Vec<SeatAvailability>, SeatMapError> {
        let ledger = self.ledger(show_id).ok_or(SeatMapError::UnknownShow(show_id))?;
        let map = ledger.map();
        let now = self.clock.now();

        Ok(map
            .list_seats()
            .into_iter()
            .map(|seat| {
                let record = ledger.slots.get(&seat.seat).and_then(|s| s.current());
                let status = match record {
                    Some(rec) => match rec.effective_state(now) {
                        SeatState::Sold => SeatStatus::Sold,
                        SeatState::Held if viewer.is_some() && rec.holder.as_ref() == viewer => SeatStatus::HeldByCaller {
                            expires_at: rec.hold_expires_at.unwrap_or(now),
                        },
                        SeatState::Held => SeatStatus::HeldByOther,
                        SeatState::Free => SeatStatus::Free,
                    },
                    None => SeatStatus::Free,
                };
                SeatAvailability {
                    seat: seat.seat,
                    label: seat.label,
                    category: seat.category,
                    price: seat.price,
                    status,
                }
            })
            .collect())
    }
}
