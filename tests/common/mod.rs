#![allow(dead_code)]

use box_office::clock::{Clock, ManualClock};
use box_office::engine::ReservationEngine;
use box_office::models::{HolderId, SeatRef, Show};
use box_office::repository::{MemorySalesRepository, SalesRepository};
use box_office::seat_map::{SeatLayout, TierSpec};
use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use std::time::Duration;

pub fn show(id: i64) -> Show {
    Show {
        id,
        title: format!("Show #{}", id),
        show_date: NaiveDate::from_ymd_opt(2025, 4, 12).unwrap(),
        starts_at: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
        ends_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
        base_price: 20_000,
        is_active: true,
    }
}

/// Ряды с одинаковой ценой во всех местах.
pub fn rows(rows: &[&str], seats_per_row: u32, price: i64) -> SeatLayout {
    SeatLayout::Rows {
        rows: rows.iter().map(|r| r.to_string()).collect(),
        seats_per_row,
        tiers: vec![TierSpec { category: "silver".into(), price }],
    }
}

pub fn holder(id: &str) -> HolderId {
    HolderId::new(id).unwrap()
}

pub fn seats(labels: &[&str]) -> Vec<SeatRef> {
    labels.iter().map(|l| l.parse().unwrap()).collect()
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub struct Harness {
    pub engine: Arc<ReservationEngine>,
    pub clock: Arc<ManualClock>,
    pub repository: Arc<MemorySalesRepository>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_millis(250))
    }

    pub fn with_lock_timeout(timeout: Duration) -> Self {
        let clock = Arc::new(ManualClock::at_epoch());
        let repository = Arc::new(MemorySalesRepository::new());
        let dyn_repo: Arc<dyn SalesRepository> = repository.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let engine = Arc::new(ReservationEngine::new(dyn_repo, dyn_clock, timeout));
        Self { engine, clock, repository }
    }

    pub async fn with_show(self, id: i64, layout: SeatLayout) -> Self {
        self.engine.configure_show(show(id), &layout).await.unwrap();
        self
    }

    /// Сдвигает часы на `n` секунд от текущего момента.
    pub fn advance(&self, n: i64) {
        self.clock.advance(chrono::Duration::seconds(n));
    }
}
