//! Схема зала: какие места существуют у сеанса, их категории и цены.
//!
//! После настройки схема только читается. Единственное изменение —
//! корректировка цены отдельного места, которая создаёт новую копию схемы.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::SeatMapError;
use crate::models::{Seat, SeatRef, Show};

/// Категория, которую получают места одной трети ряда.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub category: String,
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSpec {
    pub seat: SeatRef,
    pub category: String,
    pub price: i64,
}

/// Описание раскладки мест, присылаемое при настройке сеанса.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeatLayout {
    /// Одинаковые ряды: места `1..=seats_per_row`, первая треть — tiers[0],
    /// вторая — tiers[1], остальные — tiers[2].
    Rows {
        rows: Vec<String>,
        seats_per_row: u32,
        tiers: Vec<TierSpec>,
    },
    Explicit { seats: Vec<SeatSpec> },
}

const FALLBACK_CATEGORY: &str = "silver";

/// Верхняя граница цены места, в минимальных единицах валюты.
pub const MAX_SEAT_PRICE: i64 = 1_000_000_000_000;
pub const MAX_ROWS: usize = 1_000;
pub const MAX_SEATS_PER_ROW: u32 = 1_000;
pub const MAX_SEATS_PER_SHOW: usize = 100_000;

fn check_price(seat: &SeatRef, price: i64) -> Result<(), SeatMapError> {
    if !(0..=MAX_SEAT_PRICE).contains(&price) {
        return Err(SeatMapError::InvalidLayout(format!(
            "price {} for {} is outside 0..={}",
            price, seat, MAX_SEAT_PRICE
        )));
    }
    Ok(())
}

fn too_many_seats(count: impl std::fmt::Display) -> SeatMapError {
    SeatMapError::InvalidLayout(format!("{} seats exceed the limit of {}", count, MAX_SEATS_PER_SHOW))
}

impl SeatLayout {
    /// Число мест после раскрытия; `None` при переполнении.
    pub fn seat_count(&self) -> Option<usize> {
        match self {
            SeatLayout::Rows { rows, seats_per_row, .. } => rows.len().checked_mul(*seats_per_row as usize),
            SeatLayout::Explicit { seats } => Some(seats.len()),
        }
    }

    /// Раскрывает раскладку в список мест сеанса.
    pub fn expand(&self, show: &Show) -> Result<Vec<Seat>, SeatMapError> {
        match self {
            SeatLayout::Rows { rows, seats_per_row, tiers } => {
                if *seats_per_row == 0 || *seats_per_row > MAX_SEATS_PER_ROW {
                    return Err(SeatMapError::InvalidLayout(format!(
                        "seats_per_row must be within 1..={}",
                        MAX_SEATS_PER_ROW
                    )));
                }
                if rows.len() > MAX_ROWS {
                    return Err(SeatMapError::InvalidLayout(format!("more than {} rows", MAX_ROWS)));
                }
                let total = self
                    .seat_count()
                    .filter(|n| *n <= MAX_SEATS_PER_SHOW)
                    .ok_or_else(|| too_many_seats(format!("{} x {}", rows.len(), seats_per_row)))?;
                let mut seats = Vec::with_capacity(total);
                for row in rows {
                    let row = row.trim().to_ascii_uppercase();
                    if row.is_empty() || !row.chars().all(|c| c.is_ascii_alphabetic()) {
                        return Err(SeatMapError::InvalidLayout(format!("bad row label '{}'", row)));
                    }
                    for number in 1..=*seats_per_row {
                        let (category, price) = match tier_for(number, *seats_per_row, tiers) {
                            Some(t) => (t.category.clone(), t.price),
                            None => (FALLBACK_CATEGORY.to_string(), show.base_price),
                        };
                        seats.push(Seat::new(show.id, SeatRef::new(row.clone(), number), category, price));
                    }
                }
                Ok(seats)
            }
            SeatLayout::Explicit { seats } => {
                if seats.len() > MAX_SEATS_PER_SHOW {
                    return Err(too_many_seats(seats.len()));
                }
                Ok(seats
                    .iter()
                    .map(|s| Seat::new(show.id, s.seat.clone(), s.category.clone(), s.price))
                    .collect())
            }
        }
    }
}

// Индекс категории по позиции в ряду, ограниченный числом категорий
fn tier_for(number: u32, seats_per_row: u32, tiers: &[TierSpec]) -> Option<&TierSpec> {
    if tiers.is_empty() {
        return None;
    }
    let idx = if number <= seats_per_row / 3 {
        0
    } else if number <= 2 * seats_per_row / 3 {
        1
    } else {
        2
    };
    tiers.get(idx.min(tiers.len() - 1))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatMap {
    pub show: Show,
    seats: BTreeMap<SeatRef, Seat>,
}

impl SeatMap {
    pub fn new(show: Show, seats: Vec<Seat>) -> Result<Self, SeatMapError> {
        if seats.is_empty() {
            return Err(SeatMapError::EmptyLayout);
        }
        if seats.len() > MAX_SEATS_PER_SHOW {
            return Err(too_many_seats(seats.len()));
        }
        let mut map = BTreeMap::new();
        for seat in seats {
            check_price(&seat.seat, seat.price)?;
            let key = seat.seat.clone();
            if map.insert(key.clone(), seat).is_some() {
                return Err(SeatMapError::DuplicateSeat(key));
            }
        }
        Ok(Self { show, seats: map })
    }

    pub fn from_layout(show: Show, layout: &SeatLayout) -> Result<Self, SeatMapError> {
        let seats = layout.expand(&show)?;
        Self::new(show, seats)
    }

    pub fn show_id(&self) -> i64 {
        self.show.id
    }

    /// Все места, упорядоченные по ряду и номеру.
    pub fn list_seats(&self) -> Vec<Seat> {
        self.seats.values().cloned().collect()
    }

    pub fn is_valid_seat(&self, seat: &SeatRef) -> bool {
        self.seats.contains_key(seat)
    }

    pub fn seat(&self, seat: &SeatRef) -> Option<&Seat> {
        self.seats.get(seat)
    }

    pub fn seat_refs(&self) -> impl Iterator<Item = &SeatRef> {
        self.seats.keys()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Копия схемы с новой ценой места.
    pub fn with_price(&self, seat: &SeatRef, price: i64) -> Result<Self, SeatMapError> {
        check_price(seat, price)?;
        let mut next = self.clone();
        let entry = next
            .seats
            .get_mut(seat)
            .ok_or_else(|| SeatMapError::UnknownSeat(seat.clone()))?;
        entry.price = price;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    pub(crate) fn show(id: i64) -> Show {
        Show {
            id,
            title: "Evening concert".into(),
            show_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            starts_at: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            ends_at: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            base_price: 10_000,
            is_active: true,
        }
    }

    fn tier(category: &str, price: i64) -> TierSpec {
        TierSpec { category: category.into(), price }
    }

    #[test]
    fn rows_layout_splits_row_into_thirds() {
        let layout = SeatLayout::Rows {
            rows: vec!["a".into(), "B".into()],
            seats_per_row: 9,
            tiers: vec![tier("silver", 150), tier("gold", 200), tier("premium", 300)],
        };
        let map = SeatMap::from_layout(show(1), &layout).unwrap();

        assert_eq!(map.len(), 18);
        let cat = |n| map.seat(&SeatRef::new("A", n)).unwrap().category.clone();
        assert_eq!(cat(1), "silver");
        assert_eq!(cat(3), "silver");
        assert_eq!(cat(4), "gold");
        assert_eq!(cat(6), "gold");
        assert_eq!(cat(7), "premium");
        assert_eq!(map.seat(&SeatRef::new("B", 9)).unwrap().price, 300);
    }

    #[test]
    fn missing_tiers_fall_back() {
        let layout = SeatLayout::Rows {
            rows: vec!["A".into()],
            seats_per_row: 6,
            tiers: vec![tier("gold", 200)],
        };
        let map = SeatMap::from_layout(show(1), &layout).unwrap();
        assert!(map.list_seats().iter().all(|s| s.category == "gold"));

        let layout = SeatLayout::Rows {
            rows: vec!["A".into()],
            seats_per_row: 2,
            tiers: vec![],
        };
        let map = SeatMap::from_layout(show(1), &layout).unwrap();
        let seat = map.seat(&SeatRef::new("A", 2)).unwrap();
        assert_eq!(seat.category, "silver");
        assert_eq!(seat.price, 10_000);
    }

    #[test]
    fn rejects_bad_layouts() {
        let empty = SeatLayout::Explicit { seats: vec![] };
        assert!(matches!(SeatMap::from_layout(show(1), &empty), Err(SeatMapError::EmptyLayout)));

        let zero = SeatLayout::Rows { rows: vec!["A".into()], seats_per_row: 0, tiers: vec![] };
        assert!(matches!(SeatMap::from_layout(show(1), &zero), Err(SeatMapError::InvalidLayout(_))));

        let spec = SeatSpec { seat: SeatRef::new("A", 1), category: "vip".into(), price: 500 };
        let dup = SeatLayout::Explicit { seats: vec![spec.clone(), spec] };
        assert!(matches!(SeatMap::from_layout(show(1), &dup), Err(SeatMapError::DuplicateSeat(_))));
    }

    #[test]
    fn rejects_oversized_layouts() {
        let wide = SeatLayout::Rows { rows: vec!["A".into()], seats_per_row: u32::MAX, tiers: vec![] };
        assert!(matches!(SeatMap::from_layout(show(1), &wide), Err(SeatMapError::InvalidLayout(_))));

        let rows: Vec<String> = (0..MAX_ROWS + 1).map(|i| format!("R{}", i)).collect();
        let tall = SeatLayout::Rows { rows, seats_per_row: 1, tiers: vec![] };
        assert!(matches!(SeatMap::from_layout(show(1), &tall), Err(SeatMapError::InvalidLayout(_))));

        // каждое измерение в пределах, но произведение больше лимита зала
        let rows: Vec<String> = (0..MAX_ROWS).map(|_| "A".to_string()).collect();
        let big = SeatLayout::Rows { rows, seats_per_row: MAX_SEATS_PER_ROW, tiers: vec![] };
        assert!(matches!(SeatMap::from_layout(show(1), &big), Err(SeatMapError::InvalidLayout(_))));

        let spec = SeatSpec { seat: SeatRef::new("A", 1), category: "vip".into(), price: 1 };
        let long = SeatLayout::Explicit { seats: vec![spec; MAX_SEATS_PER_SHOW + 1] };
        assert!(matches!(SeatMap::from_layout(show(1), &long), Err(SeatMapError::InvalidLayout(_))));
    }

    #[test]
    fn prices_are_bounded() {
        let pricey = SeatLayout::Rows {
            rows: vec!["A".into()],
            seats_per_row: 2,
            tiers: vec![tier("vip", i64::MAX / 2 + 1)],
        };
        assert!(matches!(SeatMap::from_layout(show(1), &pricey), Err(SeatMapError::InvalidLayout(_))));

        let top = SeatLayout::Rows { rows: vec!["A".into()], seats_per_row: 1, tiers: vec![tier("vip", MAX_SEAT_PRICE)] };
        let map = SeatMap::from_layout(show(1), &top).unwrap();
        assert!(map.with_price(&SeatRef::new("A", 1), MAX_SEAT_PRICE + 1).is_err());
        assert!(map.with_price(&SeatRef::new("A", 1), -1).is_err());
    }

    #[test]
    fn lists_in_seat_order_and_validates_membership() {
        let layout = SeatLayout::Rows {
            rows: vec!["B".into(), "A".into()],
            seats_per_row: 2,
            tiers: vec![tier("silver", 100)],
        };
        let map = SeatMap::from_layout(show(1), &layout).unwrap();
        let labels: Vec<_> = map.list_seats().into_iter().map(|s| s.label).collect();
        assert_eq!(labels, vec!["A1", "A2", "B1", "B2"]);

        assert!(map.is_valid_seat(&SeatRef::new("A", 2)));
        assert!(!map.is_valid_seat(&SeatRef::new("A", 3)));
        assert!(!map.is_valid_seat(&SeatRef::new("C", 1)));
    }

    #[test]
    fn price_correction_copies_the_map() {
        let layout = SeatLayout::Rows { rows: vec!["A".into()], seats_per_row: 1, tiers: vec![tier("silver", 100)] };
        let map = SeatMap::from_layout(show(1), &layout).unwrap();
        let corrected = map.with_price(&SeatRef::new("A", 1), 250).unwrap();

        assert_eq!(map.seat(&SeatRef::new("A", 1)).unwrap().price, 100);
        assert_eq!(corrected.seat(&SeatRef::new("A", 1)).unwrap().price, 250);
        assert!(matches!(
            map.with_price(&SeatRef::new("Z", 1), 1),
            Err(SeatMapError::UnknownSeat(_))
        ));
    }
}
