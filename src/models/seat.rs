use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SeatRefError;

/// Идентификатор места внутри сеанса: ряд + номер, текстовая форма `"A12"`.
///
/// Порядок (`Ord`) сначала по ряду, затем по номеру. Этот же порядок
/// используется для захвата блокировок, поэтому он должен быть один на весь процесс.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatRef {
    pub row: String,
    pub number: u32,
}

impl SeatRef {
    pub fn new(row: impl Into<String>, number: u32) -> Self {
        Self { row: row.into(), number }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SeatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

impl FromStr for SeatRef {
    type Err = SeatRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| SeatRefError(s.to_string()))?;
        let (row, number) = s.split_at(split);

        if row.is_empty() || !row.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SeatRefError(s.to_string()));
        }
        let number: u32 = number.parse().map_err(|_| SeatRefError(s.to_string()))?;
        if number == 0 {
            return Err(SeatRefError(s.to_string()));
        }

        Ok(SeatRef::new(row.to_ascii_uppercase(), number))
    }
}

impl TryFrom<String> for SeatRef {
    type Error = SeatRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatRef> for String {
    fn from(seat: SeatRef) -> Self {
        seat.to_string()
    }
}

/// Место в схеме зала. Цена в минорных единицах валюты.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub show_id: i64,
    pub seat: SeatRef,
    pub category: String,
    pub price: i64,
    pub label: String,
}

impl Seat {
    pub fn new(show_id: i64, seat: SeatRef, category: impl Into<String>, price: i64) -> Self {
        let label = seat.label();
        Self {
            show_id,
            seat,
            category: category.into(),
            price,
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_row_and_number() {
        let seat: SeatRef = "a12".parse().unwrap();
        assert_eq!(seat, SeatRef::new("A", 12));
        assert_eq!(seat.label(), "A12");

        let seat: SeatRef = "AB3".parse().unwrap();
        assert_eq!(seat, SeatRef::new("AB", 3));
    }

    #[test]
    fn rejects_malformed_labels() {
        for bad in ["", "12", "A", "A0", "1A", "A-1", "A1B"] {
            assert!(bad.parse::<SeatRef>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn orders_by_row_then_number() {
        let mut seats = vec![SeatRef::new("B", 1), SeatRef::new("A", 10), SeatRef::new("A", 2)];
        seats.sort();
        assert_eq!(
            seats,
            vec![SeatRef::new("A", 2), SeatRef::new("A", 10), SeatRef::new("B", 1)]
        );
    }

    #[test]
    fn serializes_as_label() {
        let json = serde_json::to_string(&SeatRef::new("C", 7)).unwrap();
        assert_eq!(json, "\"C7\"");
        let back: SeatRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SeatRef::new("C", 7));
    }
}
