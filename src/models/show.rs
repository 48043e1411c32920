use serde::{Deserialize, Serialize};
use chrono::{NaiveDate, NaiveTime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    pub title: String,
    pub show_date: NaiveDate,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    // Базовая цена в минорных единицах, используется когда у категории нет своей цены
    pub base_price: i64,
    pub is_active: bool,
}
