//! Уведомления о подтверждённых покупках.
//!
//! Покупка публикует событие в broadcast-канал; подписчики (письмо с
//! билетами, аналитика) живут отдельно и не влияют на результат покупки.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::models::{HolderId, SeatRef};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingConfirmed {
    pub booking_id: String,
    pub show_id: i64,
    pub holder: HolderId,
    pub seats: Vec<SeatRef>,
    pub ticket_ids: Vec<String>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct BookingNotifier {
    sender: broadcast::Sender<BookingConfirmed>,
}

impl Default for BookingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingConfirmed> {
        self.sender.subscribe()
    }

    /// Отсутствие подписчиков не ошибка: событие просто никто не получит.
    pub fn publish(&self, event: BookingConfirmed) {
        let booking_id = event.booking_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => debug!("Booking {} announced to {} subscribers", booking_id, receivers),
            Err(_) => debug!("Booking {} confirmed, nobody is listening", booking_id),
        }
    }

    /// Запускает подписчика, который пишет подтверждения в лог.
    pub fn spawn_log_consumer(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => info!(
                        "📧 Booking {} for {}: {} tickets, total {}",
                        event.booking_id,
                        event.holder,
                        event.ticket_ids.len(),
                        event.total
                    ),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("📧 Notification consumer lagged, {} events dropped", missed)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
