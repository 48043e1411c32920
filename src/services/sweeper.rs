use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{ReservationEngine, SweepStats};

/// Фоновая очистка просроченных удержаний.
///
/// Корректность от неё не зависит (истечение ленивое), она лишь возвращает
/// места в `Free`, чтобы записи не копились.
pub struct ExpirySweeper {
    engine: Arc<ReservationEngine>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(engine: Arc<ReservationEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Один проход по всем сеансам
    pub fn run_once(&self) -> SweepStats {
        let stats = self.engine.sweep_all();

        if stats.seats_released > 0 || stats.seats_skipped > 0 {
            info!(
                "🧹 Released {} expired holds across {} shows ({} busy, retry next round)",
                stats.seats_released, stats.shows_scanned, stats.seats_skipped
            );
        } else {
            debug!("🧹 No expired holds in {} shows", stats.shows_scanned);
        }
        stats
    }

    pub fn spawn(self) -> JoinHandle<()> {
        info!("🧹 Expiry sweeper started, interval {:?}", self.interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once();
            }
        })
    }
}
