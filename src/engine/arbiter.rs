//! Арбитр блокировок: одно исключение на место сеанса.
//!
//! Многоместные операции захватывают исключения строго в порядке `SeatRef`,
//! поэтому два запроса с пересекающимися наборами мест не могут взаимно
//! заблокироваться. Ожидание ограничено таймаутом, после которого клиенту
//! отвечают «повторите попытку».

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::models::SeatRef;

/// Исключение на одно место.
#[derive(Debug, Default)]
pub struct SeatLock(Arc<Mutex<()>>);

impl SeatLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Неблокирующий захват, для фоновой очистки.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.0).try_lock_owned().ok()
    }
}

/// Захваченные исключения; освобождаются при drop.
#[derive(Debug)]
pub struct HeldLocks {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl HeldLocks {
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("timed out acquiring lock for seat {seat}")]
pub struct LockTimeout {
    pub seat: SeatRef,
}

#[derive(Debug, Clone)]
pub struct LockArbiter {
    timeout: Duration,
}

impl LockArbiter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Захватывает все переданные исключения в глобальном порядке мест.
    /// При таймауте уже захваченные исключения отпускаются.
    pub async fn acquire<'a, I>(&self, locks: I) -> Result<HeldLocks, LockTimeout>
    where
        I: IntoIterator<Item = (&'a SeatRef, &'a SeatLock)>,
    {
        let mut ordered: Vec<(&SeatRef, &SeatLock)> = locks.into_iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));
        // повторный захват того же мьютекса повесил бы запрос навсегда
        ordered.dedup_by(|a, b| a.0 == b.0);

        let deadline = Instant::now() + self.timeout;
        let mut guards = Vec::with_capacity(ordered.len());

        for (seat, lock) in ordered {
            match tokio::time::timeout_at(deadline, Arc::clone(&lock.0).lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    debug!("lock wait for seat {} exceeded {:?}", seat, self.timeout);
                    return Err(LockTimeout { seat: seat.clone() });
                }
            }
        }

        Ok(HeldLocks { guards })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_and_releases_on_drop() {
        let arbiter = LockArbiter::new(Duration::from_millis(50));
        let a = (SeatRef::new("A", 1), SeatLock::new());
        let b = (SeatRef::new("A", 2), SeatLock::new());

        let held = arbiter.acquire([(&b.0, &b.1), (&a.0, &a.1)]).await.unwrap();
        assert_eq!(held.len(), 2);
        assert!(a.1.try_acquire().is_none());

        drop(held);
        assert!(a.1.try_acquire().is_some());
    }

    #[tokio::test]
    async fn times_out_on_contended_seat() {
        let arbiter = LockArbiter::new(Duration::from_millis(20));
        let a = (SeatRef::new("A", 1), SeatLock::new());
        let b = (SeatRef::new("A", 2), SeatLock::new());

        let _busy = b.1.try_acquire().unwrap();
        let err = arbiter.acquire([(&a.0, &a.1), (&b.0, &b.1)]).await.unwrap_err();
        assert_eq!(err.seat, SeatRef::new("A", 2));

        // A1 не остался захваченным после неудачи
        assert!(a.1.try_acquire().is_some());
    }

    #[tokio::test]
    async fn duplicate_entries_do_not_self_deadlock() {
        let arbiter = LockArbiter::new(Duration::from_millis(20));
        let a = (SeatRef::new("A", 1), SeatLock::new());

        let held = arbiter.acquire([(&a.0, &a.1), (&a.0, &a.1)]).await.unwrap();
        assert_eq!(held.len(), 1);
    }
}
