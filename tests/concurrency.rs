mod common;

use box_office::error::{ConfirmError, HoldError};
use box_office::models::{SeatRef, SeatState};
use common::{holder, rows, seats, secs, Harness};
use futures::future::join_all;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_winner_among_many_holders() {
    let h = Harness::with_lock_timeout(Duration::from_secs(5))
        .with_show(1, rows(&["A"], 1, 100))
        .await;

    let attempts = (0..100).map(|i| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            let who = holder(&format!("h{}", i));
            let result = engine.hold(1, &seats(&["A1"]), &who, secs(60)).await;
            (who, result)
        })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    for (_, result) in &results {
        if let Err(e) = result {
            assert_eq!(*e, HoldError::SeatUnavailable(SeatRef::new("A", 1)));
        }
    }

    let record = h.engine.record(1, &SeatRef::new("A", 1)).unwrap();
    assert_eq!(record.holder.as_ref(), Some(&winners[0].0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reversed_overlapping_requests_do_not_deadlock() {
    let h = Harness::with_lock_timeout(Duration::from_secs(5))
        .with_show(1, rows(&["A", "B"], 10, 100))
        .await;

    let forward: Vec<SeatRef> = seats(&["A1", "A5", "A10", "B3", "B7"]);
    let mut backward = forward.clone();
    backward.reverse();

    let tasks = (0..40).map(|i| {
        let engine = h.engine.clone();
        let request = if i % 2 == 0 { forward.clone() } else { backward.clone() };
        tokio::spawn(async move {
            let who = holder(&format!("h{}", i));
            for _ in 0..10 {
                match engine.hold(1, &request, &who, secs(60)).await {
                    Ok(_) => {
                        engine.release(1, &request, &who).await.unwrap();
                    }
                    Err(HoldError::SeatUnavailable(_)) => tokio::task::yield_now().await,
                    Err(other) => panic!("unexpected hold error: {:?}", other),
                }
            }
        })
    });

    let finished = tokio::time::timeout(Duration::from_secs(30), join_all(tasks)).await;
    for joined in finished.expect("overlapping requests stalled") {
        joined.unwrap();
    }
    for seat in &forward {
        assert_ne!(h.engine.record(1, seat).map(|r| r.state), Some(SeatState::Held));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_confirm_sells_once() {
    let h = Harness::with_lock_timeout(Duration::from_secs(5))
        .with_show(1, rows(&["A"], 2, 100))
        .await;
    let x = holder("x");
    let pair = seats(&["A1", "A2"]);
    h.engine.hold(1, &pair, &x, secs(60)).await.unwrap();

    let attempts = (0..8).map(|_| {
        let engine = h.engine.clone();
        let (pair, x) = (pair.clone(), x.clone());
        tokio::spawn(async move { engine.confirm(1, &pair, &x).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ConfirmError::NotHeld(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_shows_proceed_in_parallel() {
    let mut h = Harness::with_lock_timeout(Duration::from_millis(100));
    for show_id in 1..=4 {
        h = h.with_show(show_id, rows(&["A"], 20, 100)).await;
    }

    let tasks = (1..=4).map(|show_id| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            let who = holder(&format!("buyer-{}", show_id));
            for n in 1..=20u32 {
                let seat = [SeatRef::new("A", n)];
                engine.hold(show_id, &seat, &who, secs(60)).await.unwrap();
                engine.confirm(show_id, &seat, &who).await.unwrap();
            }
        })
    });
    for joined in join_all(tasks).await {
        joined.unwrap();
    }

    for show_id in 1..=4 {
        let sold = h
            .engine
            .availability(show_id, None)
            .unwrap()
            .into_iter()
            .filter(|s| s.status == box_office::engine::SeatStatus::Sold)
            .count();
        assert_eq!(sold, 20);
    }
}
