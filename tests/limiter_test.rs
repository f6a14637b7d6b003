//! Tests for [`RateLimiter`] — sliding-window admission with FIFO queueing.
//!
//! All timing runs under `start_paused` so the drain loop's sleeps advance
//! virtual time deterministically.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use heimdall::{HeimdallError, LimiterRegistry, RateLimiter, ServiceConfig, ServiceId, ServiceTable};

fn limiter(capacity: u32, window: Duration) -> RateLimiter {
    RateLimiter::new(ServiceId::CoinGecko, &ServiceConfig::new(capacity, window))
}

// =========================================================================
// Capacity invariant
// =========================================================================

#[tokio::test(start_paused = true)]
async fn burst_beyond_capacity_waits_for_window() {
    let limiter = limiter(2, Duration::from_secs(1));
    let start = Instant::now();

    let (d1, d2, d3) = tokio::join!(
        async {
            limiter.execute(|| async { Ok(()) }).await.unwrap();
            start.elapsed()
        },
        async {
            limiter.execute(|| async { Ok(()) }).await.unwrap();
            start.elapsed()
        },
        async {
            limiter.execute(|| async { Ok(()) }).await.unwrap();
            start.elapsed()
        },
    );

    // First two fit the window; the third waits for the oldest slot to age out.
    assert!(d1 < Duration::from_millis(100), "first call should be immediate, took {d1:?}");
    assert!(d2 < Duration::from_millis(100), "second call should be immediate, took {d2:?}");
    assert!(d3 >= Duration::from_secs(1), "third call should wait a full window, took {d3:?}");
    assert!(d3 < Duration::from_millis(1_200), "third call waited too long: {d3:?}");
}

#[tokio::test(start_paused = true)]
async fn admissions_stay_within_capacity_across_windows() {
    let limiter = Arc::new(limiter(2, Duration::from_secs(1)));
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.execute(|| async { Ok(()) }).await.unwrap();
            start.elapsed()
        }));
    }

    let mut completions = Vec::new();
    for handle in handles {
        completions.push(handle.await.unwrap());
    }
    completions.sort();

    // Two per window: pairs land at roughly t=0, t=1s, t=2s.
    for (i, elapsed) in completions.iter().enumerate() {
        let expected_window = (i / 2) as u64;
        assert!(
            *elapsed >= Duration::from_secs(expected_window),
            "call {i} completed at {elapsed:?}, before window {expected_window}"
        );
        assert!(
            *elapsed < Duration::from_millis(expected_window * 1000 + 500),
            "call {i} completed at {elapsed:?}, after window {expected_window}"
        );
    }
}

// =========================================================================
// FIFO fairness
// =========================================================================

#[tokio::test(start_paused = true)]
async fn tasks_complete_in_enqueue_order() {
    let limiter = limiter(1, Duration::from_millis(50));
    let order = Arc::new(Mutex::new(Vec::new()));

    let run = |i: usize| {
        let order = Arc::clone(&order);
        limiter.execute(move || async move {
            order.lock().unwrap().push(i);
            Ok(())
        })
    };

    let (r0, r1, r2, r3) = tokio::join!(run(0), run(1), run(2), run(3));
    r0.unwrap();
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

// =========================================================================
// Failure isolation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn failed_task_does_not_block_the_queue() {
    let limiter = limiter(10, Duration::from_secs(1));

    let failing = limiter.execute(|| async {
        Err::<(), _>(HeimdallError::Http("connection refused".into()))
    });
    let succeeding = limiter.execute(|| async { Ok(7) });

    let (failed, succeeded) = tokio::join!(failing, succeeding);
    assert!(matches!(failed, Err(HeimdallError::Http(_))));
    assert_eq!(succeeded.unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn task_result_passes_through_unchanged() {
    let limiter = limiter(5, Duration::from_secs(1));
    let result = limiter
        .execute(|| async { Ok(String::from("payload")) })
        .await
        .unwrap();
    assert_eq!(result, "payload");
}

// =========================================================================
// Admission probes
// =========================================================================

#[tokio::test(start_paused = true)]
async fn window_frees_up_after_it_passes() {
    let limiter = limiter(1, Duration::from_secs(1));

    limiter.execute(|| async { Ok(()) }).await.unwrap();
    assert!(!limiter.can_admit());
    assert!(limiter.time_until_next_slot() > Duration::ZERO);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(limiter.can_admit());
    assert_eq!(limiter.time_until_next_slot(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn status_reports_occupancy_and_queue() {
    let limiter = Arc::new(limiter(2, Duration::from_secs(1)));

    limiter.execute(|| async { Ok(()) }).await.unwrap();
    limiter.execute(|| async { Ok(()) }).await.unwrap();

    // Window is full; a third task has to queue.
    let queued = {
        let limiter = Arc::clone(&limiter);
        tokio::spawn(async move { limiter.execute(|| async { Ok(()) }).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    let status = limiter.status();
    assert_eq!(status.in_window, 2);
    assert_eq!(status.remaining, 0);
    assert_eq!(status.queued, 1);
    assert!(status.next_slot_in > Duration::ZERO);

    queued.await.unwrap().unwrap();
}

// =========================================================================
// Reset
// =========================================================================

#[tokio::test(start_paused = true)]
async fn reset_discards_queued_tasks() {
    let limiter = Arc::new(limiter(1, Duration::from_secs(60)));
    let invoked = Arc::new(AtomicU32::new(0));

    // Fill the window.
    limiter.execute(|| async { Ok(()) }).await.unwrap();

    let queued = {
        let limiter = Arc::clone(&limiter);
        let invoked = Arc::clone(&invoked);
        tokio::spawn(async move {
            limiter
                .execute(move || async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;

    limiter.reset();

    let result = queued.await.unwrap();
    assert!(matches!(result, Err(HeimdallError::LimiterClosed)));
    assert_eq!(invoked.load(Ordering::SeqCst), 0, "discarded task must never run");
}

#[tokio::test(start_paused = true)]
async fn reset_clears_the_window() {
    let limiter = limiter(1, Duration::from_secs(60));
    limiter.execute(|| async { Ok(()) }).await.unwrap();
    assert!(!limiter.can_admit());

    limiter.reset();
    assert!(limiter.can_admit());
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn registry_limiters_are_independent() {
    let registry = LimiterRegistry::new(&ServiceTable::rate_card());

    // Fill one service's window; another service is unaffected.
    let basescan = registry.get(ServiceId::Basescan);
    for _ in 0..5 {
        basescan.execute(|| async { Ok(()) }).await.unwrap();
    }
    assert!(!basescan.can_admit());
    assert!(registry.get(ServiceId::CoinGecko).can_admit());

    registry.reset_all();
    assert!(registry.get(ServiceId::Basescan).can_admit());
}
