// Prewarm scheduler tests
// Author: kelexine (https://github.com/kelexine)

use marketcache::cache::{AccessMeta, CacheService};
use marketcache::config::PrewarmConfig;
use marketcache::prewarm::{CycleReport, PrewarmScheduler, Warmer};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(top_n: usize, concurrency: usize) -> PrewarmConfig {
    PrewarmConfig {
        top_n,
        concurrency,
        ..Default::default()
    }
}

/// Warmer that records every tenant it is called with.
fn recording_warmer(name: &str, seen: &Arc<Mutex<Vec<String>>>) -> Warmer {
    let seen = seen.clone();
    Warmer::new(name, move |tenant: String| {
        let seen = seen.clone();
        async move {
            seen.lock().push(tenant);
            Ok::<_, anyhow::Error>(())
        }
    })
}

fn record(cache: &CacheService, slug: &str, hits: usize) {
    for _ in 0..hits {
        cache.record_access(&AccessMeta::slug(slug));
    }
}

#[tokio::test]
async fn test_cycle_skipped_without_activity() {
    let cache = CacheService::disabled();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let scheduler = PrewarmScheduler::new(cache, config(20, 3))
        .with_warmer(recording_warmer("listing", &seen));

    let report = scheduler.run_cycle().await;

    assert_eq!(report, CycleReport::default());
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_failing_tenant_does_not_stop_cycle() {
    let cache = CacheService::disabled();
    record(&cache, "a", 3);
    record(&cache, "b", 2);
    record(&cache, "c", 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let failing = Warmer::new("listing", |tenant: String| async move {
        if tenant == "b" {
            anyhow::bail!("store {} unavailable", tenant);
        }
        Ok(())
    });
    let scheduler = PrewarmScheduler::new(cache, config(20, 1))
        .with_warmer(failing)
        .with_warmer(recording_warmer("products", &seen));

    let report = scheduler.run_cycle().await;

    assert_eq!(
        report,
        CycleReport {
            tenants: 3,
            attempted: 6,
            failed: 1,
        }
    );
    // the second warmer still ran for b, and c was reached after it
    assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_panicking_warmer_is_contained() {
    let cache = CacheService::disabled();
    record(&cache, "a", 2);
    record(&cache, "b", 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let panicking = Warmer::new("listing", |tenant: String| async move {
        if tenant == "a" {
            panic!("warmer bug");
        }
        Ok::<_, anyhow::Error>(())
    });
    let scheduler = PrewarmScheduler::new(cache, config(20, 2))
        .with_warmer(panicking)
        .with_warmer(recording_warmer("products", &seen));

    let report = scheduler.run_cycle().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.attempted, 4);
    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["a", "b"]);
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let cache = CacheService::disabled();
    for i in 0..10 {
        record(&cache, &format!("tenant-{}", i), 1);
    }

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let warmer = {
        let active = active.clone();
        let peak = peak.clone();
        Warmer::new("slow", move |_tenant: String| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            }
        })
    };

    let scheduler = PrewarmScheduler::new(cache, config(20, 3)).with_warmer(warmer);
    let report = scheduler.run_cycle().await;

    assert_eq!(report.tenants, 10);
    assert_eq!(report.failed, 0);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_only_top_tenants_are_warmed() {
    let cache = CacheService::disabled();
    record(&cache, "quiet", 1);
    record(&cache, "busy", 9);
    record(&cache, "steady", 4);
    // a tenant known only by id is addressed by that id
    for _ in 0..6 {
        cache.record_access(&AccessMeta::id("42"));
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let scheduler = PrewarmScheduler::new(cache, config(3, 1))
        .with_warmer(recording_warmer("listing", &seen));

    let report = scheduler.run_cycle().await;

    assert_eq!(report.tenants, 3);
    assert_eq!(*seen.lock(), vec!["busy", "42", "steady"]);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_on_interval_until_stopped() {
    let cache = CacheService::disabled();
    record(&cache, "pizza", 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let prewarm = PrewarmConfig {
        initial_delay_seconds: 30,
        interval_seconds: 300,
        ..Default::default()
    };
    let handle = PrewarmScheduler::new(cache, prewarm)
        .with_warmer(recording_warmer("listing", &seen))
        .start();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(seen.lock().len(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(seen.lock().len(), 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(seen.lock().len(), 2);

    handle.stop().await;

    tokio::time::sleep(Duration::from_secs(1000)).await;
    assert_eq!(seen.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_stops_scheduler() {
    let cache = CacheService::disabled();
    record(&cache, "pizza", 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handle = PrewarmScheduler::new(cache, PrewarmConfig::default())
        .with_warmer(recording_warmer("listing", &seen))
        .start();
    drop(handle);

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_cycle_is_retried_on_next_tick() {
    let cache = CacheService::disabled();
    record(&cache, "pizza", 1);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    // Panics while building the warm future, outside the per-warmer guard
    let flaky = {
        let seen = seen.clone();
        let attempts = attempts.clone();
        Warmer::new("listing", move |tenant: String| {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("warmer setup failed");
            }
            let seen = seen.clone();
            async move {
                seen.lock().push(tenant);
                Ok::<_, anyhow::Error>(())
            }
        })
    };
    let prewarm = PrewarmConfig {
        initial_delay_seconds: 10,
        interval_seconds: 60,
        ..Default::default()
    };
    let handle = PrewarmScheduler::new(cache, prewarm)
        .with_warmer(flaky)
        .start();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(seen.lock().is_empty());
    assert!(!handle.is_finished());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(*seen.lock(), vec!["pizza"]);

    handle.stop().await;
}
