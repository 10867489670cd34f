// Prewarm scheduler
// Periodically re-populates cache entries for the most accessed tenants.
// Author: kelexine (https://github.com/kelexine)

use crate::cache::CacheService;
use crate::config::PrewarmConfig;
use crate::metrics;
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

type WarmFn = dyn Fn(String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A named callback that re-populates one kind of cached data for a tenant.
///
/// Warmers are owned by the services that own the data; the scheduler only
/// decides when and for whom they run.
#[derive(Clone)]
pub struct Warmer {
    name: String,
    run: Arc<WarmFn>,
}

impl Warmer {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Arc::new(move |tenant| f(tenant).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the warmer for one tenant.
    pub fn call(&self, tenant: impl Into<String>) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)(tenant.into())
    }
}

impl std::fmt::Debug for Warmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warmer").field("name", &self.name).finish()
    }
}

/// Outcome of one prewarm cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Tenants taken from the queue.
    pub tenants: usize,
    /// Warmer invocations started.
    pub attempted: usize,
    /// Warmer invocations that failed or panicked.
    pub failed: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.tenants += other.tenants;
        self.attempted += other.attempted;
        self.failed += other.failed;
    }
}

/// Keeps the cache warm for the busiest tenants.
///
/// Each cycle takes the top-N tenants from the access tracker and hands them
/// to a fixed pool of workers sharing one queue, so at most `concurrency`
/// warmers run at any moment regardless of how many tenants are due.
pub struct PrewarmScheduler {
    cache: CacheService,
    warmers: Vec<Warmer>,
    config: PrewarmConfig,
}

impl PrewarmScheduler {
    pub fn new(cache: CacheService, config: PrewarmConfig) -> Self {
        Self {
            cache,
            warmers: Vec::new(),
            config,
        }
    }

    pub fn with_warmer(mut self, warmer: Warmer) -> Self {
        self.warmers.push(warmer);
        self
    }

    pub fn with_warmers(mut self, warmers: impl IntoIterator<Item = Warmer>) -> Self {
        self.warmers.extend(warmers);
        self
    }

    /// Run one cycle now. Never fails: warmer errors are logged and counted.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let tenants: VecDeque<String> = self
            .cache
            .list_top_tenants(Some(self.config.top_n))
            .into_iter()
            .filter_map(|stat| stat.identifier().map(str::to_string))
            .collect();

        if tenants.is_empty() {
            info!("[PREWARM] no tenant activity recorded yet, skipping cycle");
            metrics::record_prewarm_cycle("skipped", started.elapsed().as_secs_f64());
            return CycleReport::default();
        }

        let workers = self.config.concurrency.max(1).min(tenants.len());
        info!(
            "[PREWARM] warming {} tenants with {} workers",
            tenants.len(),
            workers
        );

        let queue = Mutex::new(tenants);
        let reports = join_all((0..workers).map(|worker| self.worker(worker, &queue))).await;

        let mut report = CycleReport::default();
        for partial in reports {
            report.merge(partial);
        }

        let elapsed = started.elapsed();
        let status = if report.failed == 0 { "completed" } else { "partial" };
        metrics::record_prewarm_cycle(status, elapsed.as_secs_f64());
        info!(
            "[PREWARM] cycle {} in {}ms: tenants={} attempted={} failed={}",
            status,
            elapsed.as_millis(),
            report.tenants,
            report.attempted,
            report.failed
        );
        report
    }

    /// Pull tenants off the shared queue until it is empty.
    async fn worker(&self, worker: usize, queue: &Mutex<VecDeque<String>>) -> CycleReport {
        let mut report = CycleReport::default();

        while let Some(tenant) = next_tenant(queue) {
            report.tenants += 1;
            debug!("[PREWARM] worker {} warming tenant={}", worker, tenant);

            for warmer in &self.warmers {
                report.attempted += 1;
                let outcome = AssertUnwindSafe(warmer.call(tenant.clone()))
                    .catch_unwind()
                    .await;

                let error = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => "warmer panicked".to_string(),
                };
                report.failed += 1;
                metrics::record_prewarm_failure(&warmer.name);
                warn!(
                    "[PREWARM] tenant={} warmer={} failed: {}",
                    tenant, warmer.name, error
                );
            }
        }

        report
    }

    /// Spawn the periodic loop: first cycle after `initial_delay_seconds`,
    /// then every `interval_seconds`.
    ///
    /// The loop runs on a detached tokio task and never holds up runtime
    /// shutdown. Dropping the returned handle stops it.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let initial_delay = Duration::from_secs(self.config.initial_delay_seconds);
        let interval = Duration::from_secs(self.config.interval_seconds.max(1));

        info!(
            "[PREWARM] scheduler started: first run in {}s, then every {}s (top {}, {} workers)",
            initial_delay.as_secs(),
            interval.as_secs(),
            self.config.top_n,
            self.config.concurrency
        );

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = stop_rx.changed() => return,
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if AssertUnwindSafe(self.run_cycle()).catch_unwind().await.is_err() {
                            warn!("[PREWARM] cycle aborted, retrying on next tick");
                            metrics::record_prewarm_cycle("skipped", 0.0);
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            info!("[PREWARM] scheduler stopped");
        });

        SchedulerHandle {
            stop: stop_tx,
            task,
        }
    }
}

fn next_tenant(queue: &Mutex<VecDeque<String>>) -> Option<String> {
    queue.lock().pop_front()
}

/// Handle to a running prewarm loop.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it. A cycle already running
    /// finishes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!("[PREWARM] scheduler task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
