use std::collections::{ HashMap, HashSet };
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sea_orm::DatabaseConnection;
use tokio::sync::{ Mutex, Semaphore };
use tokio::task::JoinSet;
use tokio::time::{ interval, Instant, MissedTickBehavior };

use crate::config::Config;
use crate::db::entity::{ product, user };
use crate::db::{ ProductRepository, UserRepository };
use crate::error::{ FetchError, Result };
use crate::services::fetch_service::{ FetchResult, Observation, ProductFetcher };
use crate::services::reconcile_service::ReconcileService;

/// Aggregate numbers for one complete pass over the tracked set.
/// `checked` counts every product the cycle drove through its worker;
/// `failed` and `skipped` are sub-counts of it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub checked: usize,
    pub changed: usize,
    pub notified: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl CycleStats {
    fn record(&mut self, outcome: &TaskOutcome) {
        self.checked += 1;
        match outcome {
            TaskOutcome::Done { changed, notified } => {
                if *changed {
                    self.changed += 1;
                }
                if *notified {
                    self.notified += 1;
                }
            }
            TaskOutcome::Failed => {
                self.failed += 1;
            }
            TaskOutcome::Skipped => {
                self.skipped += 1;
            }
        }
    }
}

enum TaskOutcome {
    Done {
        changed: bool,
        notified: bool,
    },
    Failed,
    Skipped,
}

/// Drives the tracking pipeline: one cycle per interval over every
/// tracked product, fanned out to a bounded worker pool.
pub struct TrackerScheduler {
    db: DatabaseConnection,
    fetcher: Arc<dyn ProductFetcher>,
    reconciler: Arc<ReconcileService>,
    poll_interval: Duration,
    concurrency: usize,
    fetch_retries: u32,
    retry_backoff: Duration,
    default_dest: i32,
}

impl TrackerScheduler {
    pub fn new(
        db: DatabaseConnection,
        fetcher: Arc<dyn ProductFetcher>,
        reconciler: Arc<ReconcileService>,
        config: &Config
    ) -> Self {
        Self {
            db,
            fetcher,
            reconciler,
            poll_interval: config.poll_interval,
            concurrency: config.fetch_concurrency,
            fetch_retries: config.fetch_retries,
            retry_backoff: config.retry_backoff,
            default_dest: config.default_dest,
        }
    }

    /// Run forever. A cycle that overruns its interval is cut off at the
    /// deadline (in-flight fetches finish, queued ones are skipped) and the
    /// next cycle starts on schedule rather than stacking up.
    pub async fn start(self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let deadline = Instant::now() + self.poll_interval;
            match self.run_cycle(deadline).await {
                Ok(stats) => {
                    tracing::info!(
                        "Cycle done: checked={} changed={} notified={} failed={} skipped={}",
                        stats.checked,
                        stats.changed,
                        stats.notified,
                        stats.failed,
                        stats.skipped
                    );
                }
                // Store unreachable: abort this cycle, try again next tick
                Err(e) => {
                    tracing::error!("Tracking cycle aborted: {}", e);
                }
            }
        }
    }

    /// One pass over all tracked products, grouped by destination so
    /// same-region fetches run together.
    pub async fn run_cycle(&self, deadline: Instant) -> Result<CycleStats> {
        let products = ProductRepository::new(self.db.clone()).list_active().await?;
        let users: HashMap<i64, user::Model> = UserRepository::new(self.db.clone())
            .all().await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        tracing::debug!("Starting cycle over {} products", products.len());

        let mut groups: HashMap<i32, Vec<(product::Model, user::Model)>> = HashMap::new();
        for product in products {
            let Some(owner) = users.get(&product.user_id) else {
                tracing::warn!("Product {} has no owner row, skipping", product.id);
                continue;
            };
            let dest = if owner.dest != 0 { owner.dest } else { self.default_dest };
            groups.entry(dest).or_default().push((product, owner.clone()));
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        // Destinations that hit an anti-bot wall this cycle
        let paused: Arc<Mutex<HashSet<i32>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();

        for (dest, group) in groups {
            for (product, owner) in group {
                let semaphore = semaphore.clone();
                let paused = paused.clone();
                let fetcher = self.fetcher.clone();
                let reconciler = self.reconciler.clone();
                let db = self.db.clone();
                let retries = self.fetch_retries;
                let backoff = self.retry_backoff;

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return TaskOutcome::Skipped;
                    };

                    // Past the deadline: let in-flight work finish but do
                    // not start new fetches.
                    if Instant::now() >= deadline {
                        return TaskOutcome::Skipped;
                    }
                    if paused.lock().await.contains(&dest) {
                        return TaskOutcome::Skipped;
                    }

                    let fetched = fetch_with_retry(
                        fetcher.as_ref(),
                        product.nm_id,
                        dest,
                        product.selected_size.as_deref(),
                        retries,
                        backoff
                    ).await;

                    match fetched {
                        Ok(observation) => {
                            match reconciler.process(&owner, product.id, observation).await {
                                Ok(report) =>
                                    TaskOutcome::Done {
                                        changed: report.changed,
                                        notified: report.notified,
                                    },
                                Err(e) => {
                                    tracing::error!(
                                        "[nm={}] Failed to persist observation: {}",
                                        product.nm_id,
                                        e
                                    );
                                    TaskOutcome::Failed
                                }
                            }
                        }
                        Err(FetchError::Blocked(reason)) => {
                            tracing::warn!(
                                "[nm={}] Blocked ({}), pausing dest {} for this cycle",
                                product.nm_id,
                                reason,
                                dest
                            );
                            paused.lock().await.insert(dest);
                            TaskOutcome::Failed
                        }
                        Err(FetchError::Permanent(reason)) => {
                            tracing::warn!("[nm={}] Permanent failure: {}", product.nm_id, reason);
                            if
                                let Err(e) = ProductRepository::new(db)
                                    .bump_fail_count(product.id).await
                            {
                                tracing::error!(
                                    "[nm={}] Failed to record failure: {}",
                                    product.nm_id,
                                    e
                                );
                            }
                            TaskOutcome::Failed
                        }
                        Err(FetchError::Transient(reason)) => {
                            tracing::info!(
                                "[nm={}] Still failing after retries: {}",
                                product.nm_id,
                                reason
                            );
                            TaskOutcome::Failed
                        }
                    }
                });
            }
        }

        let mut stats = CycleStats::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => stats.record(&outcome),
                Err(e) => {
                    tracing::error!("Worker task panicked: {}", e);
                    stats.record(&TaskOutcome::Failed);
                }
            }
        }

        Ok(stats)
    }
}

/// Fetch with a bounded number of immediate retries on transient errors,
/// exponential backoff with jitter in between. Blocked and permanent
/// failures are returned as-is; the next scheduled cycle is their retry.
pub async fn fetch_with_retry(
    fetcher: &dyn ProductFetcher,
    nm_id: i64,
    dest: i32,
    selected_size: Option<&str>,
    retries: u32,
    backoff: Duration
) -> FetchResult<Observation> {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(nm_id, dest, selected_size).await {
            Err(FetchError::Transient(reason)) if attempt < retries => {
                let jitter_ms = rand::rng().random_range(0..=(backoff.as_millis() as u64) / 2);
                let sleep = backoff * 2u32.pow(attempt) + Duration::from_millis(jitter_ms);
                tracing::warn!(
                    "[nm={}] Transient fetch error ({}), retry in {:?}",
                    nm_id,
                    reason,
                    sleep
                );
                tokio::time::sleep(sleep).await;
                attempt += 1;
            }
            other => {
                return other;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{ AtomicU32, Ordering };

    /// Fails with the scripted errors, then succeeds.
    struct ScriptedFetcher {
        failures: Vec<FetchError>,
        calls: AtomicU32,
    }

    impl ScriptedFetcher {
        fn new(failures: Vec<FetchError>) -> Self {
            Self { failures, calls: AtomicU32::new(0) }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            _nm_id: i64,
            _dest: i32,
            _selected_size: Option<&str>
        ) -> FetchResult<Observation> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(call) {
                Some(e) => Err(e.clone()),
                None =>
                    Ok(Observation {
                        basic_price: 1500,
                        product_price: 1000,
                        qty: 3,
                        name: "Чайник".to_string(),
                        fetched_at: Utc::now(),
                    }),
            }
        }
    }

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let fetcher = ScriptedFetcher::new(
            vec![
                FetchError::Transient("timeout".into()),
                FetchError::Transient("reset".into())
            ]
        );

        let result = fetch_with_retry(&fetcher, 42, -1257786, None, 2, Duration::from_millis(1)).await;

        assert!(result.is_ok());
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retry_budget() {
        let fetcher = ScriptedFetcher::new(
            vec![
                FetchError::Transient("1".into()),
                FetchError::Transient("2".into()),
                FetchError::Transient("3".into())
            ]
        );

        let result = fetch_with_retry(&fetcher, 42, -1257786, None, 2, Duration::from_millis(1)).await;

        assert!(matches!(result, Err(FetchError::Transient(_))));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn blocked_is_never_retried() {
        let fetcher = ScriptedFetcher::new(vec![FetchError::Blocked("HTTP 429".into())]);

        let result = fetch_with_retry(&fetcher, 42, -1257786, None, 2, Duration::from_millis(1)).await;

        assert!(matches!(result, Err(FetchError::Blocked(_))));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[test]
    fn cycle_stats_count_every_driven_product() {
        let mut stats = CycleStats::default();
        stats.record(&(TaskOutcome::Done { changed: true, notified: true }));
        stats.record(&(TaskOutcome::Done { changed: false, notified: false }));
        stats.record(&TaskOutcome::Failed);
        stats.record(&TaskOutcome::Skipped);

        assert_eq!(stats.checked, 4);
        assert_eq!(stats.changed, 1);
        assert_eq!(stats.notified, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn permanent_is_never_retried() {
        let fetcher = ScriptedFetcher::new(vec![FetchError::Permanent("HTTP 404".into())]);

        let result = fetch_with_retry(&fetcher, 42, -1257786, None, 2, Duration::from_millis(1)).await;

        assert!(matches!(result, Err(FetchError::Permanent(_))));
        assert_eq!(fetcher.call_count(), 1);
    }
}
