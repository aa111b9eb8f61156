//! Recurring background synchronization.
//!
//! One timer task per running scheduler. Each firing spawns a tick
//! (fetch → reconcile → commit for every category the source serves) unless
//! the previous tick is still in flight, in which case the firing is skipped.
//! Stopping cancels the timer only; a tick already running finishes on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mktintel_adapters::UpstreamSource;
use mktintel_core::Category;
use mktintel_storage::StoreGateway;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reconcile::{reconcile_category, CategoryReport};

/// Time between sync ticks.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Lifecycle-scoped scheduler state. Exists while the timer runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub ticks_skipped: u64,
    pub consecutive_failures: u32,
}

/// Decides how long the timer waits before the next firing.
pub trait TickSchedule: Send + Sync + 'static {
    fn next_delay(&self, state: &SyncState) -> Duration;
}

/// Same delay regardless of outcome. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedInterval(pub Duration);

impl Default for FixedInterval {
    fn default() -> Self {
        Self(SYNC_INTERVAL)
    }
}

impl TickSchedule for FixedInterval {
    fn next_delay(&self, _state: &SyncState) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: Vec<CategoryReport>,
    pub failures: Vec<(Category, String)>,
}

impl TickReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn upserted(&self) -> usize {
        self.categories.iter().map(|c| c.upserted).sum()
    }

    fn error_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(|(_, message)| message.as_str())
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another tick was in flight.
    Skipped,
}

struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Store, source and the process-wide in-flight flag shared by every tick.
struct SyncEngine {
    store: Arc<dyn StoreGateway>,
    source: Arc<dyn UpstreamSource>,
    in_flight: Arc<AtomicBool>,
}

impl SyncEngine {
    fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.in_flight.clone()))
    }

    async fn run_cycle(&self) -> TickReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("sync_tick", %run_id);

        async {
            let mut categories = Vec::new();
            let mut failures = Vec::new();
            for category in self.source.categories() {
                match reconcile_category(self.store.as_ref(), self.source.as_ref(), category).await
                {
                    Ok(report) => categories.push(report),
                    Err(err) => {
                        warn!(%category, error = %err, "category sync failed");
                        failures.push((category, err.to_string()));
                    }
                }
            }
            let report = TickReport {
                run_id,
                started_at,
                finished_at: Utc::now(),
                categories,
                failures,
            };
            info!(
                categories = report.categories.len(),
                failures = report.failures.len(),
                upserted = report.upserted(),
                "sync tick finished"
            );
            report
        }
        .instrument(span)
        .await
    }
}

async fn record_outcome(state: &Mutex<SyncState>, report: &TickReport) {
    let mut state = state.lock().await;
    state.last_run_at = Some(report.finished_at);
    match report.error_summary() {
        None => {
            state.ticks_completed += 1;
            state.consecutive_failures = 0;
        }
        Some(message) => {
            state.ticks_failed += 1;
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_error = Some(message);
        }
    }
}

struct ActiveLoop {
    state: Arc<Mutex<SyncState>>,
    shutdown: watch::Sender<bool>,
    timer: JoinHandle<()>,
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    schedule: Arc<dyn TickSchedule>,
    active: Mutex<Option<ActiveLoop>>,
}

impl SyncScheduler {
    pub fn new(store: Arc<dyn StoreGateway>, source: Arc<dyn UpstreamSource>) -> Self {
        Self::with_schedule(store, source, FixedInterval::default())
    }

    pub fn with_schedule(
        store: Arc<dyn StoreGateway>,
        source: Arc<dyn UpstreamSource>,
        schedule: impl TickSchedule,
    ) -> Self {
        Self {
            engine: Arc::new(SyncEngine {
                store,
                source,
                in_flight: Arc::new(AtomicBool::new(false)),
            }),
            schedule: Arc::new(schedule),
            active: Mutex::new(None),
        }
    }

    /// Start the timer. A no-op when already running.
    pub async fn start_auto_sync(&self) {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("auto sync already running");
            return;
        }

        let state = Arc::new(Mutex::new(SyncState {
            running: true,
            ..SyncState::default()
        }));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let timer = tokio::spawn(timer_loop(
            self.engine.clone(),
            self.schedule.clone(),
            state.clone(),
            shutdown_rx,
        ));
        info!(categories = ?self.engine.source.categories(), "auto sync started");
        *active = Some(ActiveLoop {
            state,
            shutdown,
            timer,
        });
    }

    /// Cancel the timer and release the state. A no-op when not running.
    /// Returns once no further tick can be spawned; an in-flight tick is left to finish.
    pub async fn stop_auto_sync(&self) {
        let mut active = self.active.lock().await;
        let Some(running) = active.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(err) = running.timer.await {
            error!(error = %err, "sync timer task ended abnormally");
        }
        running.state.lock().await.running = false;
        info!("auto sync stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Snapshot of the live state, or the default (not running) state once stopped.
    pub async fn state(&self) -> SyncState {
        let state = self.active.lock().await.as_ref().map(|a| a.state.clone());
        match state {
            Some(state) => state.lock().await.clone(),
            None => SyncState::default(),
        }
    }

    /// Run one cycle now, under the same overlap guard as timer ticks.
    pub async fn run_tick_now(&self) -> TickOutcome {
        let Some(_guard) = self.engine.try_begin() else {
            info!("sync tick already in flight; skipping manual run");
            return TickOutcome::Skipped;
        };
        let report = self.engine.run_cycle().await;
        let state = self.active.lock().await.as_ref().map(|a| a.state.clone());
        if let Some(state) = state {
            record_outcome(&state, &report).await;
        }
        TickOutcome::Completed(report)
    }
}

/// Fires on the schedule's deadlines. Firings during a running tick are
/// skipped. The delay after a tick is chosen once that tick has recorded its outcome.
async fn timer_loop(
    engine: Arc<SyncEngine>,
    schedule: Arc<dyn TickSchedule>,
    state: Arc<Mutex<SyncState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = schedule.next_delay(&*state.lock().await);
    let mut last_fire = Instant::now();
    let mut next_fire = last_fire + delay;
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            joined = async {
                match in_flight.as_mut() {
                    Some(tick) => tick.await,
                    None => std::future::pending().await,
                }
            } => {
                in_flight = None;
                if let Err(err) = joined {
                    error!(error = %err, "sync tick task ended abnormally");
                }
                delay = schedule.next_delay(&*state.lock().await);
                next_fire = last_fire + delay;
                continue;
            }
            _ = tokio::time::sleep_until(next_fire) => {}
        }

        last_fire = next_fire;
        let Some(guard) = engine.try_begin() else {
            warn!("previous sync tick still in flight; skipping this one");
            let mut current = state.lock().await;
            current.ticks_skipped += 1;
            delay = schedule.next_delay(&current);
            next_fire = last_fire + delay;
            continue;
        };
        let engine = engine.clone();
        let tick_state = state.clone();
        in_flight = Some(tokio::spawn(async move {
            let _guard = guard;
            let report = engine.run_cycle().await;
            record_outcome(&tick_state, &report).await;
        }));
        // Provisional deadline; replaced when the tick finishes.
        next_fire = last_fire + delay;
    }
    debug!("sync timer exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, FlakyStore, ScriptedSource};
    use serde_json::json;

    const TEST_INTERVAL: Duration = Duration::from_secs(10);

    fn market_source() -> Arc<ScriptedSource> {
        let source = Arc::new(ScriptedSource::new());
        source.set_snapshot(
            Category::MarketIntel,
            vec![record(
                Category::MarketIntel,
                json!({"market_id": "eu-iot", "region": "Europe", "segment": "IoT", "growth_rate_pct": 9.6}),
            )],
        );
        source
    }

    fn scheduler(store: &Arc<FlakyStore>, source: &Arc<ScriptedSource>) -> SyncScheduler {
        SyncScheduler::with_schedule(store.clone(), source.clone(), FixedInterval(TEST_INTERVAL))
    }

    #[test]
    fn default_schedule_uses_the_named_interval() {
        let state = SyncState::default();
        assert_eq!(FixedInterval::default().next_delay(&state), SYNC_INTERVAL);
    }

    /// Fixed interval that remembers the failure streak it was shown on every call.
    struct RecordingInterval {
        interval: Duration,
        seen: Arc<std::sync::Mutex<Vec<u32>>>,
    }

    impl TickSchedule for RecordingInterval {
        fn next_delay(&self, state: &SyncState) -> Duration {
            self.seen.lock().unwrap().push(state.consecutive_failures);
            self.interval
        }
    }

    /// Doubles the interval for every consecutive failure.
    struct DoublingOnFailure(Duration);

    impl TickSchedule for DoublingOnFailure {
        fn next_delay(&self, state: &SyncState) -> Duration {
            self.0 * 2u32.pow(state.consecutive_failures.min(8))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_sees_the_outcome_of_the_tick_that_just_ran() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.fail(Category::MarketIntel);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sched = SyncScheduler::with_schedule(
            store.clone(),
            source.clone(),
            RecordingInterval {
                interval: TEST_INTERVAL,
                seen: seen.clone(),
            },
        );

        sched.start_auto_sync().await;
        tokio::time::sleep(Duration::from_secs(35)).await;

        assert_eq!(sched.state().await.consecutive_failures, 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
        sched.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_stretches_after_the_first_failure() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.fail(Category::MarketIntel);
        let sched = SyncScheduler::with_schedule(
            store.clone(),
            source.clone(),
            DoublingOnFailure(TEST_INTERVAL),
        );

        sched.start_auto_sync().await;
        // Fails at 10s, then waits 20s; fails at 30s, then waits 40s.
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(source.fetch_calls(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.fetch_calls(), 3);
        sched.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_runs_a_single_timer() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        let sched = scheduler(&store, &source);

        sched.start_auto_sync().await;
        sched.start_auto_sync().await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(source.fetch_calls(), 2);
        let state = sched.state().await;
        assert!(state.running);
        assert_eq!(state.ticks_completed, 2);

        sched.stop_auto_sync().await;
        sched.stop_auto_sync().await;
        assert!(!sched.is_running().await);
        assert!(!sched.state().await.running);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_writes_nothing() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        let sched = scheduler(&store, &source);

        sched.start_auto_sync().await;
        sched.stop_auto_sync().await;
        tokio::time::sleep(TEST_INTERVAL * 3).await;

        assert_eq!(source.fetch_calls(), 0);
        assert_eq!(store.upsert_calls(), 0);
        assert!(!sched.state().await.running);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_are_skipped_not_queued() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.delay_fetches(Duration::from_secs(25));
        let sched = scheduler(&store, &source);

        sched.start_auto_sync().await;
        // Tick 1 runs 10s..35s; firings at 20s and 30s hit the in-flight guard; tick 2 starts at 40s.
        tokio::time::sleep(Duration::from_secs(45)).await;

        let state = sched.state().await;
        assert_eq!(state.ticks_completed, 1);
        assert_eq!(state.ticks_skipped, 2);
        assert_eq!(state.ticks_failed, 0);
        assert!(state.last_error.is_none());
        assert_eq!(source.max_concurrent_fetches(), 1);

        sched.stop_auto_sync().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fetch_calls(), 2);
        assert_eq!(source.max_concurrent_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_is_recorded_and_the_timer_keeps_going() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.fail(Category::MarketIntel);
        let sched = scheduler(&store, &source);

        sched.start_auto_sync().await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        let state = sched.state().await;
        assert!(state.running);
        assert_eq!(state.ticks_failed, 1);
        assert_eq!(state.consecutive_failures, 1);
        assert!(state.last_error.as_deref().unwrap().contains("market_intel"));

        source.recover(Category::MarketIntel);
        tokio::time::sleep(TEST_INTERVAL).await;
        let state = sched.state().await;
        assert_eq!(state.ticks_completed, 1);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(store.inner().count(Category::MarketIntel).await.unwrap(), 1);

        sched.stop_auto_sync().await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_category_does_not_block_the_others() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.fail(Category::Competitors);
        let sched = scheduler(&store, &source);

        let TickOutcome::Completed(report) = sched.run_tick_now().await else {
            panic!("tick should run when nothing is in flight");
        };
        assert!(!report.is_success());
        assert_eq!(report.failures[0].0, Category::Competitors);
        assert_eq!(report.upserted(), 1);
        assert_eq!(store.inner().count(Category::MarketIntel).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_tick_is_skipped_while_another_is_in_flight() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.delay_fetches(Duration::from_secs(25));
        let sched = Arc::new(scheduler(&store, &source));

        let first = tokio::spawn({
            let sched = sched.clone();
            async move { sched.run_tick_now().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sched.run_tick_now().await, TickOutcome::Skipped);
        assert!(matches!(first.await.unwrap(), TickOutcome::Completed(_)));
        assert_eq!(source.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_an_in_flight_tick_finish() {
        let store = Arc::new(FlakyStore::new());
        let source = market_source();
        source.delay_fetches(Duration::from_secs(25));
        let sched = scheduler(&store, &source);

        sched.start_auto_sync().await;
        tokio::time::sleep(Duration::from_secs(15)).await;
        sched.stop_auto_sync().await;
        assert!(!sched.state().await.running);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fetch_calls(), 1);
        assert_eq!(store.inner().count(Category::MarketIntel).await.unwrap(), 1);
    }
}
