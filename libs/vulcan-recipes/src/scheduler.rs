//! Activation Scheduler
//!
//! Polls for due recipes on a fixed period and drives each one through
//! [`RecipeLifecycle::activate`], sequentially, so audit order follows
//! decision order. Consecutive failures per recipe are counted; a failing
//! recipe backs off for `retry_backoff × attempts` and is abandoned (moved to
//! `failed`) once `max_activation_attempts` is reached.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use errors::{ErrorKind, VulcanResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::lifecycle::{actor, RecipeLifecycle, SCHEDULER_ACTOR};
use crate::store::RecipeFilter;
use crate::types::{Recipe, RecipeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Consecutive failures before a recipe is abandoned
    pub max_activation_attempts: u32,
    /// Base wait after a failed attempt, multiplied by the attempt count
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_activation_attempts: 5,
            retry_backoff: Duration::from_millis(10_000),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub activated: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Backing off, or lost to a concurrent change
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct FailureRecord {
    attempts: u32,
    next_attempt_at: DateTime<Utc>,
}

struct Engine {
    lifecycle: Arc<RecipeLifecycle>,
    config: SchedulerConfig,
    failures: Mutex<HashMap<RecipeId, FailureRecord>>,
    // Serializes loop ticks with manual ticks
    ticking: tokio::sync::Mutex<()>,
}

impl Engine {
    /// Attempt number for `id` at `now`, or None while it is backing off
    fn next_attempt(&self, id: RecipeId, now: DateTime<Utc>) -> Option<u32> {
        match self.failures.lock().get(&id) {
            Some(record) if record.next_attempt_at > now => None,
            Some(record) => Some(record.attempts + 1),
            None => Some(1),
        }
    }

    fn record_failure(&self, id: RecipeId, attempts: u32, now: DateTime<Utc>) {
        let wait = self
            .config
            .retry_backoff
            .checked_mul(attempts)
            .and_then(|wait| chrono::Duration::from_std(wait).ok())
            .and_then(|wait| now.checked_add_signed(wait))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.failures.lock().insert(
            id,
            FailureRecord {
                attempts,
                next_attempt_at: wait,
            },
        );
    }

    fn clear_failure(&self, id: RecipeId) {
        self.failures.lock().remove(&id);
    }

    async fn tick_at(&self, now: DateTime<Utc>) -> VulcanResult<TickReport> {
        let _guard = self.ticking.lock().await;
        let due = self
            .lifecycle
            .store()
            .find_many(&RecipeFilter::due(now))
            .await?;

        // Forget recipes that were activated, edited or deleted elsewhere
        let due_ids: HashSet<RecipeId> = due.iter().map(|recipe| recipe.id).collect();
        self.failures.lock().retain(|id, _| due_ids.contains(id));

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        for recipe in &due {
            self.process(recipe, now, &mut report).await;
        }
        Ok(report)
    }

    async fn process(&self, recipe: &Recipe, now: DateTime<Utc>, report: &mut TickReport) {
        let Some(attempt) = self.next_attempt(recipe.id, now) else {
            debug!("Recipe {} backing off", recipe.id);
            report.skipped += 1;
            return;
        };

        let error = match self
            .lifecycle
            .activate(recipe, SCHEDULER_ACTOR, attempt)
            .await
        {
            Ok(_) => {
                self.clear_failure(recipe.id);
                report.activated += 1;
                return;
            },
            Err(e) if matches!(e.kind(), ErrorKind::Conflict | ErrorKind::InvalidTransition) => {
                info!("Recipe {} skipped: {}", recipe.id, e);
                self.clear_failure(recipe.id);
                report.skipped += 1;
                return;
            },
            Err(e) => e,
        };

        report.failed += 1;
        if attempt < self.config.max_activation_attempts {
            self.record_failure(recipe.id, attempt, now);
            return;
        }

        match self
            .lifecycle
            .mark_failed(recipe, attempt, &error.to_string())
            .await
        {
            Ok(_) => {
                self.clear_failure(recipe.id);
                report.abandoned += 1;
            },
            Err(e) => {
                warn!("Recipe {} could not be marked failed: {}", recipe.id, e);
                self.record_failure(recipe.id, attempt, now);
            },
        }
    }

    async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {},
            }

            let now = self.lifecycle.now();
            match self.tick_at(now).await {
                Ok(report) if report.due > 0 => debug!("Scheduler tick: {:?}", report),
                Ok(_) => {},
                Err(e) => error!("Scheduler tick failed: {}", e),
            }
        }
    }
}

pub struct ActivationScheduler {
    engine: Arc<Engine>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    stopped: Mutex<bool>,
}

impl ActivationScheduler {
    pub fn new(lifecycle: Arc<RecipeLifecycle>, config: SchedulerConfig) -> Self {
        Self {
            engine: Arc::new(Engine {
                lifecycle,
                config,
                failures: Mutex::new(HashMap::new()),
                ticking: tokio::sync::Mutex::new(()),
            }),
            task: Mutex::new(None),
            stopped: Mutex::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.task.lock().is_some() {
            SchedulerState::Running
        } else if *self.stopped.lock() {
            SchedulerState::Stopped
        } else {
            SchedulerState::Idle
        }
    }

    /// Run one tick against an explicit instant
    pub async fn tick_at(&self, now: DateTime<Utc>) -> VulcanResult<TickReport> {
        self.engine.tick_at(now).await
    }

    /// Run one tick now
    pub async fn run_once(&self) -> VulcanResult<TickReport> {
        self.engine.tick_at(self.engine.lifecycle.now()).await
    }

    /// Activate a recipe immediately, bypassing its schedule
    pub async fn activate_now(&self, id: RecipeId, user: Option<&str>) -> VulcanResult<Recipe> {
        let recipe = self.engine.lifecycle.find(id).await?;
        let activated = self
            .engine
            .lifecycle
            .activate(&recipe, actor(user), 1)
            .await?;
        self.engine.clear_failure(id);
        Ok(activated)
    }

    /// Spawn the periodic task; returns false if it is already running
    pub fn start(&self, period: Duration) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Activation scheduler already running");
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.engine.clone().run(period, cancel.clone()));
        *task = Some((cancel, handle));
        info!("Activation scheduler started, period {:?}", period);
        true
    }

    /// Stop the periodic task, letting an in-flight tick finish
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
            *self.stopped.lock() = true;
            info!("Activation scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::lifecycle::tests::{t0, FlakyStore};
    use crate::types::tests::sample_params;
    use crate::types::{AuditAction, RecipeStatus};
    use chrono::Duration as ChronoDuration;
    use common::ManualClock;
    use errors::VulcanError;
    use tracing_test::traced_test;

    struct Harness {
        scheduler: ActivationScheduler,
        lifecycle: Arc<RecipeLifecycle>,
        store: Arc<FlakyStore>,
        audit: Arc<MemoryAuditLog>,
        clock: Arc<ManualClock>,
    }

    fn harness(config: SchedulerConfig) -> Harness {
        let store = Arc::new(FlakyStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let lifecycle = Arc::new(RecipeLifecycle::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
        ));
        Harness {
            scheduler: ActivationScheduler::new(lifecycle.clone(), config),
            lifecycle,
            store,
            audit,
            clock,
        }
    }

    async fn schedule(h: &Harness, name: &str, in_secs: i64) -> Recipe {
        h.lifecycle
            .create(
                sample_params(name),
                Some(t0() + ChronoDuration::seconds(in_secs)),
                None,
            )
            .await
            .unwrap()
    }

    fn actions(audit: &MemoryAuditLog) -> Vec<AuditAction> {
        audit.entries().iter().map(|e| e.action).collect()
    }

    #[tokio::test]
    async fn test_only_due_recipes_are_activated() {
        let h = harness(SchedulerConfig::default());
        let early = schedule(&h, "early", 50).await;
        let exact = schedule(&h, "exact", 60).await;
        let late = schedule(&h, "late", 70).await;

        let report = h
            .scheduler
            .tick_at(t0() + ChronoDuration::seconds(60))
            .await
            .unwrap();

        assert_eq!(report.due, 2);
        assert_eq!(report.activated, 2);
        for id in [early.id, exact.id] {
            let recipe = h.lifecycle.find(id).await.unwrap();
            assert_eq!(recipe.status, RecipeStatus::Activated);
        }
        let untouched = h.lifecycle.find(late.id).await.unwrap();
        assert_eq!(untouched, late);
    }

    #[tokio::test]
    async fn test_retry_backoff_then_abandon() {
        let h = harness(SchedulerConfig {
            max_activation_attempts: 3,
            retry_backoff: Duration::from_secs(10),
        });
        let recipe = schedule(&h, "stuck", 1).await;
        h.store.fail_next_updates(3);
        let start = t0() + ChronoDuration::seconds(1);

        let report = h.scheduler.tick_at(start).await.unwrap();
        assert_eq!(report.failed, 1);

        // Backing off for 10s after the first failure
        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::seconds(5))
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);

        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::seconds(10))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        // Second failure waits 20s
        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::seconds(25))
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);

        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.abandoned, 1);

        let stored = h.lifecycle.find(recipe.id).await.unwrap();
        assert_eq!(stored.status, RecipeStatus::Failed);
        assert_eq!(
            actions(&h.audit),
            vec![
                AuditAction::RecipeCreated,
                AuditAction::RecipeActivationFailed,
                AuditAction::RecipeActivationFailed,
                AuditAction::RecipeActivationFailed,
                AuditAction::RecipeActivationAbandoned,
            ]
        );
        let attempts: Vec<u64> = h
            .audit
            .entries()
            .iter()
            .filter(|e| e.action == AuditAction::RecipeActivationFailed)
            .map(|e| e.details["attempt"].as_u64().unwrap())
            .collect();
        assert_eq!(attempts, vec![1, 2, 3]);

        // Abandoned recipes are no longer due
        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let h = harness(SchedulerConfig {
            max_activation_attempts: 2,
            retry_backoff: Duration::from_secs(10),
        });
        let recipe = schedule(&h, "flaky", 1).await;
        h.store.fail_next_updates(1);
        let start = t0() + ChronoDuration::seconds(1);

        assert_eq!(h.scheduler.tick_at(start).await.unwrap().failed, 1);
        let report = h
            .scheduler
            .tick_at(start + ChronoDuration::seconds(10))
            .await
            .unwrap();
        assert_eq!(report.activated, 1);
        assert!(h.scheduler.engine.failures.lock().is_empty());

        let stored = h.lifecycle.find(recipe.id).await.unwrap();
        assert_eq!(stored.status, RecipeStatus::Activated);
    }

    #[tokio::test]
    async fn test_activate_now() {
        let h = harness(SchedulerConfig::default());
        let recipe = schedule(&h, "manual", 3600).await;

        let activated = h
            .scheduler
            .activate_now(recipe.id, Some("operator"))
            .await
            .unwrap();
        assert_eq!(activated.status, RecipeStatus::Activated);
        assert_eq!(h.audit.entries().pop().unwrap().user, "operator");

        let err = h.scheduler.activate_now(404, None).await.unwrap_err();
        assert!(matches!(err, VulcanError::NotFound { .. }));

        let err = h.scheduler.activate_now(recipe.id, None).await.unwrap_err();
        assert!(matches!(err, VulcanError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_activate_now_blank_operator_is_api() {
        let h = harness(SchedulerConfig::default());
        let first = schedule(&h, "first", 3600).await;
        let second = schedule(&h, "second", 3600).await;

        h.scheduler.activate_now(first.id, Some("  ")).await.unwrap();
        h.scheduler.activate_now(second.id, None).await.unwrap();

        let users: Vec<String> = h
            .audit
            .entries()
            .iter()
            .filter(|e| e.action == AuditAction::RecipeActivated)
            .map(|e| e.user.clone())
            .collect();
        assert_eq!(users, vec![crate::API_ACTOR, crate::API_ACTOR]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_loop_survives_failed_query() {
        let h = harness(SchedulerConfig::default());
        let recipe = schedule(&h, "a", 1).await;
        h.clock.advance(ChronoDuration::seconds(5));
        h.store.fail_next_queries(1);

        assert_eq!(h.scheduler.state(), SchedulerState::Idle);
        assert!(h.scheduler.start(Duration::from_secs(10)));
        assert!(!h.scheduler.start(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(logs_contain("Scheduler tick failed"));

        let stored = h.lifecycle.find(recipe.id).await.unwrap();
        assert_eq!(stored.status, RecipeStatus::Activated);

        h.scheduler.stop().await;
        assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
        assert!(!h.scheduler.is_running());
    }
}
