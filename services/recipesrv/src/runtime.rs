//! Service wiring: SQLite store and audit log behind the lifecycle manager,
//! with the scheduler and event hub on top

use std::sync::Arc;

use common::SharedClock;
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vulcan_recipes::{
    ActivationScheduler, EventHub, RecipeLifecycle, SchedulerConfig, SqliteAuditLog,
    SqliteRecipeStore,
};

const EVENT_CAPACITY: usize = 256;

pub struct Runtime {
    pub lifecycle: Arc<RecipeLifecycle>,
    pub scheduler: ActivationScheduler,
    pub events: Arc<EventHub>,
}

impl Runtime {
    pub fn new(pool: SqlitePool, scheduler: SchedulerConfig, clock: SharedClock) -> Self {
        let events = Arc::new(EventHub::new(EVENT_CAPACITY));
        let lifecycle = Arc::new(
            RecipeLifecycle::new(
                Arc::new(SqliteRecipeStore::new(pool.clone())),
                Arc::new(SqliteAuditLog::new(pool)),
                clock,
            )
            .with_events(events.clone()),
        );
        Self {
            scheduler: ActivationScheduler::new(lifecycle.clone(), scheduler),
            lifecycle,
            events,
        }
    }

    /// Trace every pushed event until `cancel` fires
    pub fn spawn_event_log(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => debug!("Event {}: {}", event.name, event.payload),
                        Err(RecvError::Lagged(missed)) => warn!("Event log lagged, {} events dropped", missed),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use common::ManualClock;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;
    use vulcan_recipes::{RecipeParams, RecipeStatus};

    async fn runtime(clock: Arc<ManualClock>) -> Runtime {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        vulcan_recipes::migrate(&pool).await.unwrap();
        Runtime::new(pool, SchedulerConfig::default(), clock)
    }

    fn params() -> RecipeParams {
        serde_json::from_value(json!({
            "name": "All-season 195/65",
            "curingTemp": 165.0, "tempBandPlus": 2.0, "tempBandMinus": 2.0,
            "pressure": 150.0, "pressureBandPlus": 5.0, "pressureBandMinus": 5.0,
            "curingTime": 12.0, "exhaustDelay": 3.0, "purgingCycles": 2,
            "high1": 1.0, "low1": 0.0, "high2": 1.0, "low2": 0.0, "high3": 1.0,
            "low3": 0.0, "high4": 1.0, "low4": 0.0, "high5": 1.0, "low5": 0.0,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scheduled_recipe_activates_on_tick() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let runtime = runtime(clock.clone()).await;
        let mut events = runtime.events.subscribe();

        let recipe = runtime
            .lifecycle
            .create(params(), Some(start + Duration::minutes(1)), Some("planner"))
            .await
            .unwrap();
        assert_eq!(runtime.scheduler.run_once().await.unwrap().activated, 0);

        clock.advance(Duration::minutes(1));
        assert_eq!(runtime.scheduler.run_once().await.unwrap().activated, 1);

        let stored = runtime.lifecycle.find(recipe.id).await.unwrap();
        assert_eq!(stored.status, RecipeStatus::Activated);
        assert_eq!(events.recv().await.unwrap().name, "recipe-created");
        assert_eq!(events.recv().await.unwrap().name, "recipe-activated");

        let history = runtime.lifecycle.history(1).await.unwrap();
        assert_eq!(history[0].user, "System (Scheduler)");
    }

    #[tokio::test]
    async fn test_event_log_stops_on_cancel() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let runtime = runtime(clock).await;
        let cancel = CancellationToken::new();
        let handle = runtime.spawn_event_log(cancel.clone());

        runtime.lifecycle.create(params(), None, None).await.unwrap();
        cancel.cancel();
        handle.await.unwrap();
    }
}
