//! Recipe Lifecycle Manager
//!
//! Owns the legal status transitions and writes exactly one audit entry per
//! committed transition. Every write to an existing recipe is a
//! compare-and-swap on the [`Revision`] read just before it, and audit
//! snapshots are taken from the row as the store wrote it.
//!
//! ```text
//! draft ──schedule──▶ pending ──activate──▶ activated
//!   ▲                  │  ▲
//!   └──unschedule──────┘  └──reschedule── failed ◀──abandon── pending
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::SharedClock;
use errors::{VulcanError, VulcanResult};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::delivery::{LoggingDelivery, RecipeDelivery};
use crate::events::{self, EventSink, NoopEvents};
use crate::store::RecipeStore;
use crate::types::{
    AuditAction, ChangeLogEntry, NewChangeLogEntry, NewRecipe, Recipe, RecipeId, RecipeParams,
    RecipeStatus, RecipeUpdate,
};

/// Actor recorded when the API layer supplies no operator name
pub const API_ACTOR: &str = "System (API)";
/// Actor recorded for scheduler-driven transitions
pub const SCHEDULER_ACTOR: &str = "System (Scheduler)";

pub struct RecipeLifecycle {
    store: Arc<dyn RecipeStore>,
    audit: Arc<dyn AuditLog>,
    events: Arc<dyn EventSink>,
    delivery: Arc<dyn RecipeDelivery>,
    clock: SharedClock,
}

impl RecipeLifecycle {
    pub fn new(store: Arc<dyn RecipeStore>, audit: Arc<dyn AuditLog>, clock: SharedClock) -> Self {
        Self {
            store,
            audit,
            events: Arc::new(NoopEvents),
            delivery: Arc::new(LoggingDelivery),
            clock,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn RecipeDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecipeStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn find(&self, id: RecipeId) -> VulcanResult<Recipe> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| VulcanError::recipe_not_found(id))
    }

    /// Newest audit entries first
    pub async fn history(&self, limit: usize) -> VulcanResult<Vec<ChangeLogEntry>> {
        self.audit.list(limit).await
    }

    /// Create a recipe; pending when scheduled, draft otherwise
    pub async fn create(
        &self,
        params: RecipeParams,
        scheduled_at: Option<DateTime<Utc>>,
        user: Option<&str>,
    ) -> VulcanResult<Recipe> {
        params.validate()?;
        let now = self.clock.now();
        if let Some(at) = scheduled_at {
            require_future(at, now)?;
        }

        let status = if scheduled_at.is_some() {
            RecipeStatus::Pending
        } else {
            RecipeStatus::Draft
        };

        let recipe = self
            .store
            .create(NewRecipe {
                params,
                status,
                scheduled_at,
                created_at: now,
            })
            .await?;

        info!(
            "Recipe {} ({}) created as {}",
            recipe.id, recipe.params.name, recipe.status
        );
        let snapshot = recipe.snapshot();
        self.record(
            actor(user),
            AuditAction::RecipeCreated,
            json!({ "recipe": snapshot }),
        )
        .await;
        self.events.broadcast(events::RECIPE_CREATED, snapshot);

        Ok(recipe)
    }

    /// Replace parameters and schedule of an existing recipe
    pub async fn update(
        &self,
        id: RecipeId,
        update: RecipeUpdate,
        user: Option<&str>,
    ) -> VulcanResult<Recipe> {
        let before = self.find(id).await?;
        update.params.validate()?;

        let status = next_status(&before, &update)?;
        let reschedules = status == RecipeStatus::Pending
            && (before.status != RecipeStatus::Pending || before.scheduled_at != update.scheduled_at);
        if reschedules {
            if let Some(at) = update.scheduled_at {
                require_future(at, self.clock.now())?;
            }
        }

        let replacement = Recipe {
            id,
            params: update.params,
            status,
            scheduled_at: update.scheduled_at,
            created_at: before.created_at,
            activated_at: before.activated_at,
            version: before.version,
        };

        let Some(after) = self
            .store
            .update_if(&replacement, before.revision())
            .await?
        else {
            warn!("Recipe {} changed while it was being updated", id);
            return Err(VulcanError::Conflict(format!(
                "recipe {} was modified concurrently",
                id
            )));
        };

        debug!("Recipe {} updated: {} -> {}", id, before.status, after.status);
        let after_snapshot = after.snapshot();
        self.record(
            actor(user),
            AuditAction::RecipeUpdated,
            json!({ "before": before.snapshot(), "after": after_snapshot }),
        )
        .await;
        self.events.broadcast(events::RECIPE_UPDATED, after_snapshot);

        Ok(after)
    }

    /// Delete a recipe; a missing id is `NotFound` and leaves no audit entry
    pub async fn delete(&self, id: RecipeId, user: Option<&str>) -> VulcanResult<()> {
        let snapshot = match self.store.find_by_id(id).await {
            Ok(found) => found.map(|recipe| recipe.snapshot()),
            Err(e) => {
                warn!("Recipe {} snapshot unavailable before delete: {}", id, e);
                None
            },
        };

        if !self.store.delete(id).await? {
            return Err(VulcanError::recipe_not_found(id));
        }

        info!("Recipe {} deleted", id);
        let details = match snapshot {
            Some(recipe) => json!({ "recipe": recipe }),
            None => json!({ "id": id }),
        };
        self.record(actor(user), AuditAction::RecipeDeleted, details)
            .await;
        self.events
            .broadcast(events::RECIPE_DELETED, json!({ "id": id }));

        Ok(())
    }

    /// Transition a pending recipe to activated
    ///
    /// Does not check `scheduled_at` against the clock; callers filter due
    /// recipes. A store failure leaves the recipe pending and is recorded as
    /// `recipe-activation-failed` before the error is returned.
    pub async fn activate(
        &self,
        recipe: &Recipe,
        user: &str,
        attempt: u32,
    ) -> VulcanResult<Recipe> {
        if recipe.status != RecipeStatus::Pending {
            return Err(VulcanError::InvalidTransition {
                id: recipe.id,
                from: recipe.status.to_string(),
                to: RecipeStatus::Activated.to_string(),
            });
        }

        let mut transition = recipe.clone();
        transition.status = RecipeStatus::Activated;
        transition.activated_at = Some(self.clock.now());

        let activated = match self.store.update_if(&transition, recipe.revision()).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                return Err(VulcanError::Conflict(format!(
                    "recipe {} changed since it was read for activation",
                    recipe.id
                )));
            },
            Err(e) => {
                warn!(
                    "Recipe {} activation attempt {} failed: {}",
                    recipe.id, attempt, e
                );
                let details = json!({
                    "recipeId": recipe.id,
                    "recipeName": recipe.params.name,
                    "attempt": attempt,
                    "error": e.to_string(),
                });
                self.record(user, AuditAction::RecipeActivationFailed, details.clone())
                    .await;
                self.events
                    .broadcast(events::RECIPE_ACTIVATION_FAILED, details);
                return Err(e);
            },
        };

        info!("Recipe {} ({}) activated", activated.id, activated.params.name);
        self.record(
            user,
            AuditAction::RecipeActivated,
            activation_details(&activated),
        )
        .await;
        self.events
            .broadcast(events::RECIPE_ACTIVATED, activated.snapshot());

        if let Err(e) = self.delivery.deliver(&activated).await {
            error!("Recipe {} delivery to controller failed: {}", activated.id, e);
            self.record(
                user,
                AuditAction::RecipeDeliveryFailed,
                json!({
                    "recipeId": activated.id,
                    "recipeName": activated.params.name,
                    "error": e.to_string(),
                }),
            )
            .await;
        }

        Ok(activated)
    }

    /// Give up on a pending recipe after repeated activation failures
    pub async fn mark_failed(
        &self,
        recipe: &Recipe,
        attempts: u32,
        last_error: &str,
    ) -> VulcanResult<Recipe> {
        if recipe.status != RecipeStatus::Pending {
            return Err(VulcanError::InvalidTransition {
                id: recipe.id,
                from: recipe.status.to_string(),
                to: RecipeStatus::Failed.to_string(),
            });
        }

        let mut transition = recipe.clone();
        transition.status = RecipeStatus::Failed;

        let Some(failed) = self
            .store
            .update_if(&transition, recipe.revision())
            .await?
        else {
            return Err(VulcanError::Conflict(format!(
                "recipe {} changed before it could be marked failed",
                recipe.id
            )));
        };

        error!(
            "Recipe {} abandoned after {} failed activation attempts",
            recipe.id, attempts
        );
        let details = json!({
            "recipeId": recipe.id,
            "recipeName": recipe.params.name,
            "attempts": attempts,
            "error": last_error,
        });
        self.record(
            SCHEDULER_ACTOR,
            AuditAction::RecipeActivationAbandoned,
            details.clone(),
        )
        .await;
        self.events
            .broadcast(events::RECIPE_ACTIVATION_ABANDONED, details);

        Ok(failed)
    }

    /// Append an audit entry for a transition that is already committed
    async fn record(&self, user: &str, action: AuditAction, details: Value) {
        let entry = NewChangeLogEntry {
            timestamp: self.clock.now(),
            user: user.to_string(),
            action,
            details,
        };
        if let Err(e) = self.audit.append(entry).await {
            error!("Audit append for {} failed: {}", action, e);
        }
    }
}

/// Operator name to record, falling back to [`API_ACTOR`] when blank
pub(crate) fn actor(user: Option<&str>) -> &str {
    user.filter(|name| !name.trim().is_empty())
        .unwrap_or(API_ACTOR)
}

fn require_future(at: DateTime<Utc>, now: DateTime<Utc>) -> VulcanResult<()> {
    if at > now {
        Ok(())
    } else {
        Err(VulcanError::validation(
            "scheduledAt",
            "must be in the future",
        ))
    }
}

fn invalid(current: &Recipe, to: RecipeStatus) -> VulcanError {
    VulcanError::InvalidTransition {
        id: current.id,
        from: current.status.to_string(),
        to: to.to_string(),
    }
}

/// Status an update lands in
fn next_status(current: &Recipe, update: &RecipeUpdate) -> VulcanResult<RecipeStatus> {
    if current.status == RecipeStatus::Activated {
        if let Some(requested) = update.status.filter(|s| *s != RecipeStatus::Activated) {
            return Err(invalid(current, requested));
        }
        if update.scheduled_at != current.scheduled_at {
            return Err(invalid(current, RecipeStatus::Pending));
        }
        return Ok(RecipeStatus::Activated);
    }

    if let Some(requested @ (RecipeStatus::Activated | RecipeStatus::Failed)) = update.status {
        return Err(invalid(current, requested));
    }

    match update.scheduled_at {
        None => {
            if update.status == Some(RecipeStatus::Pending) {
                return Err(VulcanError::validation(
                    "scheduledAt",
                    "is required for a pending recipe",
                ));
            }
            Ok(RecipeStatus::Draft)
        },
        Some(_) if current.scheduled_at.is_none() || current.status == RecipeStatus::Failed => {
            Ok(RecipeStatus::Pending)
        },
        Some(_) => Ok(update.status.unwrap_or(current.status)),
    }
}

fn activation_details(recipe: &Recipe) -> Value {
    json!({
        "recipeId": recipe.id,
        "recipeName": recipe.params.name,
        "activatedAt": recipe.activated_at,
        "parameters": recipe.params.activation_snapshot(),
    })
}
