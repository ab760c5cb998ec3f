//! Recipe lifecycle for the vulcanizer press
//!
//! - [`types`]: recipe and change-log records
//! - [`store`] / [`audit`]: persistence contracts with in-memory implementations
//! - [`sqlite`]: SQLite implementations of both
//! - [`lifecycle`]: legal status transitions, one audit entry each
//! - [`scheduler`]: periodic activation of due recipes with a retry cap

pub mod audit;
pub mod delivery;
pub mod events;
pub mod lifecycle;
pub mod scheduler;
pub mod sqlite;
pub mod store;
pub mod types;

pub use audit::{AuditLog, MemoryAuditLog};
pub use delivery::{LoggingDelivery, RecipeDelivery};
pub use events::{EventHub, EventSink, NoopEvents, PushEvent};
pub use lifecycle::{RecipeLifecycle, API_ACTOR, SCHEDULER_ACTOR};
pub use scheduler::{ActivationScheduler, SchedulerConfig, SchedulerState, TickReport};
pub use sqlite::{migrate, SqliteAuditLog, SqliteRecipeStore};
pub use store::{MemoryRecipeStore, RecipeFilter, RecipeStore};
pub use types::{
    AuditAction, ChangeLogEntry, NewChangeLogEntry, NewRecipe, Recipe, RecipeId, RecipeParams,
    RecipeStatus, RecipeUpdate, Revision,
};
