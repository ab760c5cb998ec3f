//! Recipe Store
//!
//! Persistence contract used by the lifecycle manager and scheduler. Every
//! write bumps the row version, and writes to existing rows are conditional
//! on the [`Revision`] the caller read, so a concurrent edit and activation
//! cannot silently overwrite each other.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::VulcanResult;
use parking_lot::Mutex;

use crate::types::{NewRecipe, Recipe, RecipeId, RecipeStatus, Revision};

/// Query filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    pub status: Option<RecipeStatus>,
    /// `scheduled_at` set and `<=` this instant
    pub scheduled_before: Option<DateTime<Utc>>,
}

impl RecipeFilter {
    /// Pending recipes due at `now`
    pub fn due(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(RecipeStatus::Pending),
            scheduled_before: Some(now),
        }
    }

    pub fn matches(&self, recipe: &Recipe) -> bool {
        if self.status.is_some_and(|status| status != recipe.status) {
            return false;
        }
        match self.scheduled_before {
            Some(limit) => recipe.scheduled_at.is_some_and(|at| at <= limit),
            None => true,
        }
    }
}

#[async_trait]
pub trait RecipeStore: Send + Sync + 'static {
    async fn create(&self, recipe: NewRecipe) -> VulcanResult<Recipe>;

    async fn find_by_id(&self, id: RecipeId) -> VulcanResult<Option<Recipe>>;

    /// Matching recipes ordered by `scheduled_at`, then id
    async fn find_many(&self, filter: &RecipeFilter) -> VulcanResult<Vec<Recipe>>;

    /// Replace the row with `recipe` only if it is still at `expected`
    ///
    /// Returns the row as stored, with its new version, or None when the row
    /// changed or disappeared since it was read.
    async fn update_if(&self, recipe: &Recipe, expected: Revision) -> VulcanResult<Option<Recipe>>;

    /// Returns false when no such row existed
    async fn delete(&self, id: RecipeId) -> VulcanResult<bool>;
}

/// In-process store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryRecipeStore {
    inner: Mutex<MemoryRows>,
}

#[derive(Debug, Default)]
struct MemoryRows {
    next_id: RecipeId,
    rows: BTreeMap<RecipeId, Recipe>,
}

impl MemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn create(&self, recipe: NewRecipe) -> VulcanResult<Recipe> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let created = Recipe {
            id: inner.next_id,
            params: recipe.params,
            status: recipe.status,
            scheduled_at: recipe.scheduled_at,
            created_at: recipe.created_at,
            activated_at: None,
            version: 1,
        };
        inner.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: RecipeId) -> VulcanResult<Option<Recipe>> {
        Ok(self.inner.lock().rows.get(&id).cloned())
    }

    async fn find_many(&self, filter: &RecipeFilter) -> VulcanResult<Vec<Recipe>> {
        let mut found: Vec<Recipe> = self
            .inner
            .lock()
            .rows
            .values()
            .filter(|recipe| filter.matches(recipe))
            .cloned()
            .collect();
        found.sort_by_key(|recipe| (recipe.scheduled_at, recipe.id));
        Ok(found)
    }

    async fn update_if(
        &self,
        recipe: &Recipe,
        expected: Revision,
    ) -> VulcanResult<Option<Recipe>> {
        let mut inner = self.inner.lock();
        match inner.rows.get_mut(&recipe.id) {
            Some(current) if current.revision() == expected => {
                let mut stored = recipe.clone();
                stored.version = expected.version + 1;
                *current = stored.clone();
                Ok(Some(stored))
            },
            _ => Ok(None),
        }
    }

    async fn delete(&self, id: RecipeId) -> VulcanResult<bool> {
        Ok(self.inner.lock().rows.remove(&id).is_some())
    }
}
