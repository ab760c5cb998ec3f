//! SQLite persistence for recipes and the change log
//!
//! Instants are stored as integer milliseconds since the Unix epoch so the
//! due query compares numbers, not strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use errors::{VulcanError, VulcanResult};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::debug;

use crate::audit::AuditLog;
use crate::store::{RecipeFilter, RecipeStore};
use crate::types::{
    AuditAction, ChangeLogEntry, NewChangeLogEntry, NewRecipe, Recipe, RecipeId, RecipeParams,
    Revision,
};

/// Create tables and indexes if missing
pub async fn migrate(pool: &SqlitePool) -> VulcanResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            params_json TEXT NOT NULL,
            status TEXT NOT NULL,
            scheduled_at INTEGER,
            created_at INTEGER NOT NULL,
            activated_at INTEGER,
            version INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_recipes_due ON recipes(status, scheduled_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS change_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            user TEXT NOT NULL,
            action TEXT NOT NULL,
            details_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    debug!("Recipe schema ready");
    Ok(())
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> VulcanResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| VulcanError::Persistence(format!("timestamp {} out of range", ms)))
}

fn from_optional_millis(ms: Option<i64>) -> VulcanResult<Option<DateTime<Utc>>> {
    ms.map(from_millis).transpose()
}

/// Truncate to the precision the table keeps
fn stored_precision(at: DateTime<Utc>) -> VulcanResult<DateTime<Utc>> {
    from_millis(to_millis(at))
}

fn hydrate_recipe(row: SqliteRow) -> VulcanResult<Recipe> {
    let params_json: String = row.try_get("params_json")?;
    let params: RecipeParams = serde_json::from_str(&params_json)?;
    let status: String = row.try_get("status")?;

    Ok(Recipe {
        id: row.try_get("id")?,
        params,
        status: status.parse()?,
        scheduled_at: from_optional_millis(row.try_get("scheduled_at")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        activated_at: from_optional_millis(row.try_get("activated_at")?)?,
        version: row.try_get("version")?,
    })
}

fn hydrate_entry(row: SqliteRow) -> VulcanResult<ChangeLogEntry> {
    let action: String = row.try_get("action")?;
    let details_json: String = row.try_get("details_json")?;

    Ok(ChangeLogEntry {
        id: row.try_get("id")?,
        timestamp: from_millis(row.try_get("timestamp")?)?,
        user: row.try_get("user")?,
        action: action.parse::<AuditAction>()?,
        details: serde_json::from_str::<Value>(&details_json)?,
    })
}

#[derive(Debug, Clone)]
pub struct SqliteRecipeStore {
    pool: SqlitePool,
}

impl SqliteRecipeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeStore for SqliteRecipeStore {
    async fn create(&self, recipe: NewRecipe) -> VulcanResult<Recipe> {
        let params_json = serde_json::to_string(&recipe.params)?;

        let id = sqlx::query(
            r#"
            INSERT INTO recipes (name, params_json, status, scheduled_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&recipe.params.name)
        .bind(params_json)
        .bind(recipe.status.as_str())
        .bind(recipe.scheduled_at.map(to_millis))
        .bind(to_millis(recipe.created_at))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Recipe {
            id,
            params: recipe.params,
            status: recipe.status,
            scheduled_at: recipe.scheduled_at.map(stored_precision).transpose()?,
            created_at: stored_precision(recipe.created_at)?,
            activated_at: None,
            version: 1,
        })
    }

    async fn find_by_id(&self, id: RecipeId) -> VulcanResult<Option<Recipe>> {
        let row = sqlx::query(
            r#"
            SELECT id, params_json, status, scheduled_at, created_at, activated_at, version
            FROM recipes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_recipe).transpose()
    }

    async fn find_many(&self, filter: &RecipeFilter) -> VulcanResult<Vec<Recipe>> {
        let rows = sqlx::query(
            r#"
            SELECT id, params_json, status, scheduled_at, created_at, activated_at, version
            FROM recipes
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR (scheduled_at IS NOT NULL AND scheduled_at <= ?2))
            ORDER BY scheduled_at ASC, id ASC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.scheduled_before.map(to_millis))
        .fetch_all(&self.pool)
        .await?;

        let mut recipes = Vec::with_capacity(rows.len());
        for row in rows {
            recipes.push(hydrate_recipe(row)?);
        }
        Ok(recipes)
    }

    async fn update_if(
        &self,
        recipe: &Recipe,
        expected: Revision,
    ) -> VulcanResult<Option<Recipe>> {
        let params_json = serde_json::to_string(&recipe.params)?;

        let row = sqlx::query(
            r#"
            UPDATE recipes
            SET name = ?, params_json = ?, status = ?, scheduled_at = ?, activated_at = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            RETURNING id, params_json, status, scheduled_at, created_at, activated_at, version
            "#,
        )
        .bind(&recipe.params.name)
        .bind(params_json)
        .bind(recipe.status.as_str())
        .bind(recipe.scheduled_at.map(to_millis))
        .bind(recipe.activated_at.map(to_millis))
        .bind(recipe.id)
        .bind(expected.version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_recipe).transpose()
    }

    async fn delete(&self, id: RecipeId) -> VulcanResult<bool> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn append(&self, entry: NewChangeLogEntry) -> VulcanResult<ChangeLogEntry> {
        let details_json = serde_json::to_string(&entry.details)?;

        let id = sqlx::query(
            r#"
            INSERT INTO change_logs (timestamp, user, action, details_json)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(to_millis(entry.timestamp))
        .bind(&entry.user)
        .bind(entry.action.as_str())
        .bind(details_json)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(ChangeLogEntry {
            id,
            timestamp: stored_precision(entry.timestamp)?,
            user: entry.user,
            action: entry.action,
            details: entry.details,
        })
    }

    async fn list(&self, limit: usize) -> VulcanResult<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, user, action, details_json
            FROM change_logs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(hydrate_entry(row)?);
        }
        Ok(entries)
    }
}

