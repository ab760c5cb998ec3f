//! Audit Log
//!
//! Append-only. Nothing in this crate updates or deletes an entry.

use async_trait::async_trait;
use errors::VulcanResult;
use parking_lot::Mutex;

use crate::types::{ChangeLogEntry, NewChangeLogEntry};

#[async_trait]
pub trait AuditLog: Send + Sync + 'static {
    async fn append(&self, entry: NewChangeLogEntry) -> VulcanResult<ChangeLogEntry>;

    /// Newest first
    async fn list(&self, limit: usize) -> VulcanResult<Vec<ChangeLogEntry>>;
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<ChangeLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first, for assertions
    pub fn entries(&self) -> Vec<ChangeLogEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: NewChangeLogEntry) -> VulcanResult<ChangeLogEntry> {
        let mut entries = self.entries.lock();
        let stored = ChangeLogEntry {
            id: entries.len() as i64 + 1,
            timestamp: entry.timestamp,
            user: entry.user,
            action: entry.action,
            details: entry.details,
        };
        entries.push(stored.clone());
        Ok(stored)
    }

    async fn list(&self, limit: usize) -> VulcanResult<Vec<ChangeLogEntry>> {
        Ok(self.entries.lock().iter().rev().take(limit).cloned().collect())
    }
}
