//! Capturing and failure-injecting test doubles

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use infra_db::{
    AuditEntry, AuditStore, DatabaseError, Entity, Operation, QueryArgs, QueryResult,
    StorageEngine,
};

/// Audit store that captures entries in memory.
#[derive(Default, Clone)]
pub struct CapturingAuditStore {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl CapturingAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit store lock").clone()
    }

    /// Polls until at least `count` entries have been appended.
    ///
    /// The recorder persists asynchronously, so tests must wait rather
    /// than assert immediately after the primary call returns.
    pub async fn wait_for_entries(&self, count: usize, timeout: Duration) -> Vec<AuditEntry> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let entries = self.entries();
            if entries.len() >= count {
                return entries;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {count} audit entries, have {}",
                    entries.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Asserts that no entry arrives within `window`.
    pub async fn assert_no_entries(&self, window: Duration) {
        tokio::time::sleep(window).await;
        let entries = self.entries();
        assert!(
            entries.is_empty(),
            "expected no audit entries, found {}",
            entries.len()
        );
    }
}

#[async_trait]
impl AuditStore for CapturingAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), DatabaseError> {
        self.entries.lock().expect("audit store lock").push(entry);
        Ok(())
    }
}

/// Audit store whose every append fails.
#[derive(Default, Clone)]
pub struct FailingAuditStore {
    attempts: Arc<Mutex<usize>>,
}

impl FailingAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appends attempted (and failed)
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().expect("attempts lock")
    }

    /// Polls until at least `count` appends were attempted.
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.attempts() < count {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {count} audit attempts, have {}",
                    self.attempts()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn append(&self, _entry: AuditEntry) -> Result<(), DatabaseError> {
        *self.attempts.lock().expect("attempts lock") += 1;
        Err(DatabaseError::ConnectionFailed(
            "audit store unavailable (injected)".to_string(),
        ))
    }
}

/// Storage engine whose every call fails.
#[derive(Default)]
pub struct FailingStorageEngine;

#[async_trait]
impl StorageEngine for FailingStorageEngine {
    async fn execute(
        &self,
        _entity: Entity,
        _operation: Operation,
        _args: QueryArgs,
    ) -> Result<QueryResult, DatabaseError> {
        Err(DatabaseError::ConnectionFailed(
            "storage engine unavailable (injected)".to_string(),
        ))
    }
}
