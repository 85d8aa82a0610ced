//! Audit trail recording
//!
//! Mutating storage calls produce [`AuditEntry`] rows in an append-only
//! trail. Recording is fire-and-forget by contract: the interceptor hands
//! entries to an [`AuditRecorder`] backed by a bounded channel and moves
//! on; a background worker persists them. A failed or dropped audit write
//! is logged and discarded - it never propagates to, stalls, or rolls back
//! the primary operation that already succeeded.
//!
//! There is deliberately no coordination between the primary write and its
//! audit entry: an entry may land after the HTTP response has gone out, or
//! be lost entirely on process crash. Callers must not rely on their
//! co-occurrence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use core_kernel::{ActorId, AuditEventId, TenantId};

use crate::entity::Entity;
use crate::error::DatabaseError;
use crate::query::{Operation, Patch, QueryArgs, StorageEngine};

/// Action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    UpdateMany,
    DeleteMany,
}

impl AuditAction {
    /// Maps a mutating operation to its audit action.
    ///
    /// The action reflects the operation as the caller issued it, before
    /// any soft-delete rewrite - a rewritten delete still records DELETE.
    /// Upsert records as UPDATE. Read operations map to `None`.
    pub fn from_operation(operation: Operation) -> Option<Self> {
        match operation {
            Operation::Create => Some(AuditAction::Create),
            Operation::Update | Operation::Upsert => Some(AuditAction::Update),
            Operation::Delete => Some(AuditAction::Delete),
            Operation::UpdateMany => Some(AuditAction::UpdateMany),
            Operation::DeleteMany => Some(AuditAction::DeleteMany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::UpdateMany => "UPDATE_MANY",
            AuditAction::DeleteMany => "DELETE_MANY",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel entity id for batch mutations where no single row id exists
pub const BATCH_ENTITY_ID: &str = "batch";

/// One append-only audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEventId,
    pub entity: Entity,
    /// Id of the affected row, or [`BATCH_ENTITY_ID`] for batch mutations
    pub entity_id: String,
    pub action: AuditAction,
    /// State before the change, when the producer had it in hand
    pub before_state: Option<Value>,
    /// Change payload - for interceptor-produced entries, the raw caller args
    pub after_state: Option<Value>,
    pub actor_id: Option<ActorId>,
    pub tenant_id: Option<TenantId>,
    /// Which surface produced the entry ("api", "job", ...)
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Converts the entry into storage-call arguments for the audit table
    pub fn to_query_args(&self) -> Result<QueryArgs, DatabaseError> {
        let mut patch = Patch::new()
            .field("id", self.id.as_uuid().to_string())
            .field("entity", self.entity.name())
            .field("entity_id", self.entity_id.clone())
            .field("action", self.action.as_str())
            .field("origin", self.origin.clone())
            .field("created_at", self.created_at.to_rfc3339());

        if let Some(before) = &self.before_state {
            patch = patch.field("before_state", before.clone());
        }
        if let Some(after) = &self.after_state {
            patch = patch.field("after_state", after.clone());
        }
        if let Some(actor) = self.actor_id {
            patch = patch.field("actor_id", actor.as_uuid().to_string());
        }
        if let Some(tenant) = self.tenant_id {
            patch = patch.tenant(tenant);
        }

        Ok(QueryArgs::with_patch(patch))
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persists one entry. Entries are append-only; implementations must
    /// never update or delete existing rows.
    async fn append(&self, entry: AuditEntry) -> Result<(), DatabaseError>;
}

/// Audit store writing through a raw storage engine.
///
/// The engine handed in here must be the *inner* engine, not the scoped
/// decorator: audit writes bypass interception so they can never trigger
/// further audit entries.
pub struct EngineAuditStore {
    engine: Arc<dyn StorageEngine>,
}

impl EngineAuditStore {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl AuditStore for EngineAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), DatabaseError> {
        let args = entry.to_query_args()?;
        self.engine
            .execute(Entity::AuditLog, Operation::Create, args)
            .await?;
        Ok(())
    }
}

/// Handle for dispatching audit entries to the background worker.
///
/// Cloning is cheap; all clones feed the same bounded queue. The worker
/// stops once every handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditRecorder {
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Spawns the worker task with the default queue capacity
    pub fn spawn(store: Arc<dyn AuditStore>) -> Self {
        Self::spawn_with_capacity(store, Self::DEFAULT_CAPACITY)
    }

    /// Spawns the worker task with an explicit queue capacity
    pub fn spawn_with_capacity(store: Arc<dyn AuditStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(capacity);

        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let entity = entry.entity;
                let action = entry.action;
                if let Err(err) = store.append(entry).await {
                    error!(
                        entity = %entity,
                        action = %action,
                        error = %err,
                        "failed to persist audit entry"
                    );
                }
            }
            debug!("audit recorder worker stopped");
        });

        Self { tx }
    }

    /// Enqueues an entry without waiting.
    ///
    /// A full queue drops the entry with a warning - losing an audit entry
    /// is an accepted failure mode, blocking the caller is not.
    pub fn record(&self, entry: AuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(
                    entity = %entry.entity,
                    action = %entry.action,
                    "audit queue full, dropping entry"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(
                    entity = %entry.entity,
                    action = %entry.action,
                    "audit recorder stopped, dropping entry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entry() -> AuditEntry {
        AuditEntry {
            id: AuditEventId::new_v7(),
            entity: Entity::Student,
            entity_id: "s1".to_string(),
            action: AuditAction::Update,
            before_state: None,
            after_state: Some(json!({"patch": {"fields": {"name": "Ana"}}})),
            actor_id: Some(ActorId::new()),
            tenant_id: Some(TenantId::new()),
            origin: "api".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_action_from_operation() {
        assert_eq!(
            AuditAction::from_operation(Operation::Create),
            Some(AuditAction::Create)
        );
        assert_eq!(
            AuditAction::from_operation(Operation::Upsert),
            Some(AuditAction::Update)
        );
        assert_eq!(
            AuditAction::from_operation(Operation::DeleteMany),
            Some(AuditAction::DeleteMany)
        );
        assert_eq!(AuditAction::from_operation(Operation::FindMany), None);
    }

    #[test]
    fn test_entry_to_query_args() {
        let entry = sample_entry();
        let args = entry.to_query_args().unwrap();

        assert_eq!(args.patch.tenant_id, entry.tenant_id);
        assert_eq!(
            args.patch.fields.get("entity"),
            Some(&json!("student"))
        );
        assert_eq!(args.patch.fields.get("action"), Some(&json!("UPDATE")));
        assert_eq!(args.patch.fields.get("entity_id"), Some(&json!("s1")));
    }

    #[test]
    fn test_batch_sentinel() {
        assert_eq!(BATCH_ENTITY_ID, "batch");
    }
}
