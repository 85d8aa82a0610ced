//! The data-access interceptor
//!
//! [`ScopedStore`] wraps an inner [`StorageEngine`] and rewrites every call
//! before delegating:
//!
//! - tenant-scoped entities get the context tenant merged into filters
//!   (reads and batch mutations) or into the write payload (creates);
//! - soft-deletable entities get a live-rows-only default on reads, and
//!   deletes are rewritten to timestamped updates - the physical row is
//!   never removed;
//! - successful mutations dispatch a fire-and-forget audit entry, except
//!   for mutations of the audit trail itself.
//!
//! The caller never observes the rewriting: result shapes and error
//! propagation match the inner engine's contract exactly.
//!
//! # Deliberate scoping gaps
//!
//! `FindUnique` and single-row `Update`/`Delete` address rows by primary
//! key and receive NO tenant predicate here. Callers of primary-key
//! operations own the ownership check. The gap is deliberate and
//! documented rather than silently closed; see DESIGN.md.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

use core_kernel::{AuditEventId, RequestContext, TenantId};

use crate::audit::{AuditAction, AuditEntry, AuditRecorder, BATCH_ENTITY_ID};
use crate::entity::Entity;
use crate::error::DatabaseError;
use crate::predicates::{merge_live_visibility, merge_tenant_into_filter, merge_tenant_into_patch};
use crate::query::{Operation, QueryArgs, QueryResult, StorageEngine};

/// What to do when a scoped operation runs without a tenant in context,
/// or with a caller-supplied tenant that conflicts with the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTenantPolicy {
    /// Fail closed: reject the call. The default.
    #[default]
    Reject,
    /// Legacy behavior: skip injection (logging a warning) and, on
    /// conflict, keep the caller's explicit value (logging an error).
    /// Opting in re-opens a known isolation gap.
    AllowUnscoped,
}

/// Tenant-scoping, soft-delete, and audit decorator over a storage engine.
pub struct ScopedStore {
    inner: Arc<dyn StorageEngine>,
    recorder: Option<AuditRecorder>,
    policy: MissingTenantPolicy,
    origin: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn StorageEngine>) -> Self {
        Self {
            inner,
            recorder: None,
            policy: MissingTenantPolicy::default(),
            origin: "api".to_string(),
        }
    }

    /// Attaches an audit recorder; without one, mutations are not audited
    pub fn with_recorder(mut self, recorder: AuditRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Overrides the missing-tenant policy
    pub fn with_policy(mut self, policy: MissingTenantPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the origin label stamped on audit entries
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Whether this operation would receive tenant injection at all.
    /// Primary-key operations bypass scoping by contract.
    fn needs_tenant(operation: Operation) -> bool {
        operation.is_scoped_read()
            || matches!(
                operation,
                Operation::Create
                    | Operation::Upsert
                    | Operation::UpdateMany
                    | Operation::DeleteMany
            )
    }

    /// Applies tenant scoping for `entity` to `args` in place.
    fn apply_tenant_scope(
        &self,
        entity: Entity,
        operation: Operation,
        args: &mut QueryArgs,
        tenant: TenantId,
    ) -> Result<(), DatabaseError> {
        let merged = if operation.is_scoped_read()
            || matches!(operation, Operation::UpdateMany | Operation::DeleteMany)
        {
            merge_tenant_into_filter(&mut args.filter, tenant, entity)
        } else if operation == Operation::Create {
            merge_tenant_into_patch(&mut args.patch, tenant, entity)
        } else if operation == Operation::Upsert {
            merge_tenant_into_filter(&mut args.filter, tenant, entity)
                .and_then(|_| merge_tenant_into_patch(&mut args.patch, tenant, entity))
        } else {
            return Ok(());
        };

        match merged {
            Ok(_) => Ok(()),
            Err(err) => {
                // A conflicting explicit tenant is a caller bug, never
                // silently papered over.
                error!(
                    entity = %entity,
                    operation = %operation,
                    error = %err,
                    "caller-supplied tenant filter conflicts with request context"
                );
                match self.policy {
                    MissingTenantPolicy::Reject => Err(err),
                    MissingTenantPolicy::AllowUnscoped => Ok(()),
                }
            }
        }
    }

    /// Handles the no-tenant-in-context case per policy.
    fn handle_missing_tenant(
        &self,
        entity: Entity,
        operation: Operation,
    ) -> Result<(), DatabaseError> {
        if !Self::needs_tenant(operation) {
            return Ok(());
        }
        match self.policy {
            MissingTenantPolicy::Reject => Err(DatabaseError::MissingTenant(entity.name())),
            MissingTenantPolicy::AllowUnscoped => {
                warn!(
                    entity = %entity,
                    operation = %operation,
                    "scoped entity accessed without tenant context; predicate injection skipped"
                );
                Ok(())
            }
        }
    }

    /// Resolves the entity id to stamp on an audit entry.
    fn audit_entity_id(result: &QueryResult, fallback: Option<uuid::Uuid>) -> String {
        if let QueryResult::Record(Some(record)) = result {
            if let Some(id) = record.id() {
                return id;
            }
        }
        fallback
            .map(|id| id.to_string())
            .unwrap_or_else(|| BATCH_ENTITY_ID.to_string())
    }

    fn dispatch_audit(
        &self,
        entity: Entity,
        action: AuditAction,
        entity_id: String,
        after_state: Option<serde_json::Value>,
    ) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        // Snapshot context values now; the worker task runs outside this
        // request's binding.
        let ctx = RequestContext::current().unwrap_or_default();
        recorder.record(AuditEntry {
            id: AuditEventId::new_v7(),
            entity,
            entity_id,
            action,
            before_state: None,
            after_state,
            actor_id: ctx.actor_id,
            tenant_id: ctx.tenant_id,
            origin: self.origin.clone(),
            created_at: Utc::now(),
        });
    }
}

#[async_trait]
impl StorageEngine for ScopedStore {
    async fn execute(
        &self,
        entity: Entity,
        operation: Operation,
        args: QueryArgs,
    ) -> Result<QueryResult, DatabaseError> {
        let descriptor = entity.descriptor();
        // Audit payload is the call as issued, before any rewriting.
        let observed_args = if operation.is_mutating() && entity != Entity::AuditLog {
            serde_json::to_value(&args).ok()
        } else {
            None
        };

        let observed_op = operation;
        let mut operation = operation;
        let mut args = args;

        if descriptor.tenant_scoped {
            match RequestContext::current_tenant() {
                Some(tenant) => self.apply_tenant_scope(entity, operation, &mut args, tenant)?,
                None => self.handle_missing_tenant(entity, operation)?,
            }
        }

        if descriptor.soft_delete {
            if operation.is_scoped_read() {
                merge_live_visibility(&mut args.filter);
            }
            match operation {
                Operation::Delete => {
                    operation = Operation::Update;
                    args.patch.deleted_at = Some(Some(Utc::now()));
                }
                Operation::DeleteMany => {
                    operation = Operation::UpdateMany;
                    args.patch.deleted_at = Some(Some(Utc::now()));
                }
                _ => {}
            }
        }

        let fallback_id = args.filter.id;
        let result = self.inner.execute(entity, operation, args).await?;

        // observed_args is only Some for mutating ops outside the audit
        // trail, so audit-of-audit recursion is ruled out structurally.
        // The action reflects the operation as issued: a rewritten delete
        // still records DELETE.
        if let Some(after_state) = observed_args {
            if let Some(action) = AuditAction::from_operation(observed_op) {
                let entity_id = Self::audit_entity_id(&result, fallback_id);
                self.dispatch_audit(entity, action, entity_id, Some(after_state));
            }
        }

        Ok(result)
    }
}
