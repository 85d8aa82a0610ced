//! Data-Access Infrastructure Layer
//!
//! This crate provides the tenant-isolation and audit-interception layer
//! every resource of the school management system goes through.
//!
//! # Architecture
//!
//! All business code depends on the [`StorageEngine`] trait. In production
//! the stack is assembled as:
//!
//! ```text
//! business code -> ScopedStore -> PgStorageEngine -> PostgreSQL
//!                      |
//!                      +-> AuditRecorder (bounded queue, background worker)
//!                              -> EngineAuditStore -> raw engine -> audit_log
//! ```
//!
//! The [`ScopedStore`] decorator injects tenant predicates and soft-delete
//! defaults per the static [`Entity`] registry, rewrites deletes into
//! timestamped updates, and dispatches fire-and-forget audit entries after
//! successful mutations. The audit path writes through the *raw* engine,
//! never the decorator, so audit writes cannot recurse.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Arc::new(PgStorageEngine::new(pool));
//! let recorder = AuditRecorder::spawn(Arc::new(EngineAuditStore::new(engine.clone())));
//! let store = ScopedStore::new(engine).with_recorder(recorder);
//!
//! // Under a bound RequestContext this returns only the tenant's live rows.
//! let students = store
//!     .execute(Entity::Student, Operation::FindMany, QueryArgs::new())
//!     .await?;
//! ```

pub mod audit;
pub mod entity;
pub mod error;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod predicates;
pub mod query;
pub mod scoped;

pub use audit::{AuditAction, AuditEntry, AuditRecorder, AuditStore, EngineAuditStore};
pub use entity::{Entity, EntityDescriptor};
pub use error::DatabaseError;
pub use memory::MemoryStorageEngine;
pub use pool::{create_pool, DatabaseConfig, DatabasePool};
pub use postgres::PgStorageEngine;
pub use predicates::{with_tenancy, with_tenant, without_soft_deleted};
pub use query::{
    DeletedVisibility, Filter, GroupCount, Operation, Patch, QueryArgs, QueryResult, Record,
    SortOrder, StorageEngine,
};
pub use scoped::{MissingTenantPolicy, ScopedStore};
