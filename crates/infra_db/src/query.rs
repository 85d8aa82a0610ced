//! Typed query model and the storage engine seam
//!
//! Every persistence call is `(entity, operation, args)`-shaped. The filter
//! and patch carry the columns the scoping layer cares about (`tenant_id`,
//! `deleted_at`, `id`) as typed fields, so predicate injection never has to
//! guess at a loosely-typed map; entity-specific columns travel in a JSON
//! field map.
//!
//! [`StorageEngine`] is the seam all business code depends on. The scoping
//! interceptor implements it as a decorator over an inner engine, so the
//! rewriting logic is an explicit, testable layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use core_kernel::TenantId;

use crate::entity::Entity;
use crate::error::DatabaseError;

/// The closed set of storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Single-row lookup by primary key. NOT tenant-filtered (see scoped.rs).
    FindUnique,
    FindFirst,
    FindMany,
    Count,
    Aggregate,
    GroupBy,
    Create,
    /// Single-row update addressed by primary key. NOT tenant-filtered.
    Update,
    Upsert,
    Delete,
    UpdateMany,
    DeleteMany,
}

impl Operation {
    /// Operations that change data and therefore produce audit entries
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Operation::Create
                | Operation::Update
                | Operation::Upsert
                | Operation::Delete
                | Operation::UpdateMany
                | Operation::DeleteMany
        )
    }

    /// Read-shaped operations
    pub fn is_read(self) -> bool {
        !self.is_mutating()
    }

    /// Read operations that receive an injected tenant predicate.
    ///
    /// `FindUnique` is deliberately absent: primary-key lookups are assumed
    /// pre-validated by the caller.
    pub fn is_scoped_read(self) -> bool {
        matches!(
            self,
            Operation::FindFirst
                | Operation::FindMany
                | Operation::Count
                | Operation::Aggregate
                | Operation::GroupBy
        )
    }

    /// Stable name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Operation::FindUnique => "findUnique",
            Operation::FindFirst => "findFirst",
            Operation::FindMany => "findMany",
            Operation::Count => "count",
            Operation::Aggregate => "aggregate",
            Operation::GroupBy => "groupBy",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::UpdateMany => "updateMany",
            Operation::DeleteMany => "deleteMany",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Visibility of soft-deleted rows in a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletedVisibility {
    /// Only rows with `deleted_at IS NULL` (the injected default)
    OnlyLive,
    /// Only rows with `deleted_at IS NOT NULL`
    OnlyDeleted,
    /// No `deleted_at` predicate at all
    All,
}

/// Typed predicate over an entity's rows.
///
/// A `None` in `tenant_id` or `deleted` means "caller did not specify";
/// the interceptor may inject a value. Explicit values are never silently
/// overridden.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Primary-key predicate
    pub id: Option<Uuid>,
    /// Explicit tenant predicate
    pub tenant_id: Option<TenantId>,
    /// Soft-delete visibility
    pub deleted: Option<DeletedVisibility>,
    /// Inclusive lower bound on `created_at`
    pub created_since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub created_until: Option<DateTime<Utc>>,
    /// Entity-specific equality conditions (column -> value)
    pub fields: Map<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate matching a single row by primary key
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Adds an equality condition on an entity-specific column
    pub fn field(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Sets an explicit tenant predicate
    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Sets an explicit soft-delete visibility
    pub fn visibility(mut self, visibility: DeletedVisibility) -> Self {
        self.deleted = Some(visibility);
        self
    }

    /// Restricts to rows created at or after `ts`
    pub fn created_since(mut self, ts: DateTime<Utc>) -> Self {
        self.created_since = Some(ts);
        self
    }

    /// Restricts to rows created at or before `ts`
    pub fn created_until(mut self, ts: DateTime<Utc>) -> Self {
        self.created_until = Some(ts);
        self
    }
}

/// Typed write payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Tenant column value; injected on create when absent
    pub tenant_id: Option<TenantId>,
    /// Soft-delete column: `Some(Some(ts))` marks deleted, `Some(None)`
    /// restores, `None` leaves the column untouched
    pub deleted_at: Option<Option<DateTime<Utc>>>,
    /// Entity-specific columns (column -> value)
    pub fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an entity-specific column
    pub fn field(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    /// Sets the tenant column explicitly
    pub fn tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// True when the patch writes nothing
    pub fn is_empty(&self) -> bool {
        self.tenant_id.is_none() && self.deleted_at.is_none() && self.fields.is_empty()
    }
}

/// Sort direction for ordered reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Arguments to a storage call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryArgs {
    pub filter: Filter,
    pub patch: Patch,
    /// Column and direction for ordered reads
    pub order_by: Option<(String, SortOrder)>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Column for GroupBy
    pub group_by: Option<String>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: Filter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_patch(patch: Patch) -> Self {
        Self {
            patch,
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn patch(mut self, patch: Patch) -> Self {
        self.patch = patch;
        self
    }

    pub fn order(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn paged(mut self, skip: u64, take: u64) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }

    pub fn group(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }
}

/// A row as returned by an engine: a JSON object keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Builds a record from a JSON value, if it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// The row's primary key rendered as a string, if present
    pub fn id(&self) -> Option<String> {
        match self.0.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Tenant column as a string, if present
    pub fn tenant_id(&self) -> Option<&str> {
        match self.0.get("tenant_id") {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// True when the row carries a non-null `deleted_at`
    pub fn is_deleted(&self) -> bool {
        matches!(self.0.get("deleted_at"), Some(v) if !v.is_null())
    }
}

/// One bucket of a GroupBy result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: Value,
    pub count: u64,
}

/// Result of a storage call. Shape depends on the operation:
/// single-row operations return `Record`, list reads return `Records`,
/// counting reads return `Count`, batch mutations return `Affected`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Record(Option<Record>),
    Records(Vec<Record>),
    Count(u64),
    Affected(u64),
    Groups(Vec<GroupCount>),
}

impl QueryResult {
    /// The single row of a `Record` result
    pub fn into_record(self) -> Option<Record> {
        match self {
            QueryResult::Record(record) => record,
            _ => None,
        }
    }

    /// The rows of a `Records` result
    pub fn into_records(self) -> Vec<Record> {
        match self {
            QueryResult::Records(records) => records,
            _ => Vec::new(),
        }
    }

    /// The value of a `Count` or `Affected` result
    pub fn count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) | QueryResult::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

/// The storage seam.
///
/// Accepts `(entity, operation, args)`-shaped calls and returns
/// operation-shaped results or storage-layer errors. The scoping
/// interceptor is a strict wrapper around this contract.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn execute(
        &self,
        entity: Entity,
        operation: Operation,
        args: QueryArgs,
    ) -> Result<QueryResult, DatabaseError>;
}
