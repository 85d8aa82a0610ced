//! In-memory storage engine
//!
//! A complete [`StorageEngine`] over process memory, used by the test
//! suite and handy for local development without a database. Records are
//! JSON objects; filters match by equality. Soft deletes are NOT special
//! here - `Delete` physically removes rows, exactly like a real engine,
//! so the interceptor's rewrite is what preserves them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::DatabaseError;
use crate::query::{
    DeletedVisibility, Filter, GroupCount, Operation, Patch, QueryArgs, QueryResult, Record,
    SortOrder, StorageEngine,
};

/// Storage engine keeping all rows in memory.
#[derive(Default)]
pub struct MemoryStorageEngine {
    tables: RwLock<HashMap<Entity, Vec<Record>>>,
}

impl MemoryStorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with pre-built rows (test setup helper)
    pub async fn seed(&self, entity: Entity, rows: Vec<Record>) {
        let mut tables = self.tables.write().await;
        tables.entry(entity).or_default().extend(rows);
    }

    /// Snapshot of a table's current rows, unfiltered
    pub async fn dump(&self, entity: Entity) -> Vec<Record> {
        let tables = self.tables.read().await;
        tables.get(&entity).cloned().unwrap_or_default()
    }

    fn matches(record: &Record, filter: &Filter) -> bool {
        if let Some(id) = filter.id {
            match record.id() {
                Some(rec_id) if rec_id == id.to_string() => {}
                _ => return false,
            }
        }
        if let Some(tenant) = filter.tenant_id {
            match record.tenant_id() {
                Some(rec_tenant) if rec_tenant == tenant.as_uuid().to_string() => {}
                _ => return false,
            }
        }
        match filter.deleted {
            Some(DeletedVisibility::OnlyLive) if record.is_deleted() => return false,
            Some(DeletedVisibility::OnlyDeleted) if !record.is_deleted() => return false,
            _ => {}
        }
        if filter.created_since.is_some() || filter.created_until.is_some() {
            let created_at = record
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<DateTime<Utc>>().ok());
            match created_at {
                Some(ts) => {
                    if filter.created_since.is_some_and(|since| ts < since) {
                        return false;
                    }
                    if filter.created_until.is_some_and(|until| ts > until) {
                        return false;
                    }
                }
                // A bounded query never matches rows without a timestamp
                None => return false,
            }
        }
        for (column, expected) in &filter.fields {
            if record.get(column) != Some(expected) {
                return false;
            }
        }
        true
    }

    fn apply_patch(record: &mut Record, patch: &Patch) {
        if let Some(tenant) = patch.tenant_id {
            record
                .0
                .insert("tenant_id".to_string(), Value::String(tenant.as_uuid().to_string()));
        }
        if let Some(deleted_at) = &patch.deleted_at {
            record
                .0
                .insert("deleted_at".to_string(), timestamp_value(deleted_at));
        }
        for (column, value) in &patch.fields {
            record.0.insert(column.clone(), value.clone());
        }
    }

    fn build_record(patch: &Patch) -> Record {
        let mut record = Record::default();
        // Engine-assigned primary key unless the caller supplied one
        if !patch.fields.contains_key("id") {
            record
                .0
                .insert("id".to_string(), Value::String(Uuid::now_v7().to_string()));
        }
        record.0.insert("deleted_at".to_string(), Value::Null);
        Self::apply_patch(&mut record, patch);
        record
    }

    fn sort(records: &mut [Record], order_by: &Option<(String, SortOrder)>) {
        if let Some((column, order)) = order_by {
            records.sort_by(|a, b| {
                let cmp = compare_values(a.get(column), b.get(column));
                match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                }
            });
        }
    }

    fn select(rows: &[Record], args: &QueryArgs) -> Vec<Record> {
        let mut matched: Vec<Record> = rows
            .iter()
            .filter(|r| Self::matches(r, &args.filter))
            .cloned()
            .collect();
        Self::sort(&mut matched, &args.order_by);
        let skip = args.skip.unwrap_or(0) as usize;
        let take = args.take.map(|t| t as usize).unwrap_or(usize::MAX);
        matched.into_iter().skip(skip).take(take).collect()
    }
}

fn timestamp_value(ts: &Option<DateTime<Utc>>) -> Value {
    match ts {
        Some(ts) => Value::String(ts.to_rfc3339()),
        None => Value::Null,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl StorageEngine for MemoryStorageEngine {
    async fn execute(
        &self,
        entity: Entity,
        operation: Operation,
        args: QueryArgs,
    ) -> Result<QueryResult, DatabaseError> {
        match operation {
            Operation::FindUnique | Operation::FindFirst => {
                let tables = self.tables.read().await;
                let rows = tables.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
                let found = Self::select(rows, &args).into_iter().next();
                Ok(QueryResult::Record(found))
            }
            Operation::FindMany => {
                let tables = self.tables.read().await;
                let rows = tables.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
                Ok(QueryResult::Records(Self::select(rows, &args)))
            }
            Operation::Count | Operation::Aggregate => {
                let tables = self.tables.read().await;
                let rows = tables.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
                let count = rows.iter().filter(|r| Self::matches(r, &args.filter)).count();
                Ok(QueryResult::Count(count as u64))
            }
            Operation::GroupBy => {
                let column = args
                    .group_by
                    .as_deref()
                    .ok_or_else(|| DatabaseError::QueryFailed("groupBy requires a column".into()))?;
                let tables = self.tables.read().await;
                let rows = tables.get(&entity).map(Vec::as_slice).unwrap_or(&[]);
                let mut buckets: Vec<GroupCount> = Vec::new();
                for record in rows.iter().filter(|r| Self::matches(r, &args.filter)) {
                    let key = record.get(column).cloned().unwrap_or(Value::Null);
                    match buckets.iter_mut().find(|b| b.key == key) {
                        Some(bucket) => bucket.count += 1,
                        None => buckets.push(GroupCount { key, count: 1 }),
                    }
                }
                Ok(QueryResult::Groups(buckets))
            }
            Operation::Create => {
                let record = Self::build_record(&args.patch);
                let mut tables = self.tables.write().await;
                tables.entry(entity).or_default().push(record.clone());
                Ok(QueryResult::Record(Some(record)))
            }
            Operation::Update => {
                let mut tables = self.tables.write().await;
                let rows = tables.entry(entity).or_default();
                match rows.iter_mut().find(|r| Self::matches(r, &args.filter)) {
                    Some(record) => {
                        Self::apply_patch(record, &args.patch);
                        Ok(QueryResult::Record(Some(record.clone())))
                    }
                    None => Ok(QueryResult::Record(None)),
                }
            }
            Operation::Upsert => {
                let mut tables = self.tables.write().await;
                let rows = tables.entry(entity).or_default();
                match rows.iter_mut().find(|r| Self::matches(r, &args.filter)) {
                    Some(record) => {
                        Self::apply_patch(record, &args.patch);
                        Ok(QueryResult::Record(Some(record.clone())))
                    }
                    None => {
                        let record = Self::build_record(&args.patch);
                        rows.push(record.clone());
                        Ok(QueryResult::Record(Some(record)))
                    }
                }
            }
            Operation::UpdateMany => {
                let mut tables = self.tables.write().await;
                let rows = tables.entry(entity).or_default();
                let mut affected = 0u64;
                for record in rows.iter_mut().filter(|r| Self::matches(r, &args.filter)) {
                    Self::apply_patch(record, &args.patch);
                    affected += 1;
                }
                Ok(QueryResult::Affected(affected))
            }
            Operation::Delete => {
                let mut tables = self.tables.write().await;
                let rows = tables.entry(entity).or_default();
                match rows.iter().position(|r| Self::matches(r, &args.filter)) {
                    Some(index) => {
                        let removed = rows.remove(index);
                        Ok(QueryResult::Record(Some(removed)))
                    }
                    None => Ok(QueryResult::Record(None)),
                }
            }
            Operation::DeleteMany => {
                let mut tables = self.tables.write().await;
                let rows = tables.entry(entity).or_default();
                let before = rows.len();
                rows.retain(|r| !Self::matches(r, &args.filter));
                Ok(QueryResult::Affected((before - rows.len()) as u64))
            }
        }
    }
}
