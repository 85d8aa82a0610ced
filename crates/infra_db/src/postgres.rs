//! PostgreSQL storage engine
//!
//! Implements the `(entity, operation, args)` contract over PostgreSQL with
//! dynamically built SQL. Rows travel as JSON (`row_to_json`) so the engine
//! stays schema-agnostic: the typed filter/patch columns (`id`, `tenant_id`,
//! `deleted_at`) are known to every scoped table, everything else is
//! caller-supplied columns.
//!
//! Column names arriving in filter/patch field maps are validated against a
//! strict identifier charset before they reach the SQL text; values are
//! always bound parameters.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::entity::Entity;
use crate::error::DatabaseError;
use crate::query::{
    DeletedVisibility, Filter, GroupCount, Operation, Patch, QueryArgs, QueryResult, Record,
    SortOrder, StorageEngine,
};

/// Storage engine backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStorageEngine {
    pool: PgPool,
}

impl PgStorageEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Accepts lowercase snake_case identifiers only; everything else is
/// rejected before it can reach SQL text.
fn validate_ident(name: &str) -> Result<&str, DatabaseError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);
    if valid_start && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        Ok(name)
    } else {
        Err(DatabaseError::QueryFailed(format!(
            "invalid column name '{name}'"
        )))
    }
}

/// Binds a JSON scalar as the matching Postgres type.
fn push_bind_value<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    value: &'a Value,
) -> Result<(), DatabaseError> {
    match value {
        Value::String(s) => {
            qb.push_bind(s.as_str());
        }
        Value::Bool(b) => {
            qb.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                qb.push_bind(f);
            } else {
                return Err(DatabaseError::SerializationError(format!(
                    "unsupported numeric value {n}"
                )));
            }
        }
        Value::Object(_) | Value::Array(_) => {
            qb.push_bind(value);
        }
        Value::Null => {
            return Err(DatabaseError::SerializationError(
                "null filter values must use IS NULL semantics".to_string(),
            ));
        }
    }
    Ok(())
}

/// Appends the WHERE clause for a typed filter.
fn push_where<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    filter: &'a Filter,
) -> Result<(), DatabaseError> {
    qb.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        qb.push(" AND id = ");
        qb.push_bind(id);
    }
    if let Some(tenant) = filter.tenant_id {
        qb.push(" AND tenant_id = ");
        qb.push_bind(*tenant.as_uuid());
    }
    match filter.deleted {
        Some(DeletedVisibility::OnlyLive) => {
            qb.push(" AND deleted_at IS NULL");
        }
        Some(DeletedVisibility::OnlyDeleted) => {
            qb.push(" AND deleted_at IS NOT NULL");
        }
        Some(DeletedVisibility::All) | None => {}
    }
    if let Some(since) = filter.created_since {
        qb.push(" AND created_at >= ");
        qb.push_bind(since);
    }
    if let Some(until) = filter.created_until {
        qb.push(" AND created_at <= ");
        qb.push_bind(until);
    }
    for (column, value) in &filter.fields {
        let column = validate_ident(column)?;
        if value.is_null() {
            qb.push(format_args!(" AND {column} IS NULL"));
        } else {
            qb.push(format_args!(" AND {column} = "));
            push_bind_value(qb, value)?;
        }
    }
    Ok(())
}

/// Appends ORDER BY / OFFSET / LIMIT.
fn push_page(qb: &mut QueryBuilder<'_, Postgres>, args: &QueryArgs) -> Result<(), DatabaseError> {
    if let Some((column, order)) = &args.order_by {
        let column = validate_ident(column)?;
        let dir = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        qb.push(format_args!(" ORDER BY {column} {dir}"));
    }
    if let Some(skip) = args.skip {
        qb.push(" OFFSET ");
        qb.push_bind(skip as i64);
    }
    if let Some(take) = args.take {
        qb.push(" LIMIT ");
        qb.push_bind(take as i64);
    }
    Ok(())
}

/// Columns a patch writes, as (name, value) pairs with typed columns first.
fn patch_columns(patch: &Patch) -> Result<Vec<(&str, Value)>, DatabaseError> {
    let mut columns: Vec<(&str, Value)> = Vec::new();
    if let Some(tenant) = patch.tenant_id {
        columns.push(("tenant_id", Value::String(tenant.as_uuid().to_string())));
    }
    if let Some(deleted_at) = &patch.deleted_at {
        let value = match deleted_at {
            Some(ts) => Value::String(ts.to_rfc3339()),
            None => Value::Null,
        };
        columns.push(("deleted_at", value));
    }
    for (column, value) in &patch.fields {
        columns.push((validate_ident(column)?, value.clone()));
    }
    Ok(columns)
}

/// Binds a patch value inside INSERT/UPDATE; timestamps and uuids stored in
/// typed columns are cast from their text binding.
fn push_patch_value(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    value: &Value,
) -> Result<(), DatabaseError> {
    match value {
        Value::Null => {
            qb.push("NULL");
            Ok(())
        }
        Value::String(s) if column == "tenant_id" || column == "id" || column == "actor_id" => {
            qb.push_bind(s.clone());
            qb.push("::uuid");
            Ok(())
        }
        Value::String(s) if column == "deleted_at" || column == "created_at" => {
            qb.push_bind(s.clone());
            qb.push("::timestamptz");
            Ok(())
        }
        Value::String(s) => {
            qb.push_bind(s.clone());
            Ok(())
        }
        Value::Bool(b) => {
            qb.push_bind(*b);
            Ok(())
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                qb.push_bind(f);
            } else {
                return Err(DatabaseError::SerializationError(format!(
                    "unsupported numeric value {n}"
                )));
            }
            Ok(())
        }
        Value::Object(_) | Value::Array(_) => {
            qb.push_bind(value.clone());
            Ok(())
        }
    }
}

impl PgStorageEngine {
    async fn fetch_records(
        &self,
        qb: &mut QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<Record>, DatabaseError> {
        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Value = row.try_get(0)?;
            let record = Record::from_value(value).ok_or_else(|| {
                DatabaseError::SerializationError("row_to_json returned a non-object".to_string())
            })?;
            records.push(record);
        }
        Ok(records)
    }

    async fn select(
        &self,
        entity: Entity,
        args: &QueryArgs,
        single: bool,
    ) -> Result<Vec<Record>, DatabaseError> {
        let table = entity.table();
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT row_to_json({table}.*) FROM {table}"));
        push_where(&mut qb, &args.filter)?;
        push_page(&mut qb, args)?;
        if single {
            qb.push(" LIMIT 1");
        }
        self.fetch_records(&mut qb).await
    }

    async fn count(&self, entity: Entity, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", entity.table()));
        push_where(&mut qb, filter)?;
        let row = qb.build().fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }

    async fn insert(&self, entity: Entity, patch: &Patch) -> Result<Option<Record>, DatabaseError> {
        let columns = patch_columns(patch)?;
        if columns.is_empty() {
            return Err(DatabaseError::QueryFailed(
                "create requires a non-empty patch".to_string(),
            ));
        }
        let table = entity.table();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("INSERT INTO {table} ("));
        for (i, (column, _)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(*column);
        }
        qb.push(") VALUES (");
        for (i, (column, value)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            push_patch_value(&mut qb, column, value)?;
        }
        qb.push(format_args!(") RETURNING row_to_json({table}.*)"));
        Ok(self.fetch_records(&mut qb).await?.into_iter().next())
    }

    fn push_update_prefix<'a>(
        qb: &mut QueryBuilder<'a, Postgres>,
        patch: &Patch,
    ) -> Result<(), DatabaseError> {
        let columns = patch_columns(patch)?;
        if columns.is_empty() {
            return Err(DatabaseError::QueryFailed(
                "update requires a non-empty patch".to_string(),
            ));
        }
        qb.push(" SET ");
        for (i, (column, value)) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format_args!("{column} = "));
            push_patch_value(qb, column, value)?;
        }
        Ok(())
    }

    async fn update_one(
        &self,
        entity: Entity,
        args: &QueryArgs,
    ) -> Result<Option<Record>, DatabaseError> {
        let table = entity.table();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("UPDATE {table}"));
        Self::push_update_prefix(&mut qb, &args.patch)?;
        push_where(&mut qb, &args.filter)?;
        qb.push(format_args!(" RETURNING row_to_json({table}.*)"));
        Ok(self.fetch_records(&mut qb).await?.into_iter().next())
    }

    async fn update_many(&self, entity: Entity, args: &QueryArgs) -> Result<u64, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {}", entity.table()));
        Self::push_update_prefix(&mut qb, &args.patch)?;
        push_where(&mut qb, &args.filter)?;
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_one(
        &self,
        entity: Entity,
        filter: &Filter,
    ) -> Result<Option<Record>, DatabaseError> {
        let table = entity.table();
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("DELETE FROM {table}"));
        push_where(&mut qb, filter)?;
        qb.push(format_args!(" RETURNING row_to_json({table}.*)"));
        Ok(self.fetch_records(&mut qb).await?.into_iter().next())
    }

    async fn delete_many(&self, entity: Entity, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("DELETE FROM {}", entity.table()));
        push_where(&mut qb, filter)?;
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn group_by(
        &self,
        entity: Entity,
        args: &QueryArgs,
    ) -> Result<Vec<GroupCount>, DatabaseError> {
        let column = args
            .group_by
            .as_deref()
            .ok_or_else(|| DatabaseError::QueryFailed("groupBy requires a column".to_string()))?;
        let column = validate_ident(column)?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT to_json({column}), COUNT(*) FROM {}",
            entity.table()
        ));
        push_where(&mut qb, &args.filter)?;
        qb.push(format_args!(" GROUP BY {column}"));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Value = row.try_get(0)?;
            let count: i64 = row.try_get(1)?;
            groups.push(GroupCount {
                key,
                count: count as u64,
            });
        }
        Ok(groups)
    }
}

#[async_trait]
impl StorageEngine for PgStorageEngine {
    async fn execute(
        &self,
        entity: Entity,
        operation: Operation,
        args: QueryArgs,
    ) -> Result<QueryResult, DatabaseError> {
        match operation {
            Operation::FindUnique | Operation::FindFirst => {
                let record = self.select(entity, &args, true).await?.into_iter().next();
                Ok(QueryResult::Record(record))
            }
            Operation::FindMany => Ok(QueryResult::Records(self.select(entity, &args, false).await?)),
            Operation::Count | Operation::Aggregate => {
                Ok(QueryResult::Count(self.count(entity, &args.filter).await?))
            }
            Operation::GroupBy => Ok(QueryResult::Groups(self.group_by(entity, &args).await?)),
            Operation::Create => Ok(QueryResult::Record(self.insert(entity, &args.patch).await?)),
            Operation::Update => Ok(QueryResult::Record(self.update_one(entity, &args).await?)),
            Operation::Upsert => {
                // Update-then-insert; acceptable for the low-contention
                // admin flows that use upsert.
                match self.update_one(entity, &args).await? {
                    Some(record) => Ok(QueryResult::Record(Some(record))),
                    None => Ok(QueryResult::Record(self.insert(entity, &args.patch).await?)),
                }
            }
            Operation::Delete => Ok(QueryResult::Record(
                self.delete_one(entity, &args.filter).await?,
            )),
            Operation::DeleteMany => Ok(QueryResult::Affected(
                self.delete_many(entity, &args.filter).await?,
            )),
            Operation::UpdateMany => Ok(QueryResult::Affected(self.update_many(entity, &args).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ident_accepts_snake_case() {
        assert!(validate_ident("tenant_id").is_ok());
        assert!(validate_ident("_private").is_ok());
        assert!(validate_ident("name2").is_ok());
    }

    #[test]
    fn test_validate_ident_rejects_injection() {
        assert!(validate_ident("name; DROP TABLE students").is_err());
        assert!(validate_ident("Name").is_err());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("a-b").is_err());
    }

    #[test]
    fn test_patch_columns_order_typed_first() {
        let patch = Patch::new()
            .tenant(core_kernel::TenantId::new())
            .field("name", "Ana");
        let columns = patch_columns(&patch).unwrap();
        assert_eq!(columns[0].0, "tenant_id");
        assert_eq!(columns[1].0, "name");
    }
}
