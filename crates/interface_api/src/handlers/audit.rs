//! Audit trail handlers
//!
//! Reads go through the scoping store like any other data access, so a
//! school only ever sees its own trail. The trail itself is append-only:
//! there are no mutating endpoints here.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use infra_db::{Entity, Filter, Operation, QueryArgs, SortOrder, StorageEngine};

use crate::dto::audit::{AuditLogPage, AuditLogQuery, AuditStats, PageMeta};
use crate::error::ApiError;
use crate::AppState;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

fn listing_filter(query: &AuditLogQuery) -> Filter {
    let mut filter = Filter::new();
    if let Some(entity) = &query.entity {
        filter = filter.field("entity", entity.as_str());
    }
    if let Some(action) = &query.action {
        filter = filter.field("action", action.to_uppercase());
    }
    if let Some(actor_id) = &query.actor_id {
        filter = filter.field("actor_id", actor_id.as_str());
    }
    if let Some(from) = query.from {
        filter = filter.created_since(from);
    }
    if let Some(to) = query.to {
        filter = filter.created_until(to);
    }
    filter
}

/// Lists audit entries for the current tenant, newest first
pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogPage>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    // page is caller-controlled; the offset must not wrap
    let skip = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| ApiError::BadRequest(format!("page {page} is out of range")))?;
    let filter = listing_filter(&query);

    let total = state
        .store
        .execute(
            Entity::AuditLog,
            Operation::Count,
            QueryArgs::with_filter(filter.clone()),
        )
        .await?
        .count()
        .unwrap_or(0);

    let data = state
        .store
        .execute(
            Entity::AuditLog,
            Operation::FindMany,
            QueryArgs::with_filter(filter)
                .order("created_at", SortOrder::Desc)
                .paged(skip, limit),
        )
        .await?
        .into_records();

    Ok(Json(AuditLogPage {
        data,
        meta: PageMeta {
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        },
    }))
}

/// Fetches a single audit entry by id, within the current tenant
pub async fn get_audit_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<infra_db::Record>, ApiError> {
    // FindFirst rather than FindUnique: the scoped-read path adds the
    // tenant predicate, so an entry from another school reads as absent
    let record = state
        .store
        .execute(
            Entity::AuditLog,
            Operation::FindFirst,
            QueryArgs::with_filter(Filter::by_id(id)),
        )
        .await?
        .into_record()
        .ok_or_else(|| ApiError::NotFound(format!("Audit entry '{id}' not found")))?;

    Ok(Json(record))
}

/// Aggregated counts over the current tenant's trail
pub async fn audit_stats(State(state): State<AppState>) -> Result<Json<AuditStats>, ApiError> {
    let total = state
        .store
        .execute(Entity::AuditLog, Operation::Count, QueryArgs::new())
        .await?
        .count()
        .unwrap_or(0);

    let by_entity = match state
        .store
        .execute(
            Entity::AuditLog,
            Operation::GroupBy,
            QueryArgs::new().group("entity"),
        )
        .await?
    {
        infra_db::QueryResult::Groups(groups) => groups,
        _ => Vec::new(),
    };

    let by_action = match state
        .store
        .execute(
            Entity::AuditLog,
            Operation::GroupBy,
            QueryArgs::new().group("action"),
        )
        .await?
    {
        infra_db::QueryResult::Groups(groups) => groups,
        _ => Vec::new(),
    };

    Ok(Json(AuditStats {
        total,
        by_entity,
        by_action,
    }))
}
