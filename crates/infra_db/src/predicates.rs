//! Predicate helpers for call sites the interceptor cannot see
//!
//! Business code sometimes builds predicates the interceptor has no view
//! into - filtering a child entity through a parent's tenant column via a
//! join, or issuing a raw query. These helpers expose the exact merge
//! semantics the interceptor itself uses, from a single implementation, so
//! the two can never diverge.
//!
//! All helpers are pure and synchronous apart from reading the task-local
//! request context.

use core_kernel::{RequestContext, TenantId};

use crate::entity::Entity;
use crate::error::DatabaseError;
use crate::query::{DeletedVisibility, Filter, Patch};

/// Outcome of a tenant merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TenantMerge {
    /// The context tenant was injected
    Injected,
    /// The caller had already supplied the same tenant
    AlreadyPresent,
}

/// Merges `tenant` into the filter's tenant predicate.
///
/// The caller's explicit value is never silently replaced: an explicit
/// value equal to `tenant` is left untouched, a conflicting one is an
/// error for the caller to surface.
pub(crate) fn merge_tenant_into_filter(
    filter: &mut Filter,
    tenant: TenantId,
    entity: Entity,
) -> Result<TenantMerge, DatabaseError> {
    match filter.tenant_id {
        None => {
            filter.tenant_id = Some(tenant);
            Ok(TenantMerge::Injected)
        }
        Some(supplied) if supplied == tenant => Ok(TenantMerge::AlreadyPresent),
        Some(supplied) => Err(DatabaseError::TenantConflict {
            entity: entity.name(),
            supplied: supplied.to_string(),
            context: tenant.to_string(),
        }),
    }
}

/// Merges `tenant` into a write payload's tenant column.
///
/// Same conflict contract as [`merge_tenant_into_filter`].
pub(crate) fn merge_tenant_into_patch(
    patch: &mut Patch,
    tenant: TenantId,
    entity: Entity,
) -> Result<TenantMerge, DatabaseError> {
    match patch.tenant_id {
        None => {
            patch.tenant_id = Some(tenant);
            Ok(TenantMerge::Injected)
        }
        Some(supplied) if supplied == tenant => Ok(TenantMerge::AlreadyPresent),
        Some(supplied) => Err(DatabaseError::TenantConflict {
            entity: entity.name(),
            supplied: supplied.to_string(),
            context: tenant.to_string(),
        }),
    }
}

/// Defaults visibility to live rows unless the caller specified one.
pub(crate) fn merge_live_visibility(filter: &mut Filter) {
    if filter.deleted.is_none() {
        filter.deleted = Some(DeletedVisibility::OnlyLive);
    }
}

/// Merges the current request's tenant id into `filter`.
///
/// With no tenant in context the filter is returned unchanged - callers
/// using this outside a bound context get an unscoped predicate, the same
/// documented risk the interceptor's `AllowUnscoped` policy carries.
///
/// # Errors
///
/// Returns [`DatabaseError::TenantConflict`] when the filter already names
/// a different tenant than the context.
pub fn with_tenant(filter: Filter, entity: Entity) -> Result<Filter, DatabaseError> {
    match RequestContext::current_tenant() {
        Some(tenant) => {
            let mut filter = filter;
            merge_tenant_into_filter(&mut filter, tenant, entity)?;
            Ok(filter)
        }
        None => Ok(filter),
    }
}

/// Restricts `filter` to non-deleted rows unless the caller already chose
/// a visibility.
pub fn without_soft_deleted(filter: Filter) -> Filter {
    let mut filter = filter;
    merge_live_visibility(&mut filter);
    filter
}

/// Composes [`with_tenant`] and [`without_soft_deleted`].
pub fn with_tenancy(filter: Filter, entity: Entity) -> Result<Filter, DatabaseError> {
    Ok(without_soft_deleted(with_tenant(filter, entity)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_tenant_injects_context_tenant() {
        let tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(tenant);

        let filter = ctx
            .bind_sync(|| with_tenant(Filter::new(), Entity::Student))
            .unwrap();

        assert_eq!(filter.tenant_id, Some(tenant));
    }

    #[test]
    fn test_with_tenant_keeps_matching_explicit_value() {
        let tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(tenant);

        let filter = ctx
            .bind_sync(|| with_tenant(Filter::new().tenant(tenant), Entity::Student))
            .unwrap();

        assert_eq!(filter.tenant_id, Some(tenant));
    }

    #[test]
    fn test_with_tenant_rejects_conflicting_value() {
        let context_tenant = TenantId::new();
        let other_tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(context_tenant);

        let result =
            ctx.bind_sync(|| with_tenant(Filter::new().tenant(other_tenant), Entity::Student));

        assert!(matches!(
            result,
            Err(DatabaseError::TenantConflict { entity: "student", .. })
        ));
    }

    #[test]
    fn test_with_tenant_unbound_is_passthrough() {
        let filter = with_tenant(Filter::new(), Entity::Student).unwrap();
        assert_eq!(filter.tenant_id, None);
    }

    #[test]
    fn test_without_soft_deleted_defaults_to_live() {
        let filter = without_soft_deleted(Filter::new());
        assert_eq!(filter.deleted, Some(DeletedVisibility::OnlyLive));
    }

    #[test]
    fn test_without_soft_deleted_respects_explicit_choice() {
        let filter =
            without_soft_deleted(Filter::new().visibility(DeletedVisibility::OnlyDeleted));
        assert_eq!(filter.deleted, Some(DeletedVisibility::OnlyDeleted));
    }

    #[test]
    fn test_with_tenancy_composes_both() {
        let tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(tenant);

        let filter = ctx
            .bind_sync(|| with_tenancy(Filter::new(), Entity::Student))
            .unwrap();

        assert_eq!(filter.tenant_id, Some(tenant));
        assert_eq!(filter.deleted, Some(DeletedVisibility::OnlyLive));
    }
}
