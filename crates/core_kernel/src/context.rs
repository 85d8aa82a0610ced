//! Request-scoped context propagation
//!
//! Every authenticated request carries a tenant id, an actor id, and a role.
//! Rather than threading those through every function signature, they are
//! bound to the request's task tree with a tokio task-local: any code
//! executing inside the bound future - including code reached through
//! asynchronous suspension - can read them back with
//! [`RequestContext::current`].
//!
//! Binding is scoped to the dynamic extent of the bound future. Two
//! concurrently executing request trees never observe each other's context,
//! even when interleaved on the same worker threads. Work detached with
//! `tokio::spawn` does NOT inherit the binding; callers crossing into
//! detached background work must either re-bind explicitly or snapshot the
//! values they need before spawning (the audit path does the latter).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::identifiers::{ActorId, TenantId};

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Role of the authenticated actor, as carried in the auth token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Full administrative access within the tenant
    Admin,
    /// School office staff
    Secretary,
    /// Teaching staff
    Teacher,
    /// Parent/guardian portal access
    Guardian,
}

impl Role {
    /// Returns the canonical token representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Secretary => "SECRETARY",
            Role::Teacher => "TEACHER",
            Role::Guardian => "GUARDIAN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "SECRETARY" => Ok(Role::Secretary),
            "TEACHER" => Ok(Role::Teacher),
            "GUARDIAN" => Ok(Role::Guardian),
            other => Err(crate::error::CoreError::validation(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

/// Identity of the request currently being handled.
///
/// Created once per inbound request after authentication and immutable for
/// that request's lifetime. All fields are optional: a context bound for an
/// unauthenticated or system-internal caller may carry none of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Tenant (school) the request operates on
    pub tenant_id: Option<TenantId>,
    /// Authenticated actor performing the request
    pub actor_id: Option<ActorId>,
    /// Role of the actor
    pub role: Option<Role>,
}

impl RequestContext {
    /// Creates a fully populated context
    pub fn new(tenant_id: TenantId, actor_id: ActorId, role: Role) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            actor_id: Some(actor_id),
            role: Some(role),
        }
    }

    /// Creates a context carrying only a tenant id
    ///
    /// Useful for background jobs that act on behalf of a tenant without
    /// an individual actor.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Default::default()
        }
    }

    /// Executes `future` with this context bound to its entire task tree.
    ///
    /// Any call to [`RequestContext::current`] made inside the future -
    /// directly or after any number of awaits - observes this context.
    /// Nested binds shadow the outer context only within their own future.
    pub async fn bind<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        REQUEST_CONTEXT.scope(self, future).await
    }

    /// Synchronous variant of [`RequestContext::bind`] for non-async call trees
    pub fn bind_sync<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        REQUEST_CONTEXT.sync_scope(self, f)
    }

    /// Returns the nearest enclosing bound context, or `None` when called
    /// outside any bind (e.g. from a background job that never re-entered
    /// the binder).
    pub fn current() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }

    /// Tenant id of the current request, if any
    pub fn current_tenant() -> Option<TenantId> {
        REQUEST_CONTEXT.try_with(|ctx| ctx.tenant_id).ok().flatten()
    }

    /// Actor id of the current request, if any
    pub fn current_actor() -> Option<ActorId> {
        REQUEST_CONTEXT.try_with(|ctx| ctx.actor_id).ok().flatten()
    }

    /// Role of the current request's actor, if any
    pub fn current_role() -> Option<Role> {
        REQUEST_CONTEXT.try_with(|ctx| ctx.role).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_outside_bind_is_none() {
        assert!(RequestContext::current().is_none());
        assert!(RequestContext::current_tenant().is_none());
    }

    #[test]
    fn test_sync_bind() {
        let tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(tenant);

        let observed = ctx.bind_sync(|| RequestContext::current_tenant());
        assert_eq!(observed, Some(tenant));
        assert!(RequestContext::current().is_none());
    }

    #[tokio::test]
    async fn test_bind_survives_await() {
        let tenant = TenantId::new();
        let ctx = RequestContext::for_tenant(tenant);

        let observed = ctx
            .bind(async {
                tokio::task::yield_now().await;
                RequestContext::current_tenant()
            })
            .await;

        assert_eq!(observed, Some(tenant));
    }

    #[tokio::test]
    async fn test_nested_bind_shadows_and_restores() {
        let outer = TenantId::new();
        let inner = TenantId::new();

        RequestContext::for_tenant(outer)
            .bind(async {
                assert_eq!(RequestContext::current_tenant(), Some(outer));

                let seen_inner = RequestContext::for_tenant(inner)
                    .bind(async { RequestContext::current_tenant() })
                    .await;
                assert_eq!(seen_inner, Some(inner));

                // Outer binding restored after the inner scope ends
                assert_eq!(RequestContext::current_tenant(), Some(outer));
            })
            .await;
    }

    #[tokio::test]
    async fn test_spawn_does_not_inherit_binding() {
        let tenant = TenantId::new();

        let observed = RequestContext::for_tenant(tenant)
            .bind(async {
                tokio::spawn(async { RequestContext::current_tenant() })
                    .await
                    .unwrap()
            })
            .await;

        assert_eq!(observed, None);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Admin, Role::Secretary, Role::Teacher, Role::Guardian] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("PRINCIPAL".parse::<Role>().is_err());
    }
}
