//! Pre-built test data

use core_kernel::{ActorId, RequestContext, Role, TenantId};
use infra_db::{Entity, MemoryStorageEngine, Patch, Record};
use serde_json::json;
use uuid::Uuid;

/// A bound-context fixture for one tenant with an admin actor.
pub fn admin_context(tenant: TenantId) -> RequestContext {
    RequestContext::new(tenant, ActorId::new(), Role::Admin)
}

/// A student row owned by `tenant`, live (not deleted).
pub fn student_row(tenant: TenantId, name: &str) -> Record {
    Record::from_value(json!({
        "id": Uuid::now_v7().to_string(),
        "tenant_id": tenant.as_uuid().to_string(),
        "name": name,
        "deleted_at": null,
    }))
    .expect("student fixture is an object")
}

/// A student row owned by `tenant`, already soft-deleted.
pub fn deleted_student_row(tenant: TenantId, name: &str) -> Record {
    Record::from_value(json!({
        "id": Uuid::now_v7().to_string(),
        "tenant_id": tenant.as_uuid().to_string(),
        "name": name,
        "deleted_at": "2026-01-01T00:00:00Z",
    }))
    .expect("student fixture is an object")
}

/// A create patch for a student without any tenant field.
pub fn student_patch(name: &str) -> Patch {
    Patch::new().field("name", name)
}

/// An engine seeded with `count` live students per given tenant.
pub async fn seeded_engine(tenants: &[TenantId], count: usize) -> MemoryStorageEngine {
    let engine = MemoryStorageEngine::new();
    for tenant in tenants {
        let rows = (0..count)
            .map(|i| student_row(*tenant, &format!("student-{i}")))
            .collect();
        engine.seed(Entity::Student, rows).await;
    }
    engine
}
