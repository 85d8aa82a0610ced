//! Assertion helpers for tenant and soft-delete properties

use core_kernel::TenantId;
use infra_db::Record;

/// Asserts every record belongs to `tenant`.
pub fn assert_all_tenant(records: &[Record], tenant: TenantId) {
    let expected = tenant.as_uuid().to_string();
    for record in records {
        assert_eq!(
            record.tenant_id(),
            Some(expected.as_str()),
            "record {:?} leaked across tenants",
            record.id()
        );
    }
}

/// Asserts no record is soft-deleted.
pub fn assert_none_deleted(records: &[Record]) {
    for record in records {
        assert!(
            !record.is_deleted(),
            "record {:?} is soft-deleted but was returned by a default read",
            record.id()
        );
    }
}
