//! Entity registry
//!
//! The set of persistable entities is a closed enumeration. Whether an
//! entity carries a tenant column or supports soft deletion is a static
//! property of its [`EntityDescriptor`], checked with an exhaustive match
//! rather than a runtime name lookup. Adding an entity forces a decision
//! about its scoping at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// All entities known to the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// A school - this IS the tenant, keyed by its own id
    School,
    /// Login account
    User,
    Student,
    Staff,
    /// A class of students
    ClassGroup,
    Subject,
    /// Financial transaction (tuition charges, payments)
    Transaction,
    ExtraActivity,
    Enrollment,
    /// The append-only audit trail. Never audited itself.
    AuditLog,
}

/// Static scoping properties of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Database table backing the entity
    pub table: &'static str,
    /// Whether rows carry a `tenant_id` column that must be scoped
    pub tenant_scoped: bool,
    /// Whether deletion is a timestamped `deleted_at` update
    pub soft_delete: bool,
}

impl Entity {
    pub const ALL: [Entity; 10] = [
        Entity::School,
        Entity::User,
        Entity::Student,
        Entity::Staff,
        Entity::ClassGroup,
        Entity::Subject,
        Entity::Transaction,
        Entity::ExtraActivity,
        Entity::Enrollment,
        Entity::AuditLog,
    ];

    /// Returns the static descriptor for this entity.
    ///
    /// The match is exhaustive: every entity must declare its scoping.
    pub fn descriptor(self) -> EntityDescriptor {
        match self {
            // The school row is the tenant itself; scoping it by tenant_id
            // would be circular. Access control lives with callers.
            Entity::School => EntityDescriptor {
                table: "schools",
                tenant_scoped: false,
                soft_delete: false,
            },
            Entity::User => EntityDescriptor {
                table: "users",
                tenant_scoped: true,
                soft_delete: false,
            },
            Entity::Student => EntityDescriptor {
                table: "students",
                tenant_scoped: true,
                soft_delete: true,
            },
            Entity::Staff => EntityDescriptor {
                table: "staff",
                tenant_scoped: true,
                soft_delete: true,
            },
            Entity::ClassGroup => EntityDescriptor {
                table: "class_groups",
                tenant_scoped: true,
                soft_delete: false,
            },
            Entity::Subject => EntityDescriptor {
                table: "subjects",
                tenant_scoped: true,
                soft_delete: false,
            },
            Entity::Transaction => EntityDescriptor {
                table: "transactions",
                tenant_scoped: true,
                soft_delete: true,
            },
            Entity::ExtraActivity => EntityDescriptor {
                table: "extra_activities",
                tenant_scoped: true,
                soft_delete: false,
            },
            Entity::Enrollment => EntityDescriptor {
                table: "enrollments",
                tenant_scoped: true,
                soft_delete: false,
            },
            // Tenant-scoped so trail reads are isolated like everything
            // else; excluded from audit dispatch structurally (see scoped.rs).
            Entity::AuditLog => EntityDescriptor {
                table: "audit_log",
                tenant_scoped: true,
                soft_delete: false,
            },
        }
    }

    /// Stable lowercase name used in audit entries and logs
    pub fn name(self) -> &'static str {
        match self {
            Entity::School => "school",
            Entity::User => "user",
            Entity::Student => "student",
            Entity::Staff => "staff",
            Entity::ClassGroup => "class_group",
            Entity::Subject => "subject",
            Entity::Transaction => "transaction",
            Entity::ExtraActivity => "extra_activity",
            Entity::Enrollment => "enrollment",
            Entity::AuditLog => "audit_log",
        }
    }

    /// Database table backing the entity
    pub fn table(self) -> &'static str {
        self.descriptor().table
    }

    /// Whether rows of this entity must be tenant-filtered
    pub fn is_tenant_scoped(self) -> bool {
        self.descriptor().tenant_scoped
    }

    /// Whether deletes of this entity are rewritten to timestamped updates
    pub fn is_soft_delete(self) -> bool {
        self.descriptor().soft_delete
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_school_is_not_tenant_scoped() {
        assert!(!Entity::School.is_tenant_scoped());
        assert!(!Entity::School.is_soft_delete());
    }

    #[test]
    fn test_soft_delete_set_matches_schema() {
        let soft: Vec<Entity> = Entity::ALL
            .into_iter()
            .filter(|e| e.is_soft_delete())
            .collect();
        assert_eq!(
            soft,
            vec![Entity::Student, Entity::Staff, Entity::Transaction]
        );
    }

    #[test]
    fn test_every_soft_delete_entity_is_tenant_scoped() {
        for entity in Entity::ALL {
            if entity.is_soft_delete() {
                assert!(entity.is_tenant_scoped(), "{entity} must be scoped");
            }
        }
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut tables: Vec<&str> = Entity::ALL.iter().map(|e| e.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), Entity::ALL.len());
    }
}
