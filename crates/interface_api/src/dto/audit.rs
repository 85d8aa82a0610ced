//! Audit trail DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use infra_db::{GroupCount, Record};

/// Query parameters for the audit trail listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogQuery {
    /// 1-based page number
    pub page: Option<u64>,
    /// Page size (capped)
    pub limit: Option<u64>,
    /// Filter by entity name (e.g. "student")
    pub entity: Option<String>,
    /// Filter by action (e.g. "CREATE")
    pub action: Option<String>,
    /// Filter by acting user
    pub actor_id: Option<String>,
    /// Entries recorded at or after this instant (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Entries recorded at or before this instant (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

/// Pagination metadata
#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// A page of audit entries
#[derive(Debug, Serialize)]
pub struct AuditLogPage {
    pub data: Vec<Record>,
    pub meta: PageMeta,
}

/// Aggregated audit trail statistics
#[derive(Debug, Serialize)]
pub struct AuditStats {
    pub total: u64,
    pub by_entity: Vec<GroupCount>,
    pub by_action: Vec<GroupCount>,
}
