//! Core Kernel - Foundational types for the school management system
//!
//! This crate provides the fundamental building blocks used across all other crates:
//! - Strongly-typed identifiers (tenant, actor, audit event)
//! - The request-scoped context store used for tenant propagation
//! - Common error types

pub mod context;
pub mod error;
pub mod identifiers;

pub use context::{RequestContext, Role};
pub use error::CoreError;
pub use identifiers::{ActorId, AuditEventId, RequestId, TenantId};
