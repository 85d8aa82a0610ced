//! HTTP API Layer
//!
//! This crate provides the REST surface of the school management core
//! using Axum.
//!
//! # Architecture
//!
//! - **Auth**: JWT validation carrying the tenant, actor, and role
//! - **Middleware**: Authentication, request-context binding, request logging
//! - **Handlers**: Health probes and the tenant-scoped audit trail
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! All data access goes through the shared [`infra_db::StorageEngine`]
//! handle in [`AppState`], which in production is the scoping store: the
//! context binder middleware makes the authenticated tenant visible to it
//! for the remainder of each request.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(pool, store, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use infra_db::StorageEngine;

use crate::config::ApiConfig;
use crate::handlers::{audit, health};
use crate::middleware::{auth_middleware, context_middleware, request_log_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<dyn StorageEngine>,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `pool` - Database connection pool (readiness probe only)
/// * `store` - Scoped storage handle all handlers read and write through
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(pool: PgPool, store: Arc<dyn StorageEngine>, config: ApiConfig) -> Router {
    let state = AppState {
        pool,
        store,
        config,
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Audit trail routes (read-only)
    let audit_routes = Router::new()
        .route("/", get(audit::list_audit_logs))
        .route("/stats", get(audit::audit_stats))
        .route("/:id", get(audit::get_audit_log));

    // Protected API routes: auth validates the token, the binder scopes
    // the request, logging observes the bound actor. Layers run bottom-up.
    let api_routes = Router::new()
        .nest("/audit", audit_routes)
        .layer(axum_middleware::from_fn(request_log_middleware))
        .layer(axum_middleware::from_fn(context_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
