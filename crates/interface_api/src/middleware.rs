//! API middleware
//!
//! Three layers run in front of every protected handler, in order:
//! authentication (token validation), context binding (populating the
//! task-local request context from the validated claims), and request
//! logging. The context binder is the load-bearing one: without it the
//! scoping store sees no tenant and fails closed.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::RequestId;

use crate::auth::Claims;
use crate::AppState;

/// Authentication middleware
///
/// Validates JWT tokens and stores the claims in request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    // Extract token from Authorization header
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            warn!("Missing or invalid Authorization header");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // Validate token
    match crate::auth::validate_token(token, &state.config.jwt_secret) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!("Token validation failed: {:?}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Context-binding middleware
///
/// Takes the claims the auth layer validated and binds the request context
/// to the rest of the request's task tree. Everything downstream of this
/// layer - handlers, the scoping store, audit capture - reads the tenant
/// and actor from the bound context rather than from function arguments.
///
/// Requests that reach this layer without claims (public routes composed
/// behind it by mistake) run unbound; scoped data access then fails closed
/// at the store.
pub async fn context_middleware(request: Request<Body>, next: Next) -> Response {
    let claims = request.extensions().get::<Claims>().cloned();
    match claims {
        Some(claims) => {
            let ctx = claims.to_request_context();
            ctx.bind(next.run(request)).await
        }
        None => next.run(request).await,
    }
}

/// Request logging middleware
///
/// Logs all API requests for operations and debugging
pub async fn request_log_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId::new_v7();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let actor = request
        .extensions()
        .get::<Claims>()
        .map(|c| c.sub.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        actor = %actor,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
