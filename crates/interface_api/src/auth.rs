//! Authentication and authorization

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{ActorId, RequestContext, Role, TenantId};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (actor ID)
    pub sub: String,
    /// Tenant (school) the actor belongs to
    pub tenant: String,
    /// Actor's role
    pub role: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    /// Builds the request context carried by these claims.
    ///
    /// Fields that fail to parse are dropped rather than failing the
    /// request: the token was already validated, and a context with a
    /// missing field simply scopes less (the fail-closed store rejects
    /// scoped operations if the tenant is absent).
    pub fn to_request_context(&self) -> RequestContext {
        RequestContext {
            tenant_id: self.tenant.parse::<TenantId>().ok(),
            actor_id: self.sub.parse::<ActorId>().ok(),
            role: self.role.parse::<Role>().ok(),
        }
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `actor_id` - Actor identifier
/// * `tenant_id` - Tenant the actor belongs to
/// * `role` - Actor's role
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    actor_id: ActorId,
    tenant_id: TenantId,
    role: Role,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: actor_id.to_string(),
        tenant: tenant_id.to_string(),
        role: role.as_str().to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        if e.to_string().contains("ExpiredSignature") {
            AuthError::TokenExpired
        } else {
            AuthError::InvalidToken
        }
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let actor = ActorId::new();
        let tenant = TenantId::new();
        let token = create_token(actor, tenant, Role::Admin, "secret", 3600).unwrap();

        let claims = validate_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, actor.to_string());
        assert_eq!(claims.tenant, tenant.to_string());
        assert_eq!(claims.role, "ADMIN");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token =
            create_token(ActorId::new(), TenantId::new(), Role::Teacher, "secret", 3600).unwrap();
        assert!(matches!(
            validate_token(&token, "other"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_claims_to_request_context() {
        let actor = ActorId::new();
        let tenant = TenantId::new();
        let token = create_token(actor, tenant, Role::Secretary, "secret", 3600).unwrap();
        let claims = validate_token(&token, "secret").unwrap();

        let ctx = claims.to_request_context();
        assert_eq!(ctx.tenant_id, Some(tenant));
        assert_eq!(ctx.actor_id, Some(actor));
        assert_eq!(ctx.role, Some(Role::Secretary));
    }

    #[test]
    fn test_unparseable_fields_are_dropped() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            tenant: "also-not".to_string(),
            role: "PRINCIPAL".to_string(),
            exp: 0,
            iat: 0,
        };
        let ctx = claims.to_request_context();
        assert!(ctx.tenant_id.is_none());
        assert!(ctx.actor_id.is_none());
        assert!(ctx.role.is_none());
    }
}
