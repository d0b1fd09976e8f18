//! # Authentication Middleware
//!
//! Bearer token middleware that resolves the caller into an [`Actor`].
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}
//! ```
//!
//! `role` is `sender`, `receiver` or `admin`; `user_id` is a UUID. The
//! secret is compared in constant time against `AUTH_TOKEN`. When no token
//! is configured the service runs in development mode: `{role}:{user_id}`
//! is accepted and any secret segment is ignored.
//!
//! Token issuance belongs to the identity service. Handlers only ever see
//! the resolved [`CallerIdentity`].

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parcel_core::{Actor, Role, UserId};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// The authenticated caller, injected into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub actor: Actor,
}

impl CallerIdentity {
    pub fn role(&self) -> Role {
        self.actor.role
    }

    pub fn user_id(&self) -> UserId {
        self.actor.id
    }
}

/// Returns 401 if the middleware did not run or did not inject an identity.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller holds exactly the given role.
pub fn require_role(caller: &CallerIdentity, role: Role) -> Result<(), AppError> {
    if caller.role() == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            role.as_str(),
            caller.role().as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of secrets.
///
/// On a length mismatch a dummy comparison still runs so timing does not
/// depend on where the inputs differ.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token into a caller identity.
///
/// With `expected_secret = None` (development mode) the secret segment is
/// optional and never checked.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    let (role_str, user_str) = match (parts.as_slice(), expected_secret) {
        ([role, user, secret], Some(expected)) => {
            if !constant_time_token_eq(secret, expected) {
                return Err("invalid bearer token".into());
            }
            (*role, *user)
        }
        ([role, user, _], None) | ([role, user], None) => (*role, *user),
        _ => return Err("invalid token format, expected {role}:{user_id}:{secret}".into()),
    };

    let role: Role = role_str.parse().map_err(|e| format!("{e}"))?;
    let user_id = user_str
        .parse::<Uuid>()
        .map(UserId::from_uuid)
        .map_err(|e| format!("invalid user_id: {e}"))?;

    Ok(CallerIdentity {
        actor: Actor::new(user_id, role),
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the `Authorization` header and inject [`CallerIdentity`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let identity = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => parse_bearer_token(provided, expected.as_deref()),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
