use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";

/// Authenticated back-office user, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct StaffUser {
    pub id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    role: Option<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Resolve the calling staff user. Order:
/// 1. dev `x-user-id` override (never active in production),
/// 2. `Authorization: Bearer <jwt>` verified with the configured HS256 secret.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<StaffUser, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(StaffUser {
                id: user_id,
                role: header_value(headers, "x-user-role").unwrap_or_else(|| ROLE_ADMIN.to_string()),
            });
        }
    }

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token.".to_string()))?;
    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::Dependency("JWT_SECRET is not configured.".to_string()))?;

    let decoded = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "JWT verification failed");
        AppError::Unauthorized("Invalid or expired token.".to_string())
    })?;

    let user_id = decoded.claims.sub.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::Unauthorized("Token is missing a subject.".to_string()));
    }

    Ok(StaffUser {
        id: user_id,
        role: decoded
            .claims
            .role
            .map(|role| role.trim().to_ascii_lowercase())
            .filter(|role| !role.is_empty())
            .unwrap_or_else(|| ROLE_STAFF.to_string()),
    })
}

pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    Ok(require_user(state, headers).await?.id)
}

/// Assert the caller holds one of the allowed roles and return the user.
pub async fn require_role(
    state: &AppState,
    headers: &HeaderMap,
    allowed_roles: &[&str],
) -> Result<StaffUser, AppError> {
    let user = require_user(state, headers).await?;
    if allowed_roles.contains(&user.role.as_str()) {
        return Ok(user);
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        user.role
    )))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization")?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::bearer_token;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn rejects_missing_or_empty_tokens() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());
    }
}
