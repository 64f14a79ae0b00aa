//! Caller identity from headers set by the upstream identity provider.

use crate::domain::UserId;
use crate::error::AppError;
use crate::orchestration::Caller;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_HEADER: &str = "x-admin";

/// Extracts the authenticated [`Caller`]. Requests without a user id are rejected.
pub struct Identity(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;

        let is_admin = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| matches!(v.trim(), "1" | "true"))
            .unwrap_or(false);

        Ok(Identity(Caller {
            user_id: UserId::new(user_id),
            is_admin,
        }))
    }
}

impl Identity {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.0.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin only".to_string()))
        }
    }
}
