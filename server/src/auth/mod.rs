//! Request extractors for the acting user and client context.

pub mod jwt;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use loopdesk::{Actor, LoopdeskError, RequestContext, Role};

use crate::error::AppError;
use crate::state::AppState;

use self::jwt::validate_token;

/// The authenticated caller, taken from a `Bearer` token.
///
/// Each successful extraction refreshes the caller's directory entry so
/// their name and email are current for notifications.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub actor: Actor,
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = validate_token(token, &state.jwt)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        let user = AuthUser {
            actor: Actor::new(claims.sub, claims.name, Role::parse(&claims.role)),
            email: claims.email,
        };

        let app = state.app.clone();
        let (actor, email) = (user.actor.clone(), user.email.clone());
        crate::handlers::blocking(move || app.identify(&actor, email.as_deref())).await?;

        Ok(user)
    }
}

/// Requires the `admin` role. Rejects with 403 otherwise.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.actor.is_admin() {
            return Err(LoopdeskError::PermissionDenied("Admin role required".into()).into());
        }
        Ok(RequireAdmin(user))
    }
}

/// Client address and user agent for audit entries.
pub struct ClientContext(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip"));
        let user_agent = header(USER_AGENT.as_str());
        Ok(ClientContext(RequestContext::new(ip_address, user_agent)))
    }
}
