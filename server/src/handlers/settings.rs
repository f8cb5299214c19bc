use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use loopdesk::{LoopdeskError, NotificationSettings};
use serde_json::Value;

use crate::auth::{AuthUser, ClientContext};
use crate::error::{AppError, AppResult};
use crate::handlers::blocking;
use crate::response::ApiResponse;
use crate::state::AppState;

const INVALID_PREFERENCES: &str = "Invalid notification preferences. Must be boolean values.";

/// Both flags must be present and boolean; strings like `"true"` are rejected.
fn parse_preferences(body: &Value) -> Option<NotificationSettings> {
    Some(NotificationSettings {
        notify_on_new_loops: body.get("notify_on_new_loops")?.as_bool()?,
        notify_on_updated_loops: body.get("notify_on_updated_loops")?.as_bool()?,
    })
}

/// GET /api/settings
pub async fn get_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    let app = state.app.clone();
    let settings = blocking(move || app.settings().get(&user.actor)).await?;
    Ok(Json(ApiResponse::ok(settings)))
}

/// PUT /api/settings/notifications
pub async fn update_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    if !user.actor.is_admin() {
        return Err(LoopdeskError::PermissionDenied(
            "Only admins can configure email notifications".into(),
        )
        .into());
    }
    let Json(body) = payload?;
    let settings =
        parse_preferences(&body).ok_or_else(|| AppError::BadRequest(INVALID_PREFERENCES.into()))?;
    let app = state.app.clone();
    let saved = blocking(move || {
        app.settings()
            .update_notifications(&user.actor, &ctx, settings)
    })
    .await?;
    Ok(Json(ApiResponse::ok(saved)))
}
