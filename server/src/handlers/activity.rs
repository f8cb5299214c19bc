use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use loopdesk::{ActivityEntry, ActivityQuery, ActivityStats};
use serde::Serialize;

use crate::auth::RequireAdmin;
use crate::error::AppResult;
use crate::handlers::blocking;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub cleared: usize,
}

/// GET /api/activity
pub async fn list_activity(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<ActivityEntry>>>> {
    let Query(query) = query?;
    let app = state.app.clone();
    let entries = blocking(move || app.activity().query(&user.actor, &query)).await?;
    Ok(Json(ApiResponse::ok(entries)))
}

/// GET /api/activity/stats
pub async fn activity_stats(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
) -> AppResult<Json<ApiResponse<ActivityStats>>> {
    let app = state.app.clone();
    let stats = blocking(move || app.activity().stats(&user.actor)).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// DELETE /api/activity
pub async fn clear_activity(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
) -> AppResult<Json<ApiResponse<Cleared>>> {
    let app = state.app.clone();
    let cleared = blocking(move || app.activity().clear_all(&user.actor)).await?;
    Ok(Json(ApiResponse::ok(Cleared { cleared })))
}
