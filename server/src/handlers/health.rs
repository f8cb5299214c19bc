use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::handlers::blocking;
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Health>>> {
    let app = state.app.clone();
    blocking(move || Ok(app.database().ping()?)).await?;
    Ok(Json(ApiResponse::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })))
}
