//! Loop CRUD, archive, images and exports.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::response::Response;
use axum::Json;
use loopdesk::{DashboardStats, ImageUpload, Loop, LoopPatch, LoopQuery, LoopQueryParams, NewLoop};

use crate::auth::{AuthUser, ClientContext};
use crate::error::{AppError, AppResult};
use crate::handlers::{blocking, file_response, Disposition};
use crate::response::ApiResponse;
use crate::state::AppState;

fn parse_query(params: Result<Query<LoopQueryParams>, QueryRejection>) -> AppResult<LoopQuery> {
    let Query(params) = params?;
    Ok(LoopQuery::from_params(&params))
}

/// GET /api/loops
pub async fn list_loops(
    State(state): State<AppState>,
    user: AuthUser,
    params: Result<Query<LoopQueryParams>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<Loop>>>> {
    let query = parse_query(params)?;
    let app = state.app.clone();
    let loops = blocking(move || app.loops().list(&user.actor, &query)).await?;
    Ok(Json(ApiResponse::ok(loops)))
}

/// POST /api/loops
pub async fn create_loop(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    payload: Result<Json<NewLoop>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let Json(input) = payload?;
    let app = state.app.clone();
    let created = blocking(move || app.loops().create(&user.actor, &ctx, &input)).await?;
    Ok(Json(ApiResponse::ok(created)))
}

/// GET /api/loops/stats
pub async fn loop_stats(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let app = state.app.clone();
    let stats = blocking(move || app.loops().dashboard_stats()).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /api/loops/closing
pub async fn closing_soon(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Loop>>>> {
    let app = state.app.clone();
    let loops = blocking(move || app.loops().closing_soon(&user.actor)).await?;
    Ok(Json(ApiResponse::ok(loops)))
}

/// GET /api/loops/:id
pub async fn get_loop(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let app = state.app.clone();
    let record = blocking(move || app.loops().get(&user.actor, id)).await?;
    Ok(Json(ApiResponse::ok(record)))
}

/// PUT /api/loops/:id
pub async fn update_loop(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<LoopPatch>, JsonRejection>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let Json(patch) = payload?;
    let app = state.app.clone();
    let updated = blocking(move || app.loops().update(&user.actor, &ctx, id, &patch)).await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// DELETE /api/loops/:id
pub async fn delete_loop(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let app = state.app.clone();
    blocking(move || app.loops().delete(&user.actor, &ctx, id)).await?;
    Ok(Json(ApiResponse::done()))
}

/// PUT /api/loops/:id/archive
pub async fn archive_loop(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let app = state.app.clone();
    let record = blocking(move || app.loops().archive(&user.actor, &ctx, id)).await?;
    Ok(Json(ApiResponse::ok(record)))
}

/// PUT /api/loops/:id/unarchive
pub async fn unarchive_loop(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let app = state.app.clone();
    let record = blocking(move || app.loops().unarchive(&user.actor, &ctx, id)).await?;
    Ok(Json(ApiResponse::ok(record)))
}

/// GET /api/loops/export/csv
pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    params: Result<Query<LoopQueryParams>, QueryRejection>,
) -> AppResult<Response> {
    let query = parse_query(params)?;
    let app = state.app.clone();
    let csv = blocking(move || app.loops().export_csv(&user.actor, &ctx, &query)).await?;
    let file_name = format!("loops-export-{}.csv", chrono::Utc::now().format("%Y-%m-%d"));
    Ok(file_response(
        "text/csv; charset=utf-8",
        Disposition::Attachment,
        &file_name,
        csv.into_bytes(),
    ))
}

/// GET /api/loops/export/stats
pub async fn export_stats_csv(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
) -> AppResult<Response> {
    let app = state.app.clone();
    let csv = blocking(move || app.loops().export_stats_csv(&user.actor, &ctx)).await?;
    let file_name = format!("loops-stats-{}.csv", chrono::Utc::now().format("%Y-%m-%d"));
    Ok(file_response(
        "text/csv; charset=utf-8",
        Disposition::Attachment,
        &file_name,
        csv.into_bytes(),
    ))
}

/// GET /api/loops/:id/export/pdf
pub async fn export_pdf(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let app = state.app.clone();
    let pdf = blocking(move || app.loops().export_pdf(&user.actor, &ctx, id)).await?;
    Ok(file_response(
        "application/pdf",
        Disposition::Attachment,
        &format!("loop-{id}-report.pdf"),
        pdf,
    ))
}

/// POST /api/loops/:id/images
///
/// Multipart: one or more `images` files, optional `replaceImages=true`.
pub async fn upload_images(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let mut uploads = Vec::new();
    let mut replace = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("images") => {
                let original_name = field.file_name().unwrap_or("image").to_string();
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?.to_vec();
                uploads.push(ImageUpload {
                    original_name,
                    mimetype,
                    bytes,
                });
            }
            Some("replaceImages") => replace = field.text().await? == "true",
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(AppError::BadRequest("No images uploaded".into()));
    }

    let app = state.app.clone();
    let updated = blocking(move || {
        app.loops()
            .add_images(&user.actor, &ctx, id, &uploads, replace)
    })
    .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// GET /api/loops/:id/images/:filename
pub async fn get_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, filename)): Path<(i64, String)>,
) -> AppResult<Response> {
    let app = state.app.clone();
    let image = blocking(move || app.loops().image_bytes(&user.actor, id, &filename)).await?;
    Ok(file_response(
        &image.record.mimetype,
        Disposition::Inline,
        &image.record.original_name,
        image.bytes,
    ))
}

/// DELETE /api/loops/:id/images/:filename
pub async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    ClientContext(ctx): ClientContext,
    Path((id, filename)): Path<(i64, String)>,
) -> AppResult<Json<ApiResponse<Loop>>> {
    let app = state.app.clone();
    let updated =
        blocking(move || app.loops().remove_image(&user.actor, &ctx, id, &filename)).await?;
    Ok(Json(ApiResponse::ok(updated)))
}
