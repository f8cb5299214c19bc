//! Template store, field mapping and document generation. Admin only.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::Response;
use axum::Json;
use loopdesk::{
    DocumentTemplate, FieldMappingInput, GeneratedDocument, GenerationResult, TemplateInfo,
    TemplateUpload,
};
use loopdesk::templates::TemplateStats;
use serde::Deserialize;

use crate::auth::{ClientContext, RequireAdmin};
use crate::error::{AppError, AppResult};
use crate::handlers::{blocking, file_response, Disposition};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

/// Body of `PUT /templates/:id/fields`.
#[derive(Debug, Deserialize)]
pub struct FieldsBody {
    #[serde(default)]
    pub fields: Option<Vec<FieldMappingInput>>,
}

/// Body of `POST /templates/:id/generate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    #[serde(default)]
    pub loop_id: Option<i64>,
}

#[derive(Debug, serde::Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// GET /api/templates
pub async fn list_templates(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(filter): Query<CategoryFilter>,
) -> AppResult<Json<ApiResponse<Vec<DocumentTemplate>>>> {
    let app = state.app.clone();
    let templates = blocking(move || match filter.category.as_deref() {
        Some(category) if !category.is_empty() => app.templates().list_by_category(category),
        _ => app.templates().list(),
    })
    .await?;
    Ok(Json(ApiResponse::ok(templates)))
}

/// GET /api/templates/stats
pub async fn template_stats(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> AppResult<Json<ApiResponse<TemplateStats>>> {
    let app = state.app.clone();
    let stats = blocking(move || app.templates().stats()).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /api/templates/upload
///
/// Multipart: `templateFile`, `name`, `description`, `category`.
pub async fn upload_template(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<DocumentTemplate>>> {
    let mut name = String::new();
    let mut description = None;
    let mut category = String::new();
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("templateFile") => {
                let file_name = field.file_name().unwrap_or("template").to_string();
                let mimetype = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?.to_vec();
                file = Some((file_name, mimetype, bytes));
            }
            Some("name") => name = field.text().await?,
            Some("description") => description = Some(field.text().await?),
            Some("category") => category = field.text().await?,
            _ => {}
        }
    }

    let (file_name, mimetype, bytes) =
        file.ok_or_else(|| AppError::BadRequest("No file uploaded".into()))?;
    let upload = TemplateUpload {
        name,
        description,
        category,
        file_name,
        mimetype,
        bytes,
    };

    let app = state.app.clone();
    let template = blocking(move || app.templates().upload(&user.actor, &ctx, &upload)).await?;
    Ok(Json(ApiResponse::ok(template)))
}

/// PUT /api/templates/:id
pub async fn update_template(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<TemplateInfo>, JsonRejection>,
) -> AppResult<Json<ApiResponse<DocumentTemplate>>> {
    let Json(info) = payload?;
    let app = state.app.clone();
    let template =
        blocking(move || app.templates().update_info(&user.actor, &ctx, id, &info)).await?;
    Ok(Json(ApiResponse::ok(template)))
}

/// DELETE /api/templates/:id
pub async fn delete_template(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let app = state.app.clone();
    blocking(move || app.templates().delete(&user.actor, &ctx, id)).await?;
    Ok(Json(ApiResponse::done()))
}

/// PUT /api/templates/:id/fields
pub async fn set_fields(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<FieldsBody>, JsonRejection>,
) -> AppResult<Json<ApiResponse<DocumentTemplate>>> {
    let Json(body) = payload?;
    let fields = body
        .fields
        .ok_or_else(|| AppError::BadRequest("Fields must be an array".into()))?;
    let app = state.app.clone();
    let template = blocking(move || {
        app.templates()
            .set_field_mappings(&user.actor, &ctx, id, &fields)
    })
    .await?;
    Ok(Json(ApiResponse::ok(template)))
}

/// GET /api/templates/:id/preview
pub async fn preview_template(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let app = state.app.clone();
    let file = blocking(move || app.templates().preview(id)).await?;
    Ok(file_response(
        file.content_type,
        Disposition::Inline,
        &file.file_name,
        file.bytes,
    ))
}

/// POST /api/templates/:id/generate
pub async fn generate_document(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    Path(id): Path<i64>,
    payload: Result<Json<GenerateBody>, JsonRejection>,
) -> AppResult<Json<ApiResponse<GenerationResult>>> {
    let Json(body) = payload?;
    let loop_id = body
        .loop_id
        .ok_or_else(|| AppError::BadRequest("Loop ID is required".into()))?;
    let app = state.app.clone();
    let result =
        blocking(move || app.generator().generate(&user.actor, &ctx, id, loop_id)).await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// GET /api/templates/generated/:file_name
pub async fn download_generated(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(file_name): Path<String>,
) -> AppResult<Response> {
    let app = state.app.clone();
    let file = blocking(move || app.generator().open_generated(&file_name)).await?;
    Ok(file_response(
        &file.content_type,
        Disposition::Attachment,
        &file.file_name,
        file.bytes,
    ))
}

/// DELETE /api/templates/generated/:file_name
pub async fn delete_generated(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    ClientContext(ctx): ClientContext,
    Path(file_name): Path<String>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let app = state.app.clone();
    let deleted =
        blocking(move || app.generator().delete_generated(&user.actor, &ctx, &file_name)).await?;
    Ok(Json(ApiResponse::ok(Deleted { deleted })))
}

/// GET /api/templates/loop/:loop_id/documents
pub async fn loop_documents(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(loop_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<GeneratedDocument>>>> {
    let app = state.app.clone();
    let documents = blocking(move || app.generator().list_for_loop(loop_id)).await?;
    Ok(Json(ApiResponse::ok(documents)))
}
