//! Router builder shared by the binary and the integration tests.

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use loopdesk::config::ServerConfig;
use loopdesk::Limits;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::handlers::{activity, health, loops, settings, templates};
use crate::state::AppState;

/// Headroom for multipart boundaries and text fields.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Largest request body accepted: a full template or a full image batch.
pub fn body_limit(limits: &Limits) -> usize {
    let images = limits
        .max_image_bytes
        .saturating_mul(limits.max_images_per_upload as u64);
    let largest = limits.max_template_bytes.max(images);
    usize::try_from(largest.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        // Loops. Static segments before `{id}`.
        .route("/loops", get(loops::list_loops).post(loops::create_loop))
        .route("/loops/stats", get(loops::loop_stats))
        .route("/loops/closing", get(loops::closing_soon))
        .route("/loops/export/csv", get(loops::export_csv))
        .route("/loops/export/stats", get(loops::export_stats_csv))
        .route(
            "/loops/{id}",
            get(loops::get_loop)
                .put(loops::update_loop)
                .delete(loops::delete_loop),
        )
        .route("/loops/{id}/archive", put(loops::archive_loop))
        .route("/loops/{id}/unarchive", put(loops::unarchive_loop))
        .route("/loops/{id}/export/pdf", get(loops::export_pdf))
        .route("/loops/{id}/images", post(loops::upload_images))
        .route(
            "/loops/{id}/images/{filename}",
            get(loops::get_image).delete(loops::delete_image),
        )
        // Templates and generated documents.
        .route("/templates", get(templates::list_templates))
        .route("/templates/upload", post(templates::upload_template))
        .route("/templates/stats", get(templates::template_stats))
        .route(
            "/templates/generated/{file_name}",
            get(templates::download_generated).delete(templates::delete_generated),
        )
        .route(
            "/templates/loop/{loop_id}/documents",
            get(templates::loop_documents),
        )
        .route(
            "/templates/{id}",
            put(templates::update_template).delete(templates::delete_template),
        )
        .route("/templates/{id}/fields", put(templates::set_fields))
        .route("/templates/{id}/preview", get(templates::preview_template))
        .route("/templates/{id}/generate", post(templates::generate_document))
        // Activity log.
        .route(
            "/activity",
            get(activity::list_activity).delete(activity::clear_activity),
        )
        .route("/activity/stats", get(activity::activity_stats))
        // Settings.
        .route("/settings", get(settings::get_settings))
        .route("/settings/notifications", put(settings::update_notifications))
}

/// Builds the full application [`Router`] with all middleware layers.
///
/// Layers apply bottom-up: CORS, request id, tracing, id propagation,
/// then the body limits closest to the handlers.
pub fn build_router(state: AppState, server: &ServerConfig, limits: &Limits) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");
    let max_body = body_limit(limits);

    Router::new()
        .nest("/api", api_routes())
        .layer(DefaultBodyLimit::max(max_body))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(build_cors_layer(&server.cors_origins))
        .with_state(state)
}

/// Origins that fail to parse are skipped with a warning.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
