pub mod auth;
pub mod cnfg;
pub mod converter;
pub mod docx;
pub mod error;
pub mod html;
pub mod pdf;
pub mod render;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use storage_sdk::ObjectStorage;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use auth::auth_middleware;
use cnfg::AppConfig;
use converter::Converter;
use html::{HtmlRenderer, render_html};
use pdf::render_pdf;
use workspace::TempWorkspace;

/// Largest accepted request body.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn ObjectStorage>,
    pub converter: Arc<dyn Converter>,
    pub html: Arc<HtmlRenderer>,
    pub workspace: TempWorkspace,
    pub template_bucket: String,
    pub output_bucket: String,
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn ObjectStorage>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            storage,
            converter,
            html: Arc::new(HtmlRenderer::new()),
            workspace: TempWorkspace::new(config.scratch_dir.clone()),
            template_bucket: config.template_bucket.clone(),
            output_bucket: config.output_bucket.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

pub fn app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let protected_routes = Router::new()
        .route("/render/pdf", post(render_pdf))
        .route("/render/html", post(render_html))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth_middleware,
        ))
        .with_state(app_state);

    Router::new()
        .merge(protected_routes)
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
