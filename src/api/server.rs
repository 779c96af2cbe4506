//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::handlers;
use crate::pipeline::PipelineOrchestrator;
use crate::sampling::SamplingWindow;

/// Uploads above this size are rejected before reaching the handler
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub window: SamplingWindow,
}

/// Routes with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Bind `addr` and serve until the listener fails
pub async fn start_http_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn root_handler() -> impl IntoResponse {
    Json(handlers::banner())
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.orchestrator.backend();
    Json(handlers::health_check(backend.name(), backend.is_mock()))
}

/// Analyze upload handler
async fn analyze_handler(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let form = match handlers::read_form(multipart).await {
        Ok(form) => form,
        Err((status, body)) => return (status, Json(body)).into_response(),
    };

    match handlers::analyze_upload(&state.orchestrator, state.window, form).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}
