//! HTTP API
//!
//! All application routes are keyed by `{org}` and `{app}` path segments;
//! failures are returned as the JSON error envelope.

mod apps;
mod logs;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::logs::LogSource;
use crate::reconciler::Deployer;
use crate::staging::Stager;
use axum::extract::rejection::BytesRejection;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use launchpad_models::routes;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

#[derive(Clone)]
pub struct AppState {
    pub deployer: Arc<Deployer>,
    pub stager: Arc<Stager>,
    pub logs: Arc<dyn LogSource>,
    pub config: Arc<ServerConfig>,
}

/// Build the full router, layers included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(routes::HEALTH, get(health_check))
        .route(routes::READY, get(readiness_check))
        .route(routes::INFO, get(info))
        .route(routes::APPS, get(apps::index).post(apps::create))
        .route(
            routes::APP,
            get(apps::show).patch(apps::update).delete(apps::delete),
        )
        .route(routes::APP_STAGE, post(apps::stage))
        .route(routes::APP_DEPLOY, post(apps::deploy))
        .route(routes::APP_LOGS, get(logs::tail))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(60))),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "launchpad-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check() -> Json<Value> {
    Json(json!({
        "status": "ready",
        "service": "launchpad-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn info() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Decode a JSON body, reporting failures under `title` with serde's message as details.
fn decode<T: DeserializeOwned>(
    body: Result<axum::body::Bytes, BytesRejection>,
    title: &str,
) -> Result<T, ApiError> {
    let body = body.map_err(|e| ApiError::bad_request(title, e.body_text()))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(title, e.to_string()))
}
