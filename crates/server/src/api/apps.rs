use super::{decode, AppState};
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use launchpad_models::error::{
    DEPLOY_UNMARSHAL_FAILED, STAGE_UNMARSHAL_FAILED, UPDATE_UNMARSHAL_FAILED,
};
use launchpad_models::{
    App, AppList, AppRef, ApplicationCreateRequest, DeployRequest, StageRequest, StageResponse,
    UpdateAppRequest,
};
use serde_json::{json, Value};

const CREATE_UNMARSHAL_FAILED: &str = "Failed to unmarshal app create request";

pub(super) async fn index(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Result<Json<AppList>, ApiError> {
    Ok(Json(state.deployer.list(&org).await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Path(org): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request: ApplicationCreateRequest = decode(body, CREATE_UNMARSHAL_FAILED)?;
    state.deployer.create(&org, &request.name).await?;
    Ok((StatusCode::CREATED, Json(json!({}))))
}

pub(super) async fn show(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
) -> Result<Json<App>, ApiError> {
    Ok(Json(state.deployer.show(&AppRef::new(app, org)).await?))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: UpdateAppRequest = decode(body, UPDATE_UNMARSHAL_FAILED)?;
    state
        .deployer
        .update_instances(&AppRef::new(app, org), request.instances)
        .await?;
    Ok(Json(json!({})))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state.deployer.delete(&AppRef::new(app, org)).await?;
    Ok(Json(json!({})))
}

pub(super) async fn stage(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<StageResponse>, ApiError> {
    let request: StageRequest = decode(body, STAGE_UNMARSHAL_FAILED)?;
    Ok(Json(
        state.stager.stage(&AppRef::new(app, org), request).await?,
    ))
}

pub(super) async fn deploy(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Value>, ApiError> {
    let request: DeployRequest = decode(body, DEPLOY_UNMARSHAL_FAILED)?;
    state
        .deployer
        .deploy(&AppRef::new(app, org), request)
        .await?;
    Ok(Json(json!({})))
}
