//! Request and response bodies of the application endpoints

use crate::app::{AppRef, GitRef, StageRef};
use serde::{Deserialize, Serialize};

/// Body of `POST .../applications/{app}/deploy`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub app: AppRef,
    /// Desired instance count, `None` keeps the current scale
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,
    #[serde(default)]
    pub stage: StageRef,
    #[serde(default)]
    pub route: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitRef>,
    #[serde(rename = "imageurl")]
    pub image_url: String,
}

/// Body of `POST .../applications/{app}/stage`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    pub app: AppRef,
    pub git: GitRef,
    #[serde(default)]
    pub route: String,
}

/// Reply of the stage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResponse {
    pub stage: StageRef,
    /// Image the pipeline pushes on success
    #[serde(rename = "image")]
    pub image_url: String,
}

/// Reply of the upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub git: GitRef,
}

/// Body of `PATCH .../applications/{app}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAppRequest {
    pub instances: i32,
}

/// Body of `POST .../applications`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCreateRequest {
    pub name: String,
}
