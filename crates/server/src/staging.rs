//! Staging submission
//!
//! Turns a stage request into a pipeline run of the configured staging
//! pipeline. Progress is observed by the client through the run's status and
//! the log endpoint; nothing here waits for the build.

use crate::builders::app_labels;
use crate::config::{ServerConfig, StagingConfig};
use crate::error::{DeployError, Result};
use crate::pipeline::PipelineStore;
use crate::reconciler::{registry_error, validate_identity};
use crate::registry::AppRegistry;
use launchpad_models::labels::{COMPONENT_STAGING, LABEL_COMPONENT, LABEL_STAGE_ID};
use launchpad_models::pipeline::{API_VERSION, KIND};
use launchpad_models::{AppRef, GitRef, StageRef, StageRequest, StageResponse};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// One pipeline run to create.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub id: String,
    pub app: AppRef,
    pub git: GitRef,
    pub route: String,
    pub image: String,
}

/// Image reference the pipeline pushes for a stage.
#[must_use]
pub fn image_for(registry: &str, app: &AppRef, stage_id: &str) -> String {
    format!("{registry}/apps/{}-{}:{stage_id}", app.org, app.name)
}

fn param(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value })
}

/// Manifest of the pipeline run building `run`.
#[must_use]
pub fn pipeline_run_manifest(run: &StageRun, staging: &StagingConfig) -> Value {
    let mut labels = app_labels(&run.app);
    labels.insert(LABEL_COMPONENT.to_string(), COMPONENT_STAGING.to_string());
    labels.insert(LABEL_STAGE_ID.to_string(), run.id.clone());

    json!({
        "apiVersion": API_VERSION,
        "kind": KIND,
        "metadata": {
            "name": run.id,
            "namespace": staging.namespace,
            "labels": labels,
        },
        "spec": {
            "serviceAccountName": staging.service_account_name,
            "pipelineRef": { "name": staging.pipeline_name },
            "params": [
                param("APP_NAME", &run.app.name),
                param("ORG", &run.app.org),
                param("ROUTE", &run.route),
                param("GIT_URL", &run.git.url),
                param("GIT_REVISION", &run.git.revision),
                param("IMAGE", &run.image),
                param("STAGE_ID", &run.id),
            ],
            "workspaces": [{
                "name": "source",
                "volumeClaimTemplate": {
                    "spec": {
                        "accessModes": ["ReadWriteOnce"],
                        "resources": { "requests": { "storage": staging.workspace_size } }
                    }
                }
            }]
        }
    })
}

pub struct Stager {
    registry: Arc<dyn AppRegistry>,
    pipelines: Arc<dyn PipelineStore>,
    config: Arc<ServerConfig>,
}

impl Stager {
    pub fn new(
        registry: Arc<dyn AppRegistry>,
        pipelines: Arc<dyn PipelineStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            registry,
            pipelines,
            config,
        }
    }

    /// Create a pipeline run building the application's sources.
    #[instrument(skip(self, request), fields(app = %path_app))]
    pub async fn stage(&self, path_app: &AppRef, request: StageRequest) -> Result<StageResponse> {
        validate_identity(path_app, &request.app)?;
        self.registry.owner(&request.app).await.map_err(|e| {
            registry_error(
                e,
                DeployError::AppNotKnown(request.app.clone()),
                "failed to resolve application owner",
            )
        })?;

        let id = Uuid::new_v4().simple().to_string();
        let route = if request.route.is_empty() {
            self.config.default_route(&request.app.name)
        } else {
            request.route
        };
        let run = StageRun {
            image: image_for(&self.config.staging.registry, &request.app, &id),
            id,
            app: request.app,
            git: request.git,
            route,
        };

        self.pipelines
            .create(pipeline_run_manifest(&run, &self.config.staging))
            .await
            .map_err(|e| DeployError::infra("failed to create pipeline run", e))?;

        info!(stage_id = %run.id, image = %run.image, revision = %run.git.revision, "staging submitted");
        Ok(StageResponse {
            stage: StageRef::new(run.id),
            image_url: run.image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MemoryPipelines;
    use crate::registry::MemoryRegistry;
    use launchpad_models::labels::stage_selector;

    fn request(app: AppRef) -> StageRequest {
        StageRequest {
            app,
            git: GitRef {
                url: "http://git.example.com/workspace/web".into(),
                revision: "deadbeef".into(),
            },
            route: String::new(),
        }
    }

    async fn stager() -> (Stager, Arc<MemoryPipelines>) {
        let registry = Arc::new(MemoryRegistry::new());
        registry.add_app(&AppRef::new("web", "workspace")).await;
        let pipelines = Arc::new(MemoryPipelines::new());
        let config = ServerConfig {
            domain: "apps.example.com".into(),
            ..ServerConfig::default()
        };
        (
            Stager::new(registry, pipelines.clone(), Arc::new(config)),
            pipelines,
        )
    }

    #[tokio::test]
    async fn stage_creates_labelled_run() {
        let (stager, pipelines) = stager().await;
        let app = AppRef::new("web", "workspace");
        let response = stager.stage(&app, request(app.clone())).await.unwrap();

        let id = response.stage.id().unwrap().to_string();
        assert_eq!(id.len(), 32);
        assert!(response
            .image_url
            .ends_with(&format!("/apps/workspace-web:{id}")));

        let runs = pipelines.list(&stage_selector(&id)).await.unwrap();
        assert_eq!(runs.len(), 1);

        let manifest = pipelines.manifest(&id).await.unwrap();
        assert_eq!(manifest["metadata"]["namespace"], "launchpad-staging");
        assert_eq!(manifest["spec"]["pipelineRef"]["name"], "staging-pipeline");
        let params = manifest["spec"]["params"].as_array().unwrap();
        let route = params.iter().find(|p| p["name"] == "ROUTE").unwrap();
        assert_eq!(route["value"], "web.apps.example.com");
        let revision = params.iter().find(|p| p["name"] == "GIT_REVISION").unwrap();
        assert_eq!(revision["value"], "deadbeef");
    }

    #[tokio::test]
    async fn each_submission_gets_a_new_id() {
        let (stager, pipelines) = stager().await;
        let app = AppRef::new("web", "workspace");
        let first = stager.stage(&app, request(app.clone())).await.unwrap();
        let second = stager.stage(&app, request(app.clone())).await.unwrap();
        assert_ne!(first.stage, second.stage);
        assert_eq!(pipelines.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_app_is_rejected() {
        let (stager, pipelines) = stager().await;
        let ghost = AppRef::new("ghost", "workspace");
        let err = stager.stage(&ghost, request(ghost.clone())).await.unwrap_err();
        assert!(matches!(err, DeployError::AppNotKnown(_)));
        assert_eq!(pipelines.len().await, 0);
    }
}
