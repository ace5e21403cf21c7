//! Push and deploy flows
//!
//! `push` takes an application from a source tarball to running instances:
//! upload, stage, deploy the staged image, then wait until every desired
//! instance reports ready. `deploy_image` starts from an existing image.

use crate::logs::LogSink;
use crate::staging::{poll_until, StagingCoordinator, StagingError};
use crate::transport::{ApiClient, ClientError};
use crate::ui;
use launchpad_models::{routes, App, AppRef, DeployRequest, StageRef, StageRequest};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PushError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("{app} did not become ready within {timeout:?}")]
    NotReady { app: AppRef, timeout: Duration },
}

/// How the deployed application is exposed and waited for.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Route host, empty for the server default
    pub route: String,
    /// Instance count, `None` keeps the current scale
    pub instances: Option<i32>,
    pub ready_interval: Duration,
    pub ready_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            route: String::new(),
            instances: None,
            ready_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(300),
        }
    }
}

/// Upload `tarball`, stage it, deploy the result and wait for readiness.
pub async fn push<S: LogSink>(
    client: &ApiClient,
    coordinator: &StagingCoordinator,
    app: &AppRef,
    tarball: Vec<u8>,
    sink: S,
    options: &DeployOptions,
) -> Result<App, PushError> {
    ui::print_step(&format!("Uploading sources of {app}"));
    let uploaded = client.upload(app, tarball).await?;
    debug!(app = %app, revision = %uploaded.git.revision, "sources uploaded");

    ui::print_step("Staging");
    let run = coordinator
        .submit(&StageRequest {
            app: app.clone(),
            git: uploaded.git.clone(),
            route: options.route.clone(),
        })
        .await?;
    coordinator.await_run(&run, sink).await?;
    ui::print_success(&format!("Built {}", run.image));

    let request = DeployRequest {
        app: app.clone(),
        instances: options.instances,
        stage: StageRef::new(run.id),
        route: options.route.clone(),
        git: Some(uploaded.git),
        image_url: run.image,
    };
    deploy(client, &request, options).await
}

/// Deploy an existing image and wait for readiness.
pub async fn deploy_image(
    client: &ApiClient,
    app: &AppRef,
    image: &str,
    options: &DeployOptions,
) -> Result<App, PushError> {
    let request = DeployRequest {
        app: app.clone(),
        instances: options.instances,
        stage: StageRef::default(),
        route: options.route.clone(),
        git: None,
        image_url: image.to_string(),
    };
    deploy(client, &request, options).await
}

async fn deploy(
    client: &ApiClient,
    request: &DeployRequest,
    options: &DeployOptions,
) -> Result<App, PushError> {
    ui::print_step(&format!("Deploying {}", request.image_url));
    let _: Value = client
        .post_json(&routes::app_deploy(&request.app.org, &request.app.name), request)
        .await?;
    info!(app = %request.app, image = %request.image_url, "deploy accepted");

    wait_for_app(client, &request.app, options.ready_interval, options.ready_timeout).await
}

/// Poll the application until every desired instance is ready.
pub async fn wait_for_app(
    client: &ApiClient,
    app: &AppRef,
    interval: Duration,
    timeout: Duration,
) -> Result<App, PushError> {
    let spinner = ui::spinner(&format!("Waiting for {app} to become ready"));
    let path = routes::app(&app.org, &app.name);

    let (path, progress) = (path.as_str(), &spinner);
    let ready = poll_until(interval, timeout, move || async move {
        let shown: App = client.get(path).await?;
        progress.set_message(format!("{app}: {}", display_status(&shown)));
        Ok::<_, ClientError>((shown.active && shown.is_converged()).then_some(shown))
    })
    .await;
    spinner.finish_and_clear();

    match ready? {
        Some(shown) => Ok(shown),
        None => Err(PushError::NotReady {
            app: app.clone(),
            timeout,
        }),
    }
}

fn display_status(app: &App) -> &str {
    if app.status.is_empty() {
        "pending"
    } else {
        &app.status
    }
}
