//! Push and deploy flows against a mocked API.

use async_trait::async_trait;
use launchpad_cli::staging::StagingOptions;
use launchpad_cli::{
    deploy_image, push, ApiClient, DeployOptions, PipelineWatcher, PushError, StagingCoordinator,
    StagingError,
};
use launchpad_models::{AppRef, LogLine, PipelineRun};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedWatcher(Vec<PipelineRun>);

#[async_trait]
impl PipelineWatcher for FixedWatcher {
    async fn list(&self, _selector: &str) -> anyhow::Result<Vec<PipelineRun>> {
        Ok(self.0.clone())
    }
}

fn run(status: serde_json::Value) -> PipelineRun {
    serde_json::from_value(json!({
        "metadata": { "name": "abc", "labels": { "launchpad.dev/stage-id": "abc" } },
        "status": status
    }))
    .unwrap()
}

fn shown(status: &str) -> serde_json::Value {
    json!({
        "name": "web",
        "organization": "workspace",
        "status": status,
        "route": "web.apps.example.com",
        "stageId": "abc",
        "active": true
    })
}

fn client(server: &MockServer) -> ApiClient {
    // The mock does not upgrade WebSockets; the failing relay is only logged.
    ApiClient::new(&server.uri(), &server.uri().replacen("http", "ws", 1)).unwrap()
}

fn options() -> DeployOptions {
    DeployOptions {
        route: String::new(),
        instances: Some(1),
        ready_interval: Duration::from_millis(10),
        ready_timeout: Duration::from_secs(5),
    }
}

fn coordinator(server: &MockServer, runs: Vec<PipelineRun>) -> StagingCoordinator {
    StagingCoordinator::new(
        client(server),
        Arc::new(FixedWatcher(runs)),
        StagingOptions {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            close_grace: Duration::from_millis(100),
        },
    )
}

async fn mount_upload_and_stage(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/orgs/workspace/applications/web/store"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "git": { "url": "http://git.example.com/web", "revision": "deadbeef" }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orgs/workspace/applications/web/stage"))
        .and(body_partial_json(json!({ "git": { "revision": "deadbeef" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stage": { "id": "abc" },
            "image": "registry.local/apps/workspace-web:abc"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn push_deploys_the_staged_image_and_waits_for_readiness() {
    let server = MockServer::start().await;
    mount_upload_and_stage(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orgs/workspace/applications/web/deploy"))
        .and(body_partial_json(json!({
            "stage": { "id": "abc" },
            "imageurl": "registry.local/apps/workspace-web:abc",
            "instances": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs/workspace/applications/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(shown("0/1")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs/workspace/applications/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(shown("1/1")))
        .mount(&server)
        .await;

    let completed = run(json!({
        "completionTime": "2025-01-01T00:00:00Z",
        "conditions": [{ "type": "Succeeded", "status": "True" }]
    }));
    let (sink, _lines) = mpsc::unbounded_channel::<LogLine>();
    let app = push(
        &client(&server),
        &coordinator(&server, vec![completed]),
        &AppRef::new("web", "workspace"),
        b"tarball".to_vec(),
        sink,
        &options(),
    )
    .await
    .unwrap();

    assert_eq!(app.status, "1/1");
    assert_eq!(app.stage_id, "abc");
}

#[tokio::test]
async fn failed_build_stops_before_deploy() {
    let server = MockServer::start().await;
    mount_upload_and_stage(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orgs/workspace/applications/web/deploy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let failed = run(json!({
        "conditions": [{ "type": "Succeeded", "status": "False", "message": "no buildpack matched" }]
    }));
    let (sink, _lines) = mpsc::unbounded_channel::<LogLine>();
    let err = push(
        &client(&server),
        &coordinator(&server, vec![failed]),
        &AppRef::new("web", "workspace"),
        b"tarball".to_vec(),
        sink,
        &options(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PushError::Staging(StagingError::BuildFailed(ref m)) if m == "no buildpack matched"
    ));
}

#[tokio::test]
async fn deploy_image_times_out_when_never_ready() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/orgs/workspace/applications/web/deploy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs/workspace/applications/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(shown("0/1")))
        .mount(&server)
        .await;

    let err = deploy_image(
        &client(&server),
        &AppRef::new("web", "workspace"),
        "splatform/sample-app",
        &DeployOptions {
            ready_timeout: Duration::from_millis(100),
            ..options()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PushError::NotReady { .. }));
}
