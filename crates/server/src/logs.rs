//! Container log tailing
//!
//! A [`LogSource`] merges the output of every container of the selected pods
//! into one [`LogStream`]. Without `follow`, the stream ends once every
//! container stream is done, which is when the WebSocket endpoint sends its
//! closing frame. With `follow`, pods are watched and every container is
//! tailed once it starts, so the stream only ends when the client goes away.

use async_trait::async_trait;
use futures::{AsyncBufReadExt, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use launchpad_models::labels::{app_selector, stage_selector};
use launchpad_models::{AppRef, LogLine};
use std::collections::HashSet;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

const LINE_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Merged lines of several container streams.
///
/// Dropping the stream stops the tasks reading the containers.
pub struct LogStream {
    lines: mpsc::Receiver<LogLine>,
    readers: Vec<JoinHandle<()>>,
}

impl LogStream {
    #[must_use]
    pub fn new(lines: mpsc::Receiver<LogLine>, readers: Vec<JoinHandle<()>>) -> Self {
        Self { lines, readers }
    }

    /// A finished stream yielding `lines`.
    #[must_use]
    pub fn from_lines(lines: Vec<LogLine>) -> Self {
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            // Capacity covers every line.
            let _ = tx.try_send(line);
        }
        Self::new(rx, Vec::new())
    }
}

impl Stream for LogStream {
    type Item = LogLine;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogLine>> {
        self.get_mut().lines.poll_recv(cx)
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

#[async_trait]
pub trait LogSource: Send + Sync {
    /// Lines of the application's pods, or of the staging pods of `stage_id`.
    async fn stream(
        &self,
        app: &AppRef,
        stage_id: Option<&str>,
        follow: bool,
    ) -> Result<LogStream, LogError>;
}

/// [`LogSource`] reading pod logs from the API server.
#[derive(Clone)]
pub struct KubeLogSource {
    client: Client,
    staging_namespace: String,
}

impl KubeLogSource {
    #[must_use]
    pub fn new(client: Client, staging_namespace: impl Into<String>) -> Self {
        Self {
            client,
            staging_namespace: staging_namespace.into(),
        }
    }
}

async fn read_container(
    pods: Api<Pod>,
    pod_name: String,
    container_name: String,
    namespace: String,
    follow: bool,
    tx: mpsc::Sender<LogLine>,
) {
    let params = LogParams {
        container: Some(container_name.clone()),
        follow,
        ..LogParams::default()
    };

    let reader = match pods.log_stream(&pod_name, &params).await {
        Ok(reader) => reader,
        Err(e) => {
            warn!(pod = %pod_name, container = %container_name, error = %e, "failed to open log stream");
            return;
        }
    };

    let mut lines = Box::pin(reader.lines());
    while let Some(line) = lines.next().await {
        let message = match line {
            Ok(message) => message,
            Err(e) => {
                debug!(pod = %pod_name, container = %container_name, error = %e, "log stream ended");
                break;
            }
        };
        let line = LogLine {
            message,
            pod_name: pod_name.clone(),
            container_name: container_name.clone(),
            namespace: namespace.clone(),
        };
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

/// Containers of `pod` that have started running, init containers first.
fn started_containers(pod: &Pod) -> Vec<String> {
    let Some(status) = pod.status.as_ref() else {
        return Vec::new();
    };
    status
        .init_container_statuses
        .iter()
        .flatten()
        .chain(status.container_statuses.iter().flatten())
        .filter(|container| {
            container
                .state
                .as_ref()
                .is_some_and(|state| state.running.is_some() || state.terminated.is_some())
        })
        .map(|container| container.name.clone())
        .collect()
}

/// Watch the selected pods and tail each container as it starts.
///
/// Runs until the receiving side of `tx` is gone or the task is aborted;
/// dropping the join set stops every reader it started.
async fn follow_pods(pods: Api<Pod>, selector: String, namespace: String, tx: mpsc::Sender<LogLine>) {
    let mut readers = JoinSet::new();
    let mut tailed = HashSet::new();

    let config = watcher::Config::default().labels(&selector);
    let mut events = Box::pin(watcher(pods.clone(), config).default_backoff().applied_objects());

    while let Some(event) = events.next().await {
        let pod = match event {
            Ok(pod) => pod,
            Err(e) => {
                warn!(selector = %selector, error = %e, "pod watch failed");
                continue;
            }
        };

        let pod_name = pod.name_any();
        for container_name in started_containers(&pod) {
            if tailed.insert((pod_name.clone(), container_name.clone())) {
                debug!(pod = %pod_name, container = %container_name, "tailing container");
                readers.spawn(read_container(
                    pods.clone(),
                    pod_name.clone(),
                    container_name,
                    namespace.clone(),
                    true,
                    tx.clone(),
                ));
            }
        }

        while readers.try_join_next().is_some() {}
        if tx.is_closed() {
            break;
        }
    }
}

#[async_trait]
impl LogSource for KubeLogSource {
    async fn stream(
        &self,
        app: &AppRef,
        stage_id: Option<&str>,
        follow: bool,
    ) -> Result<LogStream, LogError> {
        let (namespace, selector) = match stage_id {
            Some(id) => (self.staging_namespace.clone(), stage_selector(id)),
            None => (app.org.clone(), app_selector(app)),
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let (tx, rx) = mpsc::channel(LINE_BUFFER);

        if follow {
            debug!(app = %app, selector = %selector, "following logs");
            let watch = tokio::spawn(follow_pods(pods, selector, namespace, tx));
            return Ok(LogStream::new(rx, vec![watch]));
        }

        let list = pods.list(&ListParams::default().labels(&selector)).await?;
        let mut readers = Vec::new();
        for pod in &list.items {
            let pod_name = pod.name_any();
            let spec = pod.spec.as_ref();
            let containers = spec
                .and_then(|s| s.init_containers.as_ref())
                .into_iter()
                .flatten()
                .chain(spec.map(|s| &s.containers).into_iter().flatten());

            for container in containers {
                readers.push(tokio::spawn(read_container(
                    pods.clone(),
                    pod_name.clone(),
                    container.name.clone(),
                    namespace.clone(),
                    false,
                    tx.clone(),
                )));
            }
        }

        debug!(app = %app, selector = %selector, streams = readers.len(), "tailing logs");
        Ok(LogStream::new(rx, readers))
    }
}

type Keyed = (AppRef, Option<String>, LogLine);

/// [`LogSource`] serving pushed lines, keyed by application and stage id.
///
/// Following streams also receive lines pushed after they were opened.
#[derive(Debug)]
pub struct MemoryLogSource {
    lines: tokio::sync::RwLock<Vec<Keyed>>,
    pushed: broadcast::Sender<Keyed>,
}

impl Default for MemoryLogSource {
    fn default() -> Self {
        Self {
            lines: tokio::sync::RwLock::default(),
            pushed: broadcast::channel(LINE_BUFFER).0,
        }
    }
}

impl MemoryLogSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, app: &AppRef, stage_id: Option<&str>, message: &str) {
        let line = LogLine {
            message: message.to_string(),
            pod_name: format!("{}-pod", app.name),
            container_name: app.name.clone(),
            namespace: app.org.clone(),
        };
        let keyed = (app.clone(), stage_id.map(str::to_string), line);
        let mut lines = self.lines.write().await;
        lines.push(keyed.clone());
        // Nobody following is fine.
        let _ = self.pushed.send(keyed);
    }
}

fn selected(keyed: &Keyed, app: &AppRef, stage_id: Option<&str>) -> bool {
    keyed.0 == *app && keyed.1.as_deref() == stage_id
}

#[async_trait]
impl LogSource for MemoryLogSource {
    async fn stream(
        &self,
        app: &AppRef,
        stage_id: Option<&str>,
        follow: bool,
    ) -> Result<LogStream, LogError> {
        let lines = self.lines.read().await;
        let existing: Vec<LogLine> = lines
            .iter()
            .filter(|keyed| selected(keyed, app, stage_id))
            .map(|(_, _, line)| line.clone())
            .collect();
        if !follow {
            return Ok(LogStream::from_lines(existing));
        }

        // Subscribing under the read lock keeps pushes from slipping between
        // the snapshot and the subscription.
        let mut pushed = self.pushed.subscribe();
        drop(lines);

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let (app, stage_id) = (app.clone(), stage_id.map(str::to_string));
        let forward = tokio::spawn(async move {
            for line in existing {
                if tx.send(line).await.is_err() {
                    return;
                }
            }
            loop {
                match pushed.recv().await {
                    Ok(keyed) if selected(&keyed, &app, stage_id.as_deref()) => {
                        if tx.send(keyed.2).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(LogStream::new(rx, vec![forward]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn memory_source_filters_by_stage() {
        let source = MemoryLogSource::new();
        let app = AppRef::new("web", "workspace");
        source.push(&app, Some("abc"), "building").await;
        source.push(&app, None, "listening on 8080").await;

        let staged: Vec<LogLine> = source.stream(&app, Some("abc"), false).await.unwrap().collect().await;
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].message, "building");

        let runtime: Vec<LogLine> = source.stream(&app, None, false).await.unwrap().collect().await;
        assert_eq!(runtime[0].message, "listening on 8080");
    }

    #[tokio::test]
    async fn stream_ends_when_senders_are_gone() {
        let (tx, rx) = mpsc::channel(4);
        let writer = tokio::spawn(async move {
            for i in 0..3 {
                tx.send(LogLine {
                    message: format!("line {i}"),
                    pod_name: "p".into(),
                    container_name: "c".into(),
                    namespace: "n".into(),
                })
                .await
                .unwrap();
            }
        });
        let lines: Vec<LogLine> = LogStream::new(rx, Vec::new()).collect().await;
        writer.await.unwrap();
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn following_memory_source_sees_later_lines() {
        let source = MemoryLogSource::new();
        let app = AppRef::new("web", "workspace");
        source.push(&app, Some("abc"), "cloning").await;

        let mut lines = source.stream(&app, Some("abc"), true).await.unwrap();
        assert_eq!(lines.next().await.unwrap().message, "cloning");

        source.push(&app, None, "runtime line").await;
        source.push(&app, Some("abc"), "building").await;
        assert_eq!(lines.next().await.unwrap().message, "building");

        // Still open: nothing more arrives but the stream does not end.
        assert!(timeout(Duration::from_millis(50), lines.next()).await.is_err());
    }

    #[test]
    fn only_started_containers_are_tailed() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "abc-build-pod" },
            "status": {
                "initContainerStatuses": [
                    { "name": "prepare", "image": "i", "imageID": "", "ready": false,
                      "restartCount": 0, "state": { "terminated": { "exitCode": 0 } } }
                ],
                "containerStatuses": [
                    { "name": "step-build", "image": "i", "imageID": "", "ready": true,
                      "restartCount": 0, "state": { "running": {} } },
                    { "name": "step-push", "image": "i", "imageID": "", "ready": false,
                      "restartCount": 0, "state": { "waiting": { "reason": "PodInitializing" } } }
                ]
            }
        }))
        .unwrap();
        assert_eq!(started_containers(&pod), vec!["prepare", "step-build"]);
        assert!(started_containers(&Pod::default()).is_empty());
    }

    async fn pods_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/namespaces/launchpad-staging/pods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": { "resourceVersion": "1" },
                "items": []
            })))
            .mount(&server)
            .await;
        server
    }

    fn kube_source(server: &MockServer) -> KubeLogSource {
        let config = kube::Config::new(server.uri().parse().unwrap());
        KubeLogSource::new(Client::try_from(config).unwrap(), "launchpad-staging")
    }

    #[tokio::test]
    async fn follow_waits_for_pods_that_do_not_exist_yet() {
        let server = pods_server().await;
        let app = AppRef::new("web", "workspace");
        let mut lines = kube_source(&server)
            .stream(&app, Some("abc123"), true)
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(300), lines.next()).await.is_err());
    }

    #[tokio::test]
    async fn without_follow_no_pods_ends_the_stream() {
        let server = pods_server().await;
        let app = AppRef::new("web", "workspace");
        let mut lines = kube_source(&server)
            .stream(&app, Some("abc123"), false)
            .await
            .unwrap();
        let next = timeout(Duration::from_secs(5), lines.next()).await.unwrap();
        assert!(next.is_none());
    }
}
