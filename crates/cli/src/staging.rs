//! Staging coordination
//!
//! A staging run goes `Submitted -> Running -> {Succeeded, Failed, TimedOut}`.
//! While the pipeline runs, its logs are relayed on a spawned task and the
//! pipeline run objects are polled on the caller's task. The poll loop alone
//! decides the outcome; the relay is cancelled and joined before returning.

use crate::logs::{relay, LogSink};
use crate::transport::{ApiClient, ClientError};
use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use kube::Client;
use launchpad_models::labels::stage_selector;
use launchpad_models::pipeline::{API_VERSION, GROUP, KIND, PLURAL, VERSION};
use launchpad_models::{routes, AppRef, PipelineRun, StageRequest, StageResponse};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to submit staging run: {0}")]
    Submit(#[source] ClientError),

    /// Message of the failed pipeline condition, verbatim.
    #[error("build failed: {0}")]
    BuildFailed(String),

    #[error("staging did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("failed to read pipeline runs: {0}")]
    Pipeline(String),
}

/// Read access to the pipeline runs of the staging namespace.
#[async_trait]
pub trait PipelineWatcher: Send + Sync {
    async fn list(&self, selector: &str) -> anyhow::Result<Vec<PipelineRun>>;
}

/// [`PipelineWatcher`] listing Tekton runs through the API server.
#[derive(Clone)]
pub struct KubePipelineWatcher {
    api: Api<DynamicObject>,
}

impl KubePipelineWatcher {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        let resource = ApiResource {
            group: GROUP.to_string(),
            version: VERSION.to_string(),
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            plural: PLURAL.to_string(),
        };
        Self {
            api: Api::namespaced_with(client, namespace, &resource),
        }
    }
}

#[async_trait]
impl PipelineWatcher for KubePipelineWatcher {
    async fn list(&self, selector: &str) -> anyhow::Result<Vec<PipelineRun>> {
        let list = self.api.list(&ListParams::default().labels(selector)).await?;
        list.items
            .into_iter()
            .map(|object| -> anyhow::Result<PipelineRun> {
                Ok(serde_json::from_value(serde_json::to_value(object)?)?)
            })
            .collect()
    }
}

/// Run `check` now and then every `interval` until it yields a value.
///
/// Returns `Ok(None)` once `timeout` has elapsed without a value. The last
/// sleep is shortened so the final check happens at the deadline.
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunOutcome {
    Succeeded,
    Failed(String),
}

/// Outcome of a stage once its runs say so; `None` while still running.
fn evaluate(runs: &[PipelineRun]) -> Option<RunOutcome> {
    if let Some(message) = runs.iter().find_map(PipelineRun::failure) {
        return Some(RunOutcome::Failed(message));
    }
    runs.iter()
        .any(|run| run.completion_time().is_some())
        .then_some(RunOutcome::Succeeded)
}

/// A submitted staging run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub id: String,
    pub app: AppRef,
    /// Image the pipeline pushes on success
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct StagingOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// How long the relay keeps draining after cancellation
    pub close_grace: Duration,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(600),
            close_grace: Duration::from_secs(2),
        }
    }
}

pub struct StagingCoordinator {
    client: ApiClient,
    watcher: Arc<dyn PipelineWatcher>,
    options: StagingOptions,
}

impl StagingCoordinator {
    #[must_use]
    pub fn new(client: ApiClient, watcher: Arc<dyn PipelineWatcher>, options: StagingOptions) -> Self {
        Self {
            client,
            watcher,
            options,
        }
    }

    /// Ask the server to start staging. Not retried.
    pub async fn submit(&self, request: &StageRequest) -> Result<StageRun, StagingError> {
        let path = routes::app_stage(&request.app.org, &request.app.name);
        let response: StageResponse = self
            .client
            .post_json(&path, request)
            .await
            .map_err(StagingError::Submit)?;

        let id = response
            .stage
            .id()
            .ok_or_else(|| StagingError::Pipeline("server returned an empty stage id".into()))?
            .to_string();
        info!(app = %request.app, stage_id = %id, "staging submitted");
        Ok(StageRun {
            id,
            app: request.app.clone(),
            image: response.image_url,
        })
    }

    /// Relay the run's logs into `sink` until the pipeline reaches an outcome.
    pub async fn await_run<S: LogSink>(&self, run: &StageRun, sink: S) -> Result<(), StagingError> {
        let url = self.client.ws_url(
            &routes::app_logs(&run.app.org, &run.app.name),
            &[("follow", "true"), ("stage_id", &run.id)],
        );
        let cancel = CancellationToken::new();
        let relay_task = tokio::spawn(relay(url, sink, cancel.clone(), self.options.close_grace));

        let selector = stage_selector(&run.id);
        let (watcher, selector, id) = (&self.watcher, selector.as_str(), run.id.as_str());
        let outcome = poll_until(self.options.poll_interval, self.options.timeout, move || async move {
            let runs = watcher
                .list(selector)
                .await
                .map_err(|e| StagingError::Pipeline(format!("{e:#}")))?;
            debug!(stage_id = %id, runs = runs.len(), "polled pipeline runs");
            Ok::<_, StagingError>(evaluate(&runs))
        })
        .await;

        cancel.cancel();
        match relay_task.await {
            Ok(Ok(lines)) => debug!(stage_id = %run.id, lines, "log relay finished"),
            Ok(Err(e)) => warn!(stage_id = %run.id, error = %e, "log relay failed"),
            Err(e) => warn!(stage_id = %run.id, error = %e, "log relay task panicked"),
        }

        match outcome? {
            Some(RunOutcome::Succeeded) => {
                info!(stage_id = %run.id, "staging succeeded");
                Ok(())
            }
            Some(RunOutcome::Failed(message)) => Err(StagingError::BuildFailed(message)),
            None => Err(StagingError::TimedOut(self.options.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_models::LogLine;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Serves one scripted list per call, repeating the last one.
    struct ScriptedWatcher {
        replies: Mutex<Vec<Vec<PipelineRun>>>,
        calls: AtomicUsize,
        selectors: Mutex<Vec<String>>,
    }

    impl ScriptedWatcher {
        fn new(replies: Vec<Vec<PipelineRun>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                selectors: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PipelineWatcher for ScriptedWatcher {
        async fn list(&self, selector: &str) -> anyhow::Result<Vec<PipelineRun>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.selectors.lock().unwrap().push(selector.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                Ok(replies.remove(0))
            } else {
                Ok(replies.first().cloned().unwrap_or_default())
            }
        }
    }

    struct FailingWatcher;

    #[async_trait]
    impl PipelineWatcher for FailingWatcher {
        async fn list(&self, _selector: &str) -> anyhow::Result<Vec<PipelineRun>> {
            anyhow::bail!("forbidden")
        }
    }

    fn run_with_status(status: serde_json::Value) -> PipelineRun {
        serde_json::from_value(json!({
            "metadata": { "name": "abc", "labels": { "launchpad.dev/stage-id": "abc" } },
            "status": status
        }))
        .unwrap()
    }

    fn completed() -> PipelineRun {
        run_with_status(json!({
            "completionTime": "2025-01-01T00:00:00Z",
            "conditions": [{ "type": "Succeeded", "status": "True" }]
        }))
    }

    fn running() -> PipelineRun {
        run_with_status(json!({
            "conditions": [{ "type": "Succeeded", "status": "Unknown", "reason": "Running" }]
        }))
    }

    fn failed(message: &str) -> PipelineRun {
        run_with_status(json!({
            "completionTime": "2025-01-01T00:00:00Z",
            "conditions": [{ "type": "Succeeded", "status": "False", "message": message }]
        }))
    }

    fn coordinator(watcher: Arc<dyn PipelineWatcher>, timeout: Duration) -> StagingCoordinator {
        // Nothing listens on port 1, so the relay fails fast and is only logged.
        let client = ApiClient::new("http://127.0.0.1:1", "ws://127.0.0.1:1").unwrap();
        StagingCoordinator::new(
            client,
            watcher,
            StagingOptions {
                poll_interval: Duration::from_secs(1),
                timeout,
                close_grace: Duration::from_millis(100),
            },
        )
    }

    fn stage_run() -> StageRun {
        StageRun {
            id: "abc".into(),
            app: AppRef::new("web", "workspace"),
            image: "registry/apps/workspace-web:abc".into(),
        }
    }

    fn sink() -> mpsc::UnboundedSender<LogLine> {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn failed_condition_wins_over_completion() {
        assert_eq!(evaluate(&[]), None);
        assert_eq!(evaluate(&[running()]), None);
        assert_eq!(evaluate(&[completed()]), Some(RunOutcome::Succeeded));
        assert_eq!(
            evaluate(&[completed(), failed("step build exited 1")]),
            Some(RunOutcome::Failed("step build exited 1".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_checks_immediately_then_at_interval() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let started = Instant::now();
        let value = poll_until(Duration::from_secs(1), Duration::from_secs(30), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, ()>((n == 3).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, Some(3));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_gives_up_at_deadline() {
        let value = poll_until(Duration::from_secs(2), Duration::from_secs(5), || async {
            Ok::<Option<()>, ()>(None)
        })
        .await
        .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_three_empty_polls() {
        let watcher = ScriptedWatcher::new(vec![vec![], vec![], vec![], vec![completed()]]);
        coordinator(watcher.clone(), Duration::from_secs(60))
            .await_run(&stage_run(), sink())
            .await
            .unwrap();

        assert_eq!(watcher.calls.load(Ordering::SeqCst), 4);
        assert!(watcher
            .selectors
            .lock()
            .unwrap()
            .iter()
            .all(|s| s == "launchpad.dev/stage-id=abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_message_is_passed_through() {
        let watcher = ScriptedWatcher::new(vec![vec![running()], vec![failed("buildpack detect failed")]]);
        let err = coordinator(watcher, Duration::from_secs(60))
            .await_run(&stage_run(), sink())
            .await
            .unwrap_err();
        match err {
            StagingError::BuildFailed(message) => assert_eq!(message, "buildpack detect failed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_while_running() {
        let watcher = ScriptedWatcher::new(vec![vec![running()]]);
        let err = coordinator(watcher, Duration::from_secs(3))
            .await_run(&stage_run(), sink())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::TimedOut(t) if t == Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn listing_failure_aborts() {
        let err = coordinator(Arc::new(FailingWatcher), Duration::from_secs(60))
            .await_run(&stage_run(), sink())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Pipeline(m) if m.contains("forbidden")));
    }
}
