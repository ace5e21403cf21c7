//! Pipeline runs of the staging engine
//!
//! Runs are created by [`Stager`](crate::staging::Stager) and garbage
//! collected here once a newer stage of the same application is deployed.

mod kubernetes;
mod memory;

pub use kubernetes::KubePipelines;
pub use memory::MemoryPipelines;

use async_trait::async_trait;
use launchpad_models::labels::app_selector;
use launchpad_models::{AppRef, PipelineRun};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline run {0} not found")]
    NotFound(String),

    #[error("invalid pipeline run: {0}")]
    Invalid(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Pipeline runs of the staging namespace.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Runs matching an equality label selector (`k=v,k2=v2`).
    async fn list(&self, selector: &str) -> Result<Vec<PipelineRun>, PipelineError>;

    async fn create(&self, manifest: Value) -> Result<(), PipelineError>;

    async fn delete(&self, name: &str) -> Result<(), PipelineError>;
}

/// Remove the runs of an application except the one of `keep`.
///
/// Runs already gone when deleted are skipped. Returns how many runs were
/// deleted.
pub async fn unstage(
    store: &dyn PipelineStore,
    app: &AppRef,
    keep: Option<&str>,
) -> Result<usize, PipelineError> {
    let runs = store.list(&app_selector(app)).await?;
    let mut deleted = 0;

    for run in runs {
        if keep.is_some() && run.stage_id() == keep {
            continue;
        }
        let Some(name) = run.name() else {
            continue;
        };
        match store.delete(name).await {
            Ok(()) => deleted += 1,
            Err(PipelineError::NotFound(_)) => {
                debug!(run = name, "pipeline run already removed");
            }
            Err(e) => return Err(e),
        }
    }

    if deleted > 0 {
        info!(app = %app, deleted, "removed previous pipeline runs");
    }
    Ok(deleted)
}

/// Whether `labels` satisfy an equality selector.
pub(crate) fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term.trim()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_models::labels::{LABEL_NAME, LABEL_PART_OF, LABEL_STAGE_ID};
    use serde_json::json;

    fn run(name: &str, app: &AppRef) -> Value {
        json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {
                "name": name,
                "labels": {
                    LABEL_NAME: app.name,
                    LABEL_PART_OF: app.org,
                    LABEL_STAGE_ID: name,
                }
            }
        })
    }

    #[test]
    fn selector_matching() {
        let labels = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert!(matches_selector(&labels, "a=1"));
        assert!(matches_selector(&labels, "a=1,b=2"));
        assert!(!matches_selector(&labels, "a=1,b=3"));
        assert!(matches_selector(&labels, "b"));
        assert!(!matches_selector(&labels, "c"));
    }

    #[tokio::test]
    async fn unstage_keeps_current_run_only() {
        let store = MemoryPipelines::new();
        let app = AppRef::new("web", "workspace");
        let other = AppRef::new("api", "workspace");
        store.create(run("old1", &app)).await.unwrap();
        store.create(run("old2", &app)).await.unwrap();
        store.create(run("current", &app)).await.unwrap();
        store.create(run("foreign", &other)).await.unwrap();

        let deleted = unstage(&store, &app, Some("current")).await.unwrap();
        assert_eq!(deleted, 2);

        let left: Vec<String> = store
            .list("")
            .await
            .unwrap()
            .iter()
            .filter_map(|r| r.name().map(str::to_string))
            .collect();
        assert_eq!(left, vec!["current", "foreign"]);
    }

    #[tokio::test]
    async fn unstage_without_keep_removes_all_runs_of_app() {
        let store = MemoryPipelines::new();
        let app = AppRef::new("web", "workspace");
        store.create(run("one", &app)).await.unwrap();
        store.create(run("two", &app)).await.unwrap();

        assert_eq!(unstage(&store, &app, None).await.unwrap(), 2);
        assert!(store.list("").await.unwrap().is_empty());
    }
}
