use super::{matches_selector, PipelineError, PipelineStore};
use async_trait::async_trait;
use launchpad_models::PipelineRun;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory [`PipelineStore`], runs keyed by name.
#[derive(Debug, Default)]
pub struct MemoryPipelines {
    runs: RwLock<BTreeMap<String, Value>>,
}

impl MemoryPipelines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw manifest of a stored run.
    pub async fn manifest(&self, name: &str) -> Option<Value> {
        self.runs.read().await.get(name).cloned()
    }

    /// Number of stored runs.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelines {
    async fn list(&self, selector: &str) -> Result<Vec<PipelineRun>, PipelineError> {
        let runs = self.runs.read().await;
        let mut matching = Vec::new();
        for manifest in runs.values() {
            let run: PipelineRun = serde_json::from_value(manifest.clone())
                .map_err(|e| PipelineError::Invalid(e.to_string()))?;
            if matches_selector(&run.metadata.labels, selector) {
                matching.push(run);
            }
        }
        Ok(matching)
    }

    async fn create(&self, manifest: Value) -> Result<(), PipelineError> {
        let name = manifest["metadata"]["name"]
            .as_str()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PipelineError::Invalid("metadata.name is required".into()))?
            .to_string();

        let mut runs = self.runs.write().await;
        if runs.contains_key(&name) {
            return Err(PipelineError::Invalid(format!("{name} already exists")));
        }
        runs.insert(name, manifest);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PipelineError> {
        self.runs
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }
}
