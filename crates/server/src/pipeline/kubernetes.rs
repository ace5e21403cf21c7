use super::{PipelineError, PipelineStore};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use launchpad_models::pipeline::{API_VERSION, GROUP, KIND, PLURAL, VERSION};
use launchpad_models::PipelineRun;
use serde_json::Value;

/// Tekton `PipelineRun` API resource definition.
fn pipeline_run_api() -> ApiResource {
    ApiResource {
        group: GROUP.to_string(),
        version: VERSION.to_string(),
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        plural: PLURAL.to_string(),
    }
}

/// [`PipelineStore`] over the pipeline engine's custom resources.
#[derive(Clone)]
pub struct KubePipelines {
    api: Api<DynamicObject>,
}

impl KubePipelines {
    #[must_use]
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced_with(client, namespace, &pipeline_run_api()),
        }
    }
}

fn to_run(object: &DynamicObject) -> Result<PipelineRun, PipelineError> {
    let value = serde_json::to_value(object).map_err(|e| PipelineError::Invalid(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| PipelineError::Invalid(e.to_string()))
}

#[async_trait]
impl PipelineStore for KubePipelines {
    async fn list(&self, selector: &str) -> Result<Vec<PipelineRun>, PipelineError> {
        let list = self.api.list(&ListParams::default().labels(selector)).await?;
        list.items.iter().map(to_run).collect()
    }

    async fn create(&self, manifest: Value) -> Result<(), PipelineError> {
        let object: DynamicObject =
            serde_json::from_value(manifest).map_err(|e| PipelineError::Invalid(e.to_string()))?;
        self.api.create(&PostParams::default(), &object).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PipelineError> {
        match self.api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(PipelineError::NotFound(name.into())),
            Err(e) => Err(e.into()),
        }
    }
}
