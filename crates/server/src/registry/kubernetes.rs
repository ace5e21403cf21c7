use super::{env_secret_name, AppRegistry, RegistryError};
use crate::crds::{App, AppSpec};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use launchpad_models::labels::{LABEL_MANAGED_BY, LABEL_NAME, LABEL_PART_OF, MANAGED_BY};
use launchpad_models::{env, AppRef, EnvVariableList};
use std::collections::BTreeMap;
use tracing::debug;

/// [`AppRegistry`] over `App` resources, namespaces and env secrets.
#[derive(Clone)]
pub struct KubeRegistry {
    client: Client,
}

impl KubeRegistry {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apps(&self, org: &str) -> Api<App> {
        Api::namespaced(self.client.clone(), org)
    }
}

#[async_trait]
impl AppRegistry for KubeRegistry {
    async fn owner(&self, app: &AppRef) -> Result<OwnerReference, RegistryError> {
        let resource = self
            .apps(&app.org)
            .get(&app.name)
            .await
            .map_err(|e| RegistryError::from_kube(e, &app.to_string()))?;
        resource
            .owner_reference()
            .ok_or_else(|| RegistryError::Backend(format!("App {app} has no uid")))
    }

    async fn environment(&self, app: &AppRef) -> Result<EnvVariableList, RegistryError> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &app.org);
        let Some(secret) = secrets.get_opt(&env_secret_name(app)).await? else {
            debug!(app = %app, "no environment secret, using empty environment");
            return Ok(EnvVariableList::new());
        };

        let mut values: BTreeMap<String, String> = BTreeMap::new();
        for (name, bytes) in secret.data.unwrap_or_default() {
            values.insert(name, String::from_utf8_lossy(&bytes.0).into_owned());
        }
        for (name, value) in secret.string_data.unwrap_or_default() {
            values.insert(name, value);
        }

        Ok(env::from_map(values))
    }

    async fn exists_org(&self, org: &str) -> Result<bool, RegistryError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        Ok(namespaces.get_opt(org).await?.is_some())
    }

    async fn create(&self, app: &AppRef) -> Result<(), RegistryError> {
        let mut resource = App::new(&app.name, AppSpec::default());
        resource.metadata.labels = Some(BTreeMap::from([
            (LABEL_NAME.to_string(), app.name.clone()),
            (LABEL_PART_OF.to_string(), app.org.clone()),
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
        ]));
        self.apps(&app.org)
            .create(&PostParams::default(), &resource)
            .await
            .map_err(|e| RegistryError::from_kube(e, &app.to_string()))?;
        Ok(())
    }

    async fn list(&self, org: &str) -> Result<Vec<AppRef>, RegistryError> {
        let list = self.apps(org).list(&ListParams::default()).await?;
        let mut apps: Vec<AppRef> = list
            .items
            .iter()
            .map(|resource| AppRef::new(resource.name_any(), org))
            .collect();
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    async fn delete(&self, app: &AppRef) -> Result<(), RegistryError> {
        self.apps(&app.org)
            .delete(&app.name, &DeleteParams::foreground())
            .await
            .map_err(|e| RegistryError::from_kube(e, &app.to_string()))?;
        Ok(())
    }
}
