use super::{AppRegistry, RegistryError};
use async_trait::async_trait;
use crate::crds::{App, AppSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use launchpad_models::{env, AppRef, EnvVariableList};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    orgs: BTreeSet<String>,
    /// app -> uid of its `App` resource
    apps: BTreeMap<(String, String), String>,
    environments: BTreeMap<(String, String), BTreeMap<String, String>>,
}

/// In-memory [`AppRegistry`].
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
    serial: AtomicU64,
    unavailable: AtomicBool,
}

fn key(app: &AppRef) -> (String, String) {
    (app.org.clone(), app.name.clone())
}

impl MemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_org(&self, org: &str) {
        self.state.write().await.orgs.insert(org.to_string());
    }

    /// Register an application, creating its organization when needed.
    pub async fn add_app(&self, app: &AppRef) {
        let uid = format!("app-uid-{}", self.serial.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.state.write().await;
        state.orgs.insert(app.org.clone());
        state.apps.insert(key(app), uid);
    }

    pub async fn set_env(&self, app: &AppRef, name: &str, value: &str) {
        self.state
            .write()
            .await
            .environments
            .entry(key(app))
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    /// Make every call fail as if the backend could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RegistryError::Backend("registry unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AppRegistry for MemoryRegistry {
    async fn owner(&self, app: &AppRef) -> Result<OwnerReference, RegistryError> {
        self.check()?;
        let state = self.state.read().await;
        let uid = state
            .apps
            .get(&key(app))
            .ok_or_else(|| RegistryError::NotFound(app.to_string()))?;
        let mut resource = App::new(&app.name, AppSpec::default());
        resource.metadata.uid = Some(uid.clone());
        resource
            .owner_reference()
            .ok_or_else(|| RegistryError::Backend(format!("{app} has no uid")))
    }

    async fn environment(&self, app: &AppRef) -> Result<EnvVariableList, RegistryError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(env::from_map(
            state.environments.get(&key(app)).cloned().unwrap_or_default(),
        ))
    }

    async fn exists_org(&self, org: &str) -> Result<bool, RegistryError> {
        self.check()?;
        Ok(self.state.read().await.orgs.contains(org))
    }

    async fn create(&self, app: &AppRef) -> Result<(), RegistryError> {
        self.check()?;
        if self.state.read().await.apps.contains_key(&key(app)) {
            return Err(RegistryError::AlreadyExists(app.to_string()));
        }
        self.add_app(app).await;
        Ok(())
    }

    async fn list(&self, org: &str) -> Result<Vec<AppRef>, RegistryError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .apps
            .keys()
            .filter(|(app_org, _)| app_org == org)
            .map(|(app_org, name)| AppRef::new(name.clone(), app_org.clone()))
            .collect())
    }

    async fn delete(&self, app: &AppRef) -> Result<(), RegistryError> {
        self.check()?;
        let mut state = self.state.write().await;
        state
            .apps
            .remove(&key(app))
            .ok_or_else(|| RegistryError::NotFound(app.to_string()))?;
        state.environments.remove(&key(app));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn environment_is_sorted_by_name() {
        let registry = MemoryRegistry::new();
        let app = AppRef::new("web", "workspace");
        registry.add_app(&app).await;
        registry.set_env(&app, "ZED", "1").await;
        registry.set_env(&app, "ALPHA", "2").await;

        let names: Vec<String> = registry
            .environment(&app)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["ALPHA", "ZED"]);
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let registry = MemoryRegistry::new();
        let app = AppRef::new("web", "workspace");
        registry.create(&app).await.unwrap();
        assert!(matches!(
            registry.create(&app).await,
            Err(RegistryError::AlreadyExists(_))
        ));
        assert!(registry.exists_org("workspace").await.unwrap());
    }

    #[tokio::test]
    async fn unknown_app_has_no_owner() {
        let registry = MemoryRegistry::new();
        let err = registry
            .owner(&AppRef::new("web", "workspace"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
