//! Registered applications and their runtime environment
//!
//! An application exists once an `App` resource is present in the
//! organization namespace; its environment lives in the `<app>-env` secret.

mod kubernetes;
mod memory;

pub use kubernetes::KubeRegistry;
pub use memory::MemoryRegistry;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use launchpad_models::{AppRef, EnvVariableList};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("registry backend unavailable: {0}")]
    Backend(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl RegistryError {
    /// Classify API server not-found and already-exists statuses.
    pub(crate) fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(what.to_string()),
            kube::Error::Api(ae) if ae.code == 409 => Self::AlreadyExists(what.to_string()),
            other => Self::Kube(other),
        }
    }
}

#[async_trait]
pub trait AppRegistry: Send + Sync {
    /// Owner reference every object of the application points at.
    async fn owner(&self, app: &AppRef) -> Result<OwnerReference, RegistryError>;

    /// Environment variables of the application, sorted by name.
    async fn environment(&self, app: &AppRef) -> Result<EnvVariableList, RegistryError>;

    async fn exists_org(&self, org: &str) -> Result<bool, RegistryError>;

    async fn create(&self, app: &AppRef) -> Result<(), RegistryError>;

    /// Names of the applications registered in an organization.
    async fn list(&self, org: &str) -> Result<Vec<AppRef>, RegistryError>;

    async fn delete(&self, app: &AppRef) -> Result<(), RegistryError>;
}

/// Name of the secret holding an application's environment.
#[must_use]
pub fn env_secret_name(app: &AppRef) -> String {
    format!("{}-env", app.name)
}
