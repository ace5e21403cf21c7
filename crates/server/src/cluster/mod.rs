//! Access to the namespaced objects a deploy converges
//!
//! The reconciler only needs `get`, `create` and `replace` keyed by
//! namespace and name. [`KubeCluster`] talks to the API server,
//! [`MemoryCluster`] keeps objects in memory with the API server's
//! bookkeeping rules for tests.

mod kubernetes;
mod memory;

pub use kubernetes::KubeCluster;
pub use memory::MemoryCluster;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency failure, the write raced another writer.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cluster API error ({code}): {message}")]
    Api { code: u16, message: String },
}

impl ClusterError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(ae.message)
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            kube::Error::Api(ae) => Self::Api {
                code: ae.code,
                message: ae.message,
            },
            other => Self::Api {
                code: 500,
                message: other.to_string(),
            },
        }
    }
}

/// Namespaced get/create/replace of one object kind.
#[async_trait]
pub trait ResourceClient<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, ClusterError>;

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ClusterError>;

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ClusterError>;
}

/// Every kind a deploy writes.
pub trait ClusterApi:
    ResourceClient<Deployment> + ResourceClient<Service> + ResourceClient<Ingress>
{
}

impl<T> ClusterApi for T where
    T: ResourceClient<Deployment> + ResourceClient<Service> + ResourceClient<Ingress>
{
}
