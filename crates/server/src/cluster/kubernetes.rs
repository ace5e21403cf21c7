use super::{ClusterError, ResourceClient};
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Client, Resource};
use k8s_openapi::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// [`ResourceClient`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K> ResourceClient<K> for KubeCluster
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, ClusterError> {
        Ok(self.api::<K>(namespace).get(name).await?)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ClusterError> {
        Ok(self
            .api::<K>(namespace)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ClusterError> {
        Ok(self
            .api::<K>(namespace)
            .replace(name, &PostParams::default(), object)
            .await?)
    }
}
