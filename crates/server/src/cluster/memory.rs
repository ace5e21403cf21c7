use super::{ClusterError, ResourceClient};
use async_trait::async_trait;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// (kind, namespace, name)
type ObjectKey = (String, String, String);

/// In-memory [`ResourceClient`] for every kind.
///
/// Mirrors the API server rules a reconciler depends on: creating an existing
/// object fails with `AlreadyExists`, a replace carrying a stale
/// `resourceVersion` fails with `Conflict`, services get a cluster IP on
/// create and reject replaces that change or drop it.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    objects: RwLock<BTreeMap<ObjectKey, Value>>,
    serial: AtomicU64,
    writes: AtomicUsize,
}

fn key<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::kind(&()).into_owned(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn codec(err: serde_json::Error) -> ClusterError {
    ClusterError::Api {
        code: 500,
        message: err.to_string(),
    }
}

fn invalid(message: impl Into<String>) -> ClusterError {
    ClusterError::Api {
        code: 422,
        message: message.into(),
    }
}

fn text(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

impl MemoryCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful creates and replaces so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored object, if any.
    pub async fn object<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let objects = self.objects.read().await;
        objects
            .get(&key::<K>(namespace, name))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Overwrite the status of a stored object, as a controller would.
    pub async fn set_status<K>(&self, namespace: &str, name: &str, status: Value) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        let mut objects = self.objects.write().await;
        match objects.get_mut(&key::<K>(namespace, name)) {
            Some(value) => {
                value["status"] = status;
                true
            }
            None => false,
        }
    }

    fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl<K> ResourceClient<K> for MemoryCluster
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, ClusterError> {
        let objects = self.objects.read().await;
        let value = objects
            .get(&key::<K>(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("{} \"{name}\"", K::kind(&()))))?;
        serde_json::from_value(value.clone()).map_err(codec)
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, ClusterError> {
        let kind = K::kind(&());
        let mut value = serde_json::to_value(object).map_err(codec)?;
        let name = text(&value["metadata"]["name"])
            .ok_or_else(|| invalid("metadata.name: Required value"))?
            .to_string();

        let mut objects = self.objects.write().await;
        let key = key::<K>(namespace, &name);
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "{kind} \"{name}\" already exists"
            )));
        }

        let serial = self.next_serial();
        value["metadata"]["namespace"] = json!(namespace);
        value["metadata"]["resourceVersion"] = json!(serial.to_string());
        value["metadata"]["uid"] = json!(format!("uid-{serial}"));
        if kind == "Service" && text(&value["spec"]["clusterIP"]).is_none() {
            let ip = format!("10.43.{}.{}", serial / 256, serial % 256);
            value["spec"]["clusterIP"] = json!(ip);
            value["spec"]["clusterIPs"] = json!([ip]);
        }

        let stored = serde_json::from_value(value.clone()).map_err(codec)?;
        objects.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, ClusterError> {
        let kind = K::kind(&());
        let mut value = serde_json::to_value(object).map_err(codec)?;

        let mut objects = self.objects.write().await;
        let key = key::<K>(namespace, name);
        let current = objects
            .get(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} \"{name}\"")))?;

        if let Some(version) = text(&value["metadata"]["resourceVersion"]) {
            if Some(version) != text(&current["metadata"]["resourceVersion"]) {
                return Err(ClusterError::Conflict(format!(
                    "Operation cannot be fulfilled on {kind} \"{name}\": the object has been modified"
                )));
            }
        }

        if kind == "Service" {
            let assigned = text(&current["spec"]["clusterIP"]);
            let requested = text(&value["spec"]["clusterIP"]);
            if requested != assigned {
                return Err(invalid(format!(
                    "Service \"{name}\" is invalid: spec.clusterIP: Invalid value: \"{}\": field is immutable",
                    requested.unwrap_or_default()
                )));
            }
        }

        value["metadata"]["namespace"] = json!(namespace);
        value["metadata"]["uid"] = current["metadata"]["uid"].clone();
        value["metadata"]["resourceVersion"] = json!(self.next_serial().to_string());
        if value["status"].is_null() {
            value["status"] = current["status"].clone();
        }

        let stored = serde_json::from_value(value.clone()).map_err(codec)?;
        objects.insert(key, value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn service(cluster_ip: Option<&str>, version: Option<&str>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".into()),
                resource_version: version.map(Into::into),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(Into::into),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        }
    }

    #[tokio::test]
    async fn create_assigns_cluster_fields() {
        let cluster = MemoryCluster::new();
        let created = ResourceClient::<Service>::create(&cluster, "workspace", &service(None, None))
            .await
            .unwrap();

        let spec = created.spec.unwrap();
        assert!(spec.cluster_ip.is_some());
        assert_eq!(spec.cluster_ips.unwrap().len(), 1);
        assert!(created.metadata.resource_version.is_some());
        assert_eq!(created.metadata.namespace.as_deref(), Some("workspace"));
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let cluster = MemoryCluster::new();
        ResourceClient::<Service>::create(&cluster, "workspace", &service(None, None))
            .await
            .unwrap();
        let err = ResourceClient::<Service>::create(&cluster, "workspace", &service(None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists(_)));
        assert_eq!(cluster.writes(), 1);
    }

    #[tokio::test]
    async fn replace_rejects_stale_version_and_dropped_ip() {
        let cluster = MemoryCluster::new();
        let created = ResourceClient::<Service>::create(&cluster, "workspace", &service(None, None))
            .await
            .unwrap();
        let ip = created.spec.as_ref().and_then(|s| s.cluster_ip.clone());

        let stale = service(ip.as_deref(), Some("999"));
        let err = ResourceClient::<Service>::replace(&cluster, "workspace", "web", &stale)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Conflict(_)));

        let dropped = service(None, created.metadata.resource_version.as_deref());
        let err = ResourceClient::<Service>::replace(&cluster, "workspace", "web", &dropped)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Api { code: 422, .. }));

        let carried = service(ip.as_deref(), created.metadata.resource_version.as_deref());
        let replaced = ResourceClient::<Service>::replace(&cluster, "workspace", "web", &carried)
            .await
            .unwrap();
        assert_ne!(
            replaced.metadata.resource_version,
            created.metadata.resource_version
        );
        assert_eq!(replaced.metadata.uid, created.metadata.uid);
    }

    #[tokio::test]
    async fn replace_missing_is_not_found() {
        let cluster = MemoryCluster::new();
        let err = ResourceClient::<Service>::replace(&cluster, "workspace", "web", &service(None, None))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
