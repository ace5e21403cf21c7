//! `App` Custom Resource Definition
//!
//! An `App` registers an application within an organization namespace. It
//! carries no desired state of its own; the workload, service and route of
//! the application are owned by it so the orchestrator collects them when the
//! `App` is deleted.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "apps.launchpad.dev", version = "v1", kind = "App")]
#[kube(namespaced)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct AppSpec {}

impl App {
    /// Plain back-link to this resource, or `None` before the API server
    /// assigned a uid.
    #[must_use]
    pub fn owner_reference(&self) -> Option<OwnerReference> {
        let uid = self.uid()?;
        Some(OwnerReference {
            api_version: App::api_version(&()).into_owned(),
            kind: App::kind(&()).into_owned(),
            name: self.name_any(),
            uid,
            controller: None,
            block_owner_deletion: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_reference_requires_uid() {
        let mut app = App::new("web", AppSpec::default());
        assert!(app.owner_reference().is_none());

        app.metadata.uid = Some("1234".into());
        let owner = app.owner_reference().unwrap();
        assert_eq!(owner.api_version, "apps.launchpad.dev/v1");
        assert_eq!(owner.kind, "App");
        assert_eq!(owner.name, "web");
        assert_eq!(owner.uid, "1234");
        assert_eq!(owner.controller, None);
        assert_eq!(owner.block_owner_deletion, None);
    }
}
