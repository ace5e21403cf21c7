//! Deploy reconciler
//!
//! Converges the workload, service and route of an application onto the
//! requested image and scale. Every write is create-or-update, so applying the
//! same request twice leaves the cluster unchanged apart from resource
//! versions.

use crate::builders::{build_route, build_service, build_workload, DeploySpec};
use crate::cluster::{ClusterApi, ClusterError, ResourceClient};
use crate::config::ServerConfig;
use crate::error::{DeployError, Result};
use crate::pipeline::{self, PipelineStore};
use crate::registry::{AppRegistry, RegistryError};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use lazy_static::lazy_static;
use launchpad_models::error::{INSTANCES_INVALID, NAME_MISMATCH, ORG_MISMATCH};
use launchpad_models::labels::LABEL_STAGE_ID;
use launchpad_models::{App, AppList, AppRef, DeployRequest};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Scale used when neither the request nor an existing workload names one.
pub const DEFAULT_INSTANCES: i32 = 1;

lazy_static! {
    /// RFC 1123 label
    static ref APP_NAME_RE: Regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap();
}

/// Fields the API server assigns and a replace must carry over.
pub trait ClusterAssigned {
    fn carry_from(&mut self, current: &Self);
}

impl ClusterAssigned for Deployment {
    fn carry_from(&mut self, current: &Self) {
        self.metadata.resource_version = current.metadata.resource_version.clone();
    }
}

impl ClusterAssigned for Ingress {
    fn carry_from(&mut self, current: &Self) {
        self.metadata.resource_version = current.metadata.resource_version.clone();
    }
}

impl ClusterAssigned for Service {
    fn carry_from(&mut self, current: &Self) {
        self.metadata.resource_version = current.metadata.resource_version.clone();
        if let (Some(desired), Some(assigned)) = (self.spec.as_mut(), current.spec.as_ref()) {
            desired.cluster_ip = assigned.cluster_ip.clone();
            desired.cluster_ips = assigned.cluster_ips.clone();
        }
    }
}

/// Create `desired`, or replace the existing object keeping its cluster-assigned fields.
async fn create_or_update<K, C>(
    client: &C,
    namespace: &str,
    mut desired: K,
) -> std::result::Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + ClusterAssigned + Send + Sync + 'static,
    C: ResourceClient<K> + ?Sized,
{
    match client.create(namespace, &desired).await {
        Ok(created) => Ok(created),
        Err(ClusterError::AlreadyExists(_)) => {
            let name = desired.name_any();
            let current = client.get(namespace, &name).await?;
            desired.carry_from(&current);
            debug!(kind = %K::kind(&()), name = %name, "updating existing object");
            client.replace(namespace, &name, &desired).await
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn validate_identity(path_app: &AppRef, body_app: &AppRef) -> Result<()> {
    if path_app.name != body_app.name {
        return Err(DeployError::validation(NAME_MISMATCH));
    }
    if path_app.org != body_app.org {
        return Err(DeployError::validation(ORG_MISMATCH));
    }
    Ok(())
}

fn validate_instances(instances: Option<i32>) -> Result<Option<i32>> {
    match instances {
        Some(n) if n < 0 => Err(DeployError::validation(INSTANCES_INVALID)),
        other => Ok(other),
    }
}

pub fn validate_app_name(name: &str) -> Result<()> {
    if name.len() > 63 || !APP_NAME_RE.is_match(name) {
        return Err(DeployError::Validation {
            title: "invalid application name".to_string(),
            details: format!(
                "'{name}' must consist of lower case alphanumeric characters or '-', \
                 start and end with an alphanumeric character and be at most 63 characters"
            ),
        });
    }
    Ok(())
}

/// Convert a registry failure, mapping a missing entry to `not_found`.
pub(crate) fn registry_error(
    err: RegistryError,
    not_found: DeployError,
    context: &str,
) -> DeployError {
    match err {
        RegistryError::NotFound(_) => not_found,
        other => DeployError::infra(context, other),
    }
}

pub struct Deployer {
    cluster: Arc<dyn ClusterApi>,
    registry: Arc<dyn AppRegistry>,
    pipelines: Arc<dyn PipelineStore>,
    config: Arc<ServerConfig>,
}

impl Deployer {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        registry: Arc<dyn AppRegistry>,
        pipelines: Arc<dyn PipelineStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            cluster,
            registry,
            pipelines,
            config,
        }
    }

    /// Converge the application onto the requested image and scale.
    #[instrument(skip(self, request), fields(app = %path_app))]
    pub async fn deploy(&self, path_app: &AppRef, request: DeployRequest) -> Result<()> {
        validate_identity(path_app, &request.app)?;
        let requested = validate_instances(request.instances)?;

        let owner = self.owner(&request.app).await?;

        let instances = match requested {
            Some(n) => n,
            None => self.current_instances(&request.app).await?,
        };

        let environment = self
            .registry
            .environment(&request.app)
            .await
            .map_err(|e| DeployError::infra("failed to access application runtime environment", e))?;

        let route = if request.route.is_empty() {
            self.config.default_route(&request.app.name)
        } else {
            request.route.clone()
        };

        let spec = DeploySpec {
            app: request.app.clone(),
            git: request.git.clone(),
            route,
            image: request.image_url.clone(),
            instances,
            stage_id: request.stage.id().map(str::to_string),
            owner,
            environment,
        };

        info!(
            image = %spec.image,
            instances = spec.instances,
            route = %spec.route,
            stage_id = spec.stage_id.as_deref().unwrap_or(""),
            "deploying application"
        );

        let namespace = spec.app.org.as_str();
        let annotations = &self.config.ingress.annotations;

        create_or_update(&*self.cluster, namespace, build_workload(&spec))
            .await
            .map_err(|e| DeployError::infra("failed to apply workload", e))?;
        create_or_update(&*self.cluster, namespace, build_service(&spec, annotations))
            .await
            .map_err(|e| DeployError::infra("failed to apply service", e))?;
        create_or_update(&*self.cluster, namespace, build_route(&spec, annotations))
            .await
            .map_err(|e| DeployError::infra("failed to apply route", e))?;

        if let Some(stage_id) = spec.stage_id.as_deref() {
            pipeline::unstage(&*self.pipelines, &spec.app, Some(stage_id))
                .await
                .map_err(|e| DeployError::infra("failed to remove previous pipeline runs", e))?;
        }

        info!("application deployed");
        Ok(())
    }

    /// Change the replica count of an already deployed application.
    #[instrument(skip(self), fields(app = %app))]
    pub async fn update_instances(&self, app: &AppRef, instances: i32) -> Result<()> {
        if instances < 0 {
            return Err(DeployError::validation(INSTANCES_INVALID));
        }
        self.owner(app).await?;

        let mut workload: Deployment =
            match ResourceClient::<Deployment>::get(&*self.cluster, &app.org, &app.name).await {
                Ok(workload) => workload,
                Err(ClusterError::NotFound(_)) => return Err(DeployError::AppNotKnown(app.clone())),
                Err(e) => return Err(DeployError::infra("failed to read workload", e)),
            };

        let Some(spec) = workload.spec.as_mut() else {
            return Err(DeployError::infra(
                "failed to scale workload",
                anyhow::anyhow!("deployment {} has no spec", app.name),
            ));
        };
        spec.replicas = Some(instances);

        ResourceClient::<Deployment>::replace(&*self.cluster, &app.org, &app.name, &workload)
            .await
            .map_err(|e| DeployError::infra("failed to scale workload", e))?;

        info!(instances, "application scaled");
        Ok(())
    }

    /// Current status of one application.
    pub async fn show(&self, app: &AppRef) -> Result<App> {
        self.ensure_org(&app.org).await?;
        self.owner(app).await?;
        self.status(app).await
    }

    /// Status of every application registered in an organization.
    pub async fn list(&self, org: &str) -> Result<AppList> {
        self.ensure_org(org).await?;
        let apps = self
            .registry
            .list(org)
            .await
            .map_err(|e| DeployError::infra("failed to list applications", e))?;

        let mut list = AppList::with_capacity(apps.len());
        for app in &apps {
            list.push(self.status(app).await?);
        }
        Ok(list)
    }

    /// Register a new application.
    #[instrument(skip(self))]
    pub async fn create(&self, org: &str, name: &str) -> Result<()> {
        validate_app_name(name)?;
        self.ensure_org(org).await?;

        let app = AppRef::new(name, org);
        match self.registry.create(&app).await {
            Ok(()) => {
                info!(app = %app, "application registered");
                Ok(())
            }
            Err(RegistryError::AlreadyExists(_)) => Err(DeployError::AppAlreadyKnown(app)),
            Err(e) => Err(DeployError::infra("failed to register application", e)),
        }
    }

    /// Unregister an application and drop all its pipeline runs.
    ///
    /// The workload, service and route are owned by the `App` resource and
    /// are collected by the orchestrator.
    #[instrument(skip(self), fields(app = %app))]
    pub async fn delete(&self, app: &AppRef) -> Result<()> {
        self.ensure_org(&app.org).await?;
        self.registry.delete(app).await.map_err(|e| {
            registry_error(e, DeployError::AppNotKnown(app.clone()), "failed to delete application")
        })?;

        pipeline::unstage(&*self.pipelines, app, None)
            .await
            .map_err(|e| DeployError::infra("failed to remove pipeline runs", e))?;

        info!("application deleted");
        Ok(())
    }

    /// Fail with `AppNotKnown` unless the application is registered.
    pub async fn ensure_known(&self, app: &AppRef) -> Result<()> {
        self.owner(app).await.map(|_| ())
    }

    async fn owner(&self, app: &AppRef) -> Result<OwnerReference> {
        self.registry.owner(app).await.map_err(|e| {
            registry_error(e, DeployError::AppNotKnown(app.clone()), "failed to resolve application owner")
        })
    }

    async fn ensure_org(&self, org: &str) -> Result<()> {
        match self.registry.exists_org(org).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DeployError::OrgNotKnown(org.to_string())),
            Err(e) => Err(DeployError::infra("failed to look up organization", e)),
        }
    }

    /// Replica count of the existing workload, or the default for a first deploy.
    async fn current_instances(&self, app: &AppRef) -> Result<i32> {
        match ResourceClient::<Deployment>::get(&*self.cluster, &app.org, &app.name).await {
            Ok(workload) => Ok(workload
                .spec
                .and_then(|spec| spec.replicas)
                .unwrap_or(DEFAULT_INSTANCES)),
            Err(ClusterError::NotFound(_)) => Ok(DEFAULT_INSTANCES),
            Err(e) => Err(DeployError::infra("failed to read current instances", e)),
        }
    }

    async fn status(&self, app: &AppRef) -> Result<App> {
        let mut view = App {
            name: app.name.clone(),
            organization: app.org.clone(),
            status: String::new(),
            route: String::new(),
            stage_id: String::new(),
            active: false,
        };

        match ResourceClient::<Deployment>::get(&*self.cluster, &app.org, &app.name).await {
            Ok(workload) => {
                let desired = workload
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(DEFAULT_INSTANCES);
                let ready = workload
                    .status
                    .as_ref()
                    .and_then(|status| status.ready_replicas)
                    .unwrap_or(0);
                view.status = App::status_string(ready, desired);
                view.active = true;
                view.stage_id = workload
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.template.metadata.as_ref())
                    .and_then(|meta| meta.labels.as_ref())
                    .and_then(|labels| labels.get(LABEL_STAGE_ID))
                    .cloned()
                    .unwrap_or_default();
            }
            Err(ClusterError::NotFound(_)) => {
                debug!(app = %app, "application has no workload");
            }
            Err(e) => return Err(DeployError::infra("failed to read workload", e)),
        }

        match ResourceClient::<Ingress>::get(&*self.cluster, &app.org, &app.name).await {
            Ok(route) => {
                view.route = route
                    .spec
                    .and_then(|spec| spec.rules)
                    .and_then(|rules| rules.into_iter().find_map(|rule| rule.host))
                    .unwrap_or_default();
            }
            Err(ClusterError::NotFound(_)) => {}
            Err(e) => warn!(app = %app, error = %e, "failed to read route"),
        }

        Ok(view)
    }
}
