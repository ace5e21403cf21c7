//! Pure construction of the three objects an application deploy owns
//!
//! Nothing in here talks to the cluster; the reconciler applies what these
//! functions return.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use launchpad_models::labels::{
    COMPONENT_APPLICATION, LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_NAME, LABEL_PART_OF,
    LABEL_STAGE_ID, MANAGED_BY,
};
use launchpad_models::{AppRef, EnvVariableList, GitRef};
use std::collections::BTreeMap;

/// Port every application container listens on.
pub const APP_PORT: i32 = 8080;

/// Environment variables injected by the platform. User entries with these
/// names are dropped.
pub const ENV_PORT: &str = "PORT";
pub const ENV_APP_NAME: &str = "LAUNCHPAD_APP_NAME";
pub const ENV_APP_ORG: &str = "LAUNCHPAD_APP_ORG";
pub const ENV_STAGE_ID: &str = "LAUNCHPAD_STAGE_ID";

/// Source the workload image was built from, when staged from git.
pub const ANNOTATION_GIT_URL: &str = "launchpad.dev/git-url";
pub const ANNOTATION_GIT_REVISION: &str = "launchpad.dev/git-revision";

const RESERVED_ENV: [&str; 4] = [ENV_PORT, ENV_APP_NAME, ENV_APP_ORG, ENV_STAGE_ID];

/// Everything needed to describe one deploy of an application.
#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub app: AppRef,
    pub git: Option<GitRef>,
    pub route: String,
    pub image: String,
    /// Effective instance count, never negative
    pub instances: i32,
    pub stage_id: Option<String>,
    pub owner: OwnerReference,
    pub environment: EnvVariableList,
}

/// Identity labels shared by all objects of the application.
#[must_use]
pub fn app_labels(app: &AppRef) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), app.name.clone()),
        (LABEL_PART_OF.to_string(), app.org.clone()),
        (LABEL_COMPONENT.to_string(), COMPONENT_APPLICATION.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

fn metadata(spec: &DeploySpec, annotations: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(spec.app.name.clone()),
        namespace: Some(spec.app.org.clone()),
        labels: Some(app_labels(&spec.app)),
        annotations,
        owner_references: Some(vec![spec.owner.clone()]),
        ..ObjectMeta::default()
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn container_env(spec: &DeploySpec) -> Vec<EnvVar> {
    let mut env: Vec<EnvVar> = spec
        .environment
        .iter()
        .filter(|variable| !RESERVED_ENV.contains(&variable.name.as_str()))
        .map(|variable| env_var(&variable.name, &variable.value))
        .collect();

    env.push(env_var(ENV_PORT, &APP_PORT.to_string()));
    env.push(env_var(ENV_APP_NAME, &spec.app.name));
    env.push(env_var(ENV_APP_ORG, &spec.app.org));
    if let Some(stage_id) = &spec.stage_id {
        env.push(env_var(ENV_STAGE_ID, stage_id));
    }
    env
}

/// Workload running `spec.instances` replicas of the application image.
#[must_use]
pub fn build_workload(spec: &DeploySpec) -> Deployment {
    let mut pod_labels = app_labels(&spec.app);
    if let Some(stage_id) = &spec.stage_id {
        pod_labels.insert(LABEL_STAGE_ID.to_string(), stage_id.clone());
    }

    let annotations = spec.git.as_ref().map(|git| {
        BTreeMap::from([
            (ANNOTATION_GIT_URL.to_string(), git.url.clone()),
            (ANNOTATION_GIT_REVISION.to_string(), git.revision.clone()),
        ])
    });

    Deployment {
        metadata: metadata(spec, annotations),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.instances),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    LABEL_NAME.to_string(),
                    spec.app.name.clone(),
                )])),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(spec.app.org.clone()),
                    automount_service_account_token: Some(false),
                    containers: vec![Container {
                        name: spec.app.name.clone(),
                        image: Some(spec.image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: APP_PORT,
                            ..ContainerPort::default()
                        }]),
                        env: Some(container_env(spec)),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        status: None,
    }
}

/// Cluster-internal service in front of the workload.
#[must_use]
pub fn build_service(spec: &DeploySpec, annotations: &BTreeMap<String, String>) -> Service {
    Service {
        metadata: metadata(spec, Some(annotations.clone())),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![ServicePort {
                port: APP_PORT,
                target_port: Some(IntOrString::Int(APP_PORT)),
                protocol: Some("TCP".to_string()),
                ..ServicePort::default()
            }]),
            selector: Some(BTreeMap::from([
                (
                    LABEL_COMPONENT.to_string(),
                    COMPONENT_APPLICATION.to_string(),
                ),
                (LABEL_NAME.to_string(), spec.app.name.clone()),
            ])),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

/// Externally reachable route for `spec.route`, TLS terminated at the edge.
#[must_use]
pub fn build_route(spec: &DeploySpec, annotations: &BTreeMap<String, String>) -> Ingress {
    Ingress {
        metadata: metadata(spec, Some(annotations.clone())),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(spec.route.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: spec.app.name.clone(),
                                port: Some(ServiceBackendPort {
                                    number: Some(APP_PORT),
                                    name: None,
                                }),
                            }),
                            resource: None,
                        },
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![spec.route.clone()]),
                secret_name: Some(format!("{}-tls", spec.route)),
            }]),
            ..IngressSpec::default()
        }),
        status: None,
    }
}
