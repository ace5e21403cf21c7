//! Server Configuration
//!
//! Loaded once at startup from a mounted YAML file. Every section has
//! defaults so a partial file is enough to run against a development cluster.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// Default location of the mounted configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";

/// Main server configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen_address", rename = "listenAddress")]
    pub listen_address: String,

    /// Wildcard domain used to derive routes (`<app>.<domain>`)
    #[serde(default)]
    pub domain: String,

    /// Staging pipeline configuration
    #[serde(default)]
    pub staging: StagingConfig,

    /// Ingress configuration
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Log tailing configuration
    #[serde(default)]
    pub logs: LogsConfig,
}

/// Staging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StagingConfig {
    /// Namespace pipeline runs are created in
    #[serde(default = "default_staging_namespace")]
    pub namespace: String,

    /// Name of the pipeline every run references
    #[serde(default = "default_pipeline_name", rename = "pipelineName")]
    pub pipeline_name: String,

    /// Service account the pipeline runs as
    #[serde(default = "default_service_account", rename = "serviceAccountName")]
    pub service_account_name: String,

    /// Registry the pipeline pushes built images to
    #[serde(default = "default_registry")]
    pub registry: String,

    /// Size of the per-run source workspace
    #[serde(default = "default_workspace_size", rename = "workspaceSize")]
    pub workspace_size: String,
}

/// Ingress configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngressConfig {
    /// Annotations put on every service and route for TLS termination at the edge
    #[serde(default = "default_ingress_annotations")]
    pub annotations: BTreeMap<String, String>,
}

/// Log tailing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogsConfig {
    /// How long the server waits for the client's close reply
    #[serde(default = "default_close_grace_seconds", rename = "closeGraceSeconds")]
    pub close_grace_seconds: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:8030".to_string()
}

fn default_staging_namespace() -> String {
    "launchpad-staging".to_string()
}

fn default_pipeline_name() -> String {
    "staging-pipeline".to_string()
}

fn default_service_account() -> String {
    "staging-triggers-admin".to_string()
}

fn default_registry() -> String {
    "registry.launchpad-registry.svc.cluster.local:5000".to_string()
}

fn default_workspace_size() -> String {
    "1Gi".to_string()
}

fn default_ingress_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "traefik.ingress.kubernetes.io/router.entrypoints".to_string(),
            "websecure".to_string(),
        ),
        (
            "traefik.ingress.kubernetes.io/router.tls".to_string(),
            "true".to_string(),
        ),
    ])
}

fn default_close_grace_seconds() -> u64 {
    2
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            namespace: default_staging_namespace(),
            pipeline_name: default_pipeline_name(),
            service_account_name: default_service_account(),
            registry: default_registry(),
            workspace_size: default_workspace_size(),
        }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            annotations: default_ingress_annotations(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            close_grace_seconds: default_close_grace_seconds(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            domain: String::new(),
            staging: StagingConfig::default(),
            ingress: IngressConfig::default(),
            logs: LogsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from mounted `ConfigMap` file
    pub fn from_mounted_file(config_path: &str) -> Result<Self, anyhow::Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;

        let config: ServerConfig = serde_yaml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))?;

        Ok(config)
    }

    /// Apply `LAUNCHPAD_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(domain) = std::env::var("LAUNCHPAD_DOMAIN") {
            self.domain = domain;
        }
        if let Ok(address) = std::env::var("LAUNCHPAD_LISTEN_ADDRESS") {
            self.listen_address = address;
        }
        if let Ok(registry) = std::env::var("LAUNCHPAD_REGISTRY") {
            self.staging.registry = registry;
        }
    }

    /// Validate that the configuration can serve requests
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            anyhow::anyhow!("listenAddress '{}' is not a socket address: {e}", self.listen_address)
        })?;

        if self.domain.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "domain is not configured. Set domain in the config file or LAUNCHPAD_DOMAIN."
            ));
        }

        for (key, value) in [
            ("staging.namespace", &self.staging.namespace),
            ("staging.pipelineName", &self.staging.pipeline_name),
            ("staging.serviceAccountName", &self.staging.service_account_name),
            ("staging.registry", &self.staging.registry),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow::anyhow!("{key} must not be empty"));
            }
        }

        Ok(())
    }

    /// Route used when a deploy request does not name one.
    #[must_use]
    pub fn default_route(&self, app_name: &str) -> String {
        format!("{app_name}.{}", self.domain)
    }
}
