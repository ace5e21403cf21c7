/*
 * Launchpad - Application Deployment Platform
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Launchpad API server binary
//!
//! Connects to the cluster, wires the Kubernetes-backed stores into the
//! HTTP API and serves until SIGINT or SIGTERM.

use launchpad_server::cluster::KubeCluster;
use launchpad_server::config::DEFAULT_CONFIG_PATH;
use launchpad_server::logs::KubeLogSource;
use launchpad_server::pipeline::KubePipelines;
use launchpad_server::registry::KubeRegistry;
use launchpad_server::{router, telemetry, AppState, Deployer, ServerConfig, Stager};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    info!(
        "Starting Launchpad API server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut config = load_server_config();
    config.apply_env_overrides();
    config.validate()?;
    let config = Arc::new(config);

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let registry = Arc::new(KubeRegistry::new(client.clone()));
    let pipelines = Arc::new(KubePipelines::new(
        client.clone(),
        &config.staging.namespace,
    ));

    let state = AppState {
        deployer: Arc::new(Deployer::new(
            Arc::new(KubeCluster::new(client.clone())),
            registry.clone(),
            pipelines.clone(),
            config.clone(),
        )),
        stager: Arc::new(Stager::new(registry, pipelines, config.clone())),
        logs: Arc::new(KubeLogSource::new(client, config.staging.namespace.clone())),
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.listen_address.as_str()).await?;
    info!("Launchpad API listening on {}", config.listen_address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Launchpad API server stopped");
    Ok(())
}

fn load_server_config() -> ServerConfig {
    let override_path = std::env::var("LAUNCHPAD_CONFIG_PATH").ok();
    let config_path = override_path
        .as_deref()
        .filter(|path| Path::new(path).exists())
        .unwrap_or(DEFAULT_CONFIG_PATH);

    match ServerConfig::from_mounted_file(config_path) {
        Ok(cfg) => {
            info!("Loaded server configuration from {}", config_path);
            cfg
        }
        Err(err) => {
            warn!(
                "Failed to load configuration from {}: {}. Using defaults.",
                config_path, err
            );
            ServerConfig::default()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
