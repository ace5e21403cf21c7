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

//! Launchpad CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use launchpad_cli::staging::StagingOptions;
use launchpad_cli::{
    deploy_image, push, relay, ui, ApiClient, ClientSettings, DeployOptions, KubePipelineWatcher,
    StagingCoordinator, StdoutSink,
};
use launchpad_models::{routes, App, AppRef, UpdateAppRequest};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const LOG_CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "launchpad", version, about = "Deploy applications to a Launchpad cluster")]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    settings: ClientSettings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a source tarball, stage it and deploy the built image.
    Push {
        name: String,
        /// Tarball of the application sources.
        tarball: PathBuf,
        #[arg(long, default_value = "")]
        route: String,
        #[arg(long)]
        instances: Option<i32>,
    },

    /// Deploy an existing image.
    Deploy {
        name: String,
        #[arg(long)]
        image: String,
        #[arg(long, default_value = "")]
        route: String,
        #[arg(long)]
        instances: Option<i32>,
    },

    /// Change the instance count of a deployed application.
    Scale {
        name: String,
        #[arg(long)]
        instances: i32,
    },

    /// Print application logs, or the build logs of a stage.
    Logs {
        name: String,
        #[arg(long, short)]
        follow: bool,
        #[arg(long)]
        stage_id: Option<String>,
    },

    /// Show the status of an application.
    Show { name: String },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::new("warn,launchpad_cli=info"),
        1 => EnvFilter::new("info,launchpad_cli=debug"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_app(app: &App) {
    ui::print_info(&format!("{}/{}", app.organization, app.name));
    println!("  status:   {}", if app.status.is_empty() { "-" } else { &app.status });
    println!("  route:    {}", app.route);
    println!("  stage id: {}", app.stage_id);
    println!("  active:   {}", app.active);
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;
    let client = ApiClient::new(&settings.api_url, &settings.ws_base())?;

    match cli.command {
        Commands::Push {
            name,
            tarball,
            route,
            instances,
        } => {
            let app = AppRef::new(name, &settings.org);
            let tarball = tokio::fs::read(&tarball)
                .await
                .with_context(|| format!("failed to read {}", tarball.display()))?;
            let kube = kube::Client::try_default()
                .await
                .context("failed to create Kubernetes client")?;
            let coordinator = StagingCoordinator::new(
                client.clone(),
                Arc::new(KubePipelineWatcher::new(kube, &settings.staging_namespace)),
                StagingOptions {
                    timeout: settings.staging_timeout(),
                    ..StagingOptions::default()
                },
            );
            let options = DeployOptions {
                route,
                instances,
                ..DeployOptions::default()
            };
            let shown = push(&client, &coordinator, &app, tarball, StdoutSink, &options).await?;
            ui::print_success(&format!("{app} is running at {}", shown.route));
        }
        Commands::Deploy {
            name,
            image,
            route,
            instances,
        } => {
            let app = AppRef::new(name, &settings.org);
            let options = DeployOptions {
                route,
                instances,
                ..DeployOptions::default()
            };
            let shown = deploy_image(&client, &app, &image, &options).await?;
            ui::print_success(&format!("{app} is running at {}", shown.route));
        }
        Commands::Scale { name, instances } => {
            let _: Value = client
                .patch_json(&routes::app(&settings.org, &name), &UpdateAppRequest { instances })
                .await?;
            ui::print_success(&format!("Scaled {name} to {instances}"));
        }
        Commands::Logs {
            name,
            follow,
            stage_id,
        } => {
            let follow = follow.to_string();
            let mut query = vec![("follow", follow.as_str())];
            if let Some(id) = stage_id.as_deref() {
                query.push(("stage_id", id));
            }
            let url = client.ws_url(&routes::app_logs(&settings.org, &name), &query);
            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => stop.cancel(),
                    Err(e) => warn!(error = %e, "failed to install Ctrl+C handler"),
                }
            });
            relay(url, StdoutSink, cancel, LOG_CLOSE_GRACE).await?;
        }
        Commands::Show { name } => {
            let shown: App = client.get(&routes::app(&settings.org, &name)).await?;
            if !shown.active {
                ui::print_warning(&format!("{name} has no running workload"));
            }
            print_app(&shown);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        ui::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
