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

//! Launchpad command line client
//!
//! Talks to the Launchpad API: uploads and stages sources, deploys images,
//! scales applications and relays their logs.

pub mod config;
pub mod logs;
pub mod push;
pub mod staging;
pub mod transport;
pub mod ui;

pub use config::ClientSettings;
pub use logs::{relay, LogSink, StdoutSink};
pub use push::{deploy_image, push, wait_for_app, DeployOptions, PushError};
pub use staging::{KubePipelineWatcher, PipelineWatcher, StageRun, StagingCoordinator, StagingError};
pub use transport::{ApiClient, ClientError};
