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

//! Launchpad API server
//!
//! Converges the workload, service and route of applications, submits
//! staging pipeline runs and tails container logs over WebSockets.

pub mod api;
pub mod builders;
pub mod cluster;
pub mod config;
pub mod crds;
pub mod error;
pub mod logs;
pub mod pipeline;
pub mod reconciler;
pub mod registry;
pub mod staging;
pub mod telemetry;

pub use api::{router, AppState};
pub use config::ServerConfig;
pub use error::{ApiError, DeployError};
pub use reconciler::Deployer;
pub use staging::Stager;
