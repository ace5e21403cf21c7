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

//! Launchpad API models
//!
//! Wire types exchanged between the Launchpad API server and its clients:
//! application identity, staging and deploy requests, the JSON error
//! envelope, label keys shared with the cluster objects, and the route table.

pub mod app;
pub mod env;
pub mod error;
pub mod labels;
pub mod logs;
pub mod pipeline;
pub mod requests;
pub mod routes;

pub use app::{App, AppList, AppRef, GitRef, StageRef};
pub use env::{EnvVariable, EnvVariableList};
pub use error::{APIError, ErrorResponse};
pub use logs::LogLine;
pub use pipeline::{PipelineRun, RunCondition};
pub use requests::{
    ApplicationCreateRequest, DeployRequest, StageRequest, StageResponse, UpdateAppRequest,
    UploadResponse,
};
