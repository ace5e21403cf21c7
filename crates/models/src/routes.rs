//! Route table of the HTTP API
//!
//! Templates use axum's `{param}` syntax so the server registers them as-is;
//! clients fill them with the path helpers below.

pub const HEALTH: &str = "/health";
pub const READY: &str = "/ready";
pub const INFO: &str = "/api/v1/info";
pub const APPS: &str = "/api/v1/orgs/{org}/applications";
pub const APP: &str = "/api/v1/orgs/{org}/applications/{app}";
pub const APP_UPLOAD: &str = "/api/v1/orgs/{org}/applications/{app}/store";
pub const APP_STAGE: &str = "/api/v1/orgs/{org}/applications/{app}/stage";
pub const APP_DEPLOY: &str = "/api/v1/orgs/{org}/applications/{app}/deploy";
pub const APP_LOGS: &str = "/api/v1/orgs/{org}/applications/{app}/logs";

fn fill(template: &str, org: &str, app: Option<&str>) -> String {
    let path = template.replace("{org}", org);
    match app {
        Some(app) => path.replace("{app}", app),
        None => path,
    }
}

#[must_use]
pub fn apps(org: &str) -> String {
    fill(APPS, org, None)
}

#[must_use]
pub fn app(org: &str, app: &str) -> String {
    fill(APP, org, Some(app))
}

#[must_use]
pub fn app_upload(org: &str, app: &str) -> String {
    fill(APP_UPLOAD, org, Some(app))
}

#[must_use]
pub fn app_stage(org: &str, app: &str) -> String {
    fill(APP_STAGE, org, Some(app))
}

#[must_use]
pub fn app_deploy(org: &str, app: &str) -> String {
    fill(APP_DEPLOY, org, Some(app))
}

#[must_use]
pub fn app_logs(org: &str, app: &str) -> String {
    fill(APP_LOGS, org, Some(app))
}
