//! Label keys shared by the cluster objects, the pipeline runs and the clients

use crate::app::AppRef;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Stage id of the build that produced a workload or a pipeline run
pub const LABEL_STAGE_ID: &str = "launchpad.dev/stage-id";

pub const COMPONENT_APPLICATION: &str = "application";
pub const COMPONENT_STAGING: &str = "staging";
pub const MANAGED_BY: &str = "launchpad";

/// Selector matching every pipeline run of a staging id.
#[must_use]
pub fn stage_selector(stage_id: &str) -> String {
    format!("{LABEL_STAGE_ID}={stage_id}")
}

/// Selector matching every labelled object of an application.
#[must_use]
pub fn app_selector(app: &AppRef) -> String {
    format!("{LABEL_NAME}={},{LABEL_PART_OF}={}", app.name, app.org)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors() {
        assert_eq!(stage_selector("abc123"), "launchpad.dev/stage-id=abc123");
        assert_eq!(
            app_selector(&AppRef::new("web", "workspace")),
            "app.kubernetes.io/name=web,app.kubernetes.io/part-of=workspace"
        );
    }
}
