//! Application identity and status views

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an application: its name and the organization (namespace) it
/// lives in. Every API operation is keyed by this pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppRef {
    pub name: String,
    pub org: String,
}

impl AppRef {
    #[must_use]
    pub fn new(name: impl Into<String>, org: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org: org.into(),
        }
    }
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// Location of uploaded sources in the git artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    pub url: String,
    pub revision: String,
}

/// Reference to a staging run. An empty id means the deploy does not
/// originate from staging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRef {
    #[serde(default)]
    pub id: String,
}

impl StageRef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the id when this reference points at a real staging run.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        if self.id.is_empty() {
            None
        } else {
            Some(self.id.as_str())
        }
    }
}

/// Application as reported by the show/list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    pub organization: String,
    /// `"<ready>/<desired>"` instance counts, empty when nothing is deployed
    pub status: String,
    #[serde(default)]
    pub route: String,
    #[serde(default, rename = "stageId")]
    pub stage_id: String,
    /// Whether a workload exists for the application
    #[serde(default)]
    pub active: bool,
}

impl App {
    /// Builds the `"<ready>/<desired>"` status string.
    #[must_use]
    pub fn status_string(ready: i32, desired: i32) -> String {
        format!("{ready}/{desired}")
    }

    /// True once every desired instance reports ready.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        match self.status.split_once('/') {
            Some((ready, desired)) => !ready.is_empty() && ready == desired,
            None => false,
        }
    }
}

pub type AppList = Vec<App>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ref_empty_id_is_none() {
        assert_eq!(StageRef::default().id(), None);
        assert_eq!(StageRef::new("abc123").id(), Some("abc123"));
    }

    #[test]
    fn stage_ref_missing_id_deserializes_as_empty() {
        let stage: StageRef = serde_json::from_str("{}").unwrap();
        assert!(stage.id().is_none());
    }

    #[test]
    fn converged_requires_matching_counts() {
        let mut app = App {
            name: "web".into(),
            organization: "workspace".into(),
            status: App::status_string(1, 3),
            route: String::new(),
            stage_id: String::new(),
            active: true,
        };
        assert!(!app.is_converged());

        app.status = App::status_string(3, 3);
        assert!(app.is_converged());

        app.status = String::new();
        assert!(!app.is_converged());
    }

    #[test]
    fn app_ref_displays_org_first() {
        assert_eq!(AppRef::new("web", "workspace").to_string(), "workspace/web");
    }
}
