//! Read-only view of a pipeline run as served by the pipeline engine
//!
//! Only the fields the staging logic relies on are modelled; everything else
//! in the object is ignored during deserialization.

use crate::labels::LABEL_STAGE_ID;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the pipeline engine's run objects
pub const GROUP: &str = "tekton.dev";
pub const VERSION: &str = "v1beta1";
pub const API_VERSION: &str = "tekton.dev/v1beta1";
pub const KIND: &str = "PipelineRun";
pub const PLURAL: &str = "pipelineruns";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    #[serde(default)]
    pub metadata: RunMetadata,
    #[serde(default)]
    pub status: Option<RunStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    #[serde(default, rename = "completionTime")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<RunCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCondition {
    #[serde(default, rename = "type")]
    pub type_: String,
    /// `"True"`, `"False"` or `"Unknown"`
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RunCondition {
    /// A condition with status `False` marks the run as failed.
    #[must_use]
    pub fn is_false(&self) -> bool {
        self.status == "False"
    }
}

impl PipelineRun {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    #[must_use]
    pub fn stage_id(&self) -> Option<&str> {
        self.metadata.labels.get(LABEL_STAGE_ID).map(String::as_str)
    }

    /// Message of the first failed condition, if any.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.status.as_ref().and_then(|status| {
            status
                .conditions
                .iter()
                .find(|condition| condition.is_false())
                .map(|condition| condition.message.clone().unwrap_or_default())
        })
    }

    #[must_use]
    pub fn completion_time(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|status| status.completion_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tekton_status() {
        let run: PipelineRun = serde_json::from_value(json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {
                "name": "abc123",
                "labels": { "launchpad.dev/stage-id": "abc123" }
            },
            "spec": { "pipelineRef": { "name": "staging-pipeline" } },
            "status": {
                "completionTime": "2025-03-01T10:00:00Z",
                "conditions": [
                    { "type": "Succeeded", "status": "True", "reason": "Succeeded" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(run.name(), Some("abc123"));
        assert_eq!(run.stage_id(), Some("abc123"));
        assert!(run.completion_time().is_some());
        assert!(run.failure().is_none());
    }

    #[test]
    fn failed_condition_message_is_kept_verbatim() {
        let run: PipelineRun = serde_json::from_value(json!({
            "metadata": { "name": "abc123" },
            "status": {
                "conditions": [
                    { "type": "Succeeded", "status": "False", "message": "Tasks Completed: 1 (Failed: 1)" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(run.failure().as_deref(), Some("Tasks Completed: 1 (Failed: 1)"));
        assert!(run.completion_time().is_none());
    }

    #[test]
    fn run_without_status_is_pending() {
        let run: PipelineRun = serde_json::from_value(json!({ "metadata": {} })).unwrap();
        assert!(run.failure().is_none());
        assert!(run.completion_time().is_none());
        assert!(run.stage_id().is_none());
    }
}
