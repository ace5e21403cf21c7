use serde::{Deserialize, Serialize};

/// One line of container output, sent as a WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub message: String,
    #[serde(rename = "podName")]
    pub pod_name: String,
    #[serde(rename = "containerName")]
    pub container_name: String,
    #[serde(default)]
    pub namespace: String,
}
