//! JSON error envelope returned by every failing API call
//!
//! ```json
//! {"errors":[{"status":400,"title":"...","details":"..."}]}
//! ```
//!
//! Callers match on some titles literally, so those are exported as constants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Title returned when a negative instance count is requested.
pub const INSTANCES_INVALID: &str = "instances param should be integer equal or greater than zero";

/// Title prefix returned when a deploy body cannot be decoded.
pub const DEPLOY_UNMARSHAL_FAILED: &str = "Failed to unmarshal deploy request";

/// Title prefix returned when a stage body cannot be decoded.
pub const STAGE_UNMARSHAL_FAILED: &str = "Failed to unmarshal stage request";

/// Title returned when a scale body cannot be decoded.
pub const UPDATE_UNMARSHAL_FAILED: &str = "Failed to unmarshal app update request";

/// Title returned when the URL and body application names differ.
pub const NAME_MISMATCH: &str = "name parameter from URL does not match name param in body";

/// Title returned when the URL and body organizations differ.
pub const ORG_MISMATCH: &str = "org parameter from URL does not match org param in body";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct APIError {
    pub status: u16,
    pub title: String,
    #[serde(default)]
    pub details: String,
}

impl APIError {
    #[must_use]
    pub fn new(status: u16, title: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            details: details.into(),
        }
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{} ({})", self.title, self.status)
        } else {
            write!(f, "{}: {} ({})", self.title, self.details, self.status)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<APIError>,
}

impl ErrorResponse {
    #[must_use]
    pub fn single(error: APIError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// The first error of the envelope, which is the one callers report.
    #[must_use]
    pub fn first(&self) -> Option<&APIError> {
        self.errors.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = ErrorResponse::single(APIError::new(400, INSTANCES_INVALID, ""));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["errors"][0]["status"], 400);
        assert_eq!(value["errors"][0]["title"], INSTANCES_INVALID);
        assert_eq!(value["errors"][0]["details"], "");
    }

    #[test]
    fn missing_details_defaults_to_empty() {
        let envelope: ErrorResponse =
            serde_json::from_str(r#"{"errors":[{"status":404,"title":"app not known"}]}"#)
                .unwrap();
        let first = envelope.first().unwrap();
        assert_eq!(first.status, 404);
        assert!(first.details.is_empty());
        assert_eq!(first.to_string(), "app not known (404)");
    }
}
