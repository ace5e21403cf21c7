use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use launchpad_models::{APIError, AppRef, ErrorResponse};
use thiserror::Error;
use tracing::error;

/// Failures of the application operations (deploy, stage, scale, show, ...).
#[derive(Debug, Error)]
pub enum DeployError {
    /// Rejected before any cluster mutation; the title is matched literally by callers.
    #[error("{title}")]
    Validation { title: String, details: String },

    #[error("application {0} is not known")]
    AppNotKnown(AppRef),

    #[error("organization {0} is not known")]
    OrgNotKnown(String),

    #[error("application {0} already exists")]
    AppAlreadyKnown(AppRef),

    #[error("{context}: {source}")]
    Infrastructure {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = DeployError> = std::result::Result<T, E>;

impl DeployError {
    pub fn validation(title: impl Into<String>) -> Self {
        Self::Validation {
            title: title.into(),
            details: String::new(),
        }
    }

    pub fn infra(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Infrastructure {
            context: context.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::AppNotKnown(_) | Self::OrgNotKnown(_) => StatusCode::NOT_FOUND,
            Self::AppAlreadyKnown(_) => StatusCode::CONFLICT,
            Self::Infrastructure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP face of an error: one entry of the JSON envelope.
#[derive(Debug)]
pub struct ApiError(pub APIError);

impl ApiError {
    pub fn bad_request(title: impl Into<String>, details: impl Into<String>) -> Self {
        Self(APIError::new(StatusCode::BAD_REQUEST.as_u16(), title, details))
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        let status = err.status().as_u16();
        match err {
            DeployError::Validation { title, details } => Self(APIError::new(status, title, details)),
            DeployError::Infrastructure { context, source } => {
                error!(context = %context, error = %source, "request failed on infrastructure");
                Self(APIError::new(status, context, format!("{source:#}")))
            }
            other => Self(APIError::new(status, other.to_string(), "")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::single(self.0))).into_response()
    }
}
