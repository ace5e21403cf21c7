//! JSON and multipart calls against the Launchpad API

use launchpad_models::{routes, AppRef, ErrorResponse, UploadResponse};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with the JSON error envelope.
    #[error("{title} ({status}){}", detail_suffix(.details))]
    Api {
        status: u16,
        title: String,
        details: String,
    },

    /// Non-success answer without a decodable envelope.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

fn detail_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!(": {details}")
    }
}

impl ClientError {
    /// HTTP status of a failed call, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::Url(_) => None,
        }
    }
}

/// Client of the Launchpad HTTP API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_url: String,
    ws_base: Url,
}

impl ApiClient {
    pub fn new(api_url: &str, ws_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_base: Url::parse(ws_url)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// WebSocket URL of `path` with `query` form-encoded.
    #[must_use]
    pub fn ws_url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = self.ws_base.clone();
        let joined = format!("{}{path}", self.ws_base.path().trim_end_matches('/'));
        url.set_path(&joined);
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url.into()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(path, "GET");
        decode(self.http.get(self.url(path)).send().await?).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "POST");
        decode(self.http.post(self.url(path)).json(body).send().await?).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path, "PATCH");
        decode(self.http.patch(self.url(path)).json(body).send().await?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(path, "DELETE");
        decode(self.http.delete(self.url(path)).send().await?).await
    }

    /// Send a source tarball to the artifact store; the reply locates it in git.
    pub async fn upload(&self, app: &AppRef, tarball: Vec<u8>) -> Result<UploadResponse, ClientError> {
        let part = Part::bytes(tarball)
            .file_name(format!("{}.tar", app.name))
            .mime_str("application/x-tar")?;
        let form = Form::new().part("file", part);

        let path = routes::app_upload(&app.org, &app.name);
        debug!(path = %path, "POST multipart");
        decode(self.http.post(self.url(&path)).multipart(form).send().await?).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        let body: &[u8] = if body.is_empty() { b"null" } else { &body };
        return Ok(serde_json::from_slice(body)?);
    }

    Err(error_from(status, &body))
}

fn error_from(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(envelope) => match envelope.first() {
            Some(error) => ClientError::Api {
                status: error.status,
                title: error.title.clone(),
                details: error.details.clone(),
            },
            None => ClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(body).into_owned(),
            },
        },
        Err(_) => ClientError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
