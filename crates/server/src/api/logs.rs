use super::AppState;
use crate::error::{ApiError, DeployError};
use crate::logs::LogStream;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::StreamExt;
use launchpad_models::AppRef;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub(super) struct LogsQuery {
    #[serde(default)]
    follow: bool,
    #[serde(default)]
    stage_id: Option<String>,
}

pub(super) async fn tail(
    State(state): State<AppState>,
    Path((org, app)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let app = AppRef::new(app, org);
    state.deployer.ensure_known(&app).await?;

    let stage_id = query.stage_id.filter(|id| !id.is_empty());
    let lines = state
        .logs
        .stream(&app, stage_id.as_deref(), query.follow)
        .await
        .map_err(|e| DeployError::infra("failed to open log streams", e))?;

    let grace = Duration::from_secs(state.config.logs.close_grace_seconds);
    Ok(ws.on_upgrade(move |socket| relay(socket, lines, grace)))
}

/// Forward every line as a text frame, then close normally.
async fn relay(mut socket: WebSocket, mut lines: LogStream, grace: Duration) {
    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else { break };
                let text = match serde_json::to_string(&line) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode log line");
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    debug!("log client went away");
                    return;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!("log client closed the stream");
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: Utf8Bytes::from_static("log streams finished"),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        return;
    }

    // Wait for the close reply so the client sees a clean shutdown.
    let _ = tokio::time::timeout(grace, async {
        while let Some(Ok(message)) = socket.recv().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
}
