//! WebSocket log relay
//!
//! Reads `LogLine` text frames from the server's log endpoint and hands each
//! one to a [`LogSink`]. The relay ends on a normal closure from the server or
//! when its cancellation token fires; after cancellation it closes its side
//! and keeps draining buffered frames for a bounded grace period.

use colored::Colorize;
use futures::{SinkExt, StreamExt};
use launchpad_models::LogLine;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("log stream failed: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Destination of relayed lines.
pub trait LogSink: Send + 'static {
    fn write(&mut self, line: LogLine);
}

/// Prints lines to stdout, prefixed with the container they came from.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write(&mut self, line: LogLine) {
        println!(
            "{} {}",
            format!("[{}]", line.container_name).bright_black(),
            line.message
        );
    }
}

impl LogSink for mpsc::UnboundedSender<LogLine> {
    fn write(&mut self, line: LogLine) {
        // The receiver going away only means nobody reads anymore.
        let _ = self.send(line);
    }
}

/// Errors that only mean the peer already closed the transport.
///
/// The server may tear the socket down right after its close frame; on
/// plain and TLS sockets alike that surfaces as a broken pipe or reset.
fn is_peer_gone(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof
        ),
        tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => true,
        _ => false,
    }
}

fn forward<S: LogSink>(sink: &mut S, text: &str) -> bool {
    match serde_json::from_str::<LogLine>(text) {
        Ok(line) => {
            sink.write(line);
            true
        }
        Err(e) => {
            warn!(error = %e, "skipping undecodable log frame");
            false
        }
    }
}

/// Relay lines from `url` into `sink` until closure or cancellation.
///
/// Returns the number of lines forwarded.
pub async fn relay<S: LogSink>(
    url: String,
    mut sink: S,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<usize, RelayError> {
    let (mut socket, _) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(0),
        connected = tokio_tungstenite::connect_async(url.as_str()) => connected?,
    };
    debug!(url = %url, "log stream connected");

    let mut forwarded = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if forward(&mut sink, text.as_str()) {
                        forwarded += 1;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "log stream closed by server");
                    // Reading on completes the closing handshake.
                    while let Some(Ok(_)) = socket.next().await {}
                    return Ok(forwarded);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) if is_peer_gone(&e) => return Ok(forwarded),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(forwarded),
            }
        }
    }

    match socket.send(Message::Close(None)).await {
        Ok(()) => {}
        Err(e) if is_peer_gone(&e) => {
            debug!(error = %e, "peer already gone while closing log stream");
            return Ok(forwarded);
        }
        Err(e) => return Err(e.into()),
    }

    let drained = tokio::time::timeout(grace, async {
        let mut drained = 0;
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if forward(&mut sink, text.as_str()) {
                        drained += 1;
                    }
                }
                Ok(Message::Close(_)) | Ok(_) => {}
                Err(e) => {
                    if !is_peer_gone(&e) {
                        warn!(error = %e, "log stream failed while draining");
                    }
                    break;
                }
            }
        }
        drained
    })
    .await;

    match drained {
        Ok(drained) => Ok(forwarded + drained),
        Err(_) => {
            debug!("log stream drain timed out");
            Ok(forwarded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_is_tolerated() {
        let err = tungstenite::Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(is_peer_gone(&err));
        assert!(is_peer_gone(&tungstenite::Error::ConnectionClosed));
        assert!(!is_peer_gone(&tungstenite::Error::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied"
        ))));
    }

    #[test]
    fn channel_sink_forwards_decoded_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = tx;
        assert!(forward(
            &mut sink,
            r#"{"message":"hello","podName":"p","containerName":"c","namespace":"n"}"#
        ));
        assert!(!forward(&mut sink, "not json"));
        assert_eq!(rx.try_recv().unwrap().message, "hello");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_before_connect_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let forwarded = relay(
            "ws://127.0.0.1:9/logs".into(),
            tx,
            cancel,
            Duration::from_millis(10),
        )
        .await
        .unwrap();
        assert_eq!(forwarded, 0);
    }
}
