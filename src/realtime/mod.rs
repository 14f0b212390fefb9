//! Real-time message delivery
//!
//! Keeps a WebSocket open to the backend and forwards every pushed message
//! to the controller as [`ControllerEvent::Inbound`]. Frames are JSON:
//! `{"type":"message","message":{...}}` carries a message, `{"type":"ping"}`
//! is a keepalive.

pub mod socket;

use anyhow::Result;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time;

use crate::api;
use crate::messaging::ControllerEvent;
use crate::models::Message;
use crate::session::Session;
use socket::LiveSocket;

/// Keepalive interval for the client ping.
const HEARTBEAT: Duration = Duration::from_secs(30);
/// Reset the backoff once a connection has stayed up this long.
const STABLE_AFTER: Duration = Duration::from_secs(60);
const MAX_BACKOFF_SECS: u64 = 64;

/// What a text frame turned out to be.
#[derive(Debug, PartialEq)]
pub enum Frame {
    Message(Box<Message>),
    Ping,
    Other(String),
}

pub fn parse_frame(text: &str) -> Frame {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return Frame::Other(text.to_string()),
    };
    match value.get("type").and_then(|t| t.as_str()) {
        Some("ping") | Some("pong") => Frame::Ping,
        Some("message") | Some("new_message") => {
            let Some(payload) = value.get("message").cloned() else {
                return Frame::Other(text.to_string());
            };
            match api::decode_message(payload) {
                Ok(msg) => Frame::Message(Box::new(msg)),
                Err(e) => {
                    tracing::warn!("Undecodable pushed message: {}", e);
                    Frame::Other(text.to_string())
                }
            }
        }
        _ => Frame::Other(text.to_string()),
    }
}

/// Reason the inner connection loop exited.
enum DisconnectReason {
    /// The controller went away. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Error(anyhow::Error),
}

/// Forward live messages to `events` until the receiving side is dropped.
///
/// On transient errors or server-initiated disconnects, reconnects with
/// exponential backoff (1s, 2s, 4s, ... capped at 64s); a connection that
/// stayed up for a minute resets the backoff.
pub async fn run(
    url: String,
    session: Session,
    events: mpsc::UnboundedSender<ControllerEvent>,
) -> Result<()> {
    let mut backoff = 1u64;

    loop {
        let started = Instant::now();
        let reason = match run_once(&url, &session, &events).await {
            Ok(reason) => reason,
            Err(e) => DisconnectReason::Error(e),
        };

        match reason {
            DisconnectReason::Shutdown => return Ok(()),
            DisconnectReason::Error(e) => {
                if started.elapsed() >= STABLE_AFTER {
                    backoff = 1;
                }
                tracing::warn!(
                    "Live delivery disconnected: {:#}. Reconnecting in {}s...",
                    e,
                    backoff
                );
                time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            }
        }
    }
}

/// One connection: connect, then pump frames and heartbeats.
async fn run_once(
    url: &str,
    session: &Session,
    events: &mpsc::UnboundedSender<ControllerEvent>,
) -> Result<DisconnectReason> {
    let mut ws = LiveSocket::connect(url, session).await?;

    let mut heartbeat = time::interval(HEARTBEAT);
    heartbeat.tick().await; // skip first immediate tick

    let reason = loop {
        tokio::select! {
            frame = ws.recv_frame() => {
                match frame {
                    Ok(Some(text)) => match parse_frame(&text) {
                        Frame::Message(msg) => {
                            if events.send(ControllerEvent::Inbound(*msg)).is_err() {
                                break DisconnectReason::Shutdown;
                            }
                        }
                        Frame::Ping => tracing::trace!("Server keepalive"),
                        Frame::Other(text) => tracing::debug!("Unhandled frame: {}", text),
                    },
                    Ok(None) => {
                        break DisconnectReason::Error(anyhow::anyhow!("WebSocket closed by server"));
                    }
                    Err(e) => {
                        break DisconnectReason::Error(e.context("WebSocket recv error"));
                    }
                }
            }
            _ = heartbeat.tick() => {
                if events.is_closed() {
                    break DisconnectReason::Shutdown;
                }
                if let Err(e) = ws.send_text(r#"{"type":"ping"}"#).await {
                    break DisconnectReason::Error(e.context("Heartbeat send failed"));
                }
            }
        }
    };

    Ok(reason)
}
