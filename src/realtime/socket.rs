//! Live delivery WebSocket connection and frame handling

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

use crate::session::Session;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct LiveSocket {
    stream: WsStream,
}

/// Endpoint URL for `user_id`.
pub fn endpoint(base: &str, user_id: &str) -> Result<Url> {
    let ws_url = base
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    let mut url =
        Url::parse(&ws_url).with_context(|| format!("Invalid realtime URL '{}'", ws_url))?;
    url.query_pairs_mut().append_pair("userId", user_id);
    Ok(url)
}

impl LiveSocket {
    /// Connect to the live delivery endpoint, authenticating with the
    /// session's bearer token.
    pub async fn connect(base: &str, session: &Session) -> Result<Self> {
        let url = endpoint(base, &session.identity.id)?;
        let token = session.bearer()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .context("Failed to build WebSocket request")?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Token is not a valid header value")?,
        );

        tracing::info!("Connecting WebSocket to {}", url);
        let (stream, response) = connect_async(request)
            .await
            .context("WebSocket connection failed")?;
        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, msg: &str) -> Result<()> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(WsMessage::Text(msg.to_string()))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Receive the next text frame, answering pings along the way.
    ///
    /// Returns `None` when the server closed the connection.
    pub async fn recv_frame(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    self.stream
                        .send(WsMessage::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }
}
