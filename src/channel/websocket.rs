//! Channel WebSocket connection and frame handling

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::TransportError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct ChannelSocket {
    stream: WsStream,
}

/// Add `?username=<name>` to the channel URL. The relay keys connections by it.
pub fn socket_url(channel_url: &str, username: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(channel_url).map_err(|e| TransportError::InvalidUrl {
        url: channel_url.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(TransportError::InvalidUrl {
                url: channel_url.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            })
        }
    }
    url.query_pairs_mut().append_pair("username", username);
    Ok(url)
}

impl ChannelSocket {
    /// Connect to the channel endpoint as `username`.
    pub async fn connect(channel_url: &str, username: &str) -> Result<Self, TransportError> {
        let url = socket_url(channel_url, username)?;
        tracing::info!("Connecting WebSocket to {}", url);

        let (stream, response) =
            connect_async(url.as_str())
                .await
                .map_err(|source| TransportError::Connect {
                    url: url.to_string(),
                    source,
                })?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, msg: &str) -> Result<(), TransportError> {
        tracing::debug!("WS send: {}", msg);
        self.stream
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| TransportError::Lost(format!("send failed: {}", e)))
    }

    /// Send a WebSocket ping as keepalive.
    pub async fn ping(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::Lost(format!("ping failed: {}", e)))
    }

    /// Receive the next text frame, answering pings and ignoring pongs.
    ///
    /// Returns `None` once the server closes the connection.
    pub async fn recv_frame(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| TransportError::Lost(format!("pong failed: {}", e)))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(TransportError::Lost(format!("receive failed: {}", e)));
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Close the connection cleanly.
    pub async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("WebSocket close: {}", e);
        }
    }
}
