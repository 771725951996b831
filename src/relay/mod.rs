//! Relay server: the server half of the transport channel.
//!
//! Clients connect with `?username=<name>`. Each inbound event is validated,
//! routed to its recipient's sockets and dropped if the recipient is offline.

mod registry;

pub use registry::{route, Registry};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::channel::frame;
use crate::models::ClientEvent;

/// Bind and relay until Ctrl+C.
pub async fn serve(bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    println!("Relay listening on ws://{}/ws (Ctrl-C to stop)", addr);

    tokio::select! {
        res = run(listener, Registry::new()) => res,
        _ = tokio::signal::ctrl_c() => {
            println!("Shutting down...");
            Ok(())
        }
    }
}

/// Accept loop over an already bound listener.
pub async fn run(listener: TcpListener, registry: Registry) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await.context("Accept failed")?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, registry).await {
                tracing::warn!("Connection from {} ended with error: {:#}", peer, e);
            }
        });
    }
}

/// Pull `username` out of the request query string.
fn username_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "username")
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn reject(reason: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason.to_string()));
    *resp.status_mut() = StatusCode::BAD_REQUEST;
    resp
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Registry) -> Result<()> {
    let mut username = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        match username_from_query(req.uri().query()) {
            Some(name) => {
                username = Some(name);
                Ok(resp)
            }
            None => Err(reject("missing username query parameter")),
        }
    })
    .await
    .with_context(|| format!("WebSocket handshake with {} failed", peer))?;

    let username = username.context("handshake accepted without username")?;
    tracing::info!("{} connected from {}", username, peer);

    let (id, frames) = registry.register(&username);
    let result = pump(ws, frames, &registry, &username).await;

    registry.unregister(&username, id);
    tracing::info!("{} disconnected", username);
    result
}

/// Shuttle frames between one socket and its registry queue until either side closes.
async fn pump(
    ws: WebSocketStream<TcpStream>,
    mut frames: mpsc::UnboundedReceiver<String>,
    registry: &Registry,
    username: &str,
) -> Result<()> {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => relay_frame(registry, username, &text),
                Some(Ok(Message::Ping(data))) => {
                    sink.send(Message::Pong(data)).await.context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(other)) => tracing::debug!("Ignoring frame from {}: {:?}", username, other),
                Some(Err(e)) => return Err(e).context("WebSocket receive error"),
            },
            outgoing = frames.recv() => match outgoing {
                Some(text) => sink.send(Message::Text(text)).await.context("Failed to push frame")?,
                None => return Ok(()),
            },
        }
    }
}

/// Decode, validate and forward one frame from `owner`. Invalid frames are logged and dropped.
fn relay_frame(registry: &Registry, owner: &str, text: &str) {
    let event: ClientEvent = match frame::decode(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Dropping frame from {}: {}", owner, e);
            return;
        }
    };

    let (recipient, out) = match route(owner, event) {
        Ok(routed) => routed,
        Err(e) => {
            tracing::warn!("Dropping event from {}: {}", owner, e);
            return;
        }
    };

    let text = match frame::encode(&out) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Could not encode {}: {}", out.name(), e);
            return;
        }
    };

    let delivered = registry.deliver(&recipient, &text);
    if delivered == 0 {
        tracing::debug!("{} for {} dropped: recipient offline", out.name(), recipient);
    } else {
        tracing::debug!("{} {} -> {} ({} socket(s))", out.name(), owner, recipient, delivered);
    }
}
