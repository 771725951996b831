//! Transport channel client
//!
//! A [`Connection`] owns a background task that keeps one WebSocket to the
//! relay open, reconnecting with exponential backoff. Inbound events arrive
//! as [`ChannelUpdate`]s on a receiver; outbound events go through the
//! [`EventSink`] impl.

pub mod frame;
pub mod websocket;

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::conversation::EventSink;
use crate::error::TransportError;
use crate::models::{ClientEvent, ServerEvent};
use websocket::ChannelSocket;

/// Upper bound of the reconnect delay.
const MAX_BACKOFF_SECS: u64 = 64;

/// A session that lasted this long resets the backoff.
const STABLE_AFTER: Duration = Duration::from_secs(60);

/// WebSocket ping interval.
const KEEPALIVE: Duration = Duration::from_secs(30);

/// What the connection task reports to its owner.
#[derive(Debug)]
pub enum ChannelUpdate {
    Connected,
    Disconnected(TransportError),
    Event(ServerEvent),
}

/// Reason one connection attempt ended.
enum SessionEnd {
    /// Owner asked to disconnect. Do not reconnect.
    Shutdown,
    /// Error or server-initiated close. Should reconnect.
    Failed(TransportError),
}

/// Explicitly owned handle to the transport channel.
pub struct Connection {
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start connecting as `username`. Must be called inside a tokio runtime.
    pub fn connect(
        channel_url: &str,
        username: &str,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelUpdate>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_connection(
            channel_url.to_string(),
            username.to_string(),
            outbound_rx,
            updates_tx,
            shutdown_rx,
        ));

        (
            Self {
                outbound: Some(outbound_tx),
                shutdown: Some(shutdown_tx),
                task: Some(task),
            },
            updates_rx,
        )
    }

    /// Flush queued events, close the socket and wait for the background task.
    ///
    /// Closing the outbound queue lets the task drain what was already emitted
    /// before it closes the socket. If that takes longer than five seconds
    /// the task is told to stop immediately.
    pub async fn disconnect(mut self) {
        self.outbound.take();
        if let Some(mut task) = self.task.take() {
            if time::timeout(Duration::from_secs(5), &mut task).await.is_err() {
                tracing::warn!("Channel did not flush within 5s, stopping");
                if let Some(tx) = self.shutdown.take() {
                    let _ = tx.send(());
                }
                let _ = task.await;
            }
        }
    }
}

impl EventSink for Connection {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.outbound
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(event)
            .map_err(|_| TransportError::Closed)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Reconnect loop.
///
/// Backoff doubles from 1s up to 64s and resets after a stable session.
/// Outbound events emitted while disconnected are dropped.
async fn run_connection(
    channel_url: String,
    username: String,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    updates: mpsc::UnboundedSender<ChannelUpdate>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut backoff = 1u64;

    loop {
        let started = Instant::now();
        let err = match run_session(
            &channel_url,
            &username,
            &mut outbound,
            &updates,
            &mut shutdown,
        )
        .await
        {
            SessionEnd::Shutdown => return,
            SessionEnd::Failed(e) => e,
        };

        if !err.is_retriable() {
            tracing::error!("Channel unusable: {}", err);
            let _ = updates.send(ChannelUpdate::Disconnected(err));
            return;
        }

        if started.elapsed() >= STABLE_AFTER {
            backoff = 1;
        }
        tracing::warn!("Channel disconnected: {}. Reconnecting in {}s...", err, backoff);
        let _ = updates.send(ChannelUpdate::Disconnected(err));

        let sleep = time::sleep(Duration::from_secs(backoff));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                event = outbound.recv() => match event {
                    Some(event) => {
                        tracing::warn!("Dropping {} while disconnected", event.name());
                    }
                    None => return,
                },
                _ = &mut shutdown => return,
            }
        }

        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

/// One connection: connect, then pump frames both ways until something breaks.
async fn run_session(
    channel_url: &str,
    username: &str,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    updates: &mpsc::UnboundedSender<ChannelUpdate>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let mut socket = tokio::select! {
        res = ChannelSocket::connect(channel_url, username) => match res {
            Ok(socket) => socket,
            Err(e) => return SessionEnd::Failed(e),
        },
        _ = &mut *shutdown => return SessionEnd::Shutdown,
    };
    let _ = updates.send(ChannelUpdate::Connected);

    let mut keepalive = time::interval(KEEPALIVE);
    keepalive.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            received = socket.recv_frame() => match received {
                Ok(Some(text)) => match frame::decode::<ServerEvent>(&text) {
                    Ok(event) => {
                        let _ = updates.send(ChannelUpdate::Event(event));
                    }
                    Err(e) => tracing::warn!("Dropping invalid frame: {}", e),
                },
                Ok(None) => return SessionEnd::Failed(TransportError::Closed),
                Err(e) => return SessionEnd::Failed(e),
            },
            event = outbound.recv() => match event {
                Some(event) => match frame::encode(&event) {
                    Ok(text) => {
                        if let Err(e) = socket.send_text(&text).await {
                            return SessionEnd::Failed(e);
                        }
                    }
                    Err(e) => tracing::warn!("Could not encode {}: {}", event.name(), e),
                },
                None => {
                    socket.close().await;
                    return SessionEnd::Shutdown;
                }
            },
            _ = keepalive.tick() => {
                if let Err(e) = socket.ping().await {
                    return SessionEnd::Failed(e);
                }
            }
            _ = &mut *shutdown => {
                socket.close().await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

/// Connect and print every inbound event until Ctrl+C.
pub async fn listen() -> Result<()> {
    let config = Config::load()?;
    let username = config.require_username()?.to_string();

    let (conn, mut updates) = Connection::connect(&config.channel_url(), &username);
    println!("Listening as {}... (Ctrl-C to stop)", username);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(ChannelUpdate::Connected) => println!("Connected."),
                Some(ChannelUpdate::Disconnected(e)) => println!("Disconnected: {}", e),
                Some(ChannelUpdate::Event(event)) => println!("{}", describe(&event)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    conn.disconnect().await;
    Ok(())
}

/// One-line human description of an inbound event.
fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::ReceiveMessage(m) => format!("[MSG] {} -> {}: {}", m.sender, m.receiver, m.message),
        ServerEvent::UserTyping(p) => format!("[TYPING] {} is typing to {}", p.sender, p.receiver),
        ServerEvent::UserStopTyping(p) => format!("[TYPING] {} stopped", p.sender),
        ServerEvent::MessageRead(r) if r.ids.is_empty() => {
            format!("[READ] {} read everything from {}", r.sender, r.receiver)
        }
        ServerEvent::MessageRead(r) => {
            format!("[READ] {} read {} message(s) from {}", r.sender, r.ids.len(), r.receiver)
        }
    }
}
