//! Async backend: runs history service requests off the event loop.
//!
//! The app sends `BackendCommand` values; each one is executed on its own
//! task and answered with a `BackendResponse` on the response channel.

use tokio::sync::mpsc;

use crate::api::{self, HistoryClient};
use crate::conversation::RequestToken;
use crate::error::HistoryFetchError;
use crate::models::{Message, User};

/// Commands sent from the TUI event loop to the backend.
pub enum BackendCommand {
    LoadRoster,
    LoadHistory { peer: String, token: RequestToken },
}

/// Responses from the backend to the TUI.
pub enum BackendResponse {
    Roster(Result<Vec<User>, HistoryFetchError>),
    History {
        token: RequestToken,
        result: Result<Vec<Message>, HistoryFetchError>,
    },
}

/// Handle for interacting with the backend from the TUI side.
pub struct Backend {
    cmd_tx: mpsc::UnboundedSender<BackendCommand>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
}

impl Backend {
    /// Spawn the command loop. Must be called inside a tokio runtime.
    pub fn start(client: HistoryClient, me: String) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        tokio::spawn(backend_loop(client, me, cmd_rx, resp_tx));

        Self { cmd_tx, resp_rx }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Suspends until a response is available. `None` once the backend is gone.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }
}

async fn backend_loop(
    client: HistoryClient,
    me: String,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let client = client.clone();
        let me = me.clone();
        let resp_tx = resp_tx.clone();

        // Responses may arrive out of order; history carries its token.
        tokio::spawn(async move {
            match cmd {
                BackendCommand::LoadRoster => {
                    let result = api::list_users_data(&client, &me).await;
                    if let Err(ref e) = result {
                        tracing::warn!("Roster fetch failed: {}", e);
                    }
                    let _ = resp_tx.send(BackendResponse::Roster(result));
                }
                BackendCommand::LoadHistory { peer, token } => {
                    // Failures are logged once the state applies the response.
                    let result = api::read_messages_data(&client, &me, &peer).await;
                    let _ = resp_tx.send(BackendResponse::History { token, result });
                }
            }
        });
    }
}
