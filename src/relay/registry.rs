//! Live connection registry and event routing for the relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::ValidationError;
use crate::models::{ClientEvent, ReadReceipt, ServerEvent};

/// Identifies one socket of a user.
pub type ConnId = u64;

/// Outbound frame queues keyed by username.
///
/// A user may hold several sockets; every one of them gets a copy.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<HashMap<String, Vec<(ConnId, mpsc::UnboundedSender<String>)>>>>,
    next_id: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket for `username`, returning its id and frame queue.
    pub fn register(&self, username: &str) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(username.to_string()).or_default().push((id, tx));
        (id, rx)
    }

    pub fn unregister(&self, username: &str, id: ConnId) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conns) = guard.get_mut(username) {
            conns.retain(|(cid, _)| *cid != id);
            if conns.is_empty() {
                guard.remove(username);
            }
        }
    }

    /// Queue `frame` on every socket of `username`. Returns how many took it.
    pub fn deliver(&self, username: &str, frame: &str) -> usize {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(username).map_or(0, |conns| {
            conns
                .iter()
                .filter(|(_, tx)| tx.send(frame.to_string()).is_ok())
                .count()
        })
    }

    #[cfg(test)]
    pub fn is_online(&self, username: &str) -> bool {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.contains_key(username)
    }
}

/// Decide who receives what for an event sent on `owner`'s connection.
///
/// The acting user must be the connection owner. Read receipts are turned
/// around: the author of the messages receives `message_read` with the
/// reader as sender.
pub fn route(owner: &str, event: ClientEvent) -> Result<(String, ServerEvent), ValidationError> {
    if event.actor() != owner {
        return Err(ValidationError::ForeignActor {
            event: event.name(),
            claimed: event.actor().to_string(),
            owner: owner.to_string(),
        });
    }

    Ok(match event {
        ClientEvent::SendMessage(m) => (m.receiver.clone(), ServerEvent::ReceiveMessage(m)),
        ClientEvent::Typing(p) => (p.receiver.clone(), ServerEvent::UserTyping(p)),
        ClientEvent::StopTyping(p) => (p.receiver.clone(), ServerEvent::UserStopTyping(p)),
        ClientEvent::MarkRead(r) => (
            r.sender.clone(),
            ServerEvent::MessageRead(ReadReceipt {
                sender: r.receiver,
                receiver: r.sender,
                ids: r.ids,
            }),
        ),
    })
}
