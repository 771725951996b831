//! Error types for the transport channel, the history service and event validation
//!
//! None of these are fatal: the connection reconnects, history fetches can be
//! retried and invalid events are dropped.

use thiserror::Error;

/// Failure on the transport channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid channel URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to connect to {url}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("connection lost: {0}")]
    Lost(String),

    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether reconnecting could help. A bad URL stays bad.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, TransportError::InvalidUrl { .. })
    }
}

/// Failure fetching the roster or a thread from the history service.
#[derive(Debug, Error)]
pub enum HistoryFetchError {
    #[error("invalid history URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("GET {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Malformed or inconsistent event payload.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed event frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("{event} acted as `{claimed}` on a connection owned by `{owner}`")]
    ForeignActor {
        event: &'static str,
        claimed: String,
        owner: String,
    },
}
