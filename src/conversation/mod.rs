//! Conversation core: per-peer message state, read receipts and typing.

mod session;
mod state;
mod typing;

pub use session::{ChatSession, EventSink, HistoryRequest, RecordingSink};
pub use state::{Action, ConversationState, Effect, Phase, RequestToken};
pub use typing::TypingDebouncer;
