//! Session: conversation state wired to an outbound event sink.

use std::cell::RefCell;
use std::rc::Rc;

use super::state::{Action, ConversationState, Effect, RequestToken};
use crate::error::TransportError;
use crate::models::ClientEvent;

/// Where outbound channel events go.
pub trait EventSink {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;
}

impl<S: EventSink + ?Sized> EventSink for Rc<S> {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        (**self).emit(event)
    }
}

/// Sink that keeps everything it was given. Used by the `send` command for
/// dry runs and by tests.
#[derive(Default)]
pub struct RecordingSink {
    events: RefCell<Vec<ClientEvent>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<ClientEvent> {
        self.events.take()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.events.borrow_mut().push(event);
        Ok(())
    }
}

/// A history request the caller must perform and report back with
/// [`Action::HistoryLoaded`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub peer: String,
    pub token: RequestToken,
}

/// Owns the conversation state and the injected sink.
pub struct ChatSession<S: EventSink> {
    state: ConversationState,
    sink: S,
}

impl<S: EventSink> ChatSession<S> {
    pub fn new(state: ConversationState, sink: S) -> Self {
        Self { state, sink }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Apply an action, forward emitted events to the sink and hand back any
    /// history requests.
    ///
    /// Sink failures are logged and swallowed; local state already reflects
    /// the action.
    pub fn dispatch(&mut self, action: Action) -> Vec<HistoryRequest> {
        let mut requests = Vec::new();
        for effect in self.state.apply(action) {
            match effect {
                Effect::Emit(event) => {
                    let name = event.name();
                    if let Err(e) = self.sink.emit(event) {
                        tracing::warn!("Failed to emit {}: {}", name, e);
                    }
                }
                Effect::FetchHistory { peer, token } => {
                    requests.push(HistoryRequest { peer, token });
                }
            }
        }
        requests
    }

    /// Tear down: cancel typing and close the conversation.
    pub fn close(&mut self) {
        self.dispatch(Action::Close);
    }

    /// Close and give the sink back, e.g. to disconnect it.
    pub fn into_sink(mut self) -> S {
        self.close();
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Participants, ReadReceipt, ServerEvent};
    use chrono::Utc;
    use std::time::Instant;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: ClientEvent) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn session(me: &str) -> (ChatSession<Rc<RecordingSink>>, Rc<RecordingSink>) {
        let sink = Rc::new(RecordingSink::default());
        (
            ChatSession::new(ConversationState::new(me), Rc::clone(&sink)),
            sink,
        )
    }

    fn open(session: &mut ChatSession<Rc<RecordingSink>>, peer: &str, history: Vec<Message>) {
        let req = session.dispatch(Action::Open { peer: peer.into() });
        assert_eq!(req.len(), 1);
        assert_eq!(req[0].peer, peer);
        session.dispatch(Action::HistoryLoaded {
            token: req[0].token,
            result: Ok(history),
        });
    }

    #[test]
    fn test_alice_opens_bob_and_marks_read() {
        let (mut s, sink) = session("alice");
        let hi = Message {
            client_id: None,
            sender: "bob".into(),
            receiver: "alice".into(),
            message: "hi".into(),
            created_at: Utc::now(),
            read: false,
        };
        open(&mut s, "bob", vec![hi]);
        assert_eq!(
            sink.take(),
            vec![ClientEvent::MarkRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "alice".into(),
                ids: vec![],
            })]
        );
    }

    #[test]
    fn test_alice_sends_hello_before_echo() {
        let (mut s, sink) = session("alice");
        open(&mut s, "bob", vec![]);
        sink.take();

        s.dispatch(Action::Send {
            text: "hello".into(),
            now: Utc::now(),
        });
        let local = s.state().messages().last().unwrap();
        assert_eq!(local.sender, "alice");
        assert_eq!(local.message, "hello");
        assert!(!local.read);

        let sent = sink.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), "send_message");
    }

    #[test]
    fn test_alice_receives_message_read() {
        let (mut s, _sink) = session("alice");
        open(&mut s, "bob", vec![]);
        for text in ["a", "b", "c"] {
            s.dispatch(Action::Send {
                text: text.into(),
                now: Utc::now(),
            });
        }
        s.dispatch(Action::Inbound {
            event: ServerEvent::MessageRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "alice".into(),
                ids: vec![],
            }),
            now: Utc::now(),
        });
        assert!(s.state().messages().iter().all(|m| m.read));
    }

    #[test]
    fn test_close_sends_pending_stop_typing() {
        let (mut s, sink) = session("alice");
        open(&mut s, "bob", vec![]);
        sink.take();
        s.dispatch(Action::Keystroke {
            now: Instant::now(),
        });
        s.close();
        assert_eq!(
            sink.take(),
            vec![
                ClientEvent::Typing(Participants::new("alice", "bob")),
                ClientEvent::StopTyping(Participants::new("alice", "bob")),
            ]
        );
    }

    #[test]
    fn test_sink_failure_keeps_optimistic_message() {
        let mut s = ChatSession::new(ConversationState::new("alice"), FailingSink);
        let req = s.dispatch(Action::Open { peer: "bob".into() });
        s.dispatch(Action::HistoryLoaded {
            token: req[0].token,
            result: Ok(vec![]),
        });
        s.dispatch(Action::Send {
            text: "still here".into(),
            now: Utc::now(),
        });
        assert_eq!(s.state().messages().len(), 1);
    }
}
