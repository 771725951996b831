//! Conversation state container.
//!
//! One authoritative value per client, mutated only through [`ConversationState::apply`].
//! Transitions never perform I/O; they return [`Effect`]s for the session to carry out.

use std::time::Instant;

use chrono::{DateTime, Utc};

use super::typing::{TypingDebouncer, TypingSignal};
use crate::error::HistoryFetchError;
use crate::models::{ClientEvent, Message, MessagePayload, Participants, ReadReceipt, ServerEvent};

/// Identifies one history fetch. Only the latest token may populate state.
pub type RequestToken = u64;

/// Lifecycle of the active conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No peer selected.
    Closed,
    /// History request in flight (or failed and awaiting retry).
    Loading { token: RequestToken },
    /// History loaded, live events applied.
    Open,
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum Action {
    Open {
        peer: String,
    },
    HistoryLoaded {
        token: RequestToken,
        result: Result<Vec<Message>, HistoryFetchError>,
    },
    RetryHistory,
    Send {
        text: String,
        now: DateTime<Utc>,
    },
    Inbound {
        event: ServerEvent,
        now: DateTime<Utc>,
    },
    Keystroke {
        now: Instant,
    },
    Tick {
        now: Instant,
    },
    Close,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(ClientEvent),
    FetchHistory { peer: String, token: RequestToken },
}

#[derive(Debug)]
pub struct ConversationState {
    me: String,
    peer: Option<String>,
    phase: Phase,
    messages: Vec<Message>,
    typing_user: Option<String>,
    last_error: Option<String>,
    next_token: RequestToken,
    typing: TypingDebouncer,
    /// Peer the in-progress typing burst was announced to.
    typing_peer: Option<String>,
}

impl ConversationState {
    pub fn new(me: &str) -> Self {
        Self::with_debouncer(me, TypingDebouncer::default())
    }

    pub fn with_debouncer(me: &str, typing: TypingDebouncer) -> Self {
        Self {
            me: me.to_string(),
            peer: None,
            phase: Phase::Closed,
            messages: Vec::new(),
            typing_user: None,
            last_error: None,
            next_token: 0,
            typing,
            typing_peer: None,
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Messages of the open conversation in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn typing_user(&self) -> Option<&str> {
        self.typing_user.as_deref()
    }

    /// Last history failure, shown as a retriable banner.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the pending `stop_typing` is due.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Apply one action and return the effects to perform, in order.
    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        let mut effects = Vec::new();
        match action {
            Action::Open { peer } => self.open(peer, &mut effects),
            Action::HistoryLoaded { token, result } => {
                self.history_loaded(token, result, &mut effects)
            }
            Action::RetryHistory => self.retry(&mut effects),
            Action::Send { text, now } => self.send(&text, now, &mut effects),
            Action::Inbound { event, now } => self.inbound(event, now),
            Action::Keystroke { now } => self.keystroke(now, &mut effects),
            Action::Tick { now } => {
                if let Some(TypingSignal::Stop) = self.typing.poll(now) {
                    self.emit_stop_typing(&mut effects);
                }
            }
            Action::Close => {
                self.end_typing(&mut effects);
                self.peer = None;
                self.phase = Phase::Closed;
                self.messages.clear();
                self.typing_user = None;
                self.last_error = None;
            }
        }
        effects
    }

    fn open(&mut self, peer: String, effects: &mut Vec<Effect>) {
        self.end_typing(effects);
        let token = self.issue_token();
        tracing::debug!(peer = %peer, token, "opening conversation");
        self.peer = Some(peer.clone());
        self.phase = Phase::Loading { token };
        self.messages.clear();
        self.typing_user = None;
        self.last_error = None;
        effects.push(Effect::FetchHistory { peer, token });
    }

    fn retry(&mut self, effects: &mut Vec<Effect>) {
        let Some(peer) = self.peer.clone() else {
            return;
        };
        if !matches!(self.phase, Phase::Loading { .. }) || self.last_error.is_none() {
            return;
        }
        let token = self.issue_token();
        tracing::debug!(peer = %peer, token, "retrying history fetch");
        self.phase = Phase::Loading { token };
        self.last_error = None;
        effects.push(Effect::FetchHistory { peer, token });
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        self.next_token
    }

    fn history_loaded(
        &mut self,
        token: RequestToken,
        result: Result<Vec<Message>, HistoryFetchError>,
        effects: &mut Vec<Effect>,
    ) {
        if self.phase != (Phase::Loading { token }) {
            tracing::debug!(token, "discarding stale history response");
            return;
        }
        let Some(peer) = self.peer.clone() else {
            return;
        };

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("History fetch for {} failed: {}", peer, e);
                self.last_error = Some(format!("Could not load conversation with {}: {}", peer, e));
                return;
            }
        };

        self.messages = history;
        self.phase = Phase::Open;
        self.last_error = None;
        tracing::debug!(peer = %peer, count = self.messages.len(), "conversation open");

        effects.push(Effect::Emit(ClientEvent::MarkRead(self.read_receipt_for(&peer))));
    }

    /// Receipt acknowledging what `peer` sent us.
    ///
    /// Targeted when every unread message carries the id its sender stamped
    /// at send time, blanket otherwise.
    fn read_receipt_for(&self, peer: &str) -> ReadReceipt {
        let unread: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.sender == peer && m.receiver == self.me && !m.read)
            .collect();
        let ids: Option<Vec<String>> = unread.iter().map(|m| m.client_id.clone()).collect();
        ReadReceipt {
            sender: peer.to_string(),
            receiver: self.me.clone(),
            ids: ids.unwrap_or_default(),
        }
    }

    fn send(&mut self, text: &str, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        if text.trim().is_empty() {
            return;
        }
        let Some(peer) = self.open_peer() else {
            tracing::debug!("send ignored: no open conversation");
            return;
        };
        let message = Message::outgoing(&self.me, &peer, text, now);
        effects.push(Effect::Emit(ClientEvent::SendMessage(MessagePayload::from(
            message.clone(),
        ))));
        self.messages.push(message);
    }

    fn inbound(&mut self, event: ServerEvent, now: DateTime<Utc>) {
        match event {
            ServerEvent::ReceiveMessage(payload) => self.receive(payload, now),
            ServerEvent::UserTyping(p) => {
                if p.receiver == self.me && self.open_peer().as_deref() == Some(p.sender.as_str()) {
                    self.typing_user = Some(p.sender);
                }
            }
            ServerEvent::UserStopTyping(_) => {
                self.typing_user = None;
            }
            ServerEvent::MessageRead(receipt) => self.mark_read(receipt),
        }
    }

    fn receive(&mut self, payload: MessagePayload, now: DateTime<Utc>) {
        if payload.sender == self.me {
            tracing::debug!("dropping echo of own message");
            return;
        }
        let Some(peer) = self.open_peer() else {
            return;
        };
        let message = payload.into_message(now);
        if !message.is_between(&self.me, &peer) {
            tracing::debug!(
                sender = %message.sender,
                receiver = %message.receiver,
                "dropping message for another conversation"
            );
            return;
        }
        self.messages.push(message);
    }

    fn mark_read(&mut self, receipt: ReadReceipt) {
        if receipt.receiver != self.me || self.open_peer().as_deref() != Some(receipt.sender.as_str())
        {
            return;
        }
        let me = &self.me;
        let mut flipped = 0usize;
        for m in self.messages.iter_mut().filter(|m| &m.sender == me) {
            let targeted = receipt.ids.is_empty()
                || m.client_id.as_ref().is_some_and(|id| receipt.ids.contains(id));
            if targeted && m.mark_read() {
                flipped += 1;
            }
        }
        tracing::debug!(reader = %receipt.sender, flipped, "read receipt applied");
    }

    fn keystroke(&mut self, now: Instant, effects: &mut Vec<Effect>) {
        if let Some(TypingSignal::Stop) = self.typing.poll(now) {
            self.emit_stop_typing(effects);
        }
        let Some(peer) = self.open_peer() else {
            return;
        };
        if let Some(TypingSignal::Start) = self.typing.keystroke(now) {
            effects.push(Effect::Emit(ClientEvent::Typing(Participants::new(
                &self.me, &peer,
            ))));
            self.typing_peer = Some(peer);
        }
    }

    /// Cancel the debounce timer, sending the pending stop if a burst was active.
    fn end_typing(&mut self, effects: &mut Vec<Effect>) {
        if let Some(TypingSignal::Stop) = self.typing.cancel() {
            self.emit_stop_typing(effects);
        }
    }

    fn emit_stop_typing(&mut self, effects: &mut Vec<Effect>) {
        if let Some(peer) = self.typing_peer.take() {
            effects.push(Effect::Emit(ClientEvent::StopTyping(Participants::new(
                &self.me, &peer,
            ))));
        }
    }

    fn open_peer(&self) -> Option<String> {
        match self.phase {
            Phase::Open => self.peer.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn incoming(sender: &str, receiver: &str, text: &str) -> MessagePayload {
        MessagePayload {
            client_id: None,
            sender: sender.into(),
            receiver: receiver.into(),
            message: text.into(),
            created_at: None,
            read: None,
        }
    }

    fn history_msg(sender: &str, receiver: &str, text: &str, read: bool) -> Message {
        Message {
            client_id: None,
            sender: sender.into(),
            receiver: receiver.into(),
            message: text.into(),
            created_at: Utc::now(),
            read,
        }
    }

    fn token_of(effects: &[Effect]) -> RequestToken {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::FetchHistory { token, .. } => Some(*token),
                _ => None,
            })
            .expect("expected a history fetch")
    }

    /// Open `peer` for `me` with the given history, returning the effects of the load.
    fn opened(me: &str, peer: &str, history: Vec<Message>) -> (ConversationState, Vec<Effect>) {
        let mut state = ConversationState::new(me);
        let token = token_of(&state.apply(Action::Open { peer: peer.into() }));
        let effects = state.apply(Action::HistoryLoaded {
            token,
            result: Ok(history),
        });
        (state, effects)
    }

    fn inbound(state: &mut ConversationState, event: ServerEvent) -> Vec<Effect> {
        state.apply(Action::Inbound {
            event,
            now: Utc::now(),
        })
    }

    fn send(state: &mut ConversationState, text: &str) -> Vec<Effect> {
        state.apply(Action::Send {
            text: text.into(),
            now: Utc::now(),
        })
    }

    #[test]
    fn test_open_transitions_closed_loading_open() {
        let mut state = ConversationState::new("alice");
        assert_eq!(state.phase(), Phase::Closed);

        let effects = state.apply(Action::Open { peer: "bob".into() });
        let token = token_of(&effects);
        assert_eq!(state.phase(), Phase::Loading { token });
        assert_eq!(state.peer(), Some("bob"));

        state.apply(Action::HistoryLoaded {
            token,
            result: Ok(vec![]),
        });
        assert_eq!(state.phase(), Phase::Open);
    }

    #[test]
    fn test_open_emits_mark_read_for_peer() {
        let (state, effects) = opened("alice", "bob", vec![history_msg("bob", "alice", "hi", false)]);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(
            effects,
            vec![Effect::Emit(ClientEvent::MarkRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "alice".into(),
                ids: vec![],
            }))]
        );
    }

    #[test]
    fn test_open_targets_ids_when_all_unread_have_ids() {
        let mut first = history_msg("bob", "alice", "hi", false);
        first.client_id = Some("m1".into());
        let mut second = history_msg("bob", "alice", "there", false);
        second.client_id = Some("m2".into());
        let mut old = history_msg("bob", "alice", "old", true);
        old.client_id = Some("m0".into());

        let (_, effects) = opened("alice", "bob", vec![old, first, second]);
        match &effects[0] {
            Effect::Emit(ClientEvent::MarkRead(r)) => assert_eq!(r.ids, vec!["m1", "m2"]),
            other => panic!("unexpected effect {:?}", other),
        }
    }

    #[test]
    fn test_stale_history_is_discarded() {
        let mut state = ConversationState::new("alice");
        let bob_token = token_of(&state.apply(Action::Open { peer: "bob".into() }));
        let carol_token = token_of(&state.apply(Action::Open {
            peer: "carol".into(),
        }));
        assert_ne!(bob_token, carol_token);

        state.apply(Action::HistoryLoaded {
            token: carol_token,
            result: Ok(vec![history_msg("carol", "alice", "yo", false)]),
        });
        // Bob's late response must not overwrite carol's thread.
        let effects = state.apply(Action::HistoryLoaded {
            token: bob_token,
            result: Ok(vec![history_msg("bob", "alice", "hi", false)]),
        });
        assert!(effects.is_empty());
        assert_eq!(state.peer(), Some("carol"));
        assert_eq!(state.messages()[0].message, "yo");
    }

    #[test]
    fn test_history_failure_stays_loading_and_retries() {
        let mut state = ConversationState::new("alice");
        let token = token_of(&state.apply(Action::Open { peer: "bob".into() }));
        let err = HistoryFetchError::Status {
            url: "http://localhost/messages".into(),
            status: 500,
            body: String::new(),
        };
        let effects = state.apply(Action::HistoryLoaded {
            token,
            result: Err(err),
        });
        assert!(effects.is_empty());
        assert_eq!(state.phase(), Phase::Loading { token });
        assert!(state.last_error().is_some());

        let retry = state.apply(Action::RetryHistory);
        let new_token = token_of(&retry);
        assert!(new_token > token);
        assert_eq!(state.last_error(), None);
        assert_eq!(state.phase(), Phase::Loading { token: new_token });
    }

    #[test]
    fn test_retry_without_failure_is_noop() {
        let mut state = ConversationState::new("alice");
        assert!(state.apply(Action::RetryHistory).is_empty());
        state.apply(Action::Open { peer: "bob".into() });
        assert!(state.apply(Action::RetryHistory).is_empty());
    }

    #[test]
    fn test_send_appends_optimistically() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        let effects = send(&mut state, "hello");

        let last = state.messages().last().unwrap();
        assert_eq!(last.sender, "alice");
        assert_eq!(last.receiver, "bob");
        assert_eq!(last.message, "hello");
        assert!(!last.read);

        match &effects[..] {
            [Effect::Emit(ClientEvent::SendMessage(p))] => {
                assert_eq!(p.message, "hello");
                assert_eq!(p.read, Some(false));
                assert_eq!(p.client_id, last.client_id);
            }
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[test]
    fn test_send_whitespace_is_noop() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        for text in ["", "   ", "\n\t "] {
            assert!(send(&mut state, text).is_empty());
        }
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_send_requires_open_conversation() {
        let mut state = ConversationState::new("alice");
        assert!(send(&mut state, "hello").is_empty());
        state.apply(Action::Open { peer: "bob".into() });
        assert!(send(&mut state, "hello").is_empty());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_receive_appends_for_open_peer() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        inbound(
            &mut state,
            ServerEvent::ReceiveMessage(incoming("bob", "alice", "hey")),
        );
        assert_eq!(state.messages().len(), 1);
        assert!(!state.messages()[0].read);
    }

    #[test]
    fn test_receive_own_echo_is_dropped() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        send(&mut state, "hello");
        inbound(
            &mut state,
            ServerEvent::ReceiveMessage(incoming("alice", "bob", "hello")),
        );
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_receive_for_other_peer_is_dropped() {
        let (mut state, _) = opened("alice", "bob", vec![history_msg("bob", "alice", "hi", false)]);
        let before = state.messages().to_vec();
        inbound(
            &mut state,
            ServerEvent::ReceiveMessage(incoming("carol", "alice", "psst")),
        );
        assert_eq!(state.messages(), &before[..]);
    }

    #[test]
    fn test_receive_while_loading_is_dropped() {
        let mut state = ConversationState::new("alice");
        state.apply(Action::Open { peer: "bob".into() });
        inbound(
            &mut state,
            ServerEvent::ReceiveMessage(incoming("bob", "alice", "early")),
        );
        assert!(state.messages().is_empty());
    }

    #[test]
    fn test_receive_duplicates_are_kept() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        for _ in 0..2 {
            inbound(
                &mut state,
                ServerEvent::ReceiveMessage(incoming("bob", "alice", "dup")),
            );
        }
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn test_message_read_flips_own_messages() {
        let (mut state, _) = opened("alice", "bob", vec![history_msg("bob", "alice", "hi", false)]);
        send(&mut state, "one");
        send(&mut state, "two");

        inbound(
            &mut state,
            ServerEvent::MessageRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "alice".into(),
                ids: vec![],
            }),
        );

        for m in state.messages() {
            if m.sender == "alice" {
                assert!(m.read, "{} should be read", m.message);
            } else {
                assert!(!m.read, "peer message untouched");
            }
        }
    }

    #[test]
    fn test_message_read_for_other_peer_is_ignored() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        send(&mut state, "one");
        inbound(
            &mut state,
            ServerEvent::MessageRead(ReadReceipt {
                sender: "carol".into(),
                receiver: "alice".into(),
                ids: vec![],
            }),
        );
        inbound(
            &mut state,
            ServerEvent::MessageRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "dave".into(),
                ids: vec![],
            }),
        );
        assert!(!state.messages()[0].read);
    }

    #[test]
    fn test_message_read_targets_ids() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        send(&mut state, "one");
        send(&mut state, "two");
        let first_id = state.messages()[0].client_id.clone().unwrap();

        inbound(
            &mut state,
            ServerEvent::MessageRead(ReadReceipt {
                sender: "bob".into(),
                receiver: "alice".into(),
                ids: vec![first_id],
            }),
        );
        assert!(state.messages()[0].read);
        assert!(!state.messages()[1].read);
    }

    #[test]
    fn test_read_never_reverses_on_reopen_history() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        send(&mut state, "one");
        let receipt = ServerEvent::MessageRead(ReadReceipt {
            sender: "bob".into(),
            receiver: "alice".into(),
            ids: vec![],
        });
        inbound(&mut state, receipt.clone());
        inbound(&mut state, receipt);
        assert!(state.messages()[0].read);
    }

    #[test]
    fn test_typing_indicator_scoped_to_open_peer() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        inbound(
            &mut state,
            ServerEvent::UserTyping(Participants::new("carol", "alice")),
        );
        assert_eq!(state.typing_user(), None);

        inbound(
            &mut state,
            ServerEvent::UserTyping(Participants::new("bob", "alice")),
        );
        assert_eq!(state.typing_user(), Some("bob"));

        // Stop clears regardless of payload.
        inbound(
            &mut state,
            ServerEvent::UserStopTyping(Participants::new("carol", "alice")),
        );
        assert_eq!(state.typing_user(), None);
    }

    #[test]
    fn test_keystroke_burst_emits_typing_then_stop() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        for i in 0..4 {
            emitted.extend(state.apply(Action::Keystroke {
                now: t0 + Duration::from_millis(100 * i),
            }));
        }
        emitted.extend(state.apply(Action::Tick {
            now: t0 + Duration::from_millis(1299),
        }));
        assert_eq!(
            emitted,
            vec![Effect::Emit(ClientEvent::Typing(Participants::new("alice", "bob")))]
        );

        let stop = state.apply(Action::Tick {
            now: t0 + Duration::from_millis(1300),
        });
        assert_eq!(
            stop,
            vec![Effect::Emit(ClientEvent::StopTyping(Participants::new("alice", "bob")))]
        );
    }

    #[test]
    fn test_switching_peer_stops_typing_to_previous_peer() {
        let (mut state, _) = opened("alice", "bob", vec![]);
        state.apply(Action::Keystroke {
            now: Instant::now(),
        });
        let effects = state.apply(Action::Open {
            peer: "carol".into(),
        });
        assert_eq!(
            effects[0],
            Effect::Emit(ClientEvent::StopTyping(Participants::new("alice", "bob")))
        );
        assert!(matches!(effects[1], Effect::FetchHistory { .. }));
        assert_eq!(state.typing_deadline(), None);
    }

    #[test]
    fn test_close_clears_everything() {
        let (mut state, _) = opened("alice", "bob", vec![history_msg("bob", "alice", "hi", false)]);
        state.apply(Action::Keystroke {
            now: Instant::now(),
        });
        let effects = state.apply(Action::Close);
        assert_eq!(effects.len(), 1);
        assert_eq!(state.phase(), Phase::Closed);
        assert!(state.messages().is_empty());
        assert_eq!(state.peer(), None);
    }
}
