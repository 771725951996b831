//! TUI application state and main event loop

use std::future;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::time;

use super::backend::{Backend, BackendCommand, BackendResponse};
use super::compose::ComposeState;
use super::log_capture::{LogFeed, Severity};
use super::roster::RosterState;
use super::ui;
use crate::api::HistoryClient;
use crate::channel::{ChannelUpdate, Connection};
use crate::config::Config;
use crate::conversation::{
    Action, ChatSession, ConversationState, EventSink, HistoryRequest, Phase, TypingDebouncer,
};
use crate::models::ServerEvent;

/// How often the status bar picks up new log lines.
const STATUS_REFRESH: Duration = Duration::from_millis(250);

/// Lines scrolled per PageUp/PageDown.
const PAGE: usize = 10;

/// Active pane in the TUI
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pane {
    #[default]
    Roster,
    Thread,
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Roster => "contacts",
            Pane::Thread => "thread",
            Pane::Compose => "compose",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Roster => Pane::Thread,
            Pane::Thread => Pane::Compose,
            Pane::Compose => Pane::Roster,
        }
    }

    fn prev(self) -> Self {
        match self {
            Pane::Roster => Pane::Compose,
            Pane::Thread => Pane::Roster,
            Pane::Compose => Pane::Thread,
        }
    }
}

/// Channel state as shown in the header and status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Connecting,
    Online,
    Reconnecting(String),
    Down(String),
}

impl Link {
    pub fn is_online(&self) -> bool {
        matches!(self, Link::Online)
    }

    pub fn describe(&self) -> String {
        match self {
            Link::Connecting => "Connecting...".to_string(),
            Link::Online => "Connected".to_string(),
            Link::Reconnecting(why) => format!("Reconnecting ({})", why),
            Link::Down(why) => format!("Offline: {}", why),
        }
    }
}

/// Application state
pub struct App<S: EventSink> {
    pub should_exit: bool,
    pub active_pane: Pane,
    pub link: Link,
    pub roster: RosterState,
    pub compose: ComposeState,
    /// Lines scrolled up from the newest message.
    pub thread_scroll: usize,
    pub status_message: Option<String>,
    pub status_is_error: bool,
    session: ChatSession<S>,
}

impl<S: EventSink> App<S> {
    pub fn new(state: ConversationState, sink: S) -> Self {
        Self {
            should_exit: false,
            active_pane: Pane::default(),
            link: Link::Connecting,
            roster: RosterState::default(),
            compose: ComposeState::default(),
            thread_scroll: 0,
            status_message: None,
            status_is_error: false,
            session: ChatSession::new(state, sink),
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        self.session.state()
    }

    pub fn me(&self) -> &str {
        self.session.state().me()
    }

    /// When the typing timer must fire next.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.session.state().typing_deadline()
    }

    /// Close the conversation and hand back the sink.
    pub fn into_sink(self) -> S {
        self.session.into_sink()
    }

    /// Handle one key press. Returns the backend work it caused.
    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Vec<BackendCommand> {
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        self.clear_status();
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_exit = true;
            return Vec::new();
        }
        match key.code {
            KeyCode::Tab => {
                self.active_pane = self.active_pane.next();
                return Vec::new();
            }
            KeyCode::BackTab => {
                self.active_pane = self.active_pane.prev();
                return Vec::new();
            }
            _ => {}
        }

        match self.active_pane {
            Pane::Roster => self.roster_key(key.code),
            Pane::Thread => self.thread_key(key.code),
            Pane::Compose => {
                self.compose_key(key.code, now);
                Vec::new()
            }
        }
    }

    fn roster_key(&mut self, code: KeyCode) -> Vec<BackendCommand> {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.roster.move_up(),
            KeyCode::Down | KeyCode::Char('j') => self.roster.move_down(),
            KeyCode::Enter => return self.open_selected(),
            KeyCode::Char('r') => return self.retry(),
            KeyCode::Char('q') | KeyCode::Esc => self.should_exit = true,
            _ => {}
        }
        Vec::new()
    }

    fn thread_key(&mut self, code: KeyCode) -> Vec<BackendCommand> {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.thread_scroll += 1,
            KeyCode::Down | KeyCode::Char('j') => {
                self.thread_scroll = self.thread_scroll.saturating_sub(1)
            }
            KeyCode::PageUp => self.thread_scroll += PAGE,
            KeyCode::PageDown => self.thread_scroll = self.thread_scroll.saturating_sub(PAGE),
            KeyCode::End => self.thread_scroll = 0,
            KeyCode::Char('r') => return self.retry(),
            KeyCode::Char('q') => self.should_exit = true,
            KeyCode::Esc => self.active_pane = Pane::Roster,
            _ => {}
        }
        Vec::new()
    }

    fn compose_key(&mut self, code: KeyCode, now: Instant) {
        match code {
            KeyCode::Char(c) => {
                self.compose.insert_char(c);
                self.session.dispatch(Action::Keystroke { now });
            }
            KeyCode::Backspace => {
                if self.compose.backspace() {
                    self.session.dispatch(Action::Keystroke { now });
                }
            }
            KeyCode::Left => self.compose.move_left(),
            KeyCode::Right => self.compose.move_right(),
            KeyCode::Enter => self.send(),
            KeyCode::Esc => self.active_pane = Pane::Roster,
            _ => {}
        }
    }

    fn send(&mut self) {
        if self.session.state().phase() != Phase::Open {
            self.set_status("Open a conversation before sending", true);
            return;
        }
        if let Some(text) = self.compose.take() {
            self.session.dispatch(Action::Send {
                text,
                now: Utc::now(),
            });
            self.thread_scroll = 0;
        }
    }

    fn open_selected(&mut self) -> Vec<BackendCommand> {
        let Some(peer) = self.roster.selected_username().map(str::to_string) else {
            return Vec::new();
        };
        self.active_pane = Pane::Compose;
        if self.session.state().peer() == Some(peer.as_str()) {
            return Vec::new();
        }
        self.roster.clear_news(&peer);
        self.thread_scroll = 0;
        let requests = self.session.dispatch(Action::Open { peer });
        history_commands(requests)
    }

    /// `r`: reload a failed roster, otherwise retry a failed history fetch.
    fn retry(&mut self) -> Vec<BackendCommand> {
        if self.roster.error.is_some() {
            self.roster.loading = true;
            self.roster.error = None;
            return vec![BackendCommand::LoadRoster];
        }
        history_commands(self.session.dispatch(Action::RetryHistory))
    }

    pub fn handle_channel_update(&mut self, update: ChannelUpdate) {
        match update {
            ChannelUpdate::Connected => {
                self.link = Link::Online;
                self.clear_status();
                tracing::info!("Connected as {}", self.me());
            }
            ChannelUpdate::Disconnected(e) if e.is_retriable() => {
                self.link = Link::Reconnecting(e.to_string());
            }
            ChannelUpdate::Disconnected(e) => {
                self.link = Link::Down(e.to_string());
            }
            ChannelUpdate::Event(event) => self.inbound(event),
        }
    }

    /// The connection task ended for good. Idempotent.
    pub fn channel_closed(&mut self) {
        if !matches!(self.link, Link::Down(_)) {
            self.link = Link::Down("channel closed".to_string());
        }
    }

    fn inbound(&mut self, event: ServerEvent) {
        if let ServerEvent::ReceiveMessage(ref m) = event {
            let state = self.session.state();
            let shown = state.phase() == Phase::Open && state.peer() == Some(m.sender.as_str());
            if m.receiver == state.me() && !shown {
                let sender = m.sender.clone();
                self.roster.mark_news(&sender);
            }
        }
        self.session.dispatch(Action::Inbound {
            event,
            now: Utc::now(),
        });
    }

    pub fn handle_backend_response(&mut self, resp: BackendResponse) {
        match resp {
            BackendResponse::Roster(Ok(users)) => self.roster.update(users),
            BackendResponse::Roster(Err(e)) => self.roster.set_error(e.to_string()),
            BackendResponse::History { token, result } => {
                self.session.dispatch(Action::HistoryLoaded { token, result });
            }
        }
    }

    /// Typing timer fired.
    pub fn tick(&mut self, now: Instant) {
        self.session.dispatch(Action::Tick { now });
    }

    /// Surface the newest logged warning in the status bar.
    pub fn refresh_status(&mut self, feed: &LogFeed) {
        if let Some((severity, line)) = feed.latest_problem() {
            self.set_status(&line, severity == Severity::Error);
        }
    }

    fn set_status(&mut self, msg: &str, is_error: bool) {
        self.status_message = Some(msg.to_string());
        self.status_is_error = is_error;
    }

    fn clear_status(&mut self) {
        self.status_message = None;
        self.status_is_error = false;
    }
}

fn history_commands(requests: Vec<HistoryRequest>) -> Vec<BackendCommand> {
    requests
        .into_iter()
        .map(|r| BackendCommand::LoadHistory {
            peer: r.peer,
            token: r.token,
        })
        .collect()
}

/// Run the TUI until the user quits.
///
/// `ratatui::init` installs a panic hook that restores the terminal, so an
/// async panic still leaves the shell usable.
pub async fn run(feed: LogFeed) -> Result<()> {
    let config = Config::load()?;
    let me = config.require_username()?.to_string();
    let client = HistoryClient::from_config(&config)?;

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &config, me, client, feed).await;
    ratatui::restore();
    result
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    config: &Config,
    me: String,
    client: HistoryClient,
    feed: LogFeed,
) -> Result<()> {
    let (conn, mut updates) = Connection::connect(&config.channel_url(), &me);
    let mut backend = Backend::start(client, me.clone());
    let state = ConversationState::with_debouncer(
        &me,
        TypingDebouncer::new(config.typing_quiet_period()),
    );
    let mut app = App::new(state, conn);
    backend.send(BackendCommand::LoadRoster);

    let mut events = EventStream::new();
    let mut status_refresh = time::interval(STATUS_REFRESH);
    let mut channel_open = true;

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app))?;

        let deadline = app.typing_deadline();
        let typing_timer = async move {
            match deadline {
                Some(at) => time::sleep_until(time::Instant::from_std(at)).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) => {
                    for cmd in app.handle_key(key, Instant::now()) {
                        backend.send(cmd);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => app.should_exit = true,
            },
            update = updates.recv(), if channel_open => match update {
                Some(update) => app.handle_channel_update(update),
                None => {
                    // Task gone for good; keep the UI up so history stays readable.
                    channel_open = false;
                    app.channel_closed();
                }
            },
            Some(resp) = backend.recv() => app.handle_backend_response(resp),
            _ = typing_timer => app.tick(Instant::now()),
            _ = status_refresh.tick() => app.refresh_status(&feed),
        }
    }

    app.into_sink().disconnect().await;
    Ok(())
}
