//! Roster widget: the contact list in the left column.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::User;

/// One roster entry.
#[derive(Clone)]
pub struct Contact {
    pub username: String,
    /// Sent us something while their thread was not open.
    pub has_news: bool,
}

/// Roster state: the contacts and the cursor.
pub struct RosterState {
    pub contacts: Vec<Contact>,
    pub selected: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for RosterState {
    fn default() -> Self {
        Self {
            contacts: Vec::new(),
            selected: 0,
            loading: true,
            error: None,
        }
    }
}

impl RosterState {
    /// Replace the contacts from a roster response, keeping the cursor on the
    /// same user when they are still present.
    pub fn update(&mut self, users: Vec<User>) {
        let current = self.selected_username().map(str::to_string);
        self.contacts = users
            .into_iter()
            .map(|u| Contact {
                has_news: self.has_news(&u.username),
                username: u.username,
            })
            .collect();
        self.loading = false;
        self.error = None;
        self.selected = current
            .and_then(|name| self.contacts.iter().position(|c| c.username == name))
            .unwrap_or(0);
    }

    pub fn set_error(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }

    pub fn selected_username(&self) -> Option<&str> {
        self.contacts.get(self.selected).map(|c| c.username.as_str())
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.selected + 1 < self.contacts.len() {
            self.selected += 1;
        }
    }

    /// Flag `username` as having unseen messages. Unknown senders are added.
    pub fn mark_news(&mut self, username: &str) {
        match self.contacts.iter_mut().find(|c| c.username == username) {
            Some(c) => c.has_news = true,
            None => self.contacts.push(Contact {
                username: username.to_string(),
                has_news: true,
            }),
        }
    }

    pub fn clear_news(&mut self, username: &str) {
        if let Some(c) = self.contacts.iter_mut().find(|c| c.username == username) {
            c.has_news = false;
        }
    }

    fn has_news(&self, username: &str) -> bool {
        self.contacts
            .iter()
            .any(|c| c.username == username && c.has_news)
    }
}

/// Keep the cursor row inside a window of `visible` rows.
fn compute_scroll_offset(selected: usize, visible: usize) -> usize {
    if visible == 0 || selected < visible {
        0
    } else {
        selected + 1 - visible
    }
}

/// Render the roster into `area`. `open_peer` is drawn highlighted.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    state: &RosterState,
    open_peer: Option<&str>,
    focused: bool,
) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .title(" Contacts ")
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    block.render(area, buf);

    let dim = Style::default().fg(Color::DarkGray);
    if state.loading {
        Paragraph::new(Line::from(Span::styled(" Loading...", dim))).render(inner, buf);
        return;
    }
    if let Some(ref err) = state.error {
        let lines = vec![
            Line::from(Span::styled(" Roster failed", Style::default().fg(Color::Red))),
            Line::from(Span::styled(format!(" {}", err), dim)),
            Line::from(Span::styled(" r to retry", dim)),
        ];
        Paragraph::new(lines).render(inner, buf);
        return;
    }
    if state.contacts.is_empty() {
        Paragraph::new(Line::from(Span::styled(" (nobody else)", dim))).render(inner, buf);
        return;
    }

    let visible = inner.height as usize;
    let offset = compute_scroll_offset(state.selected, visible);
    let lines: Vec<Line> = state
        .contacts
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(i, contact)| {
            let is_cursor = i == state.selected;
            let is_open = open_peer == Some(contact.username.as_str());

            let mut style = Style::default().fg(Color::White);
            if is_open {
                style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
            }
            if is_cursor && focused {
                style = style.bg(Color::DarkGray);
            }

            let marker = if is_cursor { ">" } else { " " };
            let mut spans = vec![Span::styled(format!("{} {}", marker, contact.username), style)];
            if contact.has_news {
                spans.push(Span::styled(" *", Style::default().fg(Color::Green)));
            }
            Line::from(spans)
        })
        .collect();

    Paragraph::new(lines).render(inner, buf);
}
