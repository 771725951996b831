//! Thread pane: the open conversation's messages and typing indicator.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::api::{format_time, read_mark};
use crate::conversation::{ConversationState, Phase};
use crate::models::Message;

/// Render the conversation. `scroll_back` counts lines scrolled up from the
/// newest message; zero pins the view to the bottom.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    state: &ConversationState,
    scroll_back: usize,
    focused: bool,
) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };
    let title = match state.peer() {
        Some(peer) => format!(" {} ", peer),
        None => " No conversation ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    block.render(area, buf);

    let lines = build_lines(state, inner.width as usize);
    let height = inner.height as usize;
    let bottom = lines.len().saturating_sub(scroll_back.min(lines.len()));
    let top = bottom.saturating_sub(height);
    let visible: Vec<Line> = lines[top..bottom].to_vec();

    Paragraph::new(visible).render(inner, buf);
}

/// Every display line for the current state, oldest first.
fn build_lines(state: &ConversationState, width: usize) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);

    if state.peer().is_none() {
        return vec![Line::from(Span::styled(
            " Pick a contact and press Enter",
            dim,
        ))];
    }

    if let Phase::Loading { .. } = state.phase() {
        return match state.last_error() {
            Some(err) => vec![
                Line::from(Span::styled(format!(" {}", err), Style::default().fg(Color::Red))),
                Line::from(Span::styled(" Press r to retry", Style::default().fg(Color::Yellow))),
            ],
            None => vec![Line::from(Span::styled(" Loading...", dim))],
        };
    }

    let mut lines = Vec::new();
    if state.messages().is_empty() {
        lines.push(Line::from(Span::styled(" (no messages yet)", dim)));
    }
    for msg in state.messages() {
        lines.extend(message_lines(msg, state.me(), width));
    }
    if let Some(who) = state.typing_user() {
        lines.push(Line::from(Span::styled(
            format!(" {} is typing...", who),
            dim.add_modifier(Modifier::ITALIC),
        )));
    }
    lines
}

/// `[HH:MM] sender: text` with the read mark on our own messages, wrapped.
fn message_lines(msg: &Message, me: &str, width: usize) -> Vec<Line<'static>> {
    let mine = msg.sender == me;
    let name_style = if mine {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    };

    let prefix = format!(" [{}] ", format_time(msg.created_at));
    let name = format!("{}: ", msg.sender);
    let indent = prefix.width() + name.width();
    let body_width = width.saturating_sub(indent + 3).max(1);

    let mut wrapped = wrap_text(&msg.message, body_width).into_iter();
    let first = wrapped.next().unwrap_or_default();

    let mut head = vec![
        Span::styled(prefix, Style::default().fg(Color::DarkGray)),
        Span::styled(name, name_style),
        Span::raw(first),
    ];
    let mut lines = Vec::new();
    let rest: Vec<String> = wrapped.collect();
    if rest.is_empty() && mine {
        head.push(Span::styled(format!(" {}", read_mark(msg.read)), read_style(msg.read)));
    }
    lines.push(Line::from(head));

    let count = rest.len();
    for (i, chunk) in rest.into_iter().enumerate() {
        let mut spans = vec![Span::raw(" ".repeat(indent)), Span::raw(chunk)];
        if mine && i + 1 == count {
            spans.push(Span::styled(format!(" {}", read_mark(msg.read)), read_style(msg.read)));
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn read_style(read: bool) -> Style {
    if read {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

/// Word wrap by display width. Words longer than a line are split.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![];
    }
    let mut result = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        for word in line.split_whitespace() {
            let mut word = word.to_string();
            while word.width() > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                let split = split_at_width(&word, max_width);
                let tail = word.split_off(split);
                result.push(word);
                word = tail;
            }
            if current.is_empty() {
                current = word;
            } else if current.width() + 1 + word.width() <= max_width {
                current.push(' ');
                current.push_str(&word);
            } else {
                result.push(std::mem::replace(&mut current, word));
            }
        }
        result.push(current);
    }
    if result.is_empty() {
        result.push(String::new());
    }
    result
}

/// Byte index of the longest prefix of `s` that fits in `width` columns.
/// Always at least one char so wrapping makes progress.
fn split_at_width(s: &str, width: usize) -> usize {
    let mut used = 0;
    for (i, c) in s.char_indices() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width && i > 0 {
            return i;
        }
        used += w;
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Action;
    use chrono::{TimeZone, Utc};

    fn msg(sender: &str, receiver: &str, text: &str, read: bool) -> Message {
        Message {
            client_id: None,
            sender: sender.into(),
            receiver: receiver.into(),
            message: text.into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap(),
            read,
        }
    }

    fn text_of(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn opened(history: Vec<Message>) -> ConversationState {
        let mut state = ConversationState::new("alice");
        let token = match state.apply(Action::Open { peer: "bob".into() }).as_slice() {
            [crate::conversation::Effect::FetchHistory { token, .. }] => *token,
            other => panic!("unexpected effects {:?}", other),
        };
        state.apply(Action::HistoryLoaded {
            token,
            result: Ok(history),
        });
        state
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("hello world foo", 11), vec!["hello world", "foo"]);
        assert_eq!(wrap_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap_text("", 10), vec![""]);
        assert!(wrap_text("x", 0).is_empty());
    }

    #[test]
    fn test_closed_shows_hint() {
        let state = ConversationState::new("alice");
        assert_eq!(text_of(&build_lines(&state, 40)), vec![" Pick a contact and press Enter"]);
    }

    #[test]
    fn test_loading_then_error_banner() {
        let mut state = ConversationState::new("alice");
        let effects = state.apply(Action::Open { peer: "bob".into() });
        assert_eq!(text_of(&build_lines(&state, 40)), vec![" Loading..."]);

        let token = match effects.as_slice() {
            [crate::conversation::Effect::FetchHistory { token, .. }] => *token,
            other => panic!("unexpected effects {:?}", other),
        };
        state.apply(Action::HistoryLoaded {
            token,
            result: Err(crate::error::HistoryFetchError::Status {
                url: "http://x/messages".into(),
                status: 500,
                body: String::new(),
            }),
        });
        let text = text_of(&build_lines(&state, 60));
        assert!(text[0].contains("Could not load conversation with bob"));
        assert!(text.last().unwrap().contains("r to retry"));
    }

    #[test]
    fn test_read_mark_only_on_own_messages() {
        let state = opened(vec![
            msg("bob", "alice", "hi", true),
            msg("alice", "bob", "hey", true),
            msg("alice", "bob", "there?", false),
        ]);
        let text = text_of(&build_lines(&state, 80));
        assert!(text[0].ends_with("bob: hi"));
        assert!(text[1].ends_with("alice: hey \u{2714}\u{2714}"));
        assert!(text[2].ends_with("alice: there? \u{2714}"));
    }

    #[test]
    fn test_render_pins_to_bottom() {
        let history: Vec<Message> = (0..10)
            .map(|i| msg("bob", "alice", &format!("m{}", i), true))
            .collect();
        let state = opened(history);

        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, 0, false);
        let row = |buf: &Buffer, y: u16| -> String {
            (0..40).map(|x| buf[(x, y)].symbol().to_string()).collect()
        };
        assert!(row(&buf, 3).contains("bob: m9"));

        let mut buf = Buffer::empty(area);
        render(area, &mut buf, &state, 2, false);
        assert!(row(&buf, 3).contains("bob: m7"));
    }
}
