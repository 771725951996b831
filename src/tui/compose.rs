//! Compose box: single-line text input.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// State for the compose box.
#[derive(Default)]
pub struct ComposeState {
    /// Current input text.
    pub input: String,
    /// Cursor position (character offset into `input`).
    pub cursor_pos: usize,
}

impl ComposeState {
    /// Insert a character at the current cursor position.
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    /// Delete the character before the cursor. Returns true if the text changed.
    pub fn backspace(&mut self) -> bool {
        if self.cursor_pos == 0 {
            return false;
        }
        let end = self.char_to_byte(self.cursor_pos);
        let start = self.char_to_byte(self.cursor_pos - 1);
        self.input.drain(start..end);
        self.cursor_pos -= 1;
        true
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor_pos = (self.cursor_pos + 1).min(self.input.chars().count());
    }

    /// Take the text for sending and clear the box.
    ///
    /// Whitespace-only input stays in the box and yields nothing. The text
    /// is returned as typed, not trimmed.
    pub fn take(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }
        self.cursor_pos = 0;
        Some(std::mem::take(&mut self.input))
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

/// Height of the compose box: border + input line + border.
pub const COMPOSE_HEIGHT: u16 = 3;

/// Render the compose box and place the cursor when focused.
pub fn render(area: Rect, frame: &mut Frame, state: &ComposeState, peer: Option<&str>, focused: bool) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width < 2 {
        return;
    }
    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let avail = inner.width as usize - 1;

    if state.input.is_empty() {
        let placeholder = match peer {
            Some(peer) => format!(" Type a message to {}...", peer),
            None => " Select a contact to start chatting".to_string(),
        };
        let line = Line::from(Span::styled(placeholder, Style::default().fg(Color::DarkGray)));
        frame.render_widget(Paragraph::new(line), input_area);
        if focused {
            frame.set_cursor_position((input_area.x + 1, input_area.y));
        }
        return;
    }

    let (visible, cursor_col) = visible_window(&state.input, state.cursor_pos, avail);
    let line = Line::from(Span::styled(format!(" {}", visible), Style::default().fg(Color::White)));
    frame.render_widget(Paragraph::new(line), input_area);
    if focused {
        frame.set_cursor_position((input_area.x + 1 + cursor_col as u16, input_area.y));
    }
}

/// Slice of `input` that fits in `width` columns with the cursor visible,
/// plus the cursor's column inside that slice.
fn visible_window(input: &str, cursor_pos: usize, width: usize) -> (String, usize) {
    if width == 0 {
        return (String::new(), 0);
    }
    let chars: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();

    // Walk back from the cursor until the window is full.
    let mut start = cursor_pos.min(chars.len());
    let mut used = 0usize;
    while start > 0 && used + chars[start - 1].1 < width {
        used += chars[start - 1].1;
        start -= 1;
    }
    let cursor_col = used;

    let mut visible = String::new();
    let mut cols = 0usize;
    for &(c, w) in &chars[start..] {
        if cols + w > width {
            break;
        }
        visible.push(c);
        cols += w;
    }
    (visible, cursor_col)
}
