//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::{App, Pane};
use super::compose;
use super::roster;
use super::thread;
use crate::conversation::EventSink;

/// Returns status indicator symbol and color based on online state
fn status_indicator(is_online: bool) -> (&'static str, Color) {
    if is_online {
        ("*", Color::Green)
    } else {
        ("o", Color::Red)
    }
}

/// Main render function
pub fn render<S: EventSink>(frame: &mut Frame, app: &App<S>) {
    let area = frame.area();

    // Layout: header (1 line) + main content + status bar (1 line)
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let [roster_area, content_area] =
        Layout::horizontal([Constraint::Length(22), Constraint::Fill(1)]).areas(main_area);

    let conversation = app.conversation();
    roster::render(
        roster_area,
        frame.buffer_mut(),
        &app.roster,
        conversation.peer(),
        app.active_pane == Pane::Roster,
    );

    let [thread_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    thread::render(
        thread_area,
        frame.buffer_mut(),
        conversation,
        app.thread_scroll,
        app.active_pane == Pane::Thread,
    );

    compose::render(
        compose_area,
        frame,
        &app.compose,
        conversation.peer(),
        app.active_pane == Pane::Compose,
    );

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header<S: EventSink>(area: Rect, buf: &mut Buffer, app: &App<S>) {
    let title_text = " chat-cli";
    let title = Span::styled(
        title_text,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let (status_symbol, status_color) = status_indicator(app.link.is_online());
    let online_label = if app.link.is_online() { "online" } else { "offline" };
    let online_status = Span::styled(
        format!(" {} {} ", status_symbol, online_label),
        Style::default().fg(status_color),
    );
    let user_name = Span::styled(format!(" {} ", app.me()), Style::default().fg(Color::Cyan));

    // Right-align the status and user name.
    let right_width = online_label.len() + 4 + app.me().len() + 2;
    let padding_width = area
        .width
        .saturating_sub((title_text.len() + right_width) as u16) as usize;

    let header_line = Line::from(vec![
        title,
        Span::raw(" ".repeat(padding_width)),
        online_status,
        user_name,
    ]);

    Paragraph::new(header_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status<S: EventSink>(area: Rect, buf: &mut Buffer, app: &App<S>) {
    if let Some(ref msg) = app.status_message {
        let style = if app.status_is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Yellow).bg(Color::DarkGray)
        };
        let line = Line::from(Span::styled(format!(" {} ", msg), style));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let (conn_symbol, conn_color) = status_indicator(app.link.is_online());
    let connection = Span::styled(
        format!(" {} {} ", conn_symbol, app.link.describe()),
        Style::default().fg(conn_color),
    );
    let sep_style = Style::default().fg(Color::Gray);
    let pane = Span::styled(
        format!("Tab: {} ", app.active_pane.as_str()),
        Style::default().fg(Color::Cyan),
    );
    let hints = Span::styled("Enter: open/send  r: retry  q: quit", Style::default().fg(Color::Gray));

    let status_line = Line::from(vec![
        connection,
        Span::styled(" | ", sep_style),
        pane,
        Span::styled(" | ", sep_style),
        hints,
    ]);

    Paragraph::new(status_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
