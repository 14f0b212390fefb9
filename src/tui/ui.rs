//! Frame layout: header, sidebar, messages, compose, status bar.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::{App, Pane};
use super::{compose, messages, sidebar};
use crate::messaging::Severity;

const SIDEBAR_WIDTH: u16 = 30;

pub fn render(frame: &mut Frame, app: &App) {
    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .areas(main_area);

    let rows = sidebar::rows(&app.ctrl);
    sidebar::render(
        sidebar_area,
        frame.buffer_mut(),
        &rows,
        &app.sidebar,
        app.pane == Pane::Sidebar,
    );

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    let title = app.open_title();
    messages::render(
        messages_area,
        frame.buffer_mut(),
        &app.ctrl,
        &title,
        &app.messages,
        app.pane == Pane::Messages,
    );
    compose::render(
        compose_area,
        frame,
        &app.compose,
        &title,
        app.pane == Pane::Compose,
    );

    render_status(status_area, frame.buffer_mut(), app);
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let identity = app.ctrl.identity();
    let (live_symbol, live_color) = if app.live {
        ("*", Color::Green)
    } else {
        ("o", Color::Red)
    };
    let total = app.ctrl.unread().total();

    let mut spans = vec![
        Span::styled(
            " Job Board Messages",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} ({})", identity.label(), identity.role),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(format!("  {} live", live_symbol), Style::default().fg(live_color)),
    ];
    if total > 0 {
        spans.push(Span::styled(
            format!("  {} unread", total),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if app.ctrl.is_sending() {
        spans.push(Span::styled("  sending...", Style::default().fg(Color::Gray)));
    }

    Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    let line = if let Some(notice) = app.ctrl.notice() {
        let (color, hint) = match notice.severity {
            Severity::Transient => (Color::Yellow, "  (Esc to dismiss)"),
            Severity::Persistent => (Color::Red, ""),
            Severity::Reauthenticate => (Color::Red, "  (run `jobboard-chat login`)"),
        };
        Line::from(vec![
            Span::styled(format!(" {}", notice.text), Style::default().fg(color)),
            Span::styled(hint, Style::default().fg(Color::Gray)),
        ])
    } else {
        let hints = match app.pane {
            Pane::Sidebar => "Enter: open  Tab: switch  F5: refresh  q: quit",
            Pane::Messages => "m: mark read  r: retry  d: discard  Tab: switch  q: quit",
            Pane::Compose => "Enter: send  Esc: back  Tab: switch",
        };
        let mut spans = vec![Span::styled(
            format!(" {} ", hints),
            Style::default().fg(Color::Gray),
        )];
        if let Some(log) = app.logs.last() {
            spans.push(Span::styled(
                format!("| {}", log),
                Style::default().fg(Color::DarkGray),
            ));
        }
        Line::from(spans)
    };

    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
