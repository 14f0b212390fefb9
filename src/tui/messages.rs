//! Messages pane: the open conversation, newest at the bottom.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::messaging::{Controller, Phase};
use crate::models::{Delivery, Message, MessageId};

/// Which message is highlighted, so failed sends can be retried or
/// discarded. `None` follows the newest message.
#[derive(Default)]
pub struct MessagesState {
    pub selected: Option<usize>,
}

impl MessagesState {
    pub fn up(&mut self, count: usize) {
        self.selected = match self.selected {
            _ if count == 0 => None,
            None => Some(count - 1),
            Some(i) => Some(i.saturating_sub(1)),
        };
    }

    pub fn down(&mut self, count: usize) {
        self.selected = match self.selected {
            Some(i) if i + 1 < count => Some(i + 1),
            _ => None,
        };
    }

    pub fn reset(&mut self) {
        self.selected = None;
    }

    pub fn selected_id(&self, messages: &[Message]) -> Option<MessageId> {
        self.selected
            .and_then(|i| messages.get(i))
            .map(|m| m.id.clone())
    }
}

pub fn render(
    area: Rect,
    buf: &mut Buffer,
    ctrl: &Controller,
    title: &str,
    state: &MessagesState,
    focused: bool,
) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(border_style)
        .title(format!(" {} ", title));
    let inner = block.inner(area);
    block.render(area, buf);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let unread = ctrl.unread_banner();
    let body = if unread > 0 {
        let banner = Rect::new(inner.x, inner.y, inner.width, 1);
        Paragraph::new(Line::from(Span::styled(
            format!(" {} unread  (m: mark read)", unread),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )))
        .render(banner, buf);
        Rect::new(inner.x, inner.y + 1, inner.width, inner.height - 1)
    } else {
        inner
    };

    let placeholder = match ctrl.phase() {
        Phase::Idle => Some("Select a conversation"),
        Phase::Loading if ctrl.messages().is_empty() => Some("Loading..."),
        Phase::Failed if ctrl.messages().is_empty() => Some("Could not load messages"),
        Phase::Ready if ctrl.messages().is_empty() => Some("No messages yet"),
        _ => None,
    };
    if let Some(text) = placeholder {
        if body.height > 0 {
            Paragraph::new(Line::from(Span::styled(
                format!(" {}", text),
                Style::default().fg(Color::DarkGray),
            )))
            .render(Rect::new(body.x, body.y, body.width, 1), buf);
        }
        return;
    }

    let local = &ctrl.identity().id;
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut focus_line = 0;
    for (idx, msg) in ctrl.messages().iter().enumerate() {
        let highlighted = state.selected == Some(idx);
        if highlighted {
            focus_line = lines.len();
        }
        message_lines(
            &mut lines,
            msg,
            msg.sender_id == *local,
            ctrl.is_unread(&msg.id),
            highlighted,
            body.width as usize,
        );
    }
    if state.selected.is_none() {
        focus_line = lines.len();
    }

    let height = body.height as usize;
    let start = if focus_line < height {
        lines.len().saturating_sub(height).min(focus_line)
    } else {
        focus_line + 1 - height
    };
    let start = start.min(lines.len().saturating_sub(height));
    for (row, line) in lines.into_iter().skip(start).take(height).enumerate() {
        Paragraph::new(line).render(
            Rect::new(body.x, body.y + row as u16, body.width, 1),
            buf,
        );
    }
}

fn message_lines(
    out: &mut Vec<Line<'static>>,
    msg: &Message,
    own: bool,
    unread: bool,
    highlighted: bool,
    width: usize,
) {
    let sender = if own {
        "You".to_string()
    } else {
        msg.sender_id.clone()
    };
    let sender_style = if own {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD)
    };
    let marker = if highlighted {
        Span::styled("\u{25BA}", Style::default().fg(Color::Yellow))
    } else if unread {
        Span::styled("\u{25CF}", Style::default().fg(Color::Yellow))
    } else {
        Span::raw(" ")
    };

    let mut header = vec![
        marker,
        Span::styled(format!("{} ", sender), sender_style),
        Span::styled(
            msg.created_at.format("%H:%M").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    match &msg.delivery {
        Delivery::Confirmed => {}
        Delivery::Pending => header.push(Span::styled(
            "  sending...",
            Style::default().fg(Color::DarkGray),
        )),
        Delivery::Sent { .. } => header.push(Span::styled(
            "  sent",
            Style::default().fg(Color::DarkGray),
        )),
        Delivery::Failed { reason } => header.push(Span::styled(
            format!("  failed: {} (r: retry, d: discard)", reason),
            Style::default().fg(Color::Red),
        )),
    }
    out.push(Line::from(header));

    let body_style = if msg.is_failed() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    for text in wrap(&msg.content, width.saturating_sub(3)) {
        out.push(Line::from(Span::styled(format!("   {}", text), body_style)));
    }
    out.push(Line::from(""));
}

/// Greedy word wrap by display width. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let needed = if current.is_empty() {
                word.width()
            } else {
                current.width() + 1 + word.width()
            };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if word.width() > width {
                for c in word.chars() {
                    if current.width() + c.to_string().width() > width {
                        lines.push(std::mem::take(&mut current));
                    }
                    current.push(c);
                }
                continue;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
