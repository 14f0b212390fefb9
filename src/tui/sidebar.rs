//! Sidebar widget: conversations with unread badges.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::messaging::Controller;
use crate::models::ConversationKey;

/// One conversation row as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: ConversationKey,
    pub title: String,
    pub unread: usize,
    /// Whether this is the conversation shown in the messages pane.
    pub open: bool,
}

/// Build sidebar rows from the controller. Unread badges come from the
/// tracker so local reads show up immediately.
pub fn rows(ctrl: &Controller) -> Vec<Row> {
    let local = &ctrl.identity().id;
    ctrl.conversations()
        .iter()
        .map(|summary| {
            let key = summary.key(local);
            Row {
                unread: ctrl.unread().count(&key),
                open: ctrl.selected() == Some(&key),
                title: summary.title(),
                key,
            }
        })
        .collect()
}

/// Cursor position in the list, independent of which conversation is open.
#[derive(Default)]
pub struct SidebarState {
    pub cursor: usize,
    /// Set once the first conversation list has arrived.
    pub loaded: bool,
}

impl SidebarState {
    pub fn up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn down(&mut self, count: usize) {
        if self.cursor + 1 < count {
            self.cursor += 1;
        }
    }

    pub fn clamp(&mut self, count: usize) {
        self.cursor = self.cursor.min(count.saturating_sub(1));
    }
}

pub fn render(area: Rect, buf: &mut Buffer, rows: &[Row], state: &SidebarState, focused: bool) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .border_style(border_style)
        .title(" Conversations ");
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }
    let first = Rect::new(inner.x, inner.y, inner.width, 1);
    if rows.is_empty() {
        let text = if state.loaded {
            " (none yet)"
        } else {
            " Loading..."
        };
        Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        )))
        .render(first, buf);
        return;
    }

    let height = inner.height as usize;
    let offset = scroll_offset(state.cursor, height, rows.len());
    for (i, (idx, row)) in rows.iter().enumerate().skip(offset).take(height).enumerate() {
        let selected = idx == state.cursor;
        let marker = if row.open { "\u{25BA}" } else { " " };
        let label = format!("{}{}", marker, row.title);
        let badge = if row.unread > 0 {
            row.unread.to_string()
        } else {
            String::new()
        };
        let line_area = Rect::new(inner.x, inner.y + i as u16, inner.width, 1);
        render_row(buf, line_area, &label, &badge, selected, row.unread > 0);
    }
}

fn scroll_offset(cursor: usize, height: usize, total: usize) -> usize {
    if total <= height || cursor < height {
        return 0;
    }
    (cursor + 1 - height).min(total - height)
}

fn render_row(buf: &mut Buffer, area: Rect, left: &str, badge: &str, selected: bool, unread: bool) {
    let base = if selected {
        Style::default().fg(Color::White).bg(Color::DarkGray)
    } else if unread {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::Gray)
    };
    let text_style = if unread || selected {
        base.add_modifier(Modifier::BOLD)
    } else {
        base
    };
    let badge_style = base.fg(Color::Yellow).add_modifier(Modifier::BOLD);

    let width = area.width as usize;
    let room = if badge.is_empty() {
        width
    } else {
        width.saturating_sub(badge.len() + 1)
    };
    let left: String = left.chars().take(room).collect();
    let pad = width.saturating_sub(left.chars().count() + badge.len());

    Paragraph::new(Line::from(vec![
        Span::styled(left, text_style),
        Span::styled(" ".repeat(pad), base),
        Span::styled(badge.to_string(), badge_style),
    ]))
    .render(area, buf);
}
