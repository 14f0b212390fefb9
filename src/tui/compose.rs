//! Single-line message input.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

/// Height of the compose box including borders.
pub const COMPOSE_HEIGHT: u16 = 3;

#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    /// Cursor position in chars, not bytes.
    pub cursor: usize,
}

impl ComposeState {
    pub fn insert(&mut self, c: char) {
        let at = self.byte_offset(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let end = self.byte_offset(self.cursor);
        let start = self.byte_offset(self.cursor - 1);
        self.input.drain(start..end);
        self.cursor -= 1;
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor = 0;
    }

    /// Take the trimmed text, leaving the box empty. Whitespace-only input is
    /// left in place and yields `None`.
    pub fn take(&mut self) -> Option<String> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.clear();
        Some(text)
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

pub fn render(area: Rect, frame: &mut Frame, state: &ComposeState, target: &str, focused: bool) {
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
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    if state.input.is_empty() {
        let hint = format!(" Message {}...", target);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                hint,
                Style::default().fg(Color::DarkGray),
            ))),
            inner,
        );
        if focused {
            frame.set_cursor_position((inner.x + 1, inner.y));
        }
        return;
    }

    let (visible, offset) = visible_window(&state.input, state.cursor, inner.width as usize);
    frame.render_widget(
        Paragraph::new(Line::from(Span::raw(format!(" {}", visible)))),
        inner,
    );
    if focused {
        frame.set_cursor_position((inner.x + 1 + offset as u16, inner.y));
    }
}

/// Slice of `input` that fits in `width` columns with the cursor in view,
/// plus the cursor's column within that slice.
fn visible_window(input: &str, cursor: usize, width: usize) -> (String, usize) {
    let avail = width.saturating_sub(2);
    let chars: Vec<char> = input.chars().collect();
    let start = cursor.saturating_sub(avail);
    let end = (start + avail).min(chars.len());
    let visible: String = chars[start..end].iter().collect();
    let before: String = chars[start..cursor.min(end)].iter().collect();
    (visible, before.width())
}
