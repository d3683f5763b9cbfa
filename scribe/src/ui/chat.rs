//! Conversation panel: message log above, input box below.
//!
//! Messages are wrapped here rather than by `Paragraph::wrap` so the total
//! line count, and with it the follow-the-bottom scroll offset, is known
//! before drawing. Widths are terminal columns, not chars.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph},
};

use scribe_core::conversation::Role;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{AppState, Mode, PanelFocus};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

pub fn render_chat(frame: &mut Frame, area: Rect, focus: PanelFocus, state: &mut AppState, theme: &Theme) {
    let pins = state.conversation.pins().len();
    let title = if pins > 0 { format!("Assistant ({pins} pinned)") } else { "Assistant".to_owned() };
    frame.render_widget(panel_block(title, focus == PanelFocus::Chat, theme), area);

    let inner = inner_rect(area);
    let [log_area, input_area] =
        inner.layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(3)]));

    let lines = message_lines(state, theme, log_area.width as usize);
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    state.chat_viewport_height = log_area.height;
    state.chat_max_scroll = total.saturating_sub(log_area.height);
    if state.chat_follow || state.chat_scroll > state.chat_max_scroll {
        state.chat_scroll = state.chat_max_scroll;
    }
    frame.render_widget(Paragraph::new(lines).scroll((state.chat_scroll, 0)), log_area);

    render_input(frame, input_area, state, theme);
}

fn message_lines(state: &AppState, theme: &Theme, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let messages = state.conversation.messages();
    if messages.is_empty() {
        lines.push(Line::styled(
            "Ask about the open document. Press i to type.",
            Style::default().fg(theme.tree_loading),
        ));
    }
    for message in messages {
        let (label, color) = match message.role {
            Role::User => ("You", theme.chat_user),
            Role::Assistant => ("Assistant", theme.chat_assistant),
        };
        lines.push(Line::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        if message.text.is_empty() && state.conversation.in_flight() == Some(message.id) {
            lines.push(Line::styled("Thinking…", Style::default().add_modifier(Modifier::ITALIC)));
        }
        for text_line in message.text.lines() {
            lines.extend(wrap(text_line, width).into_iter().map(Line::raw));
        }
        lines.push(Line::raw(""));
    }
    if let Some(err) = state.conversation.last_error() {
        for piece in wrap(&format!("Error: {err}"), width) {
            lines.push(Line::styled(piece, Style::default().fg(theme.chat_error)));
        }
    }
    lines
}

fn render_input(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let editing = state.mode == Mode::Insert;
    let border = if editing { theme.status_mode_insert } else { theme.border_inactive };
    let block = Block::bordered()
        .title(if editing { "Message (Enter sends, Esc leaves)" } else { "Message (i)" })
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);

    // Keep the end of a long input, where the cursor is, in view.
    let flat = state.input.replace('\n', "↵");
    let shown = tail_fitting(&flat, inner.width.saturating_sub(1) as usize);
    let cursor_x = inner.x.saturating_add(u16::try_from(shown.width()).unwrap_or(u16::MAX));

    frame.render_widget(Paragraph::new(Line::from(vec![Span::raw(shown)])).block(block), area);
    if editing && inner.height > 0 {
        frame.set_cursor_position(Position { x: cursor_x, y: inner.y });
    }
}

/// The longest suffix of `text` that fits in `width` columns.
pub fn tail_fitting(text: &str, width: usize) -> &str {
    let mut used = 0;
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| {
            used += c.width().unwrap_or(0);
            used <= width
        })
        .last()
        .map_or(text.len(), |(idx, _)| idx);
    &text[start..]
}

/// Splits `text` into rows of at most `width` columns, breaking at the last
/// space when there is one. A single character wider than `width` gets a
/// row of its own.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_owned()];
    }
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut row_width = 0;
    // Byte offset of the last space in `row`.
    let mut last_space: Option<usize> = None;

    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if row_width + w > width && !row.is_empty() {
            match last_space.filter(|&i| i > 0) {
                Some(i) => {
                    let rest = row[i + 1..].to_owned();
                    row.truncate(i);
                    rows.push(std::mem::replace(&mut row, rest));
                }
                None => rows.push(std::mem::take(&mut row)),
            }
            row_width = row.width();
            last_space = None;
            // The space a row breaks at is consumed.
            if c == ' ' && row.is_empty() {
                continue;
            }
        }
        if c == ' ' {
            last_space = Some(row.len());
        }
        row.push(c);
        row_width += w;
    }
    rows.push(row);
    rows
}
