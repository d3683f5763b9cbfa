//! Modal dialogs: patch preview, quit confirmation, repository prompt.

use ratatui::{
    Frame,
    layout::{Constraint, Position, Rect},
    style::Style,
    text::Line,
    widgets::{Block, Clear, Paragraph, Wrap},
};

use unicode_width::UnicodeWidthStr;

use crate::app::AppState;
use crate::highlight;
use crate::theme::Theme;

fn modal<'a>(frame: &mut Frame, area: Rect, title: &'a str, theme: &Theme) -> Block<'a> {
    frame.render_widget(Clear, area);
    Block::bordered()
        .title(title)
        .border_style(Style::default().fg(theme.border_active))
        .style(Style::default().bg(theme.background))
}

/// The unified diff of the pending patch, scrollable with j/k.
pub fn render_patch_preview(frame: &mut Frame, state: &AppState, theme: &Theme) {
    let Some(pending) = &state.pending_patch else {
        return;
    };
    let area = frame
        .area()
        .centered(Constraint::Percentage(85), Constraint::Percentage(80));
    let block = modal(frame, area, " Apply this change? y: apply  n: discard  j/k: scroll ", theme);
    frame.render_widget(
        Paragraph::new(highlight::diff_lines(&pending.diff, theme))
            .block(block)
            .scroll((state.patch_scroll, 0)),
        area,
    );
}

pub fn render_confirm_quit(frame: &mut Frame, theme: &Theme) {
    let area = frame.area().centered(Constraint::Length(52), Constraint::Length(5));
    let block = modal(frame, area, " Quit ", theme);
    frame.render_widget(
        Paragraph::new(vec![
            Line::from("The open document has unsaved changes."),
            Line::from("Quit anyway? (y / n)"),
        ])
        .block(block)
        .wrap(Wrap { trim: true }),
        area,
    );
}

pub fn render_open_repo(frame: &mut Frame, state: &AppState, theme: &Theme) {
    let area = frame.area().centered(Constraint::Percentage(60), Constraint::Length(3));
    let block = modal(frame, area, " Open repository (owner/repo, URL or git@…) ", theme);
    let inner = block.inner(area);
    frame.render_widget(Paragraph::new(state.repo_input.as_str()).block(block), area);
    let typed = u16::try_from(state.repo_input.width()).unwrap_or(u16::MAX);
    frame.set_cursor_position(Position {
        x: inner.x.saturating_add(typed).min(inner.right().saturating_sub(1)),
        y: inner.y,
    });
}
