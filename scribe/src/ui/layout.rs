//! Responsive 3-panel layout engine for scribe.
//!
//! Pure layout arithmetic; called inside `terminal.draw()` on every render so
//! each frame reflects the current terminal size.
//!
//! At `>= 120` columns all three panels are visible with widths driven by
//! `AppState.left_pct / center_pct / right_pct`. Narrower terminals show only
//! the focused panel at full width.
//!
//! `Spacing::Overlap(1)` combined with `Block::merge_borders(MergeStrategy::Fuzzy)`
//! makes adjacent panel borders share a single column and merge their
//! junction characters.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect, Spacing},
    style::{Modifier, Style},
    symbols::merge::MergeStrategy,
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
};

use scribe_core::document::DocumentPhase;

use crate::app::{AppState, Mode, PanelFocus};
use crate::theme::Theme;

/// Columns needed to show all three panels side by side.
const WIDE_LAYOUT: u16 = 120;

/// Returns `[tree, document, chat, status_bar]` rects for the current frame.
/// A collapsed panel gets a zero-width rect.
pub fn compute_layout(frame: &Frame, state: &AppState) -> [Rect; 4] {
    let [main_area, status_bar] =
        frame.area().layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]));

    let constraints = if frame.area().width >= WIDE_LAYOUT {
        [
            Constraint::Percentage(state.left_pct),
            Constraint::Percentage(state.center_pct),
            Constraint::Percentage(state.right_pct),
        ]
    } else {
        let shown = |panel: PanelFocus| {
            if state.focus == panel { Constraint::Fill(1) } else { Constraint::Length(0) }
        };
        [shown(PanelFocus::Tree), shown(PanelFocus::Document), shown(PanelFocus::Chat)]
    };

    let [tree, document, chat] =
        main_area.layout(&Layout::horizontal(constraints).spacing(Spacing::Overlap(1)));

    [tree, document, chat, status_bar]
}

/// The inner rect of a bordered panel.
pub fn inner_rect(area: Rect) -> Rect {
    area.inner(Margin { vertical: 1, horizontal: 1 })
}

/// Bordered block for a panel: thick border when focused.
///
/// `MergeStrategy::Fuzzy` because `Exact` draws wrong junctions where thick
/// and plain borders meet.
pub fn panel_block<'a>(title: impl Into<Line<'a>>, is_focused: bool, theme: &Theme) -> Block<'a> {
    let border_style = if is_focused {
        Style::default().fg(theme.border_active)
    } else {
        Style::default().fg(theme.border_inactive)
    };
    let border_type = if is_focused { BorderType::Thick } else { BorderType::Plain };

    Block::bordered()
        .title(title)
        .border_type(border_type)
        .border_style(border_style)
        .merge_borders(MergeStrategy::Fuzzy)
}

/// Renders the 1-row status bar: mode, repository, document state, activity,
/// and the latest status message.
pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let (mode_text, mode_fg) = match state.mode {
        Mode::Insert => (" INSERT ", theme.status_mode_insert),
        Mode::OpenRepo => (" OPEN ", theme.status_mode_insert),
        Mode::Normal | Mode::HelpOverlay | Mode::ConfirmQuit | Mode::ConfirmPatch => {
            (" NORMAL ", theme.status_mode_normal)
        }
    };

    let mut spans = vec![Span::styled(
        mode_text,
        Style::default().fg(mode_fg).add_modifier(Modifier::BOLD),
    )];

    if let Some(repo) = state.tree.repo() {
        spans.push(Span::raw(format!(" {repo} ")));
    }

    if let Some(doc) = state.document.current() {
        spans.push(Span::raw(format!("│ {} ", doc.path)));
        match state.document.phase() {
            DocumentPhase::Loading => spans.push(Span::raw("(loading) ")),
            DocumentPhase::Saving => spans.push(Span::raw("(saving) ")),
            DocumentPhase::Idle | DocumentPhase::Ready => {
                if doc.is_dirty() {
                    spans.push(Span::styled("● modified ", Style::default().fg(theme.status_dirty)));
                } else if let Some(at) = doc.last_saved_at() {
                    spans.push(Span::raw(format!("saved {} ", ago(scribe_core::now_secs() - at))));
                }
            }
        }
    } else if state.document.phase() == DocumentPhase::Loading {
        spans.push(Span::raw("│ (loading) "));
    }

    if state.conversation.is_in_flight() {
        spans.push(Span::raw("│ replying (Esc stops) "));
    }
    if state.proposal_pending.is_some() {
        spans.push(Span::raw("│ patching… "));
    }

    if let Some(status) = &state.status {
        let style = if status.error {
            Style::default().fg(theme.status_error).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        spans.push(Span::raw("│ "));
        spans.push(Span::styled(status.text.clone(), style));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.status_bar_bg).fg(theme.status_bar_fg)),
        area,
    );
}

/// Coarse human duration for "saved … ago".
fn ago(seconds: i64) -> String {
    match seconds {
        s if s < 10 => "just now".to_owned(),
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s => format!("{}h ago", s / 3600),
    }
}
