//! Document panel.
//!
//! Virtual scrolling over the cached highlighted lines: only
//! `editor_lines[doc_scroll..doc_scroll + height]` is materialised per frame.

use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::Line,
    widgets::{List, ListItem},
};

use scribe_core::document::DocumentPhase;

use crate::app::{AppState, PanelFocus};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

pub fn render_document(frame: &mut Frame, area: Rect, focus: PanelFocus, state: &mut AppState, theme: &Theme) {
    let title = match state.document.current() {
        Some(doc) if doc.is_dirty() => format!("{} ●", doc.name),
        Some(doc) => doc.name.clone(),
        None => "Document".to_owned(),
    };
    let inner = inner_rect(area);
    frame.render_widget(panel_block(title, focus == PanelFocus::Document, theme), area);

    if state.editor_lines.is_empty() {
        let msg = match (state.document.phase(), state.document.current()) {
            (DocumentPhase::Loading, _) => "Loading…",
            (_, Some(doc)) if !doc.is_loaded() => "This document could not be loaded. Select it again to retry.",
            (_, Some(_)) => "(empty document; press e to edit)",
            (_, None) => "Select a markdown file in the tree.",
        };
        let placeholder = ListItem::new(Line::styled(msg, Style::default().fg(theme.tree_loading)));
        frame.render_widget(List::new(vec![placeholder]), inner);
        return;
    }

    let total = state.editor_lines.len();
    let height = inner.height as usize;
    // Clamp so the last page stays full; the clamped value is kept for the
    // next keypress.
    state.doc_scroll = state.doc_scroll.min(total.saturating_sub(height.max(1)));
    let end = (state.doc_scroll + height).min(total);

    let items: Vec<ListItem> = state.editor_lines[state.doc_scroll..end]
        .iter()
        .map(|l| ListItem::new(l.clone()))
        .collect();
    frame.render_widget(List::new(items), inner);
}
