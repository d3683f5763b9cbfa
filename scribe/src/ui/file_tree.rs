//! Repository tree panel.
//!
//! Renders `AppState::visible_rows()` as a `List` with the tree cursor held in
//! `AppState.tree_state`. Directories carry an open/closed marker; pinned
//! files carry a pin marker; the open document is bold.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem},
};

use crate::app::{AppState, PanelFocus, TreeRow};
use crate::theme::Theme;
use crate::ui::layout::panel_block;

pub fn render_tree(frame: &mut Frame, area: Rect, focus: PanelFocus, state: &mut AppState, theme: &Theme) {
    let title = match state.tree.repo() {
        Some(repo) => format!("{}/{}", repo.owner, repo.repo),
        None => "Repository".to_owned(),
    };
    let block = panel_block(title, focus == PanelFocus::Tree, theme);

    let rows = state.visible_rows();
    let items: Vec<ListItem> = if rows.is_empty() {
        let msg = if state.root_loading {
            "Loading…".to_owned()
        } else if let Some(err) = &state.root_error {
            format!("Could not load: {err}")
        } else if state.tree.repo().is_none() {
            "Press o to open a repository".to_owned()
        } else {
            "No markdown documents".to_owned()
        };
        vec![ListItem::new(Line::styled(msg, Style::default().fg(theme.tree_loading)))]
    } else {
        rows.iter().map(|row| tree_item(row, state, theme)).collect()
    };

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(theme.border_active).add_modifier(Modifier::REVERSED));

    frame.render_stateful_widget(list, area, &mut state.tree_state);
}

fn tree_item(row: &TreeRow, state: &AppState, theme: &Theme) -> ListItem<'static> {
    match row {
        TreeRow::Loading { depth } => ListItem::new(Line::styled(
            format!("{}loading…", "  ".repeat(*depth)),
            Style::default().fg(theme.tree_loading).add_modifier(Modifier::ITALIC),
        )),
        TreeRow::Node { node, depth } => {
            let indent = Span::raw("  ".repeat(*depth));
            if node.is_dir() {
                let marker = if state.expanded.contains(&node.path) { "▾ " } else { "▸ " };
                return ListItem::new(Line::from(vec![
                    indent,
                    Span::styled(format!("{marker}{}/", node.name), Style::default().fg(theme.tree_dir)),
                ]));
            }
            let is_open = state.document.current().is_some_and(|d| d.path == node.path);
            let mut style = Style::default().fg(theme.tree_file);
            if is_open {
                style = style.add_modifier(Modifier::BOLD);
            }
            let pin = if state.conversation.is_pinned(&node.path) {
                Span::styled("◆ ", Style::default().fg(theme.tree_pinned))
            } else {
                Span::raw("  ")
            };
            ListItem::new(Line::from(vec![indent, pin, Span::styled(node.name.clone(), style)]))
        }
    }
}
