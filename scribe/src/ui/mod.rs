//! UI rendering for scribe.
//!
//! `render()` is the single entry point, called from the event loop's
//! `terminal.draw()` closure. Layout arithmetic lives in `layout.rs`; each
//! panel has its own module.

mod chat;
mod dialogs;
mod editor;
mod file_tree;
mod help;
pub mod keybindings;
mod layout;

use ratatui::Frame;

use crate::app::{AppState, Mode};
use crate::theme::Theme;
use layout::{compute_layout, inner_rect, render_status_bar};

/// Renders one complete frame.
///
/// Viewport heights and panel rects are written back into `state` so the
/// next keypress can compute page distances and mouse hit-tests; the
/// one-frame lag is imperceptible.
pub fn render(frame: &mut Frame, state: &mut AppState, theme: &Theme) {
    let [tree_area, doc_area, chat_area, status_bar] = compute_layout(frame, state);

    state.tree_viewport_height = inner_rect(tree_area).height;
    state.doc_viewport_height = inner_rect(doc_area).height;
    state.panel_rects = [tree_area, doc_area, chat_area];

    let focus = state.focus;
    if tree_area.width > 0 {
        file_tree::render_tree(frame, tree_area, focus, state, theme);
    }
    if doc_area.width > 0 {
        editor::render_document(frame, doc_area, focus, state, theme);
    }
    if chat_area.width > 0 {
        chat::render_chat(frame, chat_area, focus, state, theme);
    }

    render_status_bar(frame, status_bar, state, theme);

    // Overlays last so they sit on top.
    match state.mode {
        Mode::HelpOverlay => help::render_help_overlay(frame, theme, state.help_scroll),
        Mode::ConfirmQuit => dialogs::render_confirm_quit(frame, theme),
        Mode::ConfirmPatch => dialogs::render_patch_preview(frame, state, theme),
        Mode::OpenRepo => dialogs::render_open_repo(frame, state, theme),
        Mode::Normal | Mode::Insert => {}
    }
}
