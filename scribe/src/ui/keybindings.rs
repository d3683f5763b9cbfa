//! Keybinding dispatcher for scribe.
//!
//! Translates crossterm `KeyEvent`s into `AppState` mutations. Anything that
//! needs remote work or the terminal comes back as a `KeyAction` for the
//! event loop to carry out, so this module stays free of I/O. The dispatcher
//! branches first on `state.mode`; each mode has its own handler.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Position;

use crate::app::{AppState, Mode, PanelFocus};

/// What the event loop must do after a key was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Nothing beyond the state change already made.
    Continue,
    Quit,
    /// Enter on the tree cursor: open a file or toggle a directory.
    Activate,
    TogglePin,
    RefreshRoot,
    /// Open the repository typed into `repo_input`.
    OpenRepo,
    Save,
    EditExternally,
    SendMessage,
    StopTurn,
    ClearConversation,
    ProposePatch,
    ApplyPatch,
    DiscardPatch,
}

pub fn handle_key(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match state.mode {
        Mode::HelpOverlay => handle_help(key, state),
        Mode::ConfirmQuit => handle_confirm_quit(key, state),
        Mode::ConfirmPatch => handle_confirm_patch(key, state),
        Mode::Insert => handle_insert(key, state),
        Mode::OpenRepo => handle_open_repo(key, state),
        Mode::Normal => handle_normal(key, state),
    }
}

fn ctrl(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
}

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

fn handle_normal(key: KeyEvent, state: &mut AppState) -> KeyAction {
    if let Some(action) = handle_scroll_key(key, state) {
        return action;
    }
    if state.focus == PanelFocus::Tree {
        if let Some(action) = handle_tree_key(key, state) {
            return action;
        }
    }

    match key.code {
        KeyCode::Char('c') if ctrl(&key) => request_quit(state),
        KeyCode::Char('s') if ctrl(&key) => KeyAction::Save,

        // Panel focus
        KeyCode::Tab | KeyCode::Char('L') => {
            state.focus = state.focus.next();
            KeyAction::Continue
        }
        KeyCode::BackTab | KeyCode::Char('H') => {
            state.focus = state.focus.prev();
            KeyAction::Continue
        }

        KeyCode::Char('<') => {
            state.shrink_document_panel();
            KeyAction::Continue
        }
        KeyCode::Char('>') => {
            state.grow_document_panel();
            KeyAction::Continue
        }

        KeyCode::Char('o') => {
            state.repo_input.clear();
            state.mode = Mode::OpenRepo;
            KeyAction::Continue
        }
        KeyCode::Char('R') => KeyAction::RefreshRoot,
        KeyCode::Char('s') => KeyAction::Save,
        KeyCode::Char('e') => KeyAction::EditExternally,

        KeyCode::Char('i') => {
            state.focus = PanelFocus::Chat;
            state.mode = Mode::Insert;
            KeyAction::Continue
        }
        KeyCode::Enter if state.focus == PanelFocus::Chat => {
            state.mode = Mode::Insert;
            KeyAction::Continue
        }
        KeyCode::Char('Q') if state.focus == PanelFocus::Document => {
            if !state.quote_visible_document() {
                state.set_error("Nothing to quote; open a document first");
            }
            KeyAction::Continue
        }
        KeyCode::Char('a') => KeyAction::ProposePatch,
        KeyCode::Char('C') => KeyAction::ClearConversation,
        KeyCode::Esc if state.conversation.is_in_flight() => KeyAction::StopTurn,

        KeyCode::Char('?') => {
            state.help_scroll = 0;
            state.mode = Mode::HelpOverlay;
            KeyAction::Continue
        }

        KeyCode::Char('q') => request_quit(state),

        _ => KeyAction::Continue,
    }
}

fn request_quit(state: &mut AppState) -> KeyAction {
    if state.has_unsaved_work() {
        state.mode = Mode::ConfirmQuit;
        KeyAction::Continue
    } else {
        KeyAction::Quit
    }
}

/// Tree-only keys. `None` lets the key fall through to the Normal handler.
fn handle_tree_key(key: KeyEvent, state: &mut AppState) -> Option<KeyAction> {
    match key.code {
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => Some(KeyAction::Activate),
        KeyCode::Char('h') | KeyCode::Left => {
            state.collapse_or_parent();
            Some(KeyAction::Continue)
        }
        KeyCode::Char('p') => Some(KeyAction::TogglePin),
        _ => None,
    }
}

/// j / k / g / G and the Ctrl page keys, applied to the focused panel.
fn handle_scroll_key(key: KeyEvent, state: &mut AppState) -> Option<KeyAction> {
    let ctrl = ctrl(&key);
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => state.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => state.scroll_up(1),
        KeyCode::Char('g') | KeyCode::Home => state.scroll_top(),
        KeyCode::Char('G') | KeyCode::End => state.scroll_bottom(),
        KeyCode::Char('d') if ctrl => state.half_page_down(),
        KeyCode::Char('u') if ctrl => state.half_page_up(),
        KeyCode::Char('f') if ctrl => state.full_page_down(),
        KeyCode::Char('b') if ctrl => state.full_page_up(),
        KeyCode::PageDown => state.full_page_down(),
        KeyCode::PageUp => state.full_page_up(),
        _ => return None,
    }
    Some(KeyAction::Continue)
}

// ---------------------------------------------------------------------------
// Insert mode (chat input)
// ---------------------------------------------------------------------------

fn handle_insert(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            state.mode = Mode::Normal;
            KeyAction::Continue
        }
        KeyCode::Char('s') if ctrl(&key) => KeyAction::Save,
        KeyCode::Char('u') if ctrl(&key) => {
            state.input.clear();
            KeyAction::Continue
        }
        KeyCode::Char('c') if ctrl(&key) => request_quit(state),
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            state.input.push('\n');
            KeyAction::Continue
        }
        KeyCode::Enter => KeyAction::SendMessage,
        KeyCode::Backspace => {
            state.input.pop();
            KeyAction::Continue
        }
        KeyCode::Char(c) if !ctrl(&key) => {
            state.input.push(c);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Repository prompt
// ---------------------------------------------------------------------------

fn handle_open_repo(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            state.repo_input.clear();
            state.mode = Mode::Normal;
            KeyAction::Continue
        }
        KeyCode::Enter => {
            state.mode = Mode::Normal;
            KeyAction::OpenRepo
        }
        KeyCode::Backspace => {
            state.repo_input.pop();
            KeyAction::Continue
        }
        KeyCode::Char(c) if !ctrl(&key) => {
            state.repo_input.push(c);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Overlays
// ---------------------------------------------------------------------------

fn handle_help(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            state.help_scroll = state.help_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            state.help_scroll = state.help_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => state.help_scroll = 0,
        KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => state.mode = Mode::Normal,
        _ => {}
    }
    KeyAction::Continue
}

/// `y` quits, `n` / `Esc` cancels, everything else is ignored.
fn handle_confirm_quit(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => KeyAction::Quit,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            state.mode = Mode::Normal;
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

fn handle_confirm_patch(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => KeyAction::ApplyPatch,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc | KeyCode::Char('q') => {
            KeyAction::DiscardPatch
        }
        KeyCode::Char('j') | KeyCode::Down => {
            state.patch_scroll = state.patch_scroll.saturating_add(1);
            KeyAction::Continue
        }
        KeyCode::Char('k') | KeyCode::Up => {
            state.patch_scroll = state.patch_scroll.saturating_sub(1);
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

// ---------------------------------------------------------------------------
// Mouse events
// ---------------------------------------------------------------------------

/// Left click focuses the panel under the pointer; the wheel scrolls the
/// focused panel (or the help overlay) by 3 rows.
pub fn handle_mouse(mouse: MouseEvent, state: &mut AppState) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) if state.mode == Mode::Normal => {
            let pos = Position { x: mouse.column, y: mouse.row };
            let [tree, document, chat] = state.panel_rects;
            if tree.width > 0 && tree.contains(pos) {
                state.focus = PanelFocus::Tree;
            } else if document.width > 0 && document.contains(pos) {
                state.focus = PanelFocus::Document;
            } else if chat.width > 0 && chat.contains(pos) {
                state.focus = PanelFocus::Chat;
            }
        }
        MouseEventKind::ScrollUp => match state.mode {
            Mode::HelpOverlay => state.help_scroll = state.help_scroll.saturating_sub(3),
            Mode::ConfirmPatch => state.patch_scroll = state.patch_scroll.saturating_sub(3),
            _ => state.scroll_up(3),
        },
        MouseEventKind::ScrollDown => match state.mode {
            Mode::HelpOverlay => state.help_scroll = state.help_scroll.saturating_add(3),
            Mode::ConfirmPatch => state.patch_scroll = state.patch_scroll.saturating_add(3),
            _ => state.scroll_down(3),
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::document::SwitchResult;
    use scribe_core::remote::{EntryKind, RemoteFile};
    use scribe_core::tree::TreeNode;
    use scribe_core::RepoRef;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn with_ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(state: &mut AppState, text: &str) {
        for c in text.chars() {
            assert_eq!(handle_key(press(KeyCode::Char(c)), state), KeyAction::Continue);
        }
    }

    /// A state whose open document has unsaved edits.
    fn dirty_state() -> AppState {
        let mut state = AppState::default();
        state.reset_for_repo(RepoRef::new("octo", "handbook", None));
        let node = TreeNode {
            name: "a.md".into(),
            path: "a.md".into(),
            kind: EntryKind::File,
            revision: "r1".into(),
            size: None,
            children: None,
        };
        state.document.begin_select(&node).unwrap();
        state.document.finish_select(SwitchResult {
            path: "a.md".into(),
            name: "a.md".into(),
            saved: None,
            load: Ok(RemoteFile { text: "old".into(), revision: "r1".into() }),
        });
        assert!(state.document.edit("new"));
        state
    }

    #[test]
    fn clean_quit_is_immediate() {
        let mut state = AppState::default();
        assert_eq!(handle_key(press(KeyCode::Char('q')), &mut state), KeyAction::Quit);
    }

    #[test]
    fn dirty_quit_asks_first() {
        let mut state = dirty_state();
        assert_eq!(handle_key(press(KeyCode::Char('q')), &mut state), KeyAction::Continue);
        assert_eq!(state.mode, Mode::ConfirmQuit);
        assert_eq!(handle_key(press(KeyCode::Char('n')), &mut state), KeyAction::Continue);
        assert_eq!(state.mode, Mode::Normal);
        handle_key(with_ctrl('c'), &mut state);
        assert_eq!(handle_key(press(KeyCode::Char('y')), &mut state), KeyAction::Quit);
    }

    #[test]
    fn insert_mode_collects_and_sends() {
        let mut state = AppState::default();
        handle_key(press(KeyCode::Char('i')), &mut state);
        assert_eq!((state.mode, state.focus), (Mode::Insert, PanelFocus::Chat));

        // Normal-mode bindings are plain text here.
        type_text(&mut state, "quit? ok");
        handle_key(press(KeyCode::Backspace), &mut state);
        assert_eq!(state.input, "quit? o");

        assert_eq!(handle_key(press(KeyCode::Enter), &mut state), KeyAction::SendMessage);
        assert_eq!(handle_key(press(KeyCode::Esc), &mut state), KeyAction::Continue);
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn esc_stops_only_a_streaming_turn() {
        let mut state = AppState::default();
        assert_eq!(handle_key(press(KeyCode::Esc), &mut state), KeyAction::Continue);

        state.conversation.begin_turn("hello").unwrap();
        assert_eq!(handle_key(press(KeyCode::Esc), &mut state), KeyAction::StopTurn);
    }

    #[test]
    fn tree_keys_only_apply_to_the_tree() {
        let mut state = AppState::default();
        assert_eq!(handle_key(press(KeyCode::Char('p')), &mut state), KeyAction::TogglePin);
        assert_eq!(handle_key(press(KeyCode::Enter), &mut state), KeyAction::Activate);

        state.focus = PanelFocus::Document;
        assert_eq!(handle_key(press(KeyCode::Char('p')), &mut state), KeyAction::Continue);
        assert_eq!(handle_key(press(KeyCode::Char('e')), &mut state), KeyAction::EditExternally);
    }

    #[test]
    fn repository_prompt() {
        let mut state = AppState::default();
        handle_key(press(KeyCode::Char('o')), &mut state);
        assert_eq!(state.mode, Mode::OpenRepo);
        type_text(&mut state, "octo/handbook");
        assert_eq!(handle_key(press(KeyCode::Enter), &mut state), KeyAction::OpenRepo);
        assert_eq!(state.repo_input, "octo/handbook");
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn patch_preview_answers() {
        let mut state = AppState::default();
        state.mode = Mode::ConfirmPatch;
        handle_key(press(KeyCode::Char('j')), &mut state);
        assert_eq!(state.patch_scroll, 1);
        assert_eq!(handle_key(press(KeyCode::Char('y')), &mut state), KeyAction::ApplyPatch);
        assert_eq!(handle_key(press(KeyCode::Esc), &mut state), KeyAction::DiscardPatch);
    }

    #[test]
    fn quoting_the_document_starts_a_message() {
        let mut state = dirty_state();
        state.focus = PanelFocus::Document;
        state.doc_viewport_height = 10;

        assert_eq!(handle_key(press(KeyCode::Char('Q')), &mut state), KeyAction::Continue);
        assert_eq!((state.mode, state.focus), (Mode::Insert, PanelFocus::Chat));
        assert_eq!(state.input, "From a.md, lines 1-1:\n> new\n");

        // Outside the document panel the key does nothing.
        let mut state = dirty_state();
        handle_key(press(KeyCode::Char('Q')), &mut state);
        assert!(state.input.is_empty());
    }

    #[test]
    fn save_from_anywhere_outside_overlays() {
        let mut state = AppState::default();
        assert_eq!(handle_key(with_ctrl('s'), &mut state), KeyAction::Save);
        state.mode = Mode::Insert;
        assert_eq!(handle_key(with_ctrl('s'), &mut state), KeyAction::Save);
        assert!(state.input.is_empty());
    }
}
