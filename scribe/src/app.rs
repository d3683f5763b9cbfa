//! Central application state for scribe.
//!
//! This module owns all mutable state read by the renderer and mutated by the
//! keybinding dispatcher and the event loop: the mode, panel focus, scroll
//! offsets, panel geometry, and the core engines (tree cache, document
//! session, conversation log). Nothing here spawns work or draws; background
//! requests live in `actions.rs`.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use ratatui::text::Line;
use ratatui::widgets::ListState;

use scribe_core::conversation::ConversationLog;
use scribe_core::document::DocumentSession;
use scribe_core::patch::PatchProposal;
use scribe_core::tree::{TreeCache, TreeNode};
use scribe_core::RepoRef;

use crate::highlight;

/// How long a status message stays in the status bar.
const STATUS_TTL: Duration = Duration::from_secs(6);

/// Which keybinding set is active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Typing a chat message.
    Insert,
    /// Typing a repository reference to open.
    OpenRepo,
    HelpOverlay,
    /// Quit requested while the document has unsaved changes.
    ConfirmQuit,
    /// A patch preview is shown and waits for y/n.
    ConfirmPatch,
}

/// Which panel currently has keyboard focus.
///
/// Cycle order: `Tree` → `Document` → `Chat` → `Tree`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    #[default]
    Tree,
    Document,
    Chat,
}

impl PanelFocus {
    pub fn prev(self) -> Self {
        match self {
            PanelFocus::Tree => PanelFocus::Chat,
            PanelFocus::Document => PanelFocus::Tree,
            PanelFocus::Chat => PanelFocus::Document,
        }
    }

    pub fn next(self) -> Self {
        match self {
            PanelFocus::Tree => PanelFocus::Document,
            PanelFocus::Document => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Tree,
        }
    }
}

/// One visible row of the tree panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeRow {
    Node { node: Arc<TreeNode>, depth: usize },
    /// Placeholder under an open directory whose children are being fetched.
    Loading { depth: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub error: bool,
    pub shown_at: Instant,
}

/// A patch proposal waiting for confirmation, with its rendered preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPatch {
    /// The document the proposal was computed from.
    pub path: String,
    pub proposal: PatchProposal,
    /// Unified diff of the live text against the patched text.
    pub diff: String,
}

pub struct AppState {
    pub mode: Mode,
    pub focus: PanelFocus,

    // Tree panel
    pub tree: TreeCache,
    /// Directories shown open. A directory may be fetched but collapsed.
    pub expanded: HashSet<String>,
    /// Directories with a fetch in flight.
    pub loading: HashSet<String>,
    pub root_loading: bool,
    /// Why the root could not be listed; shown in place of the tree.
    pub root_error: Option<String>,
    pub tree_state: ListState,

    // Document panel
    pub document: DocumentSession,
    /// Highlighted lines of the live text, rebuilt on every text change.
    pub editor_lines: Vec<Line<'static>>,
    pub doc_scroll: usize,

    // Conversation panel
    pub conversation: ConversationLog,
    /// Persisted conversation backing `conversation`, once resumed.
    pub conversation_id: Option<String>,
    pub input: String,
    pub chat_scroll: u16,
    /// Largest useful `chat_scroll`, cached by the renderer.
    pub chat_max_scroll: u16,
    /// Keep the newest message in view while replies stream in.
    pub chat_follow: bool,
    /// Raised to make the streaming task stop pulling. Replaced per turn.
    pub stop: Arc<AtomicBool>,

    // Patch flow
    /// Path of the document a proposal is being computed for.
    pub proposal_pending: Option<String>,
    pub pending_patch: Option<PendingPatch>,
    pub patch_scroll: u16,

    pub repo_input: String,
    pub status: Option<StatusMessage>,
    pub help_scroll: u16,

    // Geometry cached by the renderer for the next keypress.
    pub tree_viewport_height: u16,
    pub doc_viewport_height: u16,
    pub chat_viewport_height: u16,
    /// Outer rects of the tree, document and chat panels.
    pub panel_rects: [Rect; 3],

    pub left_pct: u16,
    pub center_pct: u16,
    pub right_pct: u16,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            focus: PanelFocus::default(),
            tree: TreeCache::new(),
            expanded: HashSet::new(),
            loading: HashSet::new(),
            root_loading: false,
            root_error: None,
            tree_state: ListState::default(),
            document: DocumentSession::new(),
            editor_lines: Vec::new(),
            doc_scroll: 0,
            conversation: ConversationLog::new(),
            conversation_id: None,
            input: String::new(),
            chat_scroll: 0,
            chat_max_scroll: 0,
            chat_follow: true,
            stop: Arc::new(AtomicBool::new(false)),
            proposal_pending: None,
            pending_patch: None,
            patch_scroll: 0,
            repo_input: String::new(),
            status: None,
            help_scroll: 0,
            tree_viewport_height: 0,
            doc_viewport_height: 0,
            chat_viewport_height: 0,
            panel_rects: [Rect::default(); 3],
            left_pct: 20,
            center_pct: 50,
            right_pct: 30,
        }
    }
}

impl AppState {
    pub fn new(commit_template: &str) -> Self {
        Self {
            document: DocumentSession::new().with_commit_template(commit_template),
            ..Self::default()
        }
    }

    /// Forgets everything tied to the previous repository and points the
    /// tree and the document session at `repo`. Returns the new tree
    /// generation.
    pub fn reset_for_repo(&mut self, repo: RepoRef) -> u64 {
        self.document.reset(repo.clone());
        self.editor_lines.clear();
        self.doc_scroll = 0;
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        self.conversation = ConversationLog::new();
        self.conversation_id = None;
        self.pending_patch = None;
        self.proposal_pending = None;
        self.reset_tree(repo)
    }

    /// Drops the loaded tree (but not the document) ahead of a root reload.
    pub fn reset_tree(&mut self, repo: RepoRef) -> u64 {
        self.expanded.clear();
        self.loading.clear();
        self.root_loading = true;
        self.root_error = None;
        self.tree_state.select(None);
        self.tree.reset(repo)
    }

    /// Flattens the open part of the tree into display rows.
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.push_rows(self.tree.roots(), 0, &mut rows);
        rows
    }

    fn push_rows(&self, nodes: &[Arc<TreeNode>], depth: usize, rows: &mut Vec<TreeRow>) {
        for node in nodes {
            rows.push(TreeRow::Node { node: Arc::clone(node), depth });
            if !node.is_dir() || !self.expanded.contains(&node.path) {
                continue;
            }
            match &node.children {
                Some(children) => self.push_rows(children, depth + 1, rows),
                None => rows.push(TreeRow::Loading { depth: depth + 1 }),
            }
        }
    }

    /// The node under the tree cursor, if the cursor is on a node row.
    pub fn selected_node(&self) -> Option<Arc<TreeNode>> {
        let rows = self.visible_rows();
        let index = self.tree_state.selected()?.min(rows.len().checked_sub(1)?);
        match rows.into_iter().nth(index)? {
            TreeRow::Node { node, .. } => Some(node),
            TreeRow::Loading { .. } => None,
        }
    }

    /// Moves the tree cursor onto the row showing `path`.
    pub fn select_path(&mut self, path: &str) {
        let index = self
            .visible_rows()
            .iter()
            .position(|row| matches!(row, TreeRow::Node { node, .. } if node.path == path));
        if let Some(index) = index {
            self.tree_state.select(Some(index));
        }
    }

    /// Collapses the selected directory, or moves to the parent directory of
    /// the selected entry.
    pub fn collapse_or_parent(&mut self) {
        let Some(node) = self.selected_node() else {
            return;
        };
        if node.is_dir() && self.expanded.remove(&node.path) {
            return;
        }
        if let Some((parent, _)) = node.path.rsplit_once('/') {
            let parent = parent.to_owned();
            self.expanded.remove(&parent);
            self.select_path(&parent);
        }
    }

    /// Rebuilds the highlighted lines after the live text changed.
    pub fn refresh_editor_lines(&mut self) {
        self.editor_lines = match self.document.current() {
            Some(doc) => highlight::highlight_markdown(doc.text()),
            None => Vec::new(),
        };
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage { text: text.into(), error: false, shown_at: Instant::now() });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusMessage { text: text.into(), error: true, shown_at: Instant::now() });
    }

    /// Drops the status message once it has been shown long enough. Errors
    /// stay twice as long.
    pub fn expire_status(&mut self, now: Instant) {
        let expired = self.status.as_ref().is_some_and(|s| {
            let ttl = if s.error { STATUS_TTL * 2 } else { STATUS_TTL };
            now.duration_since(s.shown_at) >= ttl
        });
        if expired {
            self.status = None;
        }
    }

    /// Appends the document lines in view to the chat input as a quote and
    /// starts typing. Returns `false` when there is nothing to quote.
    pub fn quote_visible_document(&mut self) -> bool {
        let height = usize::from(self.doc_viewport_height.max(1));
        let quote = self
            .document
            .current()
            .filter(|d| d.is_loaded())
            .and_then(|d| quote_lines(&d.name, d.text(), self.doc_scroll, height));
        let Some(quote) = quote else {
            return false;
        };
        if !self.input.is_empty() && !self.input.ends_with('\n') {
            self.input.push('\n');
        }
        self.input.push_str(&quote);
        self.focus = PanelFocus::Chat;
        self.mode = Mode::Insert;
        true
    }

    /// `true` when quitting would lose work.
    pub fn has_unsaved_work(&self) -> bool {
        self.document.is_dirty() || self.document.is_busy()
    }

    pub fn scroll_down(&mut self, lines: u16) {
        match self.focus {
            PanelFocus::Tree => self.tree_state.scroll_down_by(lines),
            PanelFocus::Document => {
                self.doc_scroll = self.doc_scroll.saturating_add(lines as usize);
            }
            PanelFocus::Chat => {
                self.chat_scroll = self.chat_scroll.saturating_add(lines);
                if self.chat_scroll >= self.chat_max_scroll {
                    self.chat_follow = true;
                }
            }
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        match self.focus {
            PanelFocus::Tree => self.tree_state.scroll_up_by(lines),
            PanelFocus::Document => {
                self.doc_scroll = self.doc_scroll.saturating_sub(lines as usize);
            }
            PanelFocus::Chat => {
                self.chat_follow = false;
                self.chat_scroll = self.chat_scroll.saturating_sub(lines);
            }
        }
    }

    pub fn scroll_top(&mut self) {
        match self.focus {
            PanelFocus::Tree => self.tree_state.select_first(),
            PanelFocus::Document => self.doc_scroll = 0,
            PanelFocus::Chat => {
                self.chat_follow = false;
                self.chat_scroll = 0;
            }
        }
    }

    pub fn scroll_bottom(&mut self) {
        match self.focus {
            PanelFocus::Tree => self.tree_state.select_last(),
            PanelFocus::Document => {
                self.doc_scroll = self.editor_lines.len().saturating_sub(1);
            }
            PanelFocus::Chat => self.chat_follow = true,
        }
    }

    fn viewport_height(&self) -> u16 {
        match self.focus {
            PanelFocus::Tree => self.tree_viewport_height,
            PanelFocus::Document => self.doc_viewport_height,
            PanelFocus::Chat => self.chat_viewport_height,
        }
    }

    /// Scrolls by half the height cached at the last render (at least 1).
    pub fn half_page_down(&mut self) {
        self.scroll_down((self.viewport_height() / 2).max(1));
    }

    pub fn half_page_up(&mut self) {
        self.scroll_up((self.viewport_height() / 2).max(1));
    }

    pub fn full_page_down(&mut self) {
        self.scroll_down(self.viewport_height().max(1));
    }

    pub fn full_page_up(&mut self) {
        self.scroll_up(self.viewport_height().max(1));
    }

    /// Shrinks the document (centre) panel by 5%, split between the sides.
    /// The centre never goes below 20%.
    pub fn shrink_document_panel(&mut self) {
        const MIN_CENTER: u16 = 20;
        const STEP: u16 = 5;
        if self.center_pct <= MIN_CENTER {
            return;
        }
        let transfer = STEP.min(self.center_pct - MIN_CENTER);
        self.center_pct -= transfer;
        let left_gain = transfer / 2;
        self.left_pct = self.left_pct.saturating_add(left_gain);
        self.right_pct = self.right_pct.saturating_add(transfer - left_gain);
    }

    /// Grows the document panel by up to 5%, taken from both sides. The
    /// centre never exceeds 80% and a side never drops below 5%.
    pub fn grow_document_panel(&mut self) {
        const MAX_CENTER: u16 = 80;
        const MIN_SIDE: u16 = 5;
        const STEP: u16 = 5;
        if self.center_pct >= MAX_CENTER {
            return;
        }
        let transfer = STEP.min(MAX_CENTER - self.center_pct);
        let left_give = (transfer / 2).min(self.left_pct.saturating_sub(MIN_SIDE));
        let right_give = (transfer - transfer / 2).min(self.right_pct.saturating_sub(MIN_SIDE));
        self.left_pct -= left_give;
        self.right_pct -= right_give;
        self.center_pct += left_give + right_give;
    }
}

/// `count` lines of `text` from line `first` (0-based) as a markdown
/// blockquote headed by where they came from. `None` when the range holds
/// no text.
pub fn quote_lines(name: &str, text: &str, first: usize, count: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().skip(first).take(count).collect();
    if lines.iter().all(|l| l.trim().is_empty()) {
        return None;
    }
    let mut quote = format!("From {name}, lines {}-{}:\n", first + 1, first + lines.len());
    for line in lines {
        if line.is_empty() {
            quote.push_str(">\n");
        } else {
            quote.push_str("> ");
            quote.push_str(line);
            quote.push('\n');
        }
    }
    Some(quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::remote::{EntryKind, RemoteEntry};
    use scribe_core::tree::build_level;

    fn entry(path: &str, kind: EntryKind) -> RemoteEntry {
        RemoteEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_owned(),
            path: path.to_owned(),
            kind,
            revision: format!("sha-{path}"),
            size: None,
        }
    }

    fn state_with_tree() -> AppState {
        let mut state = AppState::default();
        state.reset_tree(RepoRef::new("octo", "handbook", None));
        state.tree.set_roots(build_level(vec![
            entry("README.md", EntryKind::File),
            entry("docs", EntryKind::Directory),
        ]));
        state
    }

    fn labels(state: &AppState) -> Vec<String> {
        state
            .visible_rows()
            .iter()
            .map(|row| match row {
                TreeRow::Node { node, depth } => format!("{depth}:{}", node.name),
                TreeRow::Loading { depth } => format!("{depth}:…"),
            })
            .collect()
    }

    #[test]
    fn open_directory_shows_loading_until_children_arrive() {
        let mut state = state_with_tree();
        assert_eq!(labels(&state), ["0:docs", "0:README.md"]);

        state.expanded.insert("docs".into());
        assert_eq!(labels(&state), ["0:docs", "1:…", "0:README.md"]);

        state.tree.apply_children(
            "docs",
            build_level(vec![entry("docs/guide.md", EntryKind::File)]),
        );
        assert_eq!(labels(&state), ["0:docs", "1:guide.md", "0:README.md"]);

        // Collapsing keeps the fetched children for the next open.
        state.expanded.remove("docs");
        assert_eq!(labels(&state), ["0:docs", "0:README.md"]);
        assert!(!state.tree.needs_fetch("docs"));
    }

    #[test]
    fn collapse_from_a_child_moves_to_its_directory() {
        let mut state = state_with_tree();
        state.expanded.insert("docs".into());
        state.tree.apply_children(
            "docs",
            build_level(vec![entry("docs/guide.md", EntryKind::File)]),
        );
        state.select_path("docs/guide.md");
        assert_eq!(state.selected_node().map(|n| n.path.clone()).as_deref(), Some("docs/guide.md"));

        state.collapse_or_parent();
        assert_eq!(state.selected_node().map(|n| n.path.clone()).as_deref(), Some("docs"));
        assert!(!state.expanded.contains("docs"));
    }

    #[test]
    fn selection_past_the_end_clamps_to_last_row() {
        let mut state = state_with_tree();
        state.tree_state.select(Some(40));
        assert_eq!(state.selected_node().map(|n| n.name.clone()).as_deref(), Some("README.md"));
    }

    #[test]
    fn panel_resize_respects_limits() {
        let mut state = AppState::default();
        for _ in 0..20 {
            state.grow_document_panel();
        }
        assert_eq!(state.center_pct, 80);
        assert_eq!(state.left_pct + state.center_pct + state.right_pct, 100);
        for _ in 0..20 {
            state.shrink_document_panel();
        }
        assert_eq!(state.center_pct, 20);
        assert_eq!(state.left_pct + state.center_pct + state.right_pct, 100);
    }

    #[test]
    fn quote_is_a_headed_blockquote() {
        let text = "# Title\n\nFirst para.\nSecond line.\n";
        assert_eq!(
            quote_lines("guide.md", text, 1, 3).as_deref(),
            Some("From guide.md, lines 2-4:\n>\n> First para.\n> Second line.\n")
        );
        // Past the end, or only blank lines.
        assert_eq!(quote_lines("guide.md", text, 10, 5), None);
        assert_eq!(quote_lines("guide.md", "\n\n", 0, 2), None);
    }

    #[test]
    fn quoting_without_a_document_changes_nothing() {
        let mut state = AppState::default();
        state.input = "draft".into();
        assert!(!state.quote_visible_document());
        assert_eq!(state.input, "draft");
        assert_eq!(state.mode, Mode::Normal);
    }

    #[test]
    fn status_expires() {
        let mut state = AppState::default();
        state.set_status("Saved");
        let shown = state.status.as_ref().map(|s| s.shown_at).unwrap();
        state.expire_status(shown + Duration::from_secs(1));
        assert!(state.status.is_some());
        state.expire_status(shown + STATUS_TTL);
        assert!(state.status.is_none());
    }
}
