//! User-initiated operations and the application of their results.
//!
//! Each operation claims its state transition synchronously on `AppState`,
//! then hands the remote half to a tokio task that reports back through the
//! event bus. The matching `on_*` function installs the outcome when the event
//! reaches the main loop. State is only ever touched from the main loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_rusqlite::Connection;

use scribe_core::context::{assemble_context, chat_prompt, ActiveDocument};
use scribe_core::conversation::{Message, TurnOutcome, TurnRejected};
use scribe_core::db;
use scribe_core::document::{DocumentSession, SaveAttempt, SaveOutcome, SelectPlan, SwitchResult};
use scribe_core::llm::LanguageModel;
use scribe_core::patch::{self, PatchProposal};
use scribe_core::remote::{RepoReader, RepoStore};
use scribe_core::tree::{fetch_level, Nodes, TreeNode};
use scribe_core::{parse_repo_ref, DocumentError, LlmError, PatchError, RemoteError, RepoRef};

use crate::app::{AppState, Mode, PanelFocus, PendingPatch};
use crate::event::AppEvent;
use crate::persist::PersistCommand;

/// Handles to everything outside the process.
#[derive(Clone)]
pub struct Services {
    pub reader: Arc<dyn RepoReader>,
    pub store: Arc<dyn RepoStore>,
    pub model: Arc<dyn LanguageModel>,
    /// Read access for resuming; writes go through `persist`.
    pub db: Arc<Connection>,
    pub persist: UnboundedSender<PersistCommand>,
    pub tx: UnboundedSender<AppEvent>,
    /// Context budget per turn, in characters.
    pub max_chars: usize,
}

impl Services {
    fn send(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event loop is gone; dropping a background result");
        }
    }

    fn persist(&self, command: PersistCommand) {
        if self.persist.send(command).is_err() {
            tracing::warn!("persistence queue is closed; conversation change not stored");
        }
    }
}

// ---------------------------------------------------------------------------
// Repository and tree
// ---------------------------------------------------------------------------

/// Parses the typed reference and opens it.
pub fn open_repository_input(state: &mut AppState, services: &Services) {
    let input = std::mem::take(&mut state.repo_input);
    match parse_repo_ref(&input) {
        Some(repo) => open_repository(state, services, repo),
        None => state.set_error(format!("Not a repository reference: {:?}", input.trim())),
    }
}

/// Points the whole session at `repo`: fresh tree, no open document, and the
/// conversation stored for that repository.
pub fn open_repository(state: &mut AppState, services: &Services, repo: RepoRef) {
    if state.document.is_busy() {
        state.set_error("Wait for the current document operation to finish");
        return;
    }
    if state.document.is_dirty() {
        state.set_error("Save the open document before switching repositories");
        return;
    }
    tracing::info!(repo = %repo, "opening repository");
    let generation = state.reset_for_repo(repo.clone());
    state.set_status(format!("Opening {repo}…"));
    spawn_root_load(services, repo.clone(), generation);
    spawn_resume(services, repo, generation);
}

/// Reloads the top level of the current repository, dropping every fetched
/// directory. The open document is kept.
pub fn refresh_root(state: &mut AppState, services: &Services) {
    let Some(repo) = state.tree.repo().cloned() else {
        state.set_error("No repository is open (press o)");
        return;
    };
    let generation = state.reset_tree(repo.clone());
    state.set_status(format!("Refreshing {repo}…"));
    spawn_root_load(services, repo, generation);
}

fn spawn_root_load(services: &Services, repo: RepoRef, generation: u64) {
    let services = services.clone();
    tokio::spawn(async move {
        let result = fetch_level(services.reader.as_ref(), &repo, "").await;
        services.send(AppEvent::RootLoaded { generation, result });
    });
}

pub fn on_root_loaded(state: &mut AppState, generation: u64, result: Result<Nodes, RemoteError>) {
    if generation != state.tree.generation() {
        tracing::debug!(generation, "dropping root listing of a previous repository");
        return;
    }
    state.root_loading = false;
    match result {
        Ok(roots) => {
            let count = roots.len();
            state.tree.set_roots(roots);
            state.tree_state.select((count > 0).then_some(0));
            if let Some(repo) = state.tree.repo() {
                tracing::info!(repo = %repo, entries = count, "loaded repository root");
                let text = format!("Opened {repo}");
                state.set_status(text);
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "repository root could not be listed");
            state.root_error = Some(err.to_string());
            state.set_error(format!("Could not list the repository: {err}"));
        }
    }
}

/// Enter on a tree row: toggles a directory, opens a file.
pub fn activate_selected(state: &mut AppState, services: &Services) {
    let Some(node) = state.selected_node() else {
        return;
    };
    if node.is_dir() {
        toggle_directory(state, services, &node.path);
    } else {
        open_document(state, services, &node);
    }
}

/// Opens or closes a directory. The first open fetches its children; the
/// fetch is skipped when one is already in flight for the same path.
pub fn toggle_directory(state: &mut AppState, services: &Services, path: &str) {
    if state.expanded.remove(path) {
        return;
    }
    state.expanded.insert(path.to_owned());
    if !state.tree.needs_fetch(path) || !state.loading.insert(path.to_owned()) {
        return;
    }
    let snapshot = state.tree.clone();
    let generation = state.tree.generation();
    let path = path.to_owned();
    let services = services.clone();
    tokio::spawn(async move {
        let result = snapshot.expand(services.reader.as_ref(), &path).await;
        services.send(AppEvent::ChildrenLoaded { generation, path, result });
    });
}

/// Installs one directory's children. A failure leaves the directory empty;
/// it is not retried until the tree is refreshed.
pub fn on_children_loaded(
    state: &mut AppState,
    generation: u64,
    path: &str,
    result: Result<Nodes, RemoteError>,
) {
    if generation != state.tree.generation() {
        tracing::debug!(path, generation, "dropping listing from a previous tree");
        return;
    }
    state.loading.remove(path);
    // Expansion failures are absorbed; settle_expansion has logged them.
    let _ = state.tree.settle_expansion(path, result);
}

/// Pins or unpins the selected file as reference context.
pub fn toggle_pin(state: &mut AppState, services: &Services) {
    let Some(node) = state.selected_node().filter(|n| !n.is_dir()) else {
        state.set_error("Only files can be pinned");
        return;
    };
    if state.conversation.toggle_pin(&node.path) {
        state.set_status(format!("Pinned {} as context", node.name));
    } else {
        state.set_status(format!("Unpinned {}", node.name));
    }
    persist_pins(state, services);
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Opens `node`, saving the current document first when it is dirty.
pub fn open_document(state: &mut AppState, services: &Services, node: &TreeNode) {
    let previous = state.document.current().map(|d| d.name.clone());
    match state.document.begin_select(node) {
        Ok(SelectPlan::Unchanged) => state.focus = PanelFocus::Document,
        Ok(SelectPlan::Switch(request)) => {
            match (&request.save, previous) {
                (Some(_), Some(previous)) => {
                    state.set_status(format!("Saving {previous} before opening {}…", request.name))
                }
                _ => state.set_status(format!("Opening {}…", request.name)),
            }
            let services = services.clone();
            tokio::spawn(async move {
                let result = DocumentSession::execute_switch(services.store.as_ref(), request).await;
                services.send(AppEvent::DocumentSwitched(Box::new(result)));
            });
        }
        Err(DocumentError::Busy) => state.set_error("Still busy with the current document"),
        Err(err) => state.set_error(format!("Could not open {}: {err}", node.name)),
    }
}

pub fn on_document_switched(state: &mut AppState, result: SwitchResult) {
    let name = result.name.clone();
    let report = state.document.finish_select(result);
    state.refresh_editor_lines();
    state.doc_scroll = 0;
    state.focus = PanelFocus::Document;

    let mut problems = Vec::new();
    if let Some(err) = report.save_error {
        problems.push(format!("previous document was not saved ({err})"));
    }
    if let Some(err) = report.load_error {
        problems.push(format!("could not load {name} ({err})"));
    }
    if problems.is_empty() {
        state.set_status(format!("Opened {name}"));
    } else {
        state.set_error(capitalize(&problems.join("; ")));
    }
}

/// Writes the open document back when it has unsaved changes.
pub fn save_document(state: &mut AppState, services: &Services) {
    match state.document.begin_save() {
        Ok(None) => state.set_status("No unsaved changes"),
        Ok(Some(request)) => {
            state.set_status(format!("Saving {}…", request.path));
            let services = services.clone();
            tokio::spawn(async move {
                let attempt = DocumentSession::execute_save(services.store.as_ref(), request).await;
                services.send(AppEvent::DocumentSaved(Box::new(attempt)));
            });
        }
        Err(DocumentError::Busy) => state.set_error("Still busy with the current document"),
        Err(err) => state.set_error(format!("Cannot save: {err}")),
    }
}

pub fn on_document_saved(state: &mut AppState, attempt: SaveAttempt) {
    let path = attempt.request.path.clone();
    match state.document.finish_save(attempt) {
        Ok(SaveOutcome::Saved { .. }) => state.set_status(format!("Saved {path}")),
        Ok(SaveOutcome::Clean) => {}
        Err(DocumentError::Remote(RemoteError::Conflict { path })) => state.set_error(format!(
            "{path} changed on the remote since it was opened; your edits are kept but were not saved"
        )),
        Err(err) => state.set_error(format!("Save failed: {err}")),
    }
}

/// Installs text coming back from the external editor.
pub fn apply_external_edit(state: &mut AppState, text: String) {
    let changed = state.document.current().is_some_and(|d| d.text() != text);
    if !changed {
        state.set_status("No changes");
        return;
    }
    if state.document.edit(text) {
        state.refresh_editor_lines();
        state.set_status("Edited; press s to save");
    } else {
        state.set_error("The document changed state while the editor was open; edit discarded");
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Sends the chat input as a new turn.
pub fn send_message(state: &mut AppState, services: &Services) {
    let Some(repo) = state.tree.repo().cloned() else {
        state.set_error("Open a repository first (press o)");
        return;
    };
    let text = state.input.trim_end().to_owned();
    let ticket = match state.conversation.begin_turn(&text) {
        Ok(ticket) => ticket,
        Err(TurnRejected::InFlight) => {
            state.set_error("A reply is still streaming; press Esc to stop it");
            return;
        }
        Err(TurnRejected::EmptyMessage) => return,
    };
    state.input.clear();
    state.chat_follow = true;

    let user_message = state
        .conversation
        .messages()
        .iter()
        .rev()
        .find(|m| m.id < ticket.assistant_id)
        .cloned();
    if let Some(message) = user_message {
        persist_message(state, services, message);
    }

    let stop = Arc::new(AtomicBool::new(false));
    state.stop = Arc::clone(&stop);

    let active = state
        .document
        .current()
        .filter(|d| d.is_loaded())
        .map(|d| ActiveDocument { path: d.path.clone(), name: d.name.clone(), content: d.text().to_owned() });
    let pins = state.conversation.pins().to_vec();
    let services = services.clone();
    tokio::spawn(async move {
        let id = ticket.assistant_id;
        let files =
            assemble_context(services.reader.as_ref(), &repo, active.as_ref(), &pins, services.max_chars).await;
        tracing::debug!(id, files = files.len(), "context assembled");
        let outcome = match services.model.stream(chat_prompt(&files, &ticket.history)).await {
            Ok(chunks) => forward_chunks(&services, id, chunks, &stop).await,
            Err(err) => TurnOutcome::Failed(err.to_string()),
        };
        services.send(AppEvent::TurnFinished { id, outcome });
    });
}

/// Pulls the stream until it ends, fails, or `stop` is raised; `stop` is
/// checked before every pull.
async fn forward_chunks(
    services: &Services,
    id: u64,
    mut chunks: scribe_core::llm::ChunkStream,
    stop: &AtomicBool,
) -> TurnOutcome {
    loop {
        if stop.load(Ordering::Relaxed) {
            return TurnOutcome::Stopped;
        }
        match chunks.next().await {
            Some(Ok(text)) => {
                if services.tx.send(AppEvent::TurnChunk { id, text }).is_err() {
                    return TurnOutcome::Stopped;
                }
            }
            Some(Err(err)) => return TurnOutcome::Failed(err.to_string()),
            None => return TurnOutcome::Completed,
        }
    }
}

pub fn on_turn_chunk(state: &mut AppState, id: u64, text: &str) {
    if !state.conversation.append_chunk(id, text) {
        tracing::debug!(id, "dropping chunk of a turn that is no longer in flight");
    }
}

pub fn on_turn_finished(state: &mut AppState, services: &Services, id: u64, outcome: TurnOutcome) {
    if let TurnOutcome::Failed(reason) = &outcome {
        if state.conversation.in_flight() == Some(id) {
            state.set_error(format!("The assistant reply failed: {reason}"));
        }
    }
    finish_turn(state, services, id, outcome);
}

/// Stops the streaming turn right away. Chunks still in transit are dropped.
pub fn stop_turn(state: &mut AppState, services: &Services) {
    let Some(id) = state.conversation.in_flight() else {
        return;
    };
    state.stop.store(true, Ordering::Relaxed);
    finish_turn(state, services, id, TurnOutcome::Stopped);
    state.set_status("Stopped");
}

fn finish_turn(state: &mut AppState, services: &Services, id: u64, outcome: TurnOutcome) {
    if !state.conversation.finish_turn(id, outcome) {
        return;
    }
    if let Some(message) = state.conversation.message(id).filter(|m| !m.text.is_empty()).cloned() {
        persist_message(state, services, message);
    }
}

/// Empties the conversation and its pins, here and on disk.
pub fn clear_conversation(state: &mut AppState, services: &Services) {
    state.stop.store(true, Ordering::Relaxed);
    state.conversation.clear();
    state.chat_scroll = 0;
    state.chat_follow = true;
    state.set_status("Conversation cleared");
    if let Some(conversation_id) = state.conversation_id.clone() {
        services.persist(PersistCommand::Clear { conversation_id });
    }
}

// ---------------------------------------------------------------------------
// Patch flow
// ---------------------------------------------------------------------------

/// Asks the model to turn the last reply into a patch of the open document.
pub fn request_patch(state: &mut AppState, services: &Services) {
    if state.proposal_pending.is_some() {
        state.set_status("Already working out a patch…");
        return;
    }
    if state.conversation.is_in_flight() {
        state.set_error("Wait for the reply to finish before applying it");
        return;
    }
    let Some(doc) = state.document.current().filter(|d| d.is_loaded()) else {
        state.set_error("Open a document first");
        return;
    };
    if state.conversation.last_assistant_reply().is_none() {
        state.set_error("There is no assistant reply to apply yet");
        return;
    }
    let history = state.conversation.history();
    let text = doc.text().to_owned();
    state.proposal_pending = Some(doc.path.clone());
    state.set_status("Working out a patch…");
    let services = services.clone();
    tokio::spawn(async move {
        let result = patch::propose(services.model.as_ref(), &history, &text).await;
        services.send(AppEvent::ProposalReady(result));
    });
}

/// `true` when `path` is still the open document.
fn is_open_document(state: &AppState, path: &str) -> bool {
    state.document.current().is_some_and(|d| d.path == path)
}

/// Shows a usable proposal as a preview against the live text of the
/// document it was computed for.
pub fn on_proposal_ready(state: &mut AppState, result: Result<Option<PatchProposal>, LlmError>) {
    let Some(path) = state.proposal_pending.take() else {
        tracing::debug!("dropping a patch proposal nobody is waiting for");
        return;
    };
    let proposal = match result {
        Ok(Some(proposal)) => proposal,
        Ok(None) => {
            state.set_error("Could not identify a section of the document to change");
            return;
        }
        Err(err) => {
            state.set_error(format!("Could not get a patch: {err}"));
            return;
        }
    };
    let Some(doc) = state.document.current().filter(|d| d.path == path) else {
        tracing::info!(path = %path, "open document changed while a patch was computed");
        state.set_error(format!("The document changed before the patch for {path} arrived; patch discarded"));
        return;
    };
    match patch::preview_patch(doc.text(), &proposal) {
        Ok(diff) => {
            state.pending_patch = Some(PendingPatch { path, proposal, diff });
            state.patch_scroll = 0;
            state.mode = Mode::ConfirmPatch;
        }
        Err(err) => report_patch_error(state, err),
    }
}

/// Applies the previewed proposal to the live text as it is now.
pub fn confirm_patch(state: &mut AppState) {
    state.mode = Mode::Normal;
    let Some(pending) = state.pending_patch.take() else {
        return;
    };
    if !is_open_document(state, &pending.path) {
        state.set_error(format!(
            "The document changed before the patch for {} was applied; patch discarded",
            pending.path
        ));
        return;
    }
    match state.document.replace_with_patch(&pending.proposal) {
        Ok(applied) => {
            state.refresh_editor_lines();
            let mut text = "Patch applied; press s to save".to_owned();
            if applied.extra_matches > 0 {
                text.push_str(&format!(
                    " (the replaced text occurs {} more time(s); only the first was changed)",
                    applied.extra_matches
                ));
            }
            state.set_status(text);
        }
        Err(DocumentError::Patch(err)) => report_patch_error(state, err),
        Err(err) => state.set_error(format!("Could not apply the patch: {err}")),
    }
}

pub fn discard_patch(state: &mut AppState) {
    state.mode = Mode::Normal;
    if state.pending_patch.take().is_some() {
        state.set_status("Patch discarded");
    }
}

fn report_patch_error(state: &mut AppState, err: PatchError) {
    match err {
        PatchError::NotFound => state.set_error("The suggested text was not found in the document"),
        PatchError::NoOp => state.set_status("The suggestion would not change the document"),
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn spawn_resume(services: &Services, repo: RepoRef, generation: u64) {
    let services = services.clone();
    tokio::spawn(async move {
        let loaded = async {
            let conversation = db::detect_or_create_conversation(&services.db, &repo.key()).await?;
            let messages = db::load_messages(&services.db, &conversation.id).await?;
            let pins = db::load_pins(&services.db, &conversation.id).await?;
            Ok::<_, tokio_rusqlite::Error>((conversation.id, messages, pins))
        }
        .await;
        match loaded {
            Ok((conversation_id, messages, pins)) => services.send(AppEvent::ConversationResumed {
                generation,
                conversation_id,
                messages,
                pins,
            }),
            Err(err) => {
                tracing::warn!(repo = %repo, error = %err, "could not load the stored conversation");
                services.send(AppEvent::Notice {
                    text: format!("Conversation history is unavailable: {err}"),
                    error: true,
                });
            }
        }
    });
}

/// Adopts the stored conversation. When the user already started talking
/// before it arrived, the live log wins and replaces what was stored.
pub fn on_conversation_resumed(
    state: &mut AppState,
    services: &Services,
    generation: u64,
    conversation_id: String,
    messages: Vec<Message>,
    pins: Vec<String>,
) {
    if generation != state.tree.generation() {
        return;
    }
    state.conversation_id = Some(conversation_id.clone());
    let live = state.conversation.messages().to_vec();
    if live.is_empty() && state.conversation.pins().is_empty() {
        tracing::info!(messages = messages.len(), pins = pins.len(), "resumed conversation");
        state.conversation.restore(messages, pins);
        state.chat_follow = true;
        return;
    }
    services.persist(PersistCommand::Replace {
        conversation_id,
        messages: live,
        pins: state.conversation.pins().to_vec(),
    });
}

fn persist_message(state: &AppState, services: &Services, message: Message) {
    let Some(conversation_id) = state.conversation_id.clone() else {
        tracing::debug!(id = message.id, "no stored conversation yet; message kept in memory only");
        return;
    };
    services.persist(PersistCommand::Append { conversation_id, message });
}

fn persist_pins(state: &AppState, services: &Services) {
    if let Some(conversation_id) = state.conversation_id.clone() {
        services.persist(PersistCommand::SavePins { conversation_id, pins: state.conversation.pins().to_vec() });
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::remote::{EntryKind, RemoteFile};

    fn file_node(path: &str) -> TreeNode {
        TreeNode {
            name: path.into(),
            path: path.into(),
            kind: EntryKind::File,
            revision: format!("sha-{path}"),
            size: None,
            children: None,
        }
    }

    /// Opens `path` with `text` the way a completed switch would.
    fn open(state: &mut AppState, path: &str, text: &str) {
        let plan = state.document.begin_select(&file_node(path)).unwrap();
        assert!(matches!(plan, SelectPlan::Switch(_)));
        on_document_switched(
            state,
            SwitchResult {
                path: path.into(),
                name: path.into(),
                saved: None,
                load: Ok(RemoteFile { text: text.into(), revision: format!("sha-{path}") }),
            },
        );
    }

    fn state_with(path: &str, text: &str) -> AppState {
        let mut state = AppState::default();
        state.reset_for_repo(RepoRef::new("octo", "handbook", None));
        open(&mut state, path, text);
        state
    }

    fn text_of(state: &AppState) -> &str {
        state.document.current().map(|d| d.text()).unwrap_or_default()
    }

    #[test]
    fn proposal_for_a_document_that_was_switched_away_is_dropped() {
        let mut state = state_with("a.md", "intro: foo");
        state.proposal_pending = Some("a.md".into());
        open(&mut state, "b.md", "b also says foo");

        on_proposal_ready(&mut state, Ok(Some(PatchProposal::new("foo", "bar"))));
        confirm_patch(&mut state);

        assert_eq!(text_of(&state), "b also says foo");
        assert!(!state.document.is_dirty());
        assert!(state.pending_patch.is_none());
        assert_eq!(state.mode, Mode::Normal);
        assert!(state.status.as_ref().is_some_and(|s| s.error));
    }

    #[test]
    fn previewed_patch_is_not_applied_to_another_document() {
        let mut state = state_with("a.md", "intro: foo");
        state.proposal_pending = Some("a.md".into());
        on_proposal_ready(&mut state, Ok(Some(PatchProposal::new("foo", "bar"))));
        assert_eq!(state.mode, Mode::ConfirmPatch);

        open(&mut state, "b.md", "b also says foo");
        confirm_patch(&mut state);

        assert_eq!(text_of(&state), "b also says foo");
        assert!(!state.document.is_dirty());
    }

    #[test]
    fn proposal_applies_to_its_own_document() {
        let mut state = state_with("a.md", "Title\n\nOld para.");
        state.proposal_pending = Some("a.md".into());
        on_proposal_ready(&mut state, Ok(Some(PatchProposal::new("Old para.", "New para."))));
        assert!(state.pending_patch.as_ref().is_some_and(|p| p.path == "a.md"));

        confirm_patch(&mut state);

        assert_eq!(text_of(&state), "Title\n\nNew para.");
        assert!(state.document.is_dirty());
        assert!(state.proposal_pending.is_none());
    }
}
