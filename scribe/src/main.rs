//! scribe: a terminal editor for Markdown documents stored in a GitHub
//! repository, with a streaming assistant beside the document.
//!
//! Entry point for the `scribe` binary. Wires together the terminal lifecycle
//! (`tui`), the unified event bus (`event`), rendering (`ui`), the background
//! operations (`actions`), and the core engines from `scribe-core` backed by
//! the HTTP clients in `scribe-remote`.
//!
//! # Startup sequence
//!
//! 1. Load config and set up file logging. Both happen before the terminal is
//!    touched so a failure prints normally.
//! 2. `install_panic_hook()` restores the terminal before a panic message
//!    prints.
//! 3. `register_sigterm()` returns a flag polled in the event loop.
//! 4. Open the conversation database, start its ordered writer, and build
//!    the HTTP clients.
//! 5. `init_tui()` enters the alternate screen and raw mode.
//! 6. Spawn the input task and open the starting repository, if any.
//!
//! `restore_tui()` runs at the single exit point after the loop. Inside the
//! loop only the Render arm uses `?`, and errors there still reach it.

mod actions;
mod app;
mod event;
mod highlight;
mod logging;
mod persist;
mod theme;
mod tui;
mod ui;

use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use scribe_core::config::load_config;
use scribe_core::parse_repo_ref;
use scribe_remote::github::GitHubClient;
use scribe_remote::openai::OpenAiClient;

use crate::actions::Services;
use crate::app::AppState;
use crate::event::{AppEvent, EventHandler};
use crate::ui::keybindings::{self, KeyAction};

/// Longest wait at exit for queued conversation writes.
const PERSIST_FLUSH: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let (config, config_error) = load_config();
    std::fs::create_dir_all(&config.data_dir)?;
    let log_path = logging::init(&config.data_dir)?;
    tracing::info!(log = %log_path.display(), "scribe starting");
    if let Some(err) = &config_error {
        tracing::warn!(error = %err, "config ignored, using defaults");
    }

    let theme = theme::Theme::from_name(&config.theme);
    let start_repo = std::env::args().nth(1).or_else(|| config.repo.clone());
    let mut state = AppState::new(&config.github.commit_message);

    tui::install_panic_hook();
    let term_flag = tui::register_sigterm()?;

    let db = scribe_core::db::open_db(config.data_dir.join("scribe.db"))
        .await
        .map_err(std::io::Error::other)?;

    let github = Arc::new(
        GitHubClient::new(&config.github.api_base, config.github.token())
            .map_err(std::io::Error::other)?,
    );
    let model = OpenAiClient::new(&config.model, config.model.api_key())
        .map_err(std::io::Error::other)?;
    if !model.is_configured() {
        tracing::warn!(env = %config.model.api_key_env, "no model API key; the assistant is disabled");
    }

    let mut terminal = tui::init_tui()?;

    let handler = EventHandler::new();
    let mut input_task = event::spawn_event_task(handler.tx.clone());
    let mut rx = handler.rx;

    let db = Arc::new(db);
    let (persist_tx, persist_task) = persist::spawn_persistence(Arc::clone(&db));

    let services = Services {
        reader: github.clone(),
        store: github,
        model: Arc::new(model),
        db,
        persist: persist_tx,
        tx: handler.tx.clone(),
        max_chars: config.context.max_chars,
    };

    match start_repo.as_deref().map(|s| (s, parse_repo_ref(s))) {
        Some((_, Some(repo))) => actions::open_repository(&mut state, &services, repo),
        Some((raw, None)) => state.set_error(format!("Not a repository reference: {raw:?}")),
        None => state.set_status("Press o to open a repository"),
    }
    if let Some(err) = config_error {
        state.set_error(format!("Config ignored: {err}"));
    }

    // Exits only via `break`, never via `?` outside the Render arm.
    'event_loop: loop {
        tokio::select! {
            // Checks SIGTERM even when no event arrives.
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else {
                    break 'event_loop;
                };
                match event {
                    AppEvent::Render => {
                        terminal.draw(|frame| ui::render(frame, &mut state, &theme))?;
                    }
                    AppEvent::Tick => state.expire_status(Instant::now()),
                    AppEvent::Resize(_, _) => {}
                    AppEvent::Key(key) => {
                        let action = keybindings::handle_key(key, &mut state);
                        if action == KeyAction::Quit {
                            break 'event_loop;
                        }
                        if action == KeyAction::EditExternally {
                            input_task =
                                edit_externally(&mut terminal, &mut state, &services, input_task).await;
                        } else {
                            dispatch(action, &mut state, &services);
                        }
                    }
                    AppEvent::Mouse(mouse) => keybindings::handle_mouse(mouse, &mut state),
                    AppEvent::RootLoaded { generation, result } => {
                        actions::on_root_loaded(&mut state, generation, result);
                    }
                    AppEvent::ChildrenLoaded { generation, path, result } => {
                        actions::on_children_loaded(&mut state, generation, &path, result);
                    }
                    AppEvent::DocumentSwitched(result) => {
                        actions::on_document_switched(&mut state, *result);
                    }
                    AppEvent::DocumentSaved(attempt) => {
                        actions::on_document_saved(&mut state, *attempt);
                    }
                    AppEvent::ConversationResumed { generation, conversation_id, messages, pins } => {
                        actions::on_conversation_resumed(
                            &mut state,
                            &services,
                            generation,
                            conversation_id,
                            messages,
                            pins,
                        );
                    }
                    AppEvent::TurnChunk { id, text } => actions::on_turn_chunk(&mut state, id, &text),
                    AppEvent::TurnFinished { id, outcome } => {
                        actions::on_turn_finished(&mut state, &services, id, outcome);
                    }
                    AppEvent::ProposalReady(result) => actions::on_proposal_ready(&mut state, result),
                    AppEvent::Notice { text, error: true } => state.set_error(text),
                    AppEvent::Notice { text, error: false } => state.set_status(text),
                    AppEvent::Quit => break 'event_loop,
                }
                if term_flag.load(Ordering::Relaxed) {
                    break 'event_loop;
                }
            }
        }
    }

    input_task.abort();
    tui::restore_tui()?;
    if state.has_unsaved_work() {
        tracing::warn!("quit with unsaved changes");
    }

    // Let queued conversation writes land. Background tasks may still hold
    // a sender, so the wait is bounded.
    drop(services);
    if tokio::time::timeout(PERSIST_FLUSH, persist_task).await.is_err() {
        tracing::warn!("conversation writes still queued at exit");
    }
    tracing::info!("scribe exiting");
    Ok(())
}

/// Carries out a key action that needs services.
fn dispatch(action: KeyAction, state: &mut AppState, services: &Services) {
    match action {
        KeyAction::Continue | KeyAction::Quit | KeyAction::EditExternally => {}
        KeyAction::Activate => actions::activate_selected(state, services),
        KeyAction::TogglePin => actions::toggle_pin(state, services),
        KeyAction::RefreshRoot => actions::refresh_root(state, services),
        KeyAction::OpenRepo => actions::open_repository_input(state, services),
        KeyAction::Save => actions::save_document(state, services),
        KeyAction::SendMessage => actions::send_message(state, services),
        KeyAction::StopTurn => actions::stop_turn(state, services),
        KeyAction::ClearConversation => actions::clear_conversation(state, services),
        KeyAction::ProposePatch => actions::request_patch(state, services),
        KeyAction::ApplyPatch => actions::confirm_patch(state),
        KeyAction::DiscardPatch => actions::discard_patch(state),
    }
}

/// Hands the open document to `$VISUAL` / `$EDITOR` and installs what comes
/// back. The input task is stopped while the editor runs and a fresh one is
/// returned.
async fn edit_externally(
    terminal: &mut tui::Tui,
    state: &mut AppState,
    services: &Services,
    input_task: JoinHandle<()>,
) -> JoinHandle<()> {
    let text = match state.document.current() {
        _ if state.document.is_busy() => {
            Err("Wait for the current document operation to finish".to_owned())
        }
        Some(doc) if doc.is_loaded() => Ok(doc.text().to_owned()),
        Some(doc) => Err(format!("{} could not be loaded; select it again to retry", doc.path)),
        None => Err("Open a document first".to_owned()),
    };
    let text = match text {
        Ok(text) => text,
        Err(message) => {
            state.set_error(message);
            return input_task;
        }
    };

    let file = match write_scratch(&text) {
        Ok(file) => file,
        Err(err) => {
            state.set_error(format!("Could not create a scratch file: {err}"));
            return input_task;
        }
    };

    input_task.abort();
    // Cancelled is the expected outcome.
    let _ = input_task.await;

    let editor = tui::editor_command();
    tracing::info!(%editor, "handing the document to an external editor");
    let outcome = tui::run_editor(terminal, &editor, file.path());
    let input_task = event::spawn_event_task(services.tx.clone());

    match outcome {
        Ok(true) => match std::fs::read_to_string(file.path()) {
            Ok(edited) => actions::apply_external_edit(state, edited),
            Err(err) => state.set_error(format!("Could not read the edited text: {err}")),
        },
        Ok(false) => state.set_error(format!("{editor} exited with an error; edits discarded")),
        Err(err) => {
            tracing::error!(error = %err, "external editor failed");
            state.set_error(format!("Could not run {editor}: {err}"));
        }
    }
    input_task
}

fn write_scratch(text: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("scribe-").suffix(".md").tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}
