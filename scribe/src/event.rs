//! Event bus for scribe.
//!
//! Terminal input, timer ticks and the results of background work are all
//! normalised into one `AppEvent` enum and sent over a tokio unbounded MPSC
//! channel. The main loop owns the receiver and is the only place state is
//! mutated.
//!
//! Two independent intervals drive the render and logic cycles:
//! - **Render interval** (33 ms, about 30 FPS) triggers a `terminal.draw()`.
//! - **Tick interval** (250 ms) expires status messages.

use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind, MouseEvent};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;

use scribe_core::conversation::{Message, TurnOutcome};
use scribe_core::document::{SaveAttempt, SwitchResult};
use scribe_core::patch::PatchProposal;
use scribe_core::tree::Nodes;
use scribe_core::{LlmError, RemoteError};

/// All events the application can receive from any source.
#[derive(Debug)]
pub enum AppEvent {
    /// A key press from the terminal (`KeyEventKind::Press` only).
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Terminal was resized to (columns, rows).
    Resize(u16, u16),
    Tick,
    Render,
    /// Top level of the repository opened under `generation`.
    RootLoaded {
        generation: u64,
        result: Result<Nodes, RemoteError>,
    },
    /// Children of one directory, fetched under `generation`.
    ChildrenLoaded {
        generation: u64,
        path: String,
        result: Result<Nodes, RemoteError>,
    },
    DocumentSwitched(Box<SwitchResult>),
    DocumentSaved(Box<SaveAttempt>),
    /// The persisted conversation for the repository opened under `generation`.
    ConversationResumed {
        generation: u64,
        conversation_id: String,
        messages: Vec<Message>,
        pins: Vec<String>,
    },
    /// One streamed piece of the assistant message `id`.
    TurnChunk { id: u64, text: String },
    TurnFinished { id: u64, outcome: TurnOutcome },
    ProposalReady(Result<Option<PatchProposal>, LlmError>),
    /// A background task wants a message in the status bar.
    Notice { text: String, error: bool },
    Quit,
}

/// Holds the sender and receiver ends of the unified event channel.
pub struct EventHandler {
    /// Cloned into every background task that produces events.
    pub tx: mpsc::UnboundedSender<AppEvent>,
    pub rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the task that forwards terminal input and timer ticks.
///
/// The returned handle is aborted while an external editor owns the terminal,
/// so that `EventStream` stops reading stdin, and the task is spawned again
/// afterwards.
///
/// `reader.next().fuse()` keeps `select!` from polling a finished stream, and
/// only `KeyEventKind::Press` is forwarded since some platforms report both
/// press and release for every keystroke.
pub fn spawn_event_task(tx: mpsc::UnboundedSender<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick_interval = interval(Duration::from_millis(250));
        let mut render_interval = interval(Duration::from_millis(33));
        let mut reader = EventStream::new();

        loop {
            let tick_tick = tick_interval.tick();
            let render_tick = render_interval.tick();
            let crossterm_event = reader.next().fuse();

            let sent = tokio::select! {
                _ = tick_tick => tx.send(AppEvent::Tick),
                _ = render_tick => tx.send(AppEvent::Render),
                maybe_event = crossterm_event => match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        tx.send(AppEvent::Key(key))
                    }
                    Some(Ok(Event::Resize(w, h))) => tx.send(AppEvent::Resize(w, h)),
                    Some(Ok(Event::Mouse(mouse))) => tx.send(AppEvent::Mouse(mouse)),
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "terminal input failed");
                        Ok(())
                    }
                    _ => Ok(()),
                },
            };
            if sent.is_err() {
                break;
            }
        }
    })
}
