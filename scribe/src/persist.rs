//! Ordered conversation persistence.
//!
//! Every write to the conversation database goes through one task that
//! drains an unbounded channel, so writes land in the order the main loop
//! issued them: a clear followed by an append never ends with the append
//! deleted. Failures are logged and the next command still runs.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;

use scribe_core::conversation::Message;
use scribe_core::db;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistCommand {
    /// Insert a message, or overwrite the stored text of the same id.
    Append { conversation_id: String, message: Message },
    /// Delete every message and pin.
    Clear { conversation_id: String },
    SavePins { conversation_id: String, pins: Vec<String> },
    /// Overwrite the stored conversation with the live one.
    Replace { conversation_id: String, messages: Vec<Message>, pins: Vec<String> },
}

/// Starts the writer task. It ends once every sender is dropped and the
/// queue is drained.
pub fn spawn_persistence(db: Arc<Connection>) -> (UnboundedSender<PersistCommand>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(db, rx));
    (tx, handle)
}

async fn run(db: Arc<Connection>, mut rx: UnboundedReceiver<PersistCommand>) {
    while let Some(command) = rx.recv().await {
        if let Err(err) = apply(&db, &command).await {
            tracing::warn!(error = %err, command = ?command, "conversation write failed");
        }
    }
    tracing::debug!("persistence queue closed");
}

async fn apply(db: &Connection, command: &PersistCommand) -> Result<(), tokio_rusqlite::Error> {
    match command {
        PersistCommand::Append { conversation_id, message } => {
            db::append_message(db, conversation_id, message).await
        }
        PersistCommand::Clear { conversation_id } => db::clear_conversation(db, conversation_id).await,
        PersistCommand::SavePins { conversation_id, pins } => {
            db::save_pins(db, conversation_id, pins).await
        }
        PersistCommand::Replace { conversation_id, messages, pins } => {
            db::clear_conversation(db, conversation_id).await?;
            for message in messages.iter().filter(|m| !m.text.is_empty()) {
                db::append_message(db, conversation_id, message).await?;
            }
            db::save_pins(db, conversation_id, pins).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::conversation::Role;

    fn message(id: u64, text: &str) -> Message {
        Message { id, role: Role::User, text: text.into(), created_at: 1_700_000_000 + id as i64 }
    }

    async fn fresh_db() -> (Arc<Connection>, String) {
        let path = tempfile::TempDir::new().unwrap().keep().join("scribe.db");
        let conn = db::open_db(&path).await.unwrap();
        let conversation = db::detect_or_create_conversation(&conn, "octo/handbook@main").await.unwrap();
        (Arc::new(conn), conversation.id)
    }

    #[tokio::test]
    async fn writes_land_in_issue_order() {
        let (conn, id) = fresh_db().await;
        let (tx, handle) = spawn_persistence(Arc::clone(&conn));

        tx.send(PersistCommand::Append { conversation_id: id.clone(), message: message(1, "old") }).unwrap();
        tx.send(PersistCommand::SavePins { conversation_id: id.clone(), pins: vec!["a.md".into()] }).unwrap();
        tx.send(PersistCommand::Clear { conversation_id: id.clone() }).unwrap();
        tx.send(PersistCommand::Append { conversation_id: id.clone(), message: message(2, "after clear") })
            .unwrap();
        tx.send(PersistCommand::SavePins { conversation_id: id.clone(), pins: vec!["b.md".into()] }).unwrap();
        drop(tx);
        handle.await.unwrap();

        let stored = db::load_messages(&conn, &id).await.unwrap();
        assert_eq!(stored, vec![message(2, "after clear")]);
        assert_eq!(db::load_pins(&conn, &id).await.unwrap(), ["b.md"]);
    }

    #[tokio::test]
    async fn replace_overwrites_and_skips_empty_replies() {
        let (conn, id) = fresh_db().await;
        let (tx, handle) = spawn_persistence(Arc::clone(&conn));

        tx.send(PersistCommand::Append { conversation_id: id.clone(), message: message(1, "stale") }).unwrap();
        tx.send(PersistCommand::Replace {
            conversation_id: id.clone(),
            messages: vec![message(1, "live"), message(2, "")],
            pins: vec!["docs/guide.md".into()],
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(db::load_messages(&conn, &id).await.unwrap(), vec![message(1, "live")]);
        assert_eq!(db::load_pins(&conn, &id).await.unwrap(), ["docs/guide.md"]);
    }
}
