//! Conversation persistence.
//!
//! One SQLite file in WAL mode, reached through `tokio-rusqlite` so queries
//! run off the async threads. Every write happens inside a `BEGIN IMMEDIATE`
//! transaction.

use std::path::Path;
use std::time::Duration;

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::conversation::{Message, Role};
use crate::now_secs;

/// A persisted conversation header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConversation {
    pub id: String,
    pub repo_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Opens (or creates) the database at `path`, configures WAL mode and
/// applies schema migrations.
pub async fn open_db(path: impl AsRef<Path>) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path.as_ref()).await?;

    conn.call(|db| -> rusqlite::Result<()> {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        // Leftover WAL from a previous run.
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        crate::schema::migrate(db)
    })
    .await?;

    Ok(conn)
}

/// Finds the most recent conversation for `repo_key`, or creates one.
///
/// Resuming bumps `updated_at`.
pub async fn detect_or_create_conversation(
    conn: &Connection,
    repo_key: &str,
) -> Result<StoredConversation, tokio_rusqlite::Error> {
    let repo_key = repo_key.to_owned();

    conn.call(move |db| -> rusqlite::Result<StoredConversation> {
        let existing = db
            .query_row(
                "SELECT id, repo_key, created_at, updated_at
                 FROM conversations
                 WHERE repo_key = ?1
                 ORDER BY updated_at DESC
                 LIMIT 1",
                rusqlite::params![&repo_key],
                |r| {
                    Ok(StoredConversation {
                        id: r.get(0)?,
                        repo_key: r.get(1)?,
                        created_at: r.get(2)?,
                        updated_at: r.get(3)?,
                    })
                },
            )
            .optional()?;

        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let conversation = match existing {
            Some(mut conversation) => {
                tx.execute(
                    "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, &conversation.id],
                )?;
                conversation.updated_at = now;
                conversation
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO conversations (id, repo_key, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)",
                    rusqlite::params![&id, &repo_key, now],
                )?;
                StoredConversation { id, repo_key, created_at: now, updated_at: now }
            }
        };
        tx.commit()?;
        Ok(conversation)
    })
    .await
}

/// Inserts or replaces one message. Streaming replies are written once the
/// turn finishes, so a replay of the same `seq` overwrites the partial text.
pub async fn append_message(
    conn: &Connection,
    conversation_id: &str,
    message: &Message,
) -> Result<(), tokio_rusqlite::Error> {
    let conversation_id = conversation_id.to_owned();
    let message = message.clone();

    conn.call(move |db| -> rusqlite::Result<()> {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO messages (conversation_id, seq, role, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(conversation_id, seq)
             DO UPDATE SET body = excluded.body",
            rusqlite::params![
                &conversation_id,
                message.id as i64,
                message.role.as_str(),
                &message.text,
                message.created_at
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now_secs(), &conversation_id],
        )?;
        tx.commit()
    })
    .await
}

/// Loads the messages of a conversation in order. Rows with an unknown role
/// are skipped.
pub async fn load_messages(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<Message>, tokio_rusqlite::Error> {
    let conversation_id = conversation_id.to_owned();

    conn.call(move |db| -> rusqlite::Result<Vec<Message>> {
        let mut stmt = db.prepare(
            "SELECT seq, role, body, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![&conversation_id], |r| {
                let seq: i64 = r.get(0)?;
                let role: String = r.get(1)?;
                let text: String = r.get(2)?;
                let created_at: i64 = r.get(3)?;
                Ok((seq, role, text, created_at))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(seq, role, text, created_at)| {
                Some(Message { id: seq as u64, role: Role::parse(&role)?, text, created_at })
            })
            .collect())
    })
    .await
}

/// Deletes every message and pin of a conversation, keeping its header.
pub async fn clear_conversation(
    conn: &Connection,
    conversation_id: &str,
) -> Result<(), tokio_rusqlite::Error> {
    let conversation_id = conversation_id.to_owned();

    conn.call(move |db| -> rusqlite::Result<()> {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            rusqlite::params![&conversation_id],
        )?;
        tx.execute(
            "DELETE FROM pins WHERE conversation_id = ?1",
            rusqlite::params![&conversation_id],
        )?;
        tx.commit()
    })
    .await
}

/// Replaces the stored pins with `paths`, in order.
pub async fn save_pins(
    conn: &Connection,
    conversation_id: &str,
    paths: &[String],
) -> Result<(), tokio_rusqlite::Error> {
    let conversation_id = conversation_id.to_owned();
    let paths = paths.to_vec();

    conn.call(move |db| -> rusqlite::Result<()> {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM pins WHERE conversation_id = ?1",
            rusqlite::params![&conversation_id],
        )?;
        for (position, path) in paths.iter().enumerate() {
            tx.execute(
                "INSERT INTO pins (conversation_id, path, position) VALUES (?1, ?2, ?3)",
                rusqlite::params![&conversation_id, path, position as i64],
            )?;
        }
        tx.commit()
    })
    .await
}

pub async fn load_pins(
    conn: &Connection,
    conversation_id: &str,
) -> Result<Vec<String>, tokio_rusqlite::Error> {
    let conversation_id = conversation_id.to_owned();

    conn.call(move |db| -> rusqlite::Result<Vec<String>> {
        let mut stmt =
            db.prepare("SELECT path FROM pins WHERE conversation_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(rusqlite::params![&conversation_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
}
