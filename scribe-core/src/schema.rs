/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open, before the version is read.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the v1 schema.
///
/// - `conversations`: one row per conversation, keyed by UUID v4 text and
///   grouped by repository key (`owner/repo@branch`).
/// - `messages`: the ordered history of a conversation; `seq` is the
///   in-memory message id.
/// - `pins`: pinned context paths in pin order.
///
/// Child rows go away with their conversation (`ON DELETE CASCADE`).
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS conversations (
        id          TEXT    PRIMARY KEY,
        repo_key    TEXT    NOT NULL,
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    ) STRICT;

    CREATE INDEX IF NOT EXISTS conversations_by_repo
        ON conversations (repo_key, updated_at);

    CREATE TABLE IF NOT EXISTS messages (
        conversation_id TEXT    NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        seq             INTEGER NOT NULL,
        role            TEXT    NOT NULL CHECK(role IN ('user', 'assistant')),
        body            TEXT    NOT NULL,
        created_at      INTEGER NOT NULL,
        PRIMARY KEY (conversation_id, seq)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS pins (
        conversation_id TEXT    NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        path            TEXT    NOT NULL,
        position        INTEGER NOT NULL,
        PRIMARY KEY (conversation_id, path)
    ) STRICT;
";

/// Brings the database to the latest schema version. Idempotent.
///
/// Each step runs inside a `BEGIN IMMEDIATE` transaction together with the
/// insert of its version row.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
        tracing::info!("database migrated to schema version 1");
    }

    Ok(())
}
