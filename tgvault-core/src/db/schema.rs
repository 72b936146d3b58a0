//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Catalogue (chats, categories, assignments)
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        tg_id        INTEGER UNIQUE NOT NULL,
        title        TEXT NOT NULL,
        kind         TEXT NOT NULL,      -- 'group', 'broadcast'
        participants INTEGER
    );

    CREATE TABLE IF NOT EXISTS categories (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    );

    -- Assignments reference chats by platform id on purpose: the
    -- catalogue is replaced wholesale on refresh and assignments must
    -- survive it, so there is no FK edge to chats here.
    CREATE TABLE IF NOT EXISTS chat_categories (
        chat_tg_id  INTEGER NOT NULL,
        category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
        PRIMARY KEY (chat_tg_id, category_id)
    );

    CREATE INDEX IF NOT EXISTS idx_chats_tg_id ON chats(tg_id);
    CREATE INDEX IF NOT EXISTS idx_chat_categories_category ON chat_categories(category_id);
    "#,
    // Version 2: Per-chat stats snapshot (derived, regenerable)
    r#"
    -- Point-in-time snapshot of a chat's message history, replaced
    -- wholesale by every stats refresh. Never partially updated.
    CREATE TABLE IF NOT EXISTS chat_stats (
        chat_id    INTEGER NOT NULL,
        message_id INTEGER NOT NULL,
        date_time  TEXT NOT NULL,        -- RFC 3339, offset preserved
        text       TEXT,
        PRIMARY KEY (chat_id, message_id)
    );

    CREATE INDEX IF NOT EXISTS idx_chat_stats_day ON chat_stats(chat_id, substr(date_time, 1, 10));
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
