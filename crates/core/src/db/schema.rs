//! Versioned schema and migrations
//!
//! The schema version lives in `PRAGMA user_version`. Each step is keyed by
//! the version it upgrades *from* and guarded with `old < N`, so a client that
//! skips versions runs every missing step inside one transaction.

use rusqlite::Connection;
use tracing::info;

use crate::errors::{Result, SidebarError};

/// Schema version this build writes
pub const CURRENT_VERSION: u32 = 3;

/// v1: prompt library
pub const PROMPTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS prompts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL,
    category    TEXT NOT NULL DEFAULT 'General',
    tags        TEXT NOT NULL DEFAULT '[]',   -- JSON array, insertion order
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,             -- epoch millis
    last_used   INTEGER,                      -- epoch millis, NULL until first use
    use_count   INTEGER NOT NULL DEFAULT 0,
    extra       TEXT NOT NULL DEFAULT '{}'    -- JSON object of passthrough fields
);

CREATE INDEX IF NOT EXISTS idx_prompts_title ON prompts(title);
CREATE INDEX IF NOT EXISTS idx_prompts_category ON prompts(category);
CREATE INDEX IF NOT EXISTS idx_prompts_created_at ON prompts(created_at);
CREATE INDEX IF NOT EXISTS idx_prompts_last_used ON prompts(last_used);
CREATE INDEX IF NOT EXISTS idx_prompts_is_favorite ON prompts(is_favorite);

-- Multi-entry tag index
CREATE TABLE IF NOT EXISTS prompt_tags (
    record_id INTEGER NOT NULL,
    position  INTEGER NOT NULL,
    tag       TEXT NOT NULL,
    PRIMARY KEY (record_id, position)
);
CREATE INDEX IF NOT EXISTS idx_prompt_tags_tag ON prompt_tags(tag);
";

/// v2: saved conversations
pub const CONVERSATIONS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    title           TEXT NOT NULL,
    content         TEXT NOT NULL,
    provider        TEXT NOT NULL DEFAULT 'unknown',
    timestamp       INTEGER NOT NULL,             -- epoch millis
    tags            TEXT NOT NULL DEFAULT '[]',
    is_favorite     INTEGER NOT NULL DEFAULT 0,
    notes           TEXT NOT NULL DEFAULT '',
    conversation_id TEXT NOT NULL DEFAULT '',     -- provider-side id, not unique
    url             TEXT NOT NULL DEFAULT '',
    modified_at     INTEGER NOT NULL,
    search_text     TEXT NOT NULL DEFAULT '',
    extra           TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_conversations_provider ON conversations(provider);
CREATE INDEX IF NOT EXISTS idx_conversations_timestamp ON conversations(timestamp);
CREATE INDEX IF NOT EXISTS idx_conversations_is_favorite ON conversations(is_favorite);

CREATE TABLE IF NOT EXISTS conversation_tags (
    record_id INTEGER NOT NULL,
    position  INTEGER NOT NULL,
    tag       TEXT NOT NULL,
    PRIMARY KEY (record_id, position)
);
CREATE INDEX IF NOT EXISTS idx_conversation_tags_tag ON conversation_tags(tag);
";

/// v3: duplicate detection by external id
pub const CONVERSATION_ID_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_conversations_conversation_id ON conversations(conversation_id);
";

/// Read the on-disk schema version
pub fn user_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    u32::try_from(version)
        .map_err(|_| SidebarError::OpenError(format!("Invalid schema version {}", version)))
}

/// Bring the database up to `target`, returning the version it started at
///
/// Fails with `OpenError` when the file was written by a newer schema.
pub fn migrate(conn: &mut Connection, target: u32) -> Result<u32> {
    let old = user_version(conn)?;

    if old > target {
        return Err(SidebarError::OpenError(format!(
            "database schema version {} is newer than requested version {}",
            old, target
        )));
    }
    if old == target {
        return Ok(old);
    }

    let tx = conn.transaction()?;

    if old < 1 && target >= 1 {
        tx.execute_batch(PROMPTS_SCHEMA)?;
    }
    if old < 2 && target >= 2 {
        tx.execute_batch(CONVERSATIONS_SCHEMA)?;
    }
    if old < 3 && target >= 3 {
        tx.execute_batch(CONVERSATION_ID_INDEX)?;
        add_column_if_missing(&tx, "prompts", "variables", "TEXT NOT NULL DEFAULT '[]'")?;
    }

    tx.pragma_update(None, "user_version", target)?;
    tx.commit()?;

    info!("Migrated store schema from v{} to v{}", old, target);
    Ok(old)
}

/// `ALTER TABLE ... ADD COLUMN` has no `IF NOT EXISTS`; check first
fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .iter()
        .any(|name| name == column);

    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))?;
    }
    Ok(())
}
