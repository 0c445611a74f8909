//! v001 -- Initial schema creation.
//!
//! Creates the key/value tables (`kv_hash`, `kv_set`), the `messages` table
//! and the `outbox` queue.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Hashes: key -> { field -> value }
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv_hash (
    key   TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,

    PRIMARY KEY (key, field)
);

-- ----------------------------------------------------------------
-- Sets: key -> { member }
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv_set (
    key    TEXT NOT NULL,
    member TEXT NOT NULL,

    PRIMARY KEY (key, member)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    gid        INTEGER PRIMARY KEY NOT NULL,  -- from the global gid counter
    window_id  INTEGER NOT NULL,
    user_id    TEXT,                          -- NULL for server generated lines
    body       TEXT NOT NULL,
    cat        TEXT NOT NULL,
    ts         INTEGER NOT NULL,              -- unix seconds
    status     TEXT NOT NULL DEFAULT 'original',
    updated_id INTEGER,
    updated_ts INTEGER
);

CREATE INDEX IF NOT EXISTS idx_messages_window_gid
    ON messages(window_id, gid);

-- ----------------------------------------------------------------
-- Outbox: pending notifications per session, drained in seq order
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS outbox (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    session_id TEXT NOT NULL,
    payload    TEXT NOT NULL                  -- JSON notification
);

CREATE INDEX IF NOT EXISTS idx_outbox_session
    ON outbox(user_id, session_id, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
