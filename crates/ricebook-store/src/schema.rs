// SPDX-License-Identifier: Apache-2.0

use crate::StoreError;
use rusqlite::Connection;
use std::path::Path;

pub const SCHEMA_VERSION: i64 = 1;

const OPEN_PRAGMAS: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    PRAGMA temp_store=MEMORY;
    PRAGMA busy_timeout=5000;
    PRAGMA cache_size=-16000;
";

const SCHEMA_DDL: &str = "
    CREATE TABLE IF NOT EXISTS users (
      id INTEGER PRIMARY KEY,
      username TEXT NOT NULL UNIQUE,
      google_uid TEXT,
      doc TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_users_google_uid
      ON users(google_uid) WHERE google_uid IS NOT NULL;
    CREATE TABLE IF NOT EXISTS profiles (
      user_id INTEGER PRIMARY KEY,
      username TEXT NOT NULL UNIQUE,
      doc TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS articles (
      id INTEGER PRIMARY KEY,
      author TEXT NOT NULL,
      date INTEGER NOT NULL,
      doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_articles_author_date
      ON articles(author, date DESC);
    CREATE TABLE IF NOT EXISTS sessions (
      token TEXT PRIMARY KEY,
      username TEXT NOT NULL,
      user_id INTEGER NOT NULL,
      created_at INTEGER NOT NULL,
      expires_at INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE INDEX IF NOT EXISTS idx_sessions_username ON sessions(username);
    CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
    CREATE TABLE IF NOT EXISTS counters (
      name TEXT PRIMARY KEY,
      value INTEGER NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS meta (
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    ) WITHOUT ROWID;
";

pub(crate) fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    init(&conn)?;
    Ok(conn)
}

pub(crate) fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

fn init(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(OPEN_PRAGMAS)?;
    conn.execute_batch(SCHEMA_DDL)?;
    let existing: Option<String> = conn
        .query_row("SELECT v FROM meta WHERE k='schema_version'", [], |row| {
            row.get(0)
        })
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    match existing {
        None => {
            conn.execute(
                "INSERT INTO meta (k, v) VALUES ('schema_version', ?1)",
                rusqlite::params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        Some(v) => {
            return Err(StoreError::Backend(format!(
                "schema version mismatch: found {v}, expected {SCHEMA_VERSION}"
            )));
        }
    }
    Ok(())
}

/// Next value of a named monotonic counter. Must run inside the caller's
/// transaction so an aborted insert never burns an id.
pub(crate) fn next_counter(
    tx: &rusqlite::Transaction<'_>,
    name: &str,
) -> Result<u64, StoreError> {
    tx.execute(
        "INSERT INTO counters (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        rusqlite::params![name],
    )?;
    let value: i64 = tx.query_row(
        "SELECT value FROM counters WHERE name = ?1",
        rusqlite::params![name],
        |row| row.get(0),
    )?;
    Ok(value as u64)
}
