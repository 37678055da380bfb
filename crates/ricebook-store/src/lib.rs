#![forbid(unsafe_code)]
//! Embedded document store: collections of JSON documents over a single
//! SQLite file. Callers get whole documents in and out; columns exist only
//! where a lookup or ordering needs an index.
//!
//! Everything here is synchronous. The service layer wraps calls in
//! `spawn_blocking`; keeping the store runtime-free keeps its tests plain.

use std::fmt::{Display, Formatter};

mod articles;
mod schema;
mod sessions;
mod users;

pub use schema::SCHEMA_VERSION;
pub use sessions::SessionRow;
pub use users::NewProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    NotFound(&'static str),
    Conflict(&'static str),
    Corrupt(String),
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::Conflict(what) => write!(f, "{what} already exists"),
            Self::Corrupt(msg) => write!(f, "corrupt document: {msg}"),
            Self::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Handle on the document database. Cheap to share behind an `Arc`; the
/// single connection serializes writers, which is all the write volume
/// here needs, while WAL keeps concurrent readers cheap.
pub struct DocumentStore {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl DocumentStore {
    /// Open (creating if absent) the store at `path` and migrate schema.
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = schema::open_connection(path)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    /// In-memory store for tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = schema::open_in_memory()?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))?;
        f(&mut guard)
    }
}
