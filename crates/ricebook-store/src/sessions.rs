// SPDX-License-Identifier: Apache-2.0

//! Durable session rows. The server keeps its own in-memory view; this
//! table is what lets logins survive a process restart.

use crate::{DocumentStore, StoreError};
use ricebook_model::{UserId, Username};
use rusqlite::{params, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub username: Username,
    pub user_id: UserId,
    pub created_at: u64,
    pub expires_at: u64,
}

impl DocumentStore {
    /// Upsert a session token. Re-issuing a token refreshes its expiry.
    pub fn put_session(
        &self,
        token: &str,
        username: &Username,
        user_id: UserId,
        created_at: u64,
        expires_at: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, username, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(token) DO UPDATE SET expires_at = excluded.expires_at",
                params![
                    token,
                    username.as_str(),
                    user_id.as_u64() as i64,
                    created_at as i64,
                    expires_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// Raw lookup. Expiry is not checked here; callers compare
    /// `expires_at` against their own clock.
    pub fn session(&self, token: &str) -> Result<Option<SessionRow>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username, user_id, created_at, expires_at
                 FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?
            .map(|(username, user_id, created_at, expires_at)| {
                Ok(SessionRow {
                    username: Username::parse(&username)
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    user_id: UserId::from_u64(user_id as u64),
                    created_at: created_at as u64,
                    expires_at: expires_at as u64,
                })
            })
            .transpose()
        })
    }

    /// Returns whether a row was actually removed, so logout can tell a
    /// live token apart from a stale one.
    pub fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            Ok(removed > 0)
        })
    }

    /// Drop every session a user holds. Password changes and account
    /// deletion both funnel through here.
    pub fn delete_sessions_for(&self, username: &Username) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE username = ?1",
                params![username.as_str()],
            )?;
            Ok(removed as u64)
        })
    }

    pub fn sweep_expired_sessions(&self, now_ms: u64) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now_ms as i64],
            )?;
            Ok(removed as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory().expect("store")
    }

    fn username(name: &str) -> Username {
        Username::parse(name).expect("username")
    }

    #[test]
    fn round_trip_and_refresh() {
        let store = store();
        let alice = username("alice");
        store
            .put_session("tok-a", &alice, UserId::from_u64(1), 100, 200)
            .expect("put");
        let row = store.session("tok-a").expect("get").expect("present");
        assert_eq!(
            row,
            SessionRow {
                username: alice.clone(),
                user_id: UserId::from_u64(1),
                created_at: 100,
                expires_at: 200,
            }
        );

        store
            .put_session("tok-a", &alice, UserId::from_u64(1), 100, 900)
            .expect("refresh");
        let row = store.session("tok-a").expect("get").expect("present");
        assert_eq!(row.expires_at, 900);
        assert_eq!(row.created_at, 100, "refresh keeps the original start");
    }

    #[test]
    fn delete_reports_whether_a_row_existed() {
        let store = store();
        store
            .put_session("tok-a", &username("alice"), UserId::from_u64(1), 0, 100)
            .expect("put");
        assert!(store.delete_session("tok-a").expect("delete"));
        assert!(!store.delete_session("tok-a").expect("repeat"));
        assert!(store.session("tok-a").expect("get").is_none());
    }

    #[test]
    fn delete_for_user_leaves_other_users_alone() {
        let store = store();
        let alice = username("alice");
        store
            .put_session("tok-a1", &alice, UserId::from_u64(1), 0, 100)
            .expect("put");
        store
            .put_session("tok-a2", &alice, UserId::from_u64(1), 0, 100)
            .expect("put");
        store
            .put_session("tok-b", &username("bob"), UserId::from_u64(2), 0, 100)
            .expect("put");

        assert_eq!(store.delete_sessions_for(&alice).expect("delete"), 2);
        assert!(store.session("tok-a1").expect("get").is_none());
        assert!(store.session("tok-b").expect("get").is_some());
    }

    #[test]
    fn sweep_removes_only_expired_rows() {
        let store = store();
        let alice = username("alice");
        store
            .put_session("old", &alice, UserId::from_u64(1), 0, 50)
            .expect("put");
        store
            .put_session("live", &alice, UserId::from_u64(1), 0, 500)
            .expect("put");

        assert_eq!(store.sweep_expired_sessions(100).expect("sweep"), 1);
        assert!(store.session("old").expect("get").is_none());
        assert!(store.session("live").expect("get").is_some());
    }
}
