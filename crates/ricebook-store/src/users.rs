// SPDX-License-Identifier: Apache-2.0

use crate::schema::next_counter;
use crate::{DocumentStore, StoreError};
use ricebook_model::{
    Email, GoogleIdentity, GoogleUid, Headline, Phone, ProfileDoc, UserId, UserRecord, Username,
    Zipcode,
};
use rusqlite::{params, OptionalExtension};

/// Profile fields captured at account creation.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub email: Email,
    pub dob: String,
    pub phone: Phone,
    pub zipcode: Zipcode,
    pub headline: Headline,
    pub avatar: String,
}

fn map_constraint(e: rusqlite::Error, what: &'static str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        if f.code == rusqlite::ErrorCode::ConstraintViolation {
            return StoreError::Conflict(what);
        }
    }
    e.into()
}

impl DocumentStore {
    /// Create the user and profile documents in one transaction. The user id
    /// comes from the `user_id` counter; a duplicate username rolls the
    /// allocation back along with everything else.
    pub fn create_user(
        &self,
        username: &Username,
        password_hash: Option<String>,
        google: Option<GoogleIdentity>,
        profile: NewProfile,
        now_ms: u64,
    ) -> Result<(UserRecord, ProfileDoc), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let id = UserId::from_u64(next_counter(&tx, "user_id")?);
            let user = UserRecord {
                id,
                username: username.clone(),
                password_hash,
                google,
                following: Vec::new(),
                created: now_ms,
            };
            user.validate()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let profile_doc = ProfileDoc {
                user_id: id,
                username: username.clone(),
                email: profile.email,
                dob: profile.dob,
                phone: profile.phone,
                zipcode: profile.zipcode,
                headline: profile.headline,
                avatar: profile.avatar,
            };
            tx.execute(
                "INSERT INTO users (id, username, google_uid, doc) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_u64() as i64,
                    username.as_str(),
                    user.google.as_ref().map(|g| g.uid.as_str()),
                    serde_json::to_string(&user)?,
                ],
            )
            .map_err(|e| map_constraint(e, "username"))?;
            tx.execute(
                "INSERT INTO profiles (user_id, username, doc) VALUES (?1, ?2, ?3)",
                params![
                    id.as_u64() as i64,
                    username.as_str(),
                    serde_json::to_string(&profile_doc)?,
                ],
            )?;
            tx.commit()?;
            Ok((user, profile_doc))
        })
    }

    pub fn find_user(&self, username: &Username) -> Result<Option<UserRecord>, StoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM users WHERE username = ?1",
                    params![username.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM users WHERE id = ?1",
                    params![id.as_u64() as i64],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn find_user_by_google_uid(
        &self,
        uid: &GoogleUid,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM users WHERE google_uid = ?1",
                    params![uid.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn username_taken(&self, candidate: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM users WHERE username = ?1",
                    params![candidate],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(hit.is_some())
        })
    }

    /// Persist a mutated user record, keeping the `google_uid` lookup column
    /// in step with the document.
    pub fn update_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        user.validate()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET google_uid = ?1, doc = ?2 WHERE id = ?3",
                    params![
                        user.google.as_ref().map(|g| g.uid.as_str()),
                        serde_json::to_string(user)?,
                        user.id.as_u64() as i64,
                    ],
                )
                .map_err(|e| map_constraint(e, "google identity"))?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            Ok(())
        })
    }

    /// Remove the account, its profile, and every session it holds.
    /// Articles keep their author string; they outlive the account.
    pub fn delete_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM users WHERE id = ?1",
                params![user.id.as_u64() as i64],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            tx.execute(
                "DELETE FROM profiles WHERE user_id = ?1",
                params![user.id.as_u64() as i64],
            )?;
            tx.execute(
                "DELETE FROM sessions WHERE username = ?1",
                params![user.username.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn profile(&self, username: &Username) -> Result<Option<ProfileDoc>, StoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM profiles WHERE username = ?1",
                    params![username.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn update_profile(&self, profile: &ProfileDoc) -> Result<(), StoreError> {
        profile
            .validate()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE profiles SET doc = ?1 WHERE user_id = ?2",
                params![
                    serde_json::to_string(profile)?,
                    profile.user_id.as_u64() as i64,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("profile"));
            }
            Ok(())
        })
    }

    /// Usernames for a follow list, keeping the edge insertion order.
    /// Edges pointing at deleted accounts are silently dropped.
    pub fn following_usernames(&self, user: &UserRecord) -> Result<Vec<String>, StoreError> {
        if user.following.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let mut names = Vec::with_capacity(user.following.len());
            let mut stmt = conn.prepare("SELECT username FROM users WHERE id = ?1")?;
            for id in &user.following {
                let name: Option<String> = stmt
                    .query_row(params![id.as_u64() as i64], |row| row.get(0))
                    .optional()?;
                if let Some(name) = name {
                    names.push(name);
                }
            }
            Ok(names)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory().expect("store")
    }

    fn new_profile(email: &str) -> NewProfile {
        NewProfile {
            email: Email::parse(email).expect("email"),
            dob: "1999-01-01".to_string(),
            phone: Phone::parse("713-348-0000").expect("phone"),
            zipcode: Zipcode::parse("77005").expect("zip"),
            headline: Headline::parse("").expect("headline"),
            avatar: "https://img.example/default.png".to_string(),
        }
    }

    fn username(name: &str) -> Username {
        Username::parse(name).expect("username")
    }

    #[test]
    fn create_and_find_round_trip() {
        let store = store();
        let (user, profile) = store
            .create_user(
                &username("alice"),
                Some("$2b$10$hash".to_string()),
                None,
                new_profile("alice@rice.edu"),
                42,
            )
            .expect("create");
        assert_eq!(user.id.as_u64(), 1);
        assert_eq!(profile.username.as_str(), "alice");

        let found = store.find_user(&username("alice")).expect("find").expect("some");
        assert_eq!(found, user);
        assert!(store.find_user(&username("nobody")).expect("find").is_none());
        assert!(store.username_taken("alice").expect("taken"));
        assert!(!store.username_taken("bob").expect("taken"));
    }

    #[test]
    fn duplicate_username_is_conflict_and_burns_nothing() {
        let store = store();
        store
            .create_user(
                &username("alice"),
                Some("h".to_string()),
                None,
                new_profile("a@b.co"),
                0,
            )
            .expect("first");
        let err = store
            .create_user(
                &username("alice"),
                Some("h".to_string()),
                None,
                new_profile("a2@b.co"),
                0,
            )
            .expect_err("duplicate");
        assert_eq!(err, StoreError::Conflict("username"));

        let (bob, _) = store
            .create_user(
                &username("bob"),
                Some("h".to_string()),
                None,
                new_profile("b@b.co"),
                0,
            )
            .expect("bob");
        assert_eq!(bob.id.as_u64(), 2, "rolled-back id was reused");
    }

    #[test]
    fn google_uid_lookup_and_update() {
        let store = store();
        let identity = GoogleIdentity::new(
            GoogleUid::parse("uid-42").expect("uid"),
            Some("Alice".to_string()),
            None,
            None,
        )
        .expect("identity");
        let (mut user, _) = store
            .create_user(
                &username("alice"),
                Some("h".to_string()),
                None,
                new_profile("a@b.co"),
                0,
            )
            .expect("create");
        assert!(store
            .find_user_by_google_uid(&GoogleUid::parse("uid-42").expect("uid"))
            .expect("lookup")
            .is_none());

        user.google = Some(identity);
        store.update_user(&user).expect("update");
        let found = store
            .find_user_by_google_uid(&GoogleUid::parse("uid-42").expect("uid"))
            .expect("lookup")
            .expect("linked");
        assert_eq!(found.username.as_str(), "alice");
    }

    #[test]
    fn linking_same_uid_twice_is_conflict() {
        let store = store();
        let uid = GoogleUid::parse("uid-1").expect("uid");
        let (mut alice, _) = store
            .create_user(
                &username("alice"),
                Some("h".to_string()),
                None,
                new_profile("a@b.co"),
                0,
            )
            .expect("alice");
        let (mut bob, _) = store
            .create_user(
                &username("bob"),
                Some("h".to_string()),
                None,
                new_profile("b@b.co"),
                0,
            )
            .expect("bob");
        alice.google =
            Some(GoogleIdentity::new(uid.clone(), None, None, None).expect("identity"));
        store.update_user(&alice).expect("link alice");
        bob.google = Some(GoogleIdentity::new(uid, None, None, None).expect("identity"));
        let err = store.update_user(&bob).expect_err("dup uid");
        assert_eq!(err, StoreError::Conflict("google identity"));
    }

    #[test]
    fn delete_user_removes_profile_and_sessions() {
        let store = store();
        let (user, _) = store
            .create_user(
                &username("alice"),
                None,
                Some(
                    GoogleIdentity::new(GoogleUid::parse("uid-9").expect("uid"), None, None, None)
                        .expect("identity"),
                ),
                new_profile("a@b.co"),
                0,
            )
            .expect("create");
        store
            .put_session("tok-1", &user.username, user.id, 0, 10_000)
            .expect("session");
        store.delete_user(&user).expect("delete");
        assert!(store.find_user(&username("alice")).expect("find").is_none());
        assert!(store.profile(&username("alice")).expect("profile").is_none());
        assert!(store.session("tok-1").expect("session").is_none());
    }

    #[test]
    fn following_usernames_keep_insertion_order() {
        let store = store();
        let (mut alice, _) = store
            .create_user(
                &username("alice"),
                Some("h".to_string()),
                None,
                new_profile("a@b.co"),
                0,
            )
            .expect("alice");
        let (bob, _) = store
            .create_user(
                &username("bob"),
                Some("h".to_string()),
                None,
                new_profile("b@b.co"),
                0,
            )
            .expect("bob");
        let (carol, _) = store
            .create_user(
                &username("carol"),
                Some("h".to_string()),
                None,
                new_profile("c@b.co"),
                0,
            )
            .expect("carol");
        assert!(alice.follow(carol.id));
        assert!(alice.follow(bob.id));
        store.update_user(&alice).expect("update");

        let reloaded = store
            .find_user(&username("alice"))
            .expect("find")
            .expect("some");
        let names = store.following_usernames(&reloaded).expect("names");
        assert_eq!(names, vec!["carol".to_string(), "bob".to_string()]);
    }
}
