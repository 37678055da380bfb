// SPDX-License-Identifier: Apache-2.0

//! Third-party sign-in plumbing: parsing the assertion the SPA posts
//! after its Google popup and deriving a free local handle for accounts
//! created through that flow.

use ricebook_model::{Email, GoogleIdentity, GoogleUid, Username, USERNAME_MAX_LEN};
use ricebook_store::{DocumentStore, StoreError};
use serde_json::Value;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AssertionError {
    Missing(&'static str),
    Invalid(&'static str),
}

/// Pulls a `GoogleIdentity` out of the posted assertion body. Only `uid`
/// is mandatory; the SPA omits the rest when the provider withholds them.
pub(crate) fn parse_assertion(body: &Value) -> Result<GoogleIdentity, AssertionError> {
    let uid_raw = match body.get("uid") {
        None | Some(Value::Null) => return Err(AssertionError::Missing("uid")),
        Some(v) => v.as_str().ok_or(AssertionError::Invalid("uid"))?,
    };
    let uid = GoogleUid::parse(uid_raw).map_err(|_| AssertionError::Invalid("uid"))?;
    let display_name = body
        .get("displayName")
        .and_then(Value::as_str)
        .map(str::to_string);
    let email = body.get("email").and_then(Value::as_str).map(str::to_string);
    let photo_url = body
        .get("photoURL")
        .and_then(Value::as_str)
        .map(str::to_string);
    GoogleIdentity::new(uid, display_name, email, photo_url)
        .map_err(|_| AssertionError::Invalid("displayName"))
}

/// Handle for a first-time third-party sign-in: the sanitized display
/// name, else the sanitized email local part, else a handle built from
/// the uid. Collisions get a numeric suffix, truncating the stem so the
/// result stays within the username length cap.
pub(crate) fn derive_unique_username(
    store: &DocumentStore,
    identity: &GoogleIdentity,
) -> Result<Username, StoreError> {
    let base = identity
        .display_name
        .as_deref()
        .and_then(Username::sanitize)
        .or_else(|| {
            identity
                .email
                .as_deref()
                .and_then(|raw| Email::parse(raw).ok())
                .and_then(|email| Username::sanitize(email.local_part()))
        })
        .or_else(|| Username::sanitize(identity.uid.as_str()))
        .or_else(|| Username::sanitize("google_user"))
        .ok_or_else(|| StoreError::Backend("handle derivation produced nothing".to_string()))?;
    if !store.username_taken(base.as_str())? {
        return Ok(base);
    }
    for n in 2_u32..=10_000 {
        let suffix = n.to_string();
        let mut stem = base.as_str().to_string();
        stem.truncate(USERNAME_MAX_LEN.saturating_sub(suffix.len()));
        let candidate = format!("{}{suffix}", stem.trim_end_matches('_'));
        if let Ok(candidate) = Username::parse(&candidate) {
            if !store.username_taken(candidate.as_str())? {
                return Ok(candidate);
            }
        }
    }
    Err(StoreError::Conflict("username"))
}
