use crate::identity::{GoogleIdentity, ParseError, Username};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storage-level user key. Follow edges reference this, not the username,
/// so a rename never rewrites the graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(transparent)]
#[non_exhaustive]
pub struct UserId(u64);

impl UserId {
    #[must_use]
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credential-bearing account record. `password_hash` is `None` for
/// accounts created through third-party sign-in that never set a password;
/// such accounts must always keep `google` populated or they would be
/// unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub id: UserId,
    pub username: Username,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<GoogleIdentity>,
    #[serde(default)]
    pub following: Vec<UserId>,
    pub created: u64,
}

impl UserRecord {
    /// A record with no way to sign in is corrupt.
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.password_hash.is_none() && self.google.is_none() {
            return Err(ParseError::InvalidFormat(
                "user record must keep at least one credential",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn follows(&self, other: UserId) -> bool {
        self.following.contains(&other)
    }

    /// Set-semantics append; returns false when the edge already existed.
    pub fn follow(&mut self, other: UserId) -> bool {
        if self.follows(other) {
            return false;
        }
        self.following.push(other);
        true
    }

    /// Returns false when there was no edge to remove.
    pub fn unfollow(&mut self, other: UserId) -> bool {
        let before = self.following.len();
        self.following.retain(|id| *id != other);
        self.following.len() != before
    }
}
