use crate::identity::{ParseError, Username};
use crate::user::UserId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const EMAIL_MAX_LEN: usize = 254;
pub const HEADLINE_MAX_LEN: usize = 280;
pub const AVATAR_URL_MAX_LEN: usize = 2048;
pub const DOB_MAX_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Email(String);

impl Email {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("email"));
        }
        if input.trim() != input {
            return Err(ParseError::Trimmed("email"));
        }
        if input.len() > EMAIL_MAX_LEN {
            return Err(ParseError::TooLong("email", EMAIL_MAX_LEN));
        }
        let Some((local, domain)) = input.split_once('@') else {
            return Err(ParseError::InvalidFormat("email must contain '@'"));
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return Err(ParseError::InvalidFormat(
                "email must be local@domain with a dotted domain",
            ));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(ParseError::InvalidFormat("email must not contain spaces"));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the '@'. Used to derive handles for third-party
    /// sign-ups that carry no usable display name.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(l, _)| l)
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `12345` or `12345-6789`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Zipcode(String);

impl Zipcode {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("zipcode"));
        }
        let (five, plus4) = match input.split_once('-') {
            Some((a, b)) => (a, Some(b)),
            None => (input, None),
        };
        let five_ok = five.len() == 5 && five.chars().all(|c| c.is_ascii_digit());
        let plus4_ok = match plus4 {
            None => true,
            Some(p) => p.len() == 4 && p.chars().all(|c| c.is_ascii_digit()),
        };
        if !five_ok || !plus4_ok {
            return Err(ParseError::InvalidFormat(
                "zipcode must be ddddd or ddddd-dddd",
            ));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `ddd-ddd-dddd`, the form the registration page collects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Phone(String);

impl Phone {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty("phone"));
        }
        let parts: Vec<&str> = input.split('-').collect();
        let shape_ok = parts.len() == 3
            && parts[0].len() == 3
            && parts[1].len() == 3
            && parts[2].len() == 4
            && parts
                .iter()
                .all(|p| p.chars().all(|c| c.is_ascii_digit()));
        if !shape_ok {
            return Err(ParseError::InvalidFormat("phone must be ddd-ddd-dddd"));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[non_exhaustive]
pub struct Headline(String);

impl Headline {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.len() > HEADLINE_MAX_LEN {
            return Err(ParseError::TooLong("headline", HEADLINE_MAX_LEN));
        }
        Ok(Self(input.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-user profile document. `dob` is fixed at registration; everything
/// else is editable through the field routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDoc {
    pub user_id: UserId,
    pub username: Username,
    pub email: Email,
    pub dob: String,
    pub phone: Phone,
    pub zipcode: Zipcode,
    pub headline: Headline,
    pub avatar: String,
}

impl ProfileDoc {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.dob.len() > DOB_MAX_LEN {
            return Err(ParseError::TooLong("dob", DOB_MAX_LEN));
        }
        if self.avatar.len() > AVATAR_URL_MAX_LEN {
            return Err(ParseError::TooLong("avatar", AVATAR_URL_MAX_LEN));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(Email::parse("a@b.co").is_ok());
        assert!(Email::parse("a@b").is_err());
        assert!(Email::parse("@b.co").is_err());
        assert!(Email::parse("a b@c.co").is_err());
        assert_eq!(Email::parse("jane@rice.edu").unwrap().local_part(), "jane");
    }

    #[test]
    fn zipcode_shapes() {
        assert!(Zipcode::parse("77005").is_ok());
        assert!(Zipcode::parse("77005-1234").is_ok());
        assert!(Zipcode::parse("7705").is_err());
        assert!(Zipcode::parse("77005-12").is_err());
        assert!(Zipcode::parse("abcde").is_err());
    }

    #[test]
    fn phone_shapes() {
        assert!(Phone::parse("713-348-0000").is_ok());
        assert!(Phone::parse("7133480000").is_err());
        assert!(Phone::parse("713-348-00").is_err());
    }

    #[test]
    fn headline_cap() {
        assert!(Headline::parse("").is_ok());
        assert!(Headline::parse(&"h".repeat(HEADLINE_MAX_LEN)).is_ok());
        assert!(Headline::parse(&"h".repeat(HEADLINE_MAX_LEN + 1)).is_err());
    }
}
