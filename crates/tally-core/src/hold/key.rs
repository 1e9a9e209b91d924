use std::{fmt, str::FromStr};

use crate::error::CoreError;

/// Identity a held action is filed under, usually the chat user who triggered it.
///
/// Chat logins are case-insensitive and often typed as mentions, so `" @Alice "`
/// and `"alice"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HoldKey(String);

impl HoldKey {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref();
        let norm = raw.trim().trim_start_matches('@').to_ascii_lowercase();

        if norm.is_empty() || norm.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidKey(raw.to_string()));
        }
        Ok(Self(norm))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HoldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HoldKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for HoldKey {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}
