//! Revision identifiers
//!
//! A revision is either a full 40-character hex digest or the sentinel `"0"`,
//! which holds provenance for changes not yet attached to a commit.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a full hex digest
pub const HEX_LEN: usize = 40;

/// Identifier of the revision a set of rename/copy rows belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(String);

impl Revision {
    /// Sentinel used for staged data that has no commit yet
    pub const WORKING: &'static str = "0";

    /// The staging revision `"0"`
    pub fn working() -> Self {
        Self(Self::WORKING.to_string())
    }

    /// Parse and validate a revision identifier
    ///
    /// Accepts a 40-character hex digest (normalized to lowercase) or `"0"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == Self::WORKING {
            return Ok(Self::working());
        }
        if s.len() != HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidRevision(format!(
                "expected {} hex digits or \"0\", got {:?}",
                HEX_LEN, s
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Wrap a value read back from a backend without re-validating it
    pub(crate) fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the staging sentinel
    pub fn is_working(&self) -> bool {
        self.0 == Self::WORKING
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Revision {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Revision {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Revision::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_digest() {
        let rev = Revision::parse("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA1").unwrap();
        assert_eq!(rev.as_str(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1");
        assert!(!rev.is_working());
    }

    #[test]
    fn test_parse_working() {
        let rev: Revision = "0".parse().unwrap();
        assert!(rev.is_working());
        assert_eq!(rev, Revision::working());
    }

    #[test]
    fn test_invalid_revision() {
        assert!(Revision::parse("").is_err());
        assert!(Revision::parse("abc").is_err());
        assert!(Revision::parse("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        assert!(Revision::parse("00").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let ok: Revision = serde_json::from_str("\"0\"").unwrap();
        assert!(ok.is_working());
        assert!(serde_json::from_str::<Revision>("\"nope\"").is_err());
    }
}
