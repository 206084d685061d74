//! Rename/copy records
//!
//! One persisted row per renamed or copied path. A revision with nothing to
//! report for a kind still gets a single row with null source and destination,
//! so "checked, nothing found" stays distinguishable from "never checked".

use crate::revision::Revision;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Mapping from a file's new path to its prior path
pub type RenameMap = BTreeMap<String, String>;

/// Raw rows keyed by revision, in the shape they travel between stores
pub type RawBatch = BTreeMap<Revision, Vec<RawMove>>;

/// Spelling of a null source/destination in raw payloads
pub const NONE_MARKER: &str = "None";

/// Whether a row records a move or a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    /// The source no longer exists after the revision
    Move,
    /// The source is kept alongside the destination
    Copy,
}

impl MoveKind {
    /// Single-character flag stored in the `kind` column
    pub fn as_flag(&self) -> &'static str {
        match self {
            MoveKind::Move => "1",
            MoveKind::Copy => "0",
        }
    }

    /// Decode the stored flag
    pub fn from_flag(flag: &str) -> Result<Self> {
        match flag.trim() {
            "1" => Ok(MoveKind::Move),
            "0" => Ok(MoveKind::Copy),
            other => Err(Error::InvalidKind(format!("unknown stored flag {:?}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Move => "move",
            MoveKind::Copy => "copy",
        }
    }
}

impl FromStr for MoveKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "move" | "mv" | "rename" | "1" => Ok(MoveKind::Move),
            "copy" | "cp" | "0" => Ok(MoveKind::Copy),
            _ => Err(Error::InvalidKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for MoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single row of the `moves` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub repo_id: String,
    pub revision: Revision,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub kind: MoveKind,
}

impl MoveRecord {
    /// Rows for one revision's rename map; an empty map yields the null marker
    pub fn from_map(repo_id: &str, revision: &Revision, map: &RenameMap, kind: MoveKind) -> Vec<Self> {
        if map.is_empty() {
            return vec![Self::marker(repo_id, revision, kind)];
        }
        map.iter()
            .map(|(dst, src)| Self {
                repo_id: repo_id.to_string(),
                revision: revision.clone(),
                source: Some(src.clone()),
                destination: Some(dst.clone()),
                kind,
            })
            .collect()
    }

    /// The "nothing to report" row
    pub fn marker(repo_id: &str, revision: &Revision, kind: MoveKind) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            revision: revision.clone(),
            source: None,
            destination: None,
            kind,
        }
    }

    /// Build a row from its transport form, normalizing `("None", "None")` to nulls
    pub fn from_raw(repo_id: &str, revision: &Revision, raw: &RawMove) -> Self {
        let (source, destination) = if raw.is_marker() {
            (None, None)
        } else {
            (Some(raw.source.clone()), Some(raw.destination.clone()))
        };
        Self {
            repo_id: repo_id.to_string(),
            revision: revision.clone(),
            source,
            destination,
            kind: raw.kind,
        }
    }

    /// Whether this row is a null marker
    pub fn is_marker(&self) -> bool {
        self.source.is_none() && self.destination.is_none()
    }

    /// Column values in table order
    pub(crate) fn params(&self) -> [Option<&str>; 5] {
        [
            Some(self.repo_id.as_str()),
            Some(self.revision.as_str()),
            self.source.as_deref(),
            self.destination.as_deref(),
            Some(self.kind.as_flag()),
        ]
    }
}

/// Transport form of a row: `(source, destination, kind)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawMove {
    pub source: String,
    pub destination: String,
    pub kind: MoveKind,
}

impl RawMove {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, kind: MoveKind) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            kind,
        }
    }

    /// The null marker in transport form
    pub fn marker(kind: MoveKind) -> Self {
        Self::new(NONE_MARKER, NONE_MARKER, kind)
    }

    pub fn is_marker(&self) -> bool {
        self.source == NONE_MARKER && self.destination == NONE_MARKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev() -> Revision {
        Revision::parse("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1").unwrap()
    }

    #[test]
    fn test_kind_flags() {
        assert_eq!(MoveKind::Move.as_flag(), "1");
        assert_eq!(MoveKind::Copy.as_flag(), "0");
        assert_eq!(MoveKind::from_flag("1").unwrap(), MoveKind::Move);
        assert_eq!(MoveKind::from_flag("0").unwrap(), MoveKind::Copy);
        assert!(MoveKind::from_flag("2").is_err());
        assert_eq!("cp".parse::<MoveKind>().unwrap(), MoveKind::Copy);
    }

    #[test]
    fn test_empty_map_is_marker() {
        let rows = MoveRecord::from_map("/repo", &rev(), &RenameMap::new(), MoveKind::Move);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_marker());
        assert_eq!(rows[0].params()[4], Some("1"));
    }

    #[test]
    fn test_map_rows() {
        let mut map = RenameMap::new();
        map.insert("b.txt".to_string(), "a.txt".to_string());
        map.insert("d.txt".to_string(), "c.txt".to_string());
        let rows = MoveRecord::from_map("/repo", &rev(), &map, MoveKind::Copy);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source.as_deref(), Some("a.txt"));
        assert_eq!(rows[0].destination.as_deref(), Some("b.txt"));
        assert_eq!(rows[0].kind, MoveKind::Copy);
    }

    #[test]
    fn test_raw_marker_normalized() {
        let row = MoveRecord::from_raw("/repo", &rev(), &RawMove::marker(MoveKind::Copy));
        assert!(row.is_marker());
        let row = MoveRecord::from_raw("/repo", &rev(), &RawMove::new("a", "b", MoveKind::Move));
        assert_eq!(row.source.as_deref(), Some("a"));
    }
}
