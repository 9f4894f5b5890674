//! Case identity and inventory records.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CaseIdError;
use crate::sanitize::{escape_control, has_forbidden_chars};

/// Domain reported for cases that sit directly under the root.
pub const UNCATEGORIZED: &str = "Uncategorized";

pub const MAX_ID_LEN: usize = 4096;

/// Root-relative case path, `Domain/Case` or `Case`, always `/`-separated.
///
/// Parsing guarantees one or two plain segments: no absolute prefix, no `.`
/// or `..`, no empty segments, no control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn parse(raw: &str) -> Result<Self, CaseIdError> {
        if raw.is_empty() {
            return Err(CaseIdError::Empty);
        }
        if raw.len() > MAX_ID_LEN {
            return Err(CaseIdError::TooLong {
                len: raw.len(),
                max: MAX_ID_LEN,
            });
        }
        if has_forbidden_chars(raw) {
            return Err(CaseIdError::InvalidCharacters {
                id: escape_control(raw).into_owned(),
            });
        }
        if raw.starts_with('/') || raw.contains('\\') || Path::new(raw).is_absolute() {
            return Err(CaseIdError::Absolute {
                id: raw.to_string(),
            });
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.iter().any(|s| *s == "..") {
            return Err(CaseIdError::ParentSegment {
                id: raw.to_string(),
            });
        }
        if segments.len() > 2 || segments.iter().any(|s| s.is_empty() || *s == ".") {
            return Err(CaseIdError::Malformed {
                id: raw.to_string(),
            });
        }

        Ok(Self(raw.to_string()))
    }

    /// Build the id for a case discovered on disk.
    pub fn from_parts(domain: Option<&str>, name: &str) -> Result<Self, CaseIdError> {
        match domain {
            Some(domain) => Self::parse(&format!("{domain}/{name}")),
            None => Self::parse(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// First segment, or [`UNCATEGORIZED`] for a root-level case.
    pub fn domain(&self) -> &str {
        match self.0.split_once('/') {
            Some((domain, _)) => domain,
            None => UNCATEGORIZED,
        }
    }

    /// The domain directory as it exists on disk, `None` for root-level cases.
    pub fn domain_dir(&self) -> Option<&str> {
        self.0.split_once('/').map(|(domain, _)| domain)
    }

    pub fn to_relative_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CaseId {
    type Err = CaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A case as seen by one inventory pass. The filesystem stays the source of
/// truth; these records are rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Case {
    pub id: CaseId,
    pub name: String,
    pub domain: String,
    /// Canonical absolute directory.
    pub path: PathBuf,
}

impl Case {
    pub fn new(id: CaseId, path: PathBuf) -> Self {
        Self {
            name: id.name().to_string(),
            domain: id.domain().to_string(),
            id,
            path,
        }
    }

    /// Inventory order: domain, then name, then id to break ties.
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (&self.domain, &self.name, self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_domain_and_name() {
        let id = CaseId::parse("Fluid/cavity2d").unwrap();
        assert_eq!(id.domain(), "Fluid");
        assert_eq!(id.name(), "cavity2d");
        assert_eq!(id.domain_dir(), Some("Fluid"));
        assert_eq!(id.to_relative_path(), PathBuf::from("Fluid").join("cavity2d"));
    }

    #[test]
    fn root_level_case_is_uncategorized() {
        let id = CaseId::parse("standalone").unwrap();
        assert_eq!(id.domain(), UNCATEGORIZED);
        assert_eq!(id.name(), "standalone");
        assert_eq!(id.domain_dir(), None);
    }

    #[test]
    fn rejects_escapes() {
        assert!(matches!(
            CaseId::parse("../etc"),
            Err(CaseIdError::ParentSegment { .. })
        ));
        assert!(matches!(
            CaseId::parse("Fluid/.."),
            Err(CaseIdError::ParentSegment { .. })
        ));
        assert!(matches!(
            CaseId::parse("/etc/passwd"),
            Err(CaseIdError::Absolute { .. })
        ));
        assert!(matches!(
            CaseId::parse("a\\b"),
            Err(CaseIdError::Absolute { .. })
        ));
    }

    #[test]
    fn rejects_malformed_shapes() {
        for raw in ["a//b", "a/", "./a", "a/b/c"] {
            assert!(
                matches!(CaseId::parse(raw), Err(CaseIdError::Malformed { .. })),
                "{raw} should be malformed"
            );
        }
        assert_eq!(CaseId::parse(""), Err(CaseIdError::Empty));
    }

    #[test]
    fn rejects_control_characters() {
        assert!(matches!(
            CaseId::parse("Fluid/case\nINJECTED"),
            Err(CaseIdError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn sort_key_orders_by_domain_then_name() {
        let mut cases = vec![
            Case::new(CaseId::parse("b/x").unwrap(), PathBuf::from("/r/b/x")),
            Case::new(CaseId::parse("a/z").unwrap(), PathBuf::from("/r/a/z")),
            Case::new(CaseId::parse("a/y").unwrap(), PathBuf::from("/r/a/y")),
        ];
        cases.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a/y", "a/z", "b/x"]);
    }
}
