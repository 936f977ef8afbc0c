//! Candidate packages
//!
//! A [`Package`] is an already-identified package version being evaluated
//! against the resolved configuration: its CPV plus the metadata the
//! visibility and USE computations look at.

use crate::{Error, Result, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A concrete package version with its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package category (e.g., "sys-apps")
    pub category: String,
    /// Package name (e.g., "systemd")
    pub name: String,
    /// Package version
    pub version: Version,
    /// Slot, "0" unless the package says otherwise
    pub slot: String,
    /// Sub-slot, defaults to the slot
    pub subslot: Option<String>,
    /// Repository the package comes from
    pub repository: Option<String>,
    /// KEYWORDS declared by the package
    pub keywords: Vec<String>,
    /// Licenses the package requires
    pub licenses: Vec<String>,
    /// IUSE, including `+`/`-` default markers
    pub iuse: Vec<String>,
    /// Flags the package is configured with, for USE-dependency matching
    pub use_flags: BTreeSet<String>,
}

impl Package {
    /// Create a package from its parts
    pub fn new(category: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            version,
            slot: "0".to_string(),
            subslot: None,
            repository: None,
            keywords: Vec::new(),
            licenses: Vec::new(),
            iuse: Vec::new(),
            use_flags: BTreeSet::new(),
        }
    }

    /// Parse a `category/name-version` string
    pub fn parse_cpv(s: &str) -> Result<Self> {
        let s = s.trim();
        let (category, rest) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidAtom(format!("missing category: {}", s)))?;
        let (name, version) = split_name_version(rest)
            .ok_or_else(|| Error::InvalidAtom(format!("missing version: {}", s)))?;
        if category.is_empty() || name.is_empty() {
            return Err(Error::InvalidAtom(format!("invalid cpv: {}", s)));
        }
        Ok(Self::new(category, name, version.parse()?))
    }

    /// Set the slot
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    /// Set the sub-slot
    pub fn with_subslot(mut self, subslot: impl Into<String>) -> Self {
        self.subslot = Some(subslot.into());
        self
    }

    /// Set the repository
    pub fn with_repository(mut self, repo: impl Into<String>) -> Self {
        self.repository = Some(repo.into());
        self
    }

    /// Set KEYWORDS from a whitespace separated string
    pub fn with_keywords(mut self, keywords: &str) -> Self {
        self.keywords = keywords.split_whitespace().map(String::from).collect();
        self
    }

    /// Set the required licenses from a whitespace separated string
    pub fn with_licenses(mut self, licenses: &str) -> Self {
        self.licenses = licenses.split_whitespace().map(String::from).collect();
        self
    }

    /// Set IUSE from a whitespace separated string
    pub fn with_iuse(mut self, iuse: &str) -> Self {
        self.iuse = iuse.split_whitespace().map(String::from).collect();
        self
    }

    /// Set the flags used for USE-dependency matching
    pub fn with_use(mut self, flags: &[&str]) -> Self {
        self.use_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    /// The unversioned `category/name` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Sub-slot, falling back to the slot
    pub fn effective_subslot(&self) -> &str {
        self.subslot.as_deref().unwrap_or(&self.slot)
    }

    /// IUSE flag names without default markers
    pub fn iuse_names(&self) -> BTreeSet<String> {
        self.iuse
            .iter()
            .map(|f| f.trim_start_matches(['+', '-']).to_string())
            .collect()
    }

    /// Flags the package enables by default (`+flag` in IUSE)
    pub fn iuse_defaults(&self) -> BTreeSet<String> {
        self.iuse
            .iter()
            .filter_map(|f| f.strip_prefix('+'))
            .map(String::from)
            .collect()
    }
}

/// Split `name-version` at the last `-` that starts a valid version
pub(crate) fn split_name_version(s: &str) -> Option<(&str, &str)> {
    s.match_indices('-')
        .map(|(idx, _)| idx)
        .filter(|&idx| {
            s[idx + 1..]
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        })
        .find(|&idx| Version::parse(&s[idx + 1..]).is_ok())
        .map(|idx| (&s[..idx], &s[idx + 1..]))
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.category, self.name, self.version)?;
        if self.slot != "0" {
            write!(f, ":{}", self.slot)?;
        }
        if let Some(ref repo) = self.repository {
            write!(f, "::{}", repo)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpv() {
        let pkg = Package::parse_cpv("dev-util/foo-bar-1.2-r1").unwrap();
        assert_eq!(pkg.category, "dev-util");
        assert_eq!(pkg.name, "foo-bar");
        assert_eq!(pkg.version.as_str(), "1.2-r1");
        assert_eq!(pkg.key(), "dev-util/foo-bar");
    }

    #[test]
    fn test_parse_cpv_name_with_digits() {
        let pkg = Package::parse_cpv("media-libs/libfoo-2-3.0").unwrap();
        assert_eq!(pkg.name, "libfoo-2");
        assert_eq!(pkg.version.as_str(), "3.0");
    }

    #[test]
    fn test_parse_cpv_requires_version() {
        assert!(Package::parse_cpv("dev-util/foo").is_err());
        assert!(Package::parse_cpv("foo-1.0").is_err());
    }

    #[test]
    fn test_iuse_defaults() {
        let pkg = Package::parse_cpv("app-misc/foo-1")
            .unwrap()
            .with_iuse("+ssl -doc gtk");
        assert_eq!(pkg.iuse_defaults().into_iter().collect::<Vec<_>>(), vec!["ssl"]);
        assert_eq!(pkg.iuse_names().len(), 3);
    }
}
