//! Package atom parsing and matching
//!
//! Implements Gentoo-style package atoms like:
//! - `category/package`
//! - `>=category/package-1.0`
//! - `=category/package-1.2*`
//! - `category/package:slot/subslot`
//! - `category/package::repo`
//! - `category/package[use_flag,-other]`

use crate::package::split_name_version;
use crate::{Eapi, Error, Package, Result, Version};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Version comparison operators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionOp {
    /// No version constraint
    #[default]
    Any,
    /// Exact version match (=)
    Equal,
    /// Greater than (>)
    Greater,
    /// Greater than or equal (>=)
    GreaterEqual,
    /// Less than (<)
    Less,
    /// Less than or equal (<=)
    LessEqual,
    /// Version glob match (=*), e.g., =category/package-1.0*
    GlobEqual,
    /// Any revision of the version (~)
    RevisionBump,
}

/// A package atom: a predicate over package versions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageAtom {
    /// Version operator
    pub operator: VersionOp,
    /// Package category (e.g., "sys-apps")
    pub category: String,
    /// Package name (e.g., "systemd")
    pub name: String,
    /// Version constraint (required unless the operator is `Any`)
    pub version: Option<Version>,
    /// Slot specification (optional)
    pub slot: Option<String>,
    /// Sub-slot specification (optional)
    pub subslot: Option<String>,
    /// Repository restriction (optional)
    pub repository: Option<String>,
    /// USE flag requirements
    pub use_deps: Vec<UseDep>,
}

impl PackageAtom {
    /// Create an unversioned atom matching every version of `category/name`
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            operator: VersionOp::Any,
            category: category.into(),
            name: name.into(),
            version: None,
            slot: None,
            subslot: None,
            repository: None,
            use_deps: Vec::new(),
        }
    }

    /// Set the version constraint
    pub fn with_version(mut self, op: VersionOp, version: Version) -> Self {
        self.operator = op;
        self.version = Some(version);
        self
    }

    /// Set the slot
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Add a USE dependency
    pub fn with_use_dep(mut self, dep: UseDep) -> Self {
        self.use_deps.push(dep);
        self
    }

    /// Parse an atom, rejecting syntax the EAPI does not allow
    pub fn parse_with_eapi(s: &str, eapi: &Eapi) -> Result<Self> {
        let atom: Self = s.parse()?;
        if atom.slot.is_some() && !eapi.options().slot_deps {
            return Err(Error::InvalidAtom(format!(
                "slot dependencies are not allowed in EAPI {}: {}",
                eapi, s
            )));
        }
        if atom.subslot.is_some() && !eapi.options().subslots {
            return Err(Error::InvalidAtom(format!(
                "sub-slots are not allowed in EAPI {}: {}",
                eapi, s
            )));
        }
        if !atom.use_deps.is_empty() && !eapi.options().use_deps {
            return Err(Error::InvalidAtom(format!(
                "USE dependencies are not allowed in EAPI {}: {}",
                eapi, s
            )));
        }
        Ok(atom)
    }

    /// The unversioned `category/name` key
    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.name)
    }

    /// Check if this atom names the given category/name
    pub fn matches_key(&self, category: &str, name: &str) -> bool {
        self.category == category && self.name == name
    }

    /// An atom that matches every version of its key unconditionally
    pub fn is_simple(&self) -> bool {
        self.operator == VersionOp::Any
            && self.slot.is_none()
            && self.subslot.is_none()
            && self.repository.is_none()
            && self.use_deps.is_empty()
    }

    /// Check whether a package satisfies this atom
    pub fn matches(&self, pkg: &Package) -> bool {
        if !self.matches_key(&pkg.category, &pkg.name) {
            return false;
        }

        if let Some(ref slot) = self.slot {
            if *slot != pkg.slot {
                return false;
            }
        }
        if let Some(ref subslot) = self.subslot {
            if subslot != pkg.effective_subslot() {
                return false;
            }
        }
        if let Some(ref repo) = self.repository {
            if pkg.repository.as_deref() != Some(repo.as_str()) {
                return false;
            }
        }
        if !self.use_deps.iter().all(|dep| dep.matches(pkg)) {
            return false;
        }

        let version = match self.version {
            Some(ref v) => v,
            None => return true,
        };
        let ord = pkg.version.cmp(version);
        match self.operator {
            VersionOp::Any => true,
            VersionOp::Equal => ord == Ordering::Equal,
            VersionOp::Greater => ord == Ordering::Greater,
            VersionOp::GreaterEqual => ord != Ordering::Less,
            VersionOp::Less => ord == Ordering::Less,
            VersionOp::LessEqual => ord != Ordering::Greater,
            VersionOp::GlobEqual => pkg.version.starts_with(version.as_str()),
            VersionOp::RevisionBump => pkg.version.cmp_base(version) == Ordering::Equal,
        }
    }
}

impl FromStr for PackageAtom {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAtom("empty atom".to_string()));
        }

        let mut remaining = s;

        // Parse operator
        let operator = if let Some(rest) = remaining.strip_prefix(">=") {
            remaining = rest;
            VersionOp::GreaterEqual
        } else if let Some(rest) = remaining.strip_prefix("<=") {
            remaining = rest;
            VersionOp::LessEqual
        } else if let Some(rest) = remaining.strip_prefix('>') {
            remaining = rest;
            VersionOp::Greater
        } else if let Some(rest) = remaining.strip_prefix('<') {
            remaining = rest;
            VersionOp::Less
        } else if let Some(rest) = remaining.strip_prefix('~') {
            remaining = rest;
            VersionOp::RevisionBump
        } else if let Some(rest) = remaining.strip_prefix('=') {
            remaining = rest;
            VersionOp::Equal
        } else {
            VersionOp::Any
        };

        // Extract USE deps [flag1,flag2]
        let mut use_deps = Vec::new();
        if let Some(start) = remaining.find('[') {
            if !remaining.ends_with(']') {
                return Err(Error::InvalidAtom(format!("unclosed USE deps: {}", s)));
            }
            let use_str = &remaining[start + 1..remaining.len() - 1];
            for dep in use_str.split(',') {
                use_deps.push(dep.parse()?);
            }
            remaining = &remaining[..start];
        }

        // Extract repository ::repo
        let mut repository = None;
        if let Some(idx) = remaining.find("::") {
            let repo = &remaining[idx + 2..];
            if repo.is_empty() {
                return Err(Error::InvalidAtom(format!("empty repository: {}", s)));
            }
            repository = Some(repo.to_string());
            remaining = &remaining[..idx];
        }

        // Extract slot :slot/subslot
        let mut slot = None;
        let mut subslot = None;
        if let Some(idx) = remaining.find(':') {
            let slot_str = &remaining[idx + 1..];
            match slot_str.split_once('/') {
                Some((s, sub)) => {
                    slot = Some(s.to_string());
                    subslot = Some(sub.to_string());
                }
                None => slot = Some(slot_str.to_string()),
            }
            if slot.as_deref() == Some("") || subslot.as_deref() == Some("") {
                return Err(Error::InvalidAtom(format!("empty slot: {}", s)));
            }
            remaining = &remaining[..idx];
        }

        // Trailing * turns = into a glob match
        let mut operator = operator;
        if let Some(rest) = remaining.strip_suffix('*') {
            if operator != VersionOp::Equal {
                return Err(Error::InvalidAtom(format!(
                    "version glob requires the = operator: {}",
                    s
                )));
            }
            operator = VersionOp::GlobEqual;
            remaining = rest;
        }

        let (category, name_version) = remaining
            .split_once('/')
            .ok_or_else(|| Error::InvalidAtom(format!("missing category: {}", s)))?;
        if name_version.contains('/') {
            return Err(Error::InvalidAtom(format!("too many '/': {}", s)));
        }

        let (name, version) = if operator == VersionOp::Any {
            (name_version, None)
        } else {
            let (name, version) = split_name_version(name_version)
                .ok_or_else(|| Error::InvalidAtom(format!("missing version: {}", s)))?;
            (name, Some(version.parse::<Version>()?))
        };

        if category.is_empty() || name.is_empty() || category.contains('*') || name.contains('*') {
            return Err(Error::InvalidAtom(format!("invalid atom: {}", s)));
        }

        Ok(PackageAtom {
            operator,
            category: category.to_string(),
            name: name.to_string(),
            version,
            slot,
            subslot,
            repository,
            use_deps,
        })
    }
}

impl fmt::Display for PackageAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            VersionOp::Any => {}
            VersionOp::Equal | VersionOp::GlobEqual => write!(f, "=")?,
            VersionOp::Greater => write!(f, ">")?,
            VersionOp::GreaterEqual => write!(f, ">=")?,
            VersionOp::Less => write!(f, "<")?,
            VersionOp::LessEqual => write!(f, "<=")?,
            VersionOp::RevisionBump => write!(f, "~")?,
        }

        write!(f, "{}/{}", self.category, self.name)?;

        if let Some(ref ver) = self.version {
            write!(f, "-{}", ver)?;
        }

        if self.operator == VersionOp::GlobEqual {
            write!(f, "*")?;
        }

        if let Some(ref slot) = self.slot {
            write!(f, ":{}", slot)?;
            if let Some(ref subslot) = self.subslot {
                write!(f, "/{}", subslot)?;
            }
        }

        if let Some(ref repo) = self.repository {
            write!(f, "::{}", repo)?;
        }

        if !self.use_deps.is_empty() {
            write!(f, "[")?;
            for (i, dep) in self.use_deps.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", dep)?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

/// USE flag dependency in an atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseDep {
    /// The USE flag name
    pub flag: String,
    /// Whether the flag must be enabled (true) or disabled (false)
    pub enabled: bool,
    /// Default value if the package lacks the flag
    pub default: Option<bool>,
}

impl UseDep {
    /// Check the requirement against the package's configured flags
    pub fn matches(&self, pkg: &Package) -> bool {
        let known = pkg.iuse.is_empty() || pkg.iuse_names().contains(&self.flag);
        let state = if known {
            pkg.use_flags.contains(&self.flag)
        } else {
            match self.default {
                Some(default) => default,
                None => return false,
            }
        };
        state == self.enabled
    }
}

impl FromStr for UseDep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAtom("empty USE dep".to_string()));
        }
        if s.ends_with('?') || s.ends_with('=') {
            return Err(Error::InvalidAtom(format!(
                "conditional USE deps are not valid in configuration atoms: {}",
                s
            )));
        }

        let (flag, default) = if let Some(flag) = s.strip_suffix("(+)") {
            (flag, Some(true))
        } else if let Some(flag) = s.strip_suffix("(-)") {
            (flag, Some(false))
        } else {
            (s, None)
        };

        let (flag, enabled) = match flag.strip_prefix('-') {
            Some(flag) => (flag, false),
            None => (flag, true),
        };

        if flag.is_empty() {
            return Err(Error::InvalidAtom(format!("empty USE flag in dep: {}", s)));
        }

        Ok(UseDep {
            flag: flag.to_string(),
            enabled,
            default,
        })
    }
}

impl fmt::Display for UseDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.enabled {
            write!(f, "-")?;
        }
        write!(f, "{}", self.flag)?;
        if let Some(def) = self.default {
            write!(f, "({})", if def { "+" } else { "-" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(cpv: &str) -> Package {
        Package::parse_cpv(cpv).unwrap()
    }

    #[test]
    fn test_parse_simple_atom() {
        let atom: PackageAtom = "sys-apps/systemd".parse().unwrap();
        assert_eq!(atom.category, "sys-apps");
        assert_eq!(atom.name, "systemd");
        assert_eq!(atom.operator, VersionOp::Any);
        assert!(atom.is_simple());
    }

    #[test]
    fn test_parse_versioned_atom() {
        let atom: PackageAtom = ">=sys-apps/systemd-250".parse().unwrap();
        assert_eq!(atom.key(), "sys-apps/systemd");
        assert_eq!(atom.version.as_ref().unwrap().as_str(), "250");
        assert_eq!(atom.operator, VersionOp::GreaterEqual);
        assert!(!atom.is_simple());
    }

    #[test]
    fn test_parse_slotted_atom() {
        let atom: PackageAtom = "dev-lang/python:3.11/3.11-r1".parse().unwrap();
        assert_eq!(atom.name, "python");
        assert_eq!(atom.slot.as_deref(), Some("3.11"));
        assert_eq!(atom.subslot.as_deref(), Some("3.11-r1"));
    }

    #[test]
    fn test_parse_use_deps() {
        let atom: PackageAtom = "sys-apps/systemd[networkd,-resolved]".parse().unwrap();
        assert_eq!(atom.use_deps.len(), 2);
        assert!(atom.use_deps[0].enabled);
        assert!(!atom.use_deps[1].enabled);
    }

    #[test]
    fn test_invalid_atoms() {
        assert!("systemd".parse::<PackageAtom>().is_err());
        assert!(">=sys-apps/systemd".parse::<PackageAtom>().is_err());
        assert!("sys-apps/systemd-1*".parse::<PackageAtom>().is_err());
        assert!("*/systemd".parse::<PackageAtom>().is_err());
        assert!("sys-apps/systemd[".parse::<PackageAtom>().is_err());
    }

    #[test]
    fn test_version_matching() {
        let atom: PackageAtom = ">=dev-util/foo-2".parse().unwrap();
        assert!(atom.matches(&pkg("dev-util/foo-2")));
        assert!(atom.matches(&pkg("dev-util/foo-2.1")));
        assert!(!atom.matches(&pkg("dev-util/foo-1.9")));
        assert!(!atom.matches(&pkg("dev-util/bar-3")));

        let atom: PackageAtom = "~dev-util/foo-2".parse().unwrap();
        assert!(atom.matches(&pkg("dev-util/foo-2-r3")));
        assert!(!atom.matches(&pkg("dev-util/foo-2.1")));

        let atom: PackageAtom = "=dev-util/foo-1.2*".parse().unwrap();
        assert!(atom.matches(&pkg("dev-util/foo-1.2.5")));
        assert!(!atom.matches(&pkg("dev-util/foo-1.3")));
        assert!(!atom.matches(&pkg("dev-util/foo-1.20")));

        let atom: PackageAtom = "=dev-util/foo-1*".parse().unwrap();
        assert!(atom.matches(&pkg("dev-util/foo-1.9")));
        assert!(!atom.matches(&pkg("dev-util/foo-10.0")));
    }

    #[test]
    fn test_slot_and_repo_matching() {
        let atom: PackageAtom = "dev-lang/python:3.12::gentoo".parse().unwrap();
        let p = pkg("dev-lang/python-3.12.1").with_slot("3.12");
        assert!(!atom.matches(&p));
        assert!(atom.matches(&p.clone().with_repository("gentoo")));
        assert!(!atom.matches(&p.with_slot("3.11").with_repository("gentoo")));
    }

    #[test]
    fn test_use_dep_matching() {
        let atom: PackageAtom = "app-misc/foo[ssl,-doc]".parse().unwrap();
        let p = pkg("app-misc/foo-1").with_iuse("ssl doc");
        assert!(atom.matches(&p.clone().with_use(&["ssl"])));
        assert!(!atom.matches(&p.with_use(&["ssl", "doc"])));
    }

    #[test]
    fn test_atom_display() {
        let atom = PackageAtom::new("sys-apps", "systemd")
            .with_version(VersionOp::GreaterEqual, "250".parse().unwrap())
            .with_slot("0");
        assert_eq!(atom.to_string(), ">=sys-apps/systemd-250:0");
    }
}
