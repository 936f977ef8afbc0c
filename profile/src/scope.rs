//! Restriction scopes for override entries
//!
//! Every override line applies under a scope. Plain atoms are bucketed by
//! their `category/name` key; extended atoms such as `*/*`, `dev-*/*` or
//! `*/vim` become freeform restrictions matched against every package.

use crate::{Error, Package, PackageAtom, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category/name predicate with `*` globs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRestriction {
    /// Category pattern
    pub category: String,
    /// Package name pattern
    pub name: String,
}

impl PackageRestriction {
    /// Build a restriction, validating both patterns
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let restriction = Self {
            category: category.into(),
            name: name.into(),
        };
        for part in [&restriction.category, &restriction.name] {
            Pattern::new(part).map_err(|e| Error::InvalidAtom(format!("{}: {}", part, e)))?;
        }
        Ok(restriction)
    }

    /// Check a package against the patterns
    pub fn matches(&self, pkg: &Package) -> bool {
        glob_match(&self.category, &pkg.category) && glob_match(&self.name, &pkg.name)
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    Pattern::new(pattern)
        .map(|p| p.matches(text))
        .unwrap_or(false)
}

/// The predicate a set of tokens applies under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Matches every package (`true`) or none (`false`)
    Always(bool),
    /// Freeform category/name restriction
    CategoryPackage(PackageRestriction),
    /// A package atom, bucketed by its key
    Atom(PackageAtom),
    /// Restriction to packages from one repository
    Repository(String),
}

impl Scope {
    /// The global scope
    pub const GLOBAL: Scope = Scope::Always(true);

    /// Parse a configuration-file atom, accepting extended wildcards
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*/*" {
            return Ok(Scope::GLOBAL);
        }
        if let Some(repo) = s.strip_prefix("*/*::") {
            return Ok(Scope::Repository(repo.to_string()));
        }
        if let Some((category, name)) = s.split_once('/') {
            let plain = |c: char| c.is_ascii_alphanumeric() || "+_.-*".contains(c);
            if (category.contains('*') || name.contains('*'))
                && category.chars().all(plain)
                && name.chars().all(plain)
            {
                return Ok(Scope::CategoryPackage(PackageRestriction::new(category, name)?));
            }
        }
        Ok(Scope::Atom(s.parse()?))
    }

    /// Check whether a package falls under this scope
    pub fn matches(&self, pkg: &Package) -> bool {
        match self {
            Scope::Always(value) => *value,
            Scope::CategoryPackage(restriction) => restriction.matches(pkg),
            Scope::Atom(atom) => atom.matches(pkg),
            Scope::Repository(repo) => pkg.repository.as_deref() == Some(repo.as_str()),
        }
    }

    /// Key used for bucketing, only atoms have one
    pub fn key(&self) -> Option<String> {
        match self {
            Scope::Atom(atom) => Some(atom.key()),
            _ => None,
        }
    }

    /// Matches everything within its bucket without further conditions
    pub fn is_unconditional(&self) -> bool {
        match self {
            Scope::Always(value) => *value,
            Scope::Atom(atom) => atom.is_simple(),
            _ => false,
        }
    }
}

impl From<PackageAtom> for Scope {
    fn from(atom: PackageAtom) -> Self {
        Scope::Atom(atom)
    }
}

impl FromStr for Scope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Always(true) => write!(f, "*/*"),
            Scope::Always(false) => write!(f, "!*/*"),
            Scope::CategoryPackage(r) => write!(f, "{}/{}", r.category, r.name),
            Scope::Atom(atom) => write!(f, "{}", atom),
            Scope::Repository(repo) => write!(f, "*/*::{}", repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(cpv: &str) -> Package {
        Package::parse_cpv(cpv).unwrap()
    }

    #[test]
    fn test_parse_scopes() {
        assert_eq!(Scope::parse("*/*").unwrap(), Scope::GLOBAL);
        assert!(matches!(
            Scope::parse("dev-*/*").unwrap(),
            Scope::CategoryPackage(_)
        ));
        assert!(matches!(Scope::parse("*/vim").unwrap(), Scope::CategoryPackage(_)));
        assert!(matches!(Scope::parse(">=app-editors/vim-9").unwrap(), Scope::Atom(_)));
        assert!(matches!(Scope::parse("*/*::gentoo").unwrap(), Scope::Repository(_)));
        assert!(Scope::parse("vim").is_err());
    }

    #[test]
    fn test_freeform_matching() {
        let scope = Scope::parse("dev-*/*").unwrap();
        assert!(scope.matches(&pkg("dev-util/foo-1")));
        assert!(!scope.matches(&pkg("app-misc/foo-1")));

        let scope = Scope::parse("*/foo").unwrap();
        assert!(scope.matches(&pkg("app-misc/foo-1")));
        assert!(!scope.matches(&pkg("app-misc/bar-1")));
    }

    #[test]
    fn test_unconditional() {
        assert!(Scope::GLOBAL.is_unconditional());
        assert!(Scope::parse("dev-util/foo").unwrap().is_unconditional());
        assert!(!Scope::parse(">=dev-util/foo-1").unwrap().is_unconditional());
        assert!(!Scope::Always(false).is_unconditional());
    }
}
