//! Package version parsing and ordering
//!
//! Versions follow the Gentoo layout:
//! - numeric components separated by dots (`1.2.3`)
//! - an optional trailing letter (`1.2b`)
//! - any number of suffixes (`_alpha`, `_beta`, `_pre`, `_rc`, `_p`), each
//!   with an optional number
//! - an optional revision (`-r2`)

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d+)((?:\.\d+)*)([a-z]?)((?:_(?:alpha|beta|pre|rc|p)\d*)*)(?:-r(\d+))?$",
        )
        .expect("static version regex")
    })
}

/// Version suffix kinds, in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl Suffix {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "alpha" => Some(Self::Alpha),
            "beta" => Some(Self::Beta),
            "pre" => Some(Self::Pre),
            "rc" => Some(Self::Rc),
            "p" => Some(Self::P),
            _ => None,
        }
    }
}

/// A dotted component after the first one.
///
/// Components with a leading zero compare as strings with trailing zeros
/// stripped, everything else compares numerically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Component {
    Int(u64),
    Str(String),
}

impl Component {
    fn parse(s: &str) -> Result<Self> {
        if s.starts_with('0') {
            Ok(Self::Str(s.trim_end_matches('0').to_string()))
        } else {
            s.parse()
                .map(Self::Int)
                .map_err(|_| Error::InvalidVersion(s.to_string()))
        }
    }

    fn as_stripped(&self) -> String {
        match self {
            Self::Int(n) => n.to_string().trim_end_matches('0').to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            _ => self.as_stripped().cmp(&other.as_stripped()),
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed package version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    first: u64,
    components: Vec<Component>,
    letter: Option<char>,
    suffixes: Vec<(Suffix, u64)>,
    revision: u64,
}

impl Version {
    /// Parse a version string such as `1.2.3_rc1-r2`
    pub fn parse(s: &str) -> Result<Self> {
        let caps = version_regex()
            .captures(s)
            .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;

        let first = caps[1]
            .parse()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;

        let components = caps[2]
            .split('.')
            .filter(|c| !c.is_empty())
            .map(Component::parse)
            .collect::<Result<Vec<_>>>()?;

        let letter = caps[3].chars().next();

        let mut suffixes = Vec::new();
        for part in caps[4].split('_').filter(|p| !p.is_empty()) {
            let split = part
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(part.len());
            let kind = Suffix::parse(&part[..split])
                .ok_or_else(|| Error::InvalidVersion(s.to_string()))?;
            let num = if split == part.len() {
                0
            } else {
                part[split..]
                    .parse()
                    .map_err(|_| Error::InvalidVersion(s.to_string()))?
            };
            suffixes.push((kind, num));
        }

        let revision = match caps.get(5) {
            Some(rev) => rev
                .as_str()
                .parse()
                .map_err(|_| Error::InvalidVersion(s.to_string()))?,
            None => 0,
        };

        Ok(Self {
            raw: s.to_string(),
            first,
            components,
            letter,
            suffixes,
            revision,
        })
    }

    /// The version as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Revision number (`-rN`), zero when absent
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Compare ignoring the revision, as the `~` operator does
    pub fn cmp_base(&self, other: &Self) -> Ordering {
        self.first
            .cmp(&other.first)
            .then_with(|| cmp_components(&self.components, &other.components))
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| cmp_suffixes(&self.suffixes, &other.suffixes))
    }

    /// Prefix match used by `=cat/pkg-1.2*`; a trailing number in the
    /// prefix must end at a component boundary, so `1*` matches `1.2` but
    /// not `10`
    pub fn starts_with(&self, prefix: &str) -> bool {
        match self.raw.strip_prefix(prefix) {
            Some(rest) => {
                !prefix.ends_with(|c: char| c.is_ascii_digit())
                    || !rest.starts_with(|c: char| c.is_ascii_digit())
            }
            None => false,
        }
    }
}

fn cmp_components(a: &[Component], b: &[Component]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

fn cmp_suffixes(a: &[(Suffix, u64)], b: &[(Suffix, u64)]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    // An extra `_p` sorts after the bare version, any other extra suffix before.
    match a.len().cmp(&b.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => match a[b.len()].0 {
            Suffix::P => Ordering::Greater,
            _ => Ordering::Less,
        },
        Ordering::Less => match b[a.len()].0 {
            Suffix::P => Ordering::Less,
            _ => Ordering::Greater,
        },
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_base(other)
            .then_with(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.first.hash(state);
        self.components.hash(state);
        self.letter.hash(state);
        self.suffixes.hash(state);
        self.revision.hash(state);
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
