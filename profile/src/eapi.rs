//! EAPI handling for profiles
//!
//! A profile's `eapi` file decides which of its files and which atom
//! syntax are legal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Features gated by EAPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapiOptions {
    /// `:slot` in atoms
    pub slot_deps: bool,
    /// `[flag]` in atoms
    pub use_deps: bool,
    /// `:slot/subslot` in atoms
    pub subslots: bool,
    /// `use.stable.*` and `package.use.stable.*`
    pub profile_stable_use: bool,
    /// `package.provided`
    pub profile_pkg_provided: bool,
}

/// A supported EAPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Eapi(u8);

impl Eapi {
    /// Newest EAPI understood
    pub const LATEST: u8 = 8;

    /// Parse an EAPI token
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().parse::<u8>() {
            Ok(n) if n <= Self::LATEST => Ok(Self(n)),
            _ => Err(Error::UnsupportedEapi(s.trim().to_string())),
        }
    }

    /// The EAPI number
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Feature switches for this EAPI
    pub fn options(&self) -> EapiOptions {
        EapiOptions {
            slot_deps: self.0 >= 1,
            use_deps: self.0 >= 2,
            subslots: self.0 >= 5,
            profile_stable_use: self.0 >= 5,
            profile_pkg_provided: self.0 < 7,
        }
    }
}

impl Default for Eapi {
    fn default() -> Self {
        Self(0)
    }
}

impl FromStr for Eapi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Eapi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_eapi() {
        assert_eq!(Eapi::parse("5").unwrap().number(), 5);
        assert_eq!(Eapi::parse(" 0\n").unwrap(), Eapi::default());
        assert!(Eapi::parse("9").is_err());
        assert!(Eapi::parse("5-progress").is_err());
    }

    #[test]
    fn test_options() {
        assert!(!Eapi::parse("4").unwrap().options().profile_stable_use);
        assert!(Eapi::parse("5").unwrap().options().profile_stable_use);
        assert!(Eapi::parse("6").unwrap().options().profile_pkg_provided);
        assert!(!Eapi::parse("7").unwrap().options().profile_pkg_provided);
        assert!(!Eapi::parse("1").unwrap().options().use_deps);
    }
}
