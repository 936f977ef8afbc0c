//! License acceptance
//!
//! Implements Gentoo-style ACCEPT_LICENSE handling:
//! - License groups (@FREE, @OSI-APPROVED, etc.) read from `license_groups`
//! - Incremental expansion of accept lists with group references

use crate::incremental::{assert_name, negate_name, Token, WorkingSet};
use crate::reader::read_lines;
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// License group table (`profiles/license_groups`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseGroups {
    /// Group name to its members; members may reference groups with `@`
    pub groups: IndexMap<String, Vec<String>>,
}

impl LicenseGroups {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `GROUP member member @OTHER` lines
    pub fn parse(content: &str) -> Result<Self> {
        let mut groups = IndexMap::new();
        for line in read_lines(content) {
            let mut parts = line.split_whitespace();
            let name = match parts.next() {
                Some(name) => name.to_string(),
                None => continue,
            };
            let members: Vec<String> = parts.map(String::from).collect();
            if members.is_empty() {
                return Err(Error::Invalid(format!("license group {} has no members", name)));
            }
            groups.insert(name, members);
        }
        Ok(Self { groups })
    }

    /// Load a `license_groups` file
    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Add a group
    pub fn insert(&mut self, name: impl Into<String>, members: &[&str]) {
        self.groups
            .insert(name.into(), members.iter().map(|m| m.to_string()).collect());
    }

    /// Resolve a group to plain license names, following nested groups
    pub fn expand(&self, group: &str) -> Result<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        let mut stack = Vec::new();
        self.expand_into(group, &mut out, &mut stack)?;
        Ok(out)
    }

    fn expand_into(
        &self,
        group: &str,
        out: &mut BTreeSet<String>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        if stack.iter().any(|g| g == group) {
            return Err(Error::Invalid(format!(
                "license group cycle: {} -> {}",
                stack.join(" -> "),
                group
            )));
        }
        let members = match self.groups.get(group) {
            Some(members) => members,
            None => {
                warn!("Unknown license group: @{}", group);
                return Ok(());
            }
        };
        stack.push(group.to_string());
        for member in members {
            match member.strip_prefix('@') {
                Some(nested) => self.expand_into(nested, out, stack)?,
                None => {
                    out.insert(member.clone());
                }
            }
        }
        stack.pop();
        Ok(())
    }
}

/// Fold ACCEPT_LICENSE style tokens into `set`, expanding `@group` references
pub fn expand_licenses<'a>(
    tokens: impl IntoIterator<Item = &'a Token>,
    groups: &LicenseGroups,
    set: &mut WorkingSet,
    finalize: bool,
) -> Result<()> {
    for token in tokens {
        match token {
            Token::ClearAll => set.clear(),
            Token::Assert(name) => assert_name(set, name),
            Token::Negate(name) => negate_name(set, name, finalize),
            Token::GroupAssert(group) => {
                for name in groups.expand(group)? {
                    assert_name(set, &name);
                }
            }
            Token::GroupNegate(group) => {
                for name in groups.expand(group)? {
                    negate_name(set, &name, finalize);
                }
            }
        }
    }
    Ok(())
}

/// Replace `@group` tokens with the group's members.
///
/// The result folds with [`crate::incremental::expand_incrementals`] exactly
/// as the input folds with [`expand_licenses`]; group cycles fail here.
pub fn flatten_groups(tokens: &[Token], groups: &LicenseGroups) -> Result<Vec<Token>> {
    let mut flat = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::GroupAssert(group) => {
                flat.extend(groups.expand(group)?.into_iter().map(Token::Assert))
            }
            Token::GroupNegate(group) => {
                flat.extend(groups.expand(group)?.into_iter().map(Token::Negate))
            }
            token => flat.push(token.clone()),
        }
    }
    Ok(flat)
}
