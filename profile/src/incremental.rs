//! Incremental token expansion
//!
//! Settings such as USE, ACCEPT_KEYWORDS and the profile use.* files are
//! lists of tokens folded left to right: `flag` asserts, `-flag` negates and
//! `-*` clears everything seen so far.

use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A working set of resolved names.
///
/// In non-finalized mode it may also hold literal `-name` markers.
pub type WorkingSet = BTreeSet<String>;

/// A single incremental token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// `name`
    Assert(String),
    /// `-name`
    Negate(String),
    /// `-*`
    ClearAll,
    /// `@group`
    GroupAssert(String),
    /// `-@group`
    GroupNegate(String),
}

impl Token {
    /// Parse a token string
    pub fn parse(s: &str) -> Result<Self> {
        let token = match s.strip_prefix('-') {
            Some("*") => Token::ClearAll,
            Some(rest) => match rest.strip_prefix('@') {
                Some(group) => Token::GroupNegate(group.to_string()),
                None => Token::Negate(rest.to_string()),
            },
            None => match s.strip_prefix('@') {
                Some(group) => Token::GroupAssert(group.to_string()),
                None => Token::Assert(s.to_string()),
            },
        };
        match token.name() {
            Some("") => Err(Error::MalformedToken(format!(
                "incomplete token {:?}: sigil without a name",
                s
            ))),
            _ => Ok(token),
        }
    }

    /// Parse a whitespace separated token list
    pub fn parse_all<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Result<Vec<Self>> {
        tokens.into_iter().map(Self::parse).collect()
    }

    /// The name this token refers to, `None` for `-*`
    pub fn name(&self) -> Option<&str> {
        match self {
            Token::Assert(n) | Token::Negate(n) | Token::GroupAssert(n) | Token::GroupNegate(n) => {
                Some(n)
            }
            Token::ClearAll => None,
        }
    }

    /// Whether the token removes rather than adds
    pub fn is_negation(&self) -> bool {
        matches!(self, Token::Negate(_) | Token::GroupNegate(_) | Token::ClearAll)
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Assert(n) => write!(f, "{}", n),
            Token::Negate(n) => write!(f, "-{}", n),
            Token::ClearAll => write!(f, "-*"),
            Token::GroupAssert(n) => write!(f, "@{}", n),
            Token::GroupNegate(n) => write!(f, "-@{}", n),
        }
    }
}

/// Fold tokens into `set`.
///
/// Asserting `n` always drops a `-n` marker. When `finalize` is false a
/// negation leaves a literal `-n` marker behind for later layers. Group
/// tokens are treated as plain names here; license expansion handles them
/// in [`crate::license::expand_licenses`].
pub fn expand_incrementals<'a>(
    tokens: impl IntoIterator<Item = &'a Token>,
    set: &mut WorkingSet,
    finalize: bool,
) {
    for token in tokens {
        match token {
            Token::ClearAll => set.clear(),
            Token::Assert(name) => assert_name(set, name),
            Token::GroupAssert(group) => assert_name(set, &format!("@{}", group)),
            Token::Negate(name) => negate_name(set, name, finalize),
            Token::GroupNegate(group) => negate_name(set, &format!("@{}", group), finalize),
        }
    }
}

pub(crate) fn assert_name(set: &mut WorkingSet, name: &str) {
    set.remove(&format!("-{}", name));
    set.insert(name.to_string());
}

pub(crate) fn negate_name(set: &mut WorkingSet, name: &str, finalize: bool) {
    set.remove(name);
    if !finalize {
        set.insert(format!("-{}", name));
    }
}

/// Parse and fold raw token strings onto an empty set
pub fn render_incrementals<'a>(
    tokens: impl IntoIterator<Item = &'a str>,
    finalize: bool,
) -> Result<WorkingSet> {
    let tokens = Token::parse_all(tokens)?;
    let mut set = WorkingSet::new();
    expand_incrementals(&tokens, &mut set, finalize);
    Ok(set)
}

/// Drop tokens whose effect is overridden later in the sequence.
///
/// Walks right to left keeping only the last token per name and stops at the
/// last `-*`. The result keeps forward order and expands to the same set.
pub fn optimize_incrementals(tokens: &[Token]) -> Vec<Token> {
    let mut seen = BTreeSet::new();
    let mut kept = Vec::new();
    for token in tokens.iter().rev() {
        match token.name() {
            None => {
                kept.push(token.clone());
                break;
            }
            Some(name) => {
                let key = (matches!(token, Token::GroupAssert(_) | Token::GroupNegate(_)), name);
                if seen.insert(key) {
                    kept.push(token.clone());
                }
            }
        }
    }
    kept.reverse();
    kept
}

/// Split tokens into negated and asserted names.
///
/// A `-*` shows up as `*` in the negated set.
pub fn split_negations(tokens: &[Token]) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut neg = BTreeSet::new();
    let mut pos = BTreeSet::new();
    for token in tokens {
        match token {
            Token::ClearAll => {
                neg.insert("*".to_string());
            }
            Token::Negate(n) => {
                neg.insert(n.clone());
            }
            Token::GroupNegate(n) => {
                neg.insert(format!("@{}", n));
            }
            Token::Assert(n) => {
                pos.insert(n.clone());
            }
            Token::GroupAssert(n) => {
                pos.insert(format!("@{}", n));
            }
        }
    }
    (neg, pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &[&str]) -> Vec<Token> {
        Token::parse_all(s.iter().copied()).unwrap()
    }

    fn set(s: &[&str]) -> WorkingSet {
        s.iter().map(|x| x.to_string()).collect()
    }

    fn expand(tokens: &[&str], start: &[&str], finalize: bool) -> WorkingSet {
        let mut s = set(start);
        expand_incrementals(&toks(tokens), &mut s, finalize);
        s
    }

    #[test]
    fn test_token_parse() {
        assert_eq!(Token::parse("-*").unwrap(), Token::ClearAll);
        assert_eq!(Token::parse("-x").unwrap(), Token::Negate("x".into()));
        assert_eq!(Token::parse("@FREE").unwrap(), Token::GroupAssert("FREE".into()));
        assert_eq!(Token::parse("-@FREE").unwrap(), Token::GroupNegate("FREE".into()));
        assert_eq!(Token::parse("x").unwrap(), Token::Assert("x".into()));
    }

    #[test]
    fn test_malformed_tokens() {
        for bad in ["-", "@", "-@", ""] {
            assert!(
                matches!(Token::parse(bad), Err(Error::MalformedToken(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_clear_all_is_absorbing() {
        assert_eq!(expand(&["x", "-*"], &["a", "b"], true), expand(&["-*"], &[], true));
        assert!(expand(&["x", "-*"], &["a"], false).is_empty());
    }

    #[test]
    fn test_negation_round_trip() {
        assert!(expand(&["-n"], &["n"], true).is_empty());
        assert_eq!(expand(&["n"], &[], true), set(&["n"]));
    }

    #[test]
    fn test_order_sensitivity() {
        assert_eq!(
            expand(&["-a", "b", "-b", "-b", "c"], &["a", "b"], true),
            set(&["c"])
        );
    }

    #[test]
    fn test_non_finalized_carry_over() {
        assert_eq!(
            expand(&["-a", "b", "-b", "c", "c"], &["a", "b"], false),
            set(&["-a", "-b", "c"])
        );
    }

    #[test]
    fn test_assert_strips_marker() {
        assert_eq!(expand(&["-a", "a"], &[], false), set(&["a"]));
        assert_eq!(expand(&["a"], &["-a"], true), set(&["a"]));
    }

    #[test]
    fn test_finalized_sets_have_no_markers() {
        let s = expand(&["-a", "-b", "c", "-d"], &["a"], true);
        assert!(s.iter().all(|x| !x.starts_with('-')));
    }

    #[test]
    fn test_optimize_incrementals() {
        let tokens = toks(&["a", "-b", "-*", "c", "-c", "d", "c"]);
        let optimized = optimize_incrementals(&tokens);
        assert_eq!(optimized, toks(&["-*", "d", "c"]));

        for start in [set(&[]), set(&["a", "b", "c", "z"])] {
            let mut original = start.clone();
            let mut compacted = start;
            expand_incrementals(&tokens, &mut original, true);
            expand_incrementals(&optimized, &mut compacted, true);
            assert_eq!(original, compacted);
        }
    }

    #[test]
    fn test_optimize_keeps_last_polarity() {
        let tokens = toks(&["x", "y", "-x"]);
        assert_eq!(optimize_incrementals(&tokens), toks(&["y", "-x"]));
    }

    #[test]
    fn test_split_negations() {
        let (neg, pos) = split_negations(&toks(&["-*", "a", "-b"]));
        assert_eq!(neg, set(&["*", "b"]));
        assert_eq!(pos, set(&["a"]));
    }
}
