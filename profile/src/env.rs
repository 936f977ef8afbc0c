//! Profile environment (make.defaults)
//!
//! make.defaults files are restricted shell: `VAR="value"` assignments with
//! quoting, backslash line continuation and `$VAR` / `${VAR}` expansion.
//! Assignments are kept unexpanded per profile node and rendered while the
//! stack folds, so expansion sees everything set by earlier profiles.

use crate::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Variables whose values accumulate across profiles instead of overriding
pub const INCREMENTALS: &[&str] = &[
    "USE",
    "USE_EXPAND",
    "USE_EXPAND_HIDDEN",
    "USE_EXPAND_IMPLICIT",
    "USE_EXPAND_UNPREFIXED",
    "IUSE_IMPLICIT",
    "ACCEPT_KEYWORDS",
    "ACCEPT_LICENSE",
    "CONFIG_PROTECT",
    "CONFIG_PROTECT_MASK",
    "FEATURES",
    "ENV_UNSET",
    "PROFILE_ONLY_VARIABLES",
];

/// Check whether a variable accumulates across profiles
pub fn is_incremental(name: &str) -> bool {
    INCREMENTALS.contains(&name)
}

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static variable regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Single-quoted text, never expanded
    Literal(String),
    /// Unquoted or double-quoted text
    Expandable(String),
}

/// One `NAME=value` line of a make.defaults file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Variable name
    pub name: String,
    segments: Vec<Segment>,
}

impl Assignment {
    /// Render the value, expanding variables against `env`
    pub fn render(&self, env: &DefaultEnv) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expandable(text) => {
                    let expanded = var_regex().replace_all(text, |caps: &regex::Captures<'_>| {
                        let name = caps
                            .get(1)
                            .or_else(|| caps.get(2))
                            .map(|m| m.as_str())
                            .unwrap_or_default();
                        env.value(name).unwrap_or_default()
                    });
                    out.push_str(&expanded);
                }
            }
        }
        out
    }

    /// The value as written, without expansion
    pub fn raw(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) | Segment::Expandable(text) => text.as_str(),
            })
            .collect()
    }
}

/// Parse make.defaults content into ordered assignments
pub fn parse_make_defaults(content: &str) -> Result<Vec<Assignment>> {
    let mut assignments = Vec::new();
    let mut chars = content.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek() {
            None => break,
            Some('#') => {
                while chars.next_if(|c| *c != '\n').is_some() {}
                continue;
            }
            Some(_) => {}
        }

        let mut name = read_name(&mut chars);
        if name == "export" {
            while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}
            name = read_name(&mut chars);
        }
        if name.is_empty() || chars.next() != Some('=') {
            return Err(Error::Invalid(format!(
                "expected NAME=value assignment near {:?}",
                name
            )));
        }

        let segments = read_value(&mut chars, &name)?;
        assignments.push(Assignment { name, segments });
    }

    Ok(assignments)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn read_name(chars: &mut Chars<'_>) -> String {
    let mut name = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_alphanumeric() || *c == '_') {
        name.push(c);
    }
    name
}

fn read_value(chars: &mut Chars<'_>, name: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = String::new();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => break,
            '\\' => {
                chars.next();
                match chars.next() {
                    Some('\n') | None => {}
                    Some(escaped) => current.push(escaped),
                }
            }
            '\'' => {
                chars.next();
                if !current.is_empty() {
                    segments.push(Segment::Expandable(std::mem::take(&mut current)));
                }
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => literal.push(c),
                        None => return Err(unterminated(name)),
                    }
                }
                segments.push(Segment::Literal(literal));
            }
            '"' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('\n') => {}
                            Some(escaped @ ('"' | '\\' | '$')) => {
                                // keep an escaped `$` out of expansion
                                if escaped == '$' {
                                    segments.push(Segment::Expandable(std::mem::take(&mut current)));
                                    segments.push(Segment::Literal("$".to_string()));
                                } else {
                                    current.push(escaped);
                                }
                            }
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(unterminated(name)),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unterminated(name)),
                    }
                }
            }
            _ => {
                chars.next();
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        segments.push(Segment::Expandable(current));
    }
    Ok(segments)
}

fn unterminated(name: &str) -> Error {
    Error::Invalid(format!("unterminated quote in value of {}", name))
}

/// A folded environment value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// Overriding variable, last assignment wins
    Plain(String),
    /// Incremental variable, tokens concatenated across profiles
    Incremental(Vec<String>),
}

impl EnvValue {
    /// The value as a single string
    pub fn as_string(&self) -> String {
        match self {
            EnvValue::Plain(value) => value.clone(),
            EnvValue::Incremental(tokens) => tokens.join(" "),
        }
    }

    /// Whitespace separated tokens of the value
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            EnvValue::Plain(value) => value.split_whitespace().collect(),
            EnvValue::Incremental(tokens) => tokens.iter().map(String::as_str).collect(),
        }
    }
}

/// Environment folded over a profile stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultEnv {
    vars: IndexMap<String, EnvValue>,
}

impl DefaultEnv {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.vars.get(name)
    }

    /// A variable rendered as a string
    pub fn value(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(EnvValue::as_string)
    }

    /// A variable's tokens, empty when unset
    pub fn tokens(&self, name: &str) -> Vec<&str> {
        self.vars.get(name).map(EnvValue::tokens).unwrap_or_default()
    }

    /// Set a variable: incrementals accumulate, everything else overrides
    pub fn set(&mut self, name: &str, value: &str) {
        if is_incremental(name) {
            let tokens = value.split_whitespace().map(String::from);
            match self.vars.get_mut(name) {
                Some(EnvValue::Incremental(existing)) => existing.extend(tokens),
                _ => {
                    self.vars
                        .insert(name.to_string(), EnvValue::Incremental(tokens.collect()));
                }
            }
        } else {
            self.vars
                .insert(name.to_string(), EnvValue::Plain(value.to_string()));
        }
    }

    /// Apply one profile's assignments in order
    pub fn apply(&mut self, assignments: &[Assignment]) {
        for assignment in assignments {
            let value = assignment.render(self);
            self.set(&assignment.name, &value);
        }
    }

    /// Variables in first-assignment order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no variable is set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
