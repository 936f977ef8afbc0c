//! Override classification
//!
//! User configuration files (`package.use`, `package.accept_keywords`,
//! `package.license`, ...) are sequences of `(scope, tokens)` lines. They are
//! split into three precedence tiers:
//!
//! 1. global defaults (`*/*` lines and make.conf-style values)
//! 2. freeform category/name restrictions, in file order
//! 3. per-key atom entries, in file order
//!
//! and queried per package.

use crate::incremental::{expand_incrementals, Token, WorkingSet};
use crate::{Error, Package, PackageAtom, PackageRestriction, Result, Scope};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Buckets {
    global: Vec<Token>,
    freeform: Vec<(PackageRestriction, Vec<Token>)>,
    by_key: HashMap<String, Vec<(PackageAtom, Vec<Token>)>>,
}

impl Buckets {
    fn classify<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Scope, Vec<Token>)>,
    {
        let mut buckets = Self::default();
        for (scope, tokens) in entries {
            match scope {
                Scope::Always(true) => buckets.global.extend(tokens),
                Scope::Always(false) => {}
                Scope::CategoryPackage(restriction) => buckets.freeform.push((restriction, tokens)),
                Scope::Atom(atom) => buckets
                    .by_key
                    .entry(atom.key())
                    .or_default()
                    .push((atom, tokens)),
                scope @ Scope::Repository(_) => {
                    return Err(Error::InvalidScope(scope.to_string()));
                }
            }
        }
        Ok(buckets)
    }

    /// Token lists of every matching entry, freeform before per-key
    fn matching<'a>(&'a self, pkg: &'a Package) -> impl Iterator<Item = &'a Token> + 'a {
        let freeform = self
            .freeform
            .iter()
            .filter(move |(restriction, _)| restriction.matches(pkg))
            .flat_map(|(_, tokens)| tokens.iter());
        let specific = self
            .by_key
            .get(&pkg.key())
            .into_iter()
            .flatten()
            .filter(move |(atom, _)| atom.matches(pkg))
            .flat_map(|(_, tokens)| tokens.iter());
        freeform.chain(specific)
    }
}

/// Incremental per-package override lookup
#[derive(Debug, Clone)]
pub struct OverrideClassifier {
    buckets: Buckets,
    defaults: WorkingSet,
    default_tokens: Vec<Token>,
    defaults_finalized: WorkingSet,
}

impl OverrideClassifier {
    /// Classify entries, finalizing the global defaults
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Scope, Vec<Token>)>,
    {
        Self::with_finalize(entries, true)
    }

    /// Classify entries; with `finalize_defaults` false the defaults keep
    /// `-flag` markers for a later layer to observe
    pub fn with_finalize<I>(entries: I, finalize_defaults: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (Scope, Vec<Token>)>,
    {
        let buckets = Buckets::classify(entries)?;

        let mut defaults = WorkingSet::new();
        expand_incrementals(&buckets.global, &mut defaults, finalize_defaults);

        let default_tokens = defaults
            .iter()
            .map(|name| Token::parse(name))
            .collect::<Result<Vec<_>>>()?;
        let defaults_finalized = defaults
            .iter()
            .filter(|name| !name.starts_with('-'))
            .cloned()
            .collect();

        Ok(Self {
            buckets,
            defaults,
            default_tokens,
            defaults_finalized,
        })
    }

    /// Expanded global defaults, possibly with `-flag` markers
    pub fn defaults(&self) -> &WorkingSet {
        &self.defaults
    }

    /// Global defaults without markers
    pub fn defaults_finalized(&self) -> &WorkingSet {
        &self.defaults_finalized
    }

    /// Global tokens as written, before expansion
    pub fn global_tokens(&self) -> &[Token] {
        &self.buckets.global
    }

    /// Tokens of every entry matching a package, lowest precedence first
    pub fn matching_tokens<'a>(&'a self, pkg: &'a Package) -> impl Iterator<Item = &'a Token> + 'a {
        self.buckets.matching(pkg)
    }

    /// Effective values for a package
    pub fn pull_data(&self, pkg: &Package) -> WorkingSet {
        self.pull_data_with(pkg, &WorkingSet::new())
    }

    /// Effective values for a package, layered over `pre_defaults`
    pub fn pull_data_with(&self, pkg: &Package, pre_defaults: &WorkingSet) -> WorkingSet {
        let mut set = if pre_defaults.is_empty() {
            self.defaults_finalized.clone()
        } else {
            let mut set = pre_defaults.clone();
            expand_incrementals(&self.default_tokens, &mut set, true);
            set
        };
        expand_incrementals(self.buckets.matching(pkg), &mut set, true);
        set
    }
}

/// Override lookup where `-` carries no meaning; matched lists are unioned
#[derive(Debug, Clone)]
pub struct NonIncrementalClassifier {
    buckets: Buckets,
    defaults: WorkingSet,
}

impl NonIncrementalClassifier {
    /// Classify entries
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Scope, Vec<Token>)>,
    {
        let buckets = Buckets::classify(entries)?;
        let defaults = buckets.global.iter().map(Token::to_string).collect();
        Ok(Self { buckets, defaults })
    }

    /// Global values
    pub fn defaults(&self) -> &WorkingSet {
        &self.defaults
    }

    /// Global values plus every matching entry, verbatim
    pub fn pull_data(&self, pkg: &Package) -> WorkingSet {
        let mut set = self.defaults.clone();
        set.extend(self.buckets.matching(pkg).map(Token::to_string));
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn entry(scope: &str, tokens: &[&str]) -> (Scope, Vec<Token>) {
        (
            scope.parse().unwrap(),
            Token::parse_all(tokens.iter().copied()).unwrap(),
        )
    }

    fn pkg(cpv: &str) -> Package {
        Package::parse_cpv(cpv).unwrap()
    }

    fn set(s: &[&str]) -> WorkingSet {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_global_defaults_only() {
        let c = OverrideClassifier::new(vec![entry("*/*", &["x", "y"])]).unwrap();
        assert_eq!(c.pull_data(&pkg("dev-util/foo-1")), set(&["x", "y"]));
        assert_eq!(c.pull_data(&pkg("app-misc/bar-2")), set(&["x", "y"]));
    }

    #[test]
    fn test_never_scope_is_ignored() {
        let entries = vec![
            entry("*/*", &["x"]),
            (Scope::Always(false), Token::parse_all(["y", "-x"]).unwrap()),
        ];
        let c = OverrideClassifier::new(entries).unwrap();
        assert_eq!(c.defaults(), &set(&["x"]));
        assert_eq!(c.pull_data(&pkg("dev-util/foo-1")), set(&["x"]));
    }

    #[test]
    fn test_repository_scope_is_rejected() {
        let err = OverrideClassifier::new(vec![entry("*/*::gentoo", &["x"])]).unwrap_err();
        assert_matches!(err, Error::InvalidScope(_));
    }

    #[test]
    fn test_precedence_freeform_then_atoms() {
        let entries = vec![
            entry(">=dev-util/foo-2", &["-x", "z"]),
            entry("dev-*/*", &["y", "-z"]),
            entry("*/*", &["x"]),
        ];
        let c = OverrideClassifier::new(entries).unwrap();
        // atoms win over freeform regardless of file order
        assert_eq!(c.pull_data(&pkg("dev-util/foo-2")), set(&["y", "z"]));
        assert_eq!(c.pull_data(&pkg("dev-util/foo-1")), set(&["x", "y"]));
        assert_eq!(c.pull_data(&pkg("app-misc/foo-2")), set(&["x"]));
    }

    #[test]
    fn test_atom_entries_keep_file_order() {
        let entries = vec![
            entry("dev-util/foo", &["x"]),
            entry(">=dev-util/foo-1", &["-x"]),
            entry(">=dev-util/foo-2", &["x"]),
        ];
        let c = OverrideClassifier::new(entries).unwrap();
        assert_eq!(c.pull_data(&pkg("dev-util/foo-2")), set(&["x"]));
        assert!(c.pull_data(&pkg("dev-util/foo-1.5")).is_empty());
        assert_eq!(c.pull_data(&pkg("dev-util/foo-0.9")), set(&["x"]));
    }

    #[test]
    fn test_pre_defaults() {
        let c = OverrideClassifier::new(vec![
            entry("*/*", &["-a", "b"]),
            entry("dev-util/foo", &["c"]),
        ])
        .unwrap();
        let pre = set(&["a", "d"]);
        // finalized defaults no longer carry the -a
        assert_eq!(
            c.pull_data_with(&pkg("dev-util/foo-1"), &pre),
            set(&["a", "b", "c", "d"])
        );
        // the caller's set is untouched and repeated calls agree
        assert_eq!(pre, set(&["a", "d"]));
        assert_eq!(
            c.pull_data_with(&pkg("dev-util/foo-1"), &pre),
            c.pull_data_with(&pkg("dev-util/foo-1"), &pre)
        );
    }

    #[test]
    fn test_unfinalized_defaults() {
        let c = OverrideClassifier::with_finalize(vec![entry("*/*", &["-a", "b"])], false).unwrap();
        assert_eq!(c.defaults(), &set(&["-a", "b"]));
        assert_eq!(c.defaults_finalized(), &set(&["b"]));
        assert_eq!(c.pull_data(&pkg("x11-libs/gtk-3")), set(&["b"]));
        assert_eq!(
            c.pull_data_with(&pkg("x11-libs/gtk-3"), &set(&["a", "d"])),
            set(&["b", "d"])
        );
    }

    #[test]
    fn test_unknown_flags_are_plain_members() {
        let c = OverrideClassifier::new(vec![entry("dev-util/foo", &["no-such-flag"])]).unwrap();
        assert_eq!(c.pull_data(&pkg("dev-util/foo-1")), set(&["no-such-flag"]));
    }

    #[test]
    fn test_non_incremental_union() {
        let c = NonIncrementalClassifier::new(vec![
            entry("*/*", &["amd64", "~amd64"]),
            entry("dev-util/foo", &["-amd64"]),
        ])
        .unwrap();
        assert_eq!(
            c.pull_data(&pkg("dev-util/foo-1")),
            set(&["amd64", "~amd64", "-amd64"])
        );
        assert_eq!(c.pull_data(&pkg("dev-util/bar-1")), set(&["amd64", "~amd64"]));
    }
}
