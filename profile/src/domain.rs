//! Effective configuration for candidate packages
//!
//! A [`Domain`] combines a [`ProfileStack`] with the user's configuration
//! directory and answers the two questions a package manager asks about a
//! package: may it be installed, and with which USE flags.

use crate::chunked::ChunkedSettings;
use crate::classifier::{NonIncrementalClassifier, OverrideClassifier};
use crate::env::{parse_make_defaults, DefaultEnv};
use crate::incremental::{expand_incrementals, optimize_incrementals, split_negations, Token, WorkingSet};
use crate::license::{flatten_groups, LicenseGroups};
use crate::reader::{read_config_path, read_lines, DirectoryMode};
use crate::stack::ProfileStack;
use crate::{Error, Package, PackageAtom, Result, Scope};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Per-package override lines: an extended atom and its tokens
pub type ScopedTokens = Vec<(Scope, Vec<Token>)>;

/// The user's configuration directory
#[derive(Debug, Clone, Default)]
pub struct UserConfig {
    /// Variables from make.conf
    pub make_conf: DefaultEnv,
    /// `package.use`
    pub package_use: ScopedTokens,
    /// `package.mask`
    pub package_mask: Vec<Scope>,
    /// `package.unmask`
    pub package_unmask: Vec<Scope>,
    /// `package.accept_keywords`, with legacy `package.keywords` first
    pub package_accept_keywords: ScopedTokens,
    /// `package.license`
    pub package_license: ScopedTokens,
}

impl UserConfig {
    /// Load a configuration directory; missing files are treated as empty
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Self::default();

        if let Some(content) = read_user_file(dir, "make.conf")? {
            let assignments =
                parse_make_defaults(&content).map_err(|e| e.in_config(dir.join("make.conf")))?;
            config.make_conf.apply(&assignments);
        }

        config.package_use = read_scoped(dir, "package.use", false)?;
        config.package_mask = read_scopes(dir, "package.mask")?;
        config.package_unmask = read_scopes(dir, "package.unmask")?;
        config.package_accept_keywords = read_scoped(dir, "package.keywords", true)?;
        config
            .package_accept_keywords
            .extend(read_scoped(dir, "package.accept_keywords", true)?);
        config.package_license = read_scoped(dir, "package.license", false)?;

        debug!(
            "Loaded user configuration from {}: {} package.use, {} package.mask, {} package.unmask entries",
            dir.display(),
            config.package_use.len(),
            config.package_mask.len(),
            config.package_unmask.len()
        );
        Ok(config)
    }

    fn tokens(&self, name: &str) -> Result<Vec<Token>> {
        Token::parse_all(self.make_conf.tokens(name))
    }
}

fn read_user_file(dir: &Path, filename: &str) -> Result<Option<String>> {
    let path = dir.join(filename);
    read_config_path(&path, DirectoryMode::Fragments).map_err(|e| e.in_config(path))
}

fn read_scoped(dir: &Path, filename: &str, allow_empty: bool) -> Result<ScopedTokens> {
    let content = match read_user_file(dir, filename)? {
        Some(content) => content,
        None => return Ok(Vec::new()),
    };
    let parse = || -> Result<ScopedTokens> {
        let mut entries = Vec::new();
        for line in read_lines(&content) {
            let mut parts = line.split_whitespace();
            let scope = match parts.next() {
                Some(scope) => Scope::parse(scope)?,
                None => continue,
            };
            let tokens = Token::parse_all(parts)?;
            if tokens.is_empty() && !allow_empty {
                return Err(Error::Invalid(format!("{} lists nothing", scope)));
            }
            entries.push((scope, tokens));
        }
        Ok(entries)
    };
    parse().map_err(|e| e.in_config(dir.join(filename)))
}

fn read_scopes(dir: &Path, filename: &str) -> Result<Vec<Scope>> {
    let content = match read_user_file(dir, filename)? {
        Some(content) => content,
        None => return Ok(Vec::new()),
    };
    read_lines(&content)
        .map(Scope::parse)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| e.in_config(dir.join(filename)))
}

/// Why a package is not installable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum HiddenReason {
    /// Matched by package.mask and not unmasked
    Masked,
    /// Excluded by a visibility atom in the profile's `packages` file
    NotInProfile(String),
    /// None of the package's keywords are accepted
    MissingKeyword(Vec<String>),
    /// Licenses the package needs that are not accepted
    License(Vec<String>),
}

/// Visibility verdict for a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reasons", rename_all = "snake_case")]
pub enum Visibility {
    /// Installable
    Visible,
    /// Not installable, with every reason found
    Hidden(Vec<HiddenReason>),
}

impl Visibility {
    /// Check whether the package is installable
    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// USE flag resolution result for one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UseState {
    /// Flags the package is built with
    pub enabled: BTreeSet<String>,
    /// Flags forced on by the profile
    pub forced: BTreeSet<String>,
    /// Flags forced off by the profile
    pub masked: BTreeSet<String>,
}

#[derive(Debug)]
enum KeywordFilter {
    Incremental(OverrideClassifier),
    NonIncremental(NonIncrementalClassifier),
}

impl KeywordFilter {
    fn accepted(&self, pkg: &Package) -> WorkingSet {
        match self {
            KeywordFilter::Incremental(classifier) => classifier.pull_data(pkg),
            KeywordFilter::NonIncremental(classifier) => classifier.pull_data(pkg),
        }
    }
}

/// Profile stack plus user configuration, ready for per-package queries
#[derive(Debug)]
pub struct Domain {
    stack: ProfileStack,
    arch: Option<String>,
    masks: Vec<Scope>,
    unmasks: Vec<Scope>,
    visibility: Vec<PackageAtom>,
    profile_keywords: Vec<(PackageAtom, Vec<Token>)>,
    keywords: KeywordFilter,
    accept_license: Vec<Token>,
    package_license: OverrideClassifier,
    use_defaults: ChunkedSettings,
    package_use: OverrideClassifier,
    forced_use: ChunkedSettings,
    masked_use: ChunkedSettings,
    stable_forced_use: ChunkedSettings,
    stable_masked_use: ChunkedSettings,
    iuse_implicit: BTreeSet<String>,
}

impl Domain {
    /// Build a domain for the profile's own `ARCH`
    pub fn new(stack: ProfileStack, user: UserConfig, license_groups: LicenseGroups) -> Result<Self> {
        Self::with_arch(stack, user, license_groups, None)
    }

    /// Build a domain, optionally overriding `ARCH`.
    ///
    /// Every profile field is resolved and every license group reference
    /// expanded here, so a broken profile or a group cycle fails now and
    /// per-package queries cannot fail later.
    pub fn with_arch(
        stack: ProfileStack,
        user: UserConfig,
        license_groups: LicenseGroups,
        arch: Option<String>,
    ) -> Result<Self> {
        let arch = match arch {
            Some(arch) => Some(arch),
            None => stack.arch()?,
        };
        if arch.is_none() {
            warn!("Profile {} does not set ARCH", stack.root().path().display());
        }
        let env = stack.default_env()?;

        let masks = stack
            .masks()?
            .iter()
            .cloned()
            .map(Scope::Atom)
            .chain(user.package_mask.iter().cloned())
            .collect();
        let unmasks = stack
            .unmasks()?
            .iter()
            .cloned()
            .map(Scope::Atom)
            .chain(user.package_unmask.iter().cloned())
            .collect();

        let keywords = keyword_filter(&stack, &user, arch.as_deref())?;

        let mut accept_license = Token::parse_all(env.tokens("ACCEPT_LICENSE"))?;
        accept_license.extend(user.tokens("ACCEPT_LICENSE")?);
        let accept_license = flatten_groups(&accept_license, &license_groups)?;
        let package_license = user
            .package_license
            .iter()
            .map(|(scope, tokens)| Ok((scope.clone(), flatten_groups(tokens, &license_groups)?)))
            .collect::<Result<ScopedTokens>>()?;

        let mut use_defaults = ChunkedSettings::new();
        let (neg, pos) = split_negations(&optimize_incrementals(&Token::parse_all(env.tokens("USE"))?));
        use_defaults.add_bare_global(neg, pos);
        use_defaults.merge(stack.pkg_use()?);
        let (neg, pos) = split_negations(&optimize_incrementals(&user.tokens("USE")?));
        use_defaults.add_bare_global(neg, pos);

        Ok(Self {
            arch,
            masks,
            unmasks,
            visibility: stack.visibility()?.to_vec(),
            profile_keywords: stack.pkg_keywords()?.clone(),
            keywords,
            accept_license,
            package_license: OverrideClassifier::new(package_license)?,
            use_defaults,
            package_use: OverrideClassifier::new(user.package_use.iter().cloned())?,
            forced_use: stack.forced_use()?.clone(),
            masked_use: stack.masked_use()?.clone(),
            stable_forced_use: stack.stable_forced_use()?.clone(),
            stable_masked_use: stack.stable_masked_use()?.clone(),
            iuse_implicit: env.tokens("IUSE_IMPLICIT").into_iter().map(String::from).collect(),
            stack,
        })
    }

    /// The profile stack
    pub fn profile(&self) -> &ProfileStack {
        &self.stack
    }

    /// Architecture keyword the domain resolves for
    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    /// Whether the package is masked: by package.mask with no unmask, or by
    /// failing a visibility atom for its key
    pub fn is_masked(&self, pkg: &Package) -> bool {
        self.mask_matched(pkg) || self.failed_visibility(pkg).is_some()
    }

    fn mask_matched(&self, pkg: &Package) -> bool {
        self.masks.iter().any(|scope| scope.matches(pkg))
            && !self.unmasks.iter().any(|scope| scope.matches(pkg))
    }

    /// Visibility atoms for the package's key that it fails
    fn failed_visibility(&self, pkg: &Package) -> Option<&PackageAtom> {
        self.visibility
            .iter()
            .find(|atom| atom.matches_key(&pkg.category, &pkg.name) && !atom.matches(pkg))
    }

    /// KEYWORDS after the profile's `package.keywords` adjustments
    pub fn effective_keywords(&self, pkg: &Package) -> WorkingSet {
        let mut keywords: WorkingSet = pkg.keywords.iter().cloned().collect();
        for (atom, tokens) in &self.profile_keywords {
            if atom.matches(pkg) {
                expand_incrementals(tokens, &mut keywords, true);
            }
        }
        keywords
    }

    /// Keywords accepted for the package
    pub fn accepted_keywords(&self, pkg: &Package) -> WorkingSet {
        self.keywords.accepted(pkg)
    }

    /// Whether any of the package's keywords is accepted
    pub fn keywords_accepted(&self, pkg: &Package) -> bool {
        let accepted = self.accepted_keywords(pkg);
        if accepted.contains("**") {
            return true;
        }
        self.effective_keywords(pkg).iter().any(|keyword| {
            if keyword.starts_with('-') {
                return false;
            }
            accepted.contains(keyword)
                || match keyword.strip_prefix('~') {
                    Some(_) => accepted.contains("~*"),
                    None => accepted.contains("*"),
                }
        })
    }

    /// Licenses accepted for the package; may hold `*` and `-license` markers
    pub fn accepted_licenses(&self, pkg: &Package) -> WorkingSet {
        let tokens = self
            .accept_license
            .iter()
            .chain(self.package_license.global_tokens())
            .chain(self.package_license.matching_tokens(pkg));
        let mut accepted = WorkingSet::new();
        expand_incrementals(tokens, &mut accepted, false);
        accepted
    }

    /// Licenses the package needs that are not accepted
    pub fn missing_licenses(&self, pkg: &Package) -> Vec<String> {
        let accepted = self.accepted_licenses(pkg);
        let wildcard = accepted.contains("*");
        pkg.licenses
            .iter()
            .filter(|license| {
                !(accepted.contains(license.as_str())
                    || (wildcard && !accepted.contains(&format!("-{}", license))))
            })
            .cloned()
            .collect()
    }

    /// Whether every license the package needs is accepted
    pub fn license_accepted(&self, pkg: &Package) -> bool {
        self.missing_licenses(pkg).is_empty()
    }

    /// Visibility verdict with every reason that applies
    pub fn visibility(&self, pkg: &Package) -> Visibility {
        let mut reasons = Vec::new();
        if self.mask_matched(pkg) {
            reasons.push(HiddenReason::Masked);
        }
        if let Some(atom) = self.failed_visibility(pkg) {
            reasons.push(HiddenReason::NotInProfile(atom.to_string()));
        }
        if !self.keywords_accepted(pkg) {
            reasons.push(HiddenReason::MissingKeyword(
                self.effective_keywords(pkg).into_iter().collect(),
            ));
        }
        let missing = self.missing_licenses(pkg);
        if !missing.is_empty() {
            reasons.push(HiddenReason::License(missing));
        }

        if reasons.is_empty() {
            Visibility::Visible
        } else {
            Visibility::Hidden(reasons)
        }
    }

    /// Whether the package is stable for the domain's arch: keyworded
    /// `ARCH` while `~ARCH` is not accepted for it
    pub fn is_stable(&self, pkg: &Package) -> bool {
        match &self.arch {
            Some(arch) => {
                self.effective_keywords(pkg).contains(arch)
                    && !self.accepted_keywords(pkg).contains(&format!("~{}", arch))
            }
            None => false,
        }
    }

    /// Resolve USE flags.
    ///
    /// Layers, lowest first: IUSE defaults, make.defaults USE, profile
    /// package.use, make.conf USE, user package.use. Forced flags are then
    /// added and masked flags removed, so a mask beats a force.
    pub fn use_state(&self, pkg: &Package) -> UseState {
        let mut raw = self.use_defaults.pull_with(pkg, &pkg.iuse_defaults());
        raw = self.package_use.pull_data_with(pkg, &raw);

        let (forced, masked) = if self.is_stable(pkg) {
            (&self.stable_forced_use, &self.stable_masked_use)
        } else {
            (&self.forced_use, &self.masked_use)
        };
        let forced = forced.pull(pkg);
        let masked = masked.pull(pkg);

        let mut enabled = raw;
        enabled.extend(forced.iter().cloned());
        enabled.retain(|flag| !masked.contains(flag));

        if !pkg.iuse.is_empty() {
            let iuse = pkg.iuse_names();
            let (kept, dropped): (BTreeSet<String>, BTreeSet<String>) = enabled
                .into_iter()
                .partition(|flag| iuse.contains(flag) || self.iuse_implicit.contains(flag));
            if !dropped.is_empty() {
                debug!(
                    "Dropping flags outside IUSE for {}: {}",
                    pkg,
                    dropped.into_iter().collect::<Vec<_>>().join(" ")
                );
            }
            enabled = kept;
        }

        UseState {
            enabled,
            forced,
            masked,
        }
    }
}

fn keyword_filter(stack: &ProfileStack, user: &UserConfig, arch: Option<&str>) -> Result<KeywordFilter> {
    let mut tokens = Token::parse_all(stack.default_env()?.tokens("ACCEPT_KEYWORDS"))?;
    tokens.extend(user.tokens("ACCEPT_KEYWORDS")?);
    let mut defaults = WorkingSet::new();
    expand_incrementals(&tokens, &mut defaults, true);

    let testing = arch.map(|arch| format!("~{}", arch));
    let fill_empty = |tokens: &[Token]| -> Vec<Token> {
        match (&testing, tokens.is_empty()) {
            (Some(testing), true) => vec![Token::Assert(testing.clone())],
            _ => tokens.to_vec(),
        }
    };

    let mut entries: ScopedTokens = vec![(
        Scope::GLOBAL,
        defaults.iter().map(|k| Token::Assert(k.clone())).collect(),
    )];
    for (atom, tokens) in stack.pkg_accept_keywords()? {
        entries.push((Scope::Atom(atom.clone()), fill_empty(tokens)));
    }
    for (scope, tokens) in &user.package_accept_keywords {
        entries.push((scope.clone(), fill_empty(tokens)));
    }

    if defaults.iter().any(|k| k.starts_with('~')) {
        Ok(KeywordFilter::NonIncremental(NonIncrementalClassifier::new(entries)?))
    } else {
        Ok(KeywordFilter::Incremental(OverrideClassifier::new(entries)?))
    }
}
