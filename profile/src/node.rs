//! A single profile directory
//!
//! Each file in a profile directory maps to one field of [`ProfileNode`].
//! Fields are parsed on first access and cached; a file that fails to parse
//! fails only its own field, with the profile path and file name attached.

use crate::chunked::{ChunkedRecord, ChunkedSettings};
use crate::env::{parse_make_defaults, Assignment};
use crate::incremental::Token;
use crate::reader::{read_config_path, read_lines, DirectoryMode};
use crate::{Eapi, Error, Package, PackageAtom, Result, Scope};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parsing strictness for profile directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Reject directory-form files such as `package.mask/`
    pub pms_strict: bool,
    /// Fail instead of warning on non-empty files the EAPI does not allow
    pub eapi_strict: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            pms_strict: true,
            eapi_strict: false,
        }
    }
}

/// Items one profile file adds and removes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diff<T> {
    /// A `-*` line discards everything inherited
    pub reset: bool,
    /// Items removed (`-item`)
    pub neg: Vec<T>,
    /// Items added
    pub pos: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            reset: false,
            neg: Vec::new(),
            pos: Vec::new(),
        }
    }
}

impl<T: PartialEq + Clone> Diff<T> {
    /// Fold this diff onto a running list
    pub fn apply(&self, items: &mut Vec<T>) {
        if self.reset {
            items.clear();
        }
        items.retain(|item| !self.neg.contains(item));
        for item in &self.pos {
            if !items.contains(item) {
                items.push(item.clone());
            }
        }
    }

    fn push(&mut self, line: &str, parse: impl Fn(&str) -> Result<T>) -> Result<()> {
        if line == "-*" {
            self.reset = true;
            self.neg.clear();
            self.pos.clear();
        } else if let Some(rest) = line.strip_prefix('-') {
            let item = parse(rest)?;
            self.pos.retain(|p| p != &item);
            self.neg.push(item);
        } else {
            let item = parse(line)?;
            self.neg.retain(|n| n != &item);
            self.pos.push(item);
        }
        Ok(())
    }
}

/// Atoms added and removed by one profile file
pub type AtomDiff = Diff<PackageAtom>;

/// The `packages` file: system set and visibility restrictions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackagesFile {
    /// `*atom` lines
    pub system: AtomDiff,
    /// plain `atom` lines
    pub visibility: AtomDiff,
}

/// Contents of a `deprecated` file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deprecation {
    /// Profile to migrate to
    pub replacement: String,
    /// Free-form explanation
    pub message: String,
}

/// Per-package token lists (`package.keywords`, `package.accept_keywords`)
pub type AtomTokens = Vec<(PackageAtom, Vec<Token>)>;

/// One profile directory with lazily parsed fields
#[derive(Debug)]
pub struct ProfileNode {
    path: PathBuf,
    options: ProfileOptions,
    pub(crate) parents: Vec<usize>,
    eapi: OnceCell<Eapi>,
    packages: OnceCell<PackagesFile>,
    masks: OnceCell<AtomDiff>,
    unmasks: OnceCell<AtomDiff>,
    pkg_provided: OnceCell<Diff<Package>>,
    pkg_keywords: OnceCell<AtomTokens>,
    pkg_accept_keywords: OnceCell<AtomTokens>,
    forced_use: OnceCell<ChunkedSettings>,
    masked_use: OnceCell<ChunkedSettings>,
    pkg_use: OnceCell<ChunkedSettings>,
    stable_forced_use: OnceCell<ChunkedSettings>,
    stable_masked_use: OnceCell<ChunkedSettings>,
    make_defaults: OnceCell<Vec<Assignment>>,
    virtuals: OnceCell<IndexMap<String, PackageAtom>>,
    deprecated: OnceCell<Option<Deprecation>>,
}

impl ProfileNode {
    /// Create a node for a profile directory; nothing is read yet
    pub fn new(path: impl Into<PathBuf>, options: ProfileOptions) -> Self {
        Self {
            path: path.into(),
            options,
            parents: Vec::new(),
            eapi: OnceCell::new(),
            packages: OnceCell::new(),
            masks: OnceCell::new(),
            unmasks: OnceCell::new(),
            pkg_provided: OnceCell::new(),
            pkg_keywords: OnceCell::new(),
            pkg_accept_keywords: OnceCell::new(),
            forced_use: OnceCell::new(),
            masked_use: OnceCell::new(),
            pkg_use: OnceCell::new(),
            stable_forced_use: OnceCell::new(),
            stable_masked_use: OnceCell::new(),
            make_defaults: OnceCell::new(),
            virtuals: OnceCell::new(),
            deprecated: OnceCell::new(),
        }
    }

    /// Profile directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arena indices of the parent profiles, in `parent` file order
    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    /// Parent directories listed in the `parent` file, unresolved
    pub fn parent_paths(&self) -> Result<Vec<PathBuf>> {
        let content = match self.read("parent")? {
            Some(content) => content,
            None => return Ok(Vec::new()),
        };
        Ok(read_lines(&content).map(|line| self.path.join(line)).collect())
    }

    /// The profile's EAPI, `0` when there is no `eapi` file
    pub fn eapi(&self) -> Result<&Eapi> {
        self.eapi.get_or_try_init(|| {
            self.parse("eapi", |content| {
                let tokens: Vec<&str> = read_lines(content).flat_map(str::split_whitespace).collect();
                match tokens.as_slice() {
                    [] => Ok(Eapi::default()),
                    [eapi] => Eapi::parse(eapi),
                    _ => Err(Error::Invalid(format!(
                        "expected a single EAPI, found {}",
                        tokens.join(" ")
                    ))),
                }
            })
            .map(Option::unwrap_or_default)
        })
    }

    /// System set and visibility diffs from `packages`
    pub fn packages(&self) -> Result<&PackagesFile> {
        self.packages.get_or_try_init(|| {
            let eapi = *self.eapi()?;
            self.parse("packages", |content| {
                let mut packages = PackagesFile::default();
                let atom = |s: &str| PackageAtom::parse_with_eapi(s, &eapi);
                for line in read_lines(content) {
                    if line == "-*" {
                        packages.system.push(line, atom)?;
                        packages.visibility.push(line, atom)?;
                    } else if let Some(system) = line.strip_prefix('*') {
                        packages.system.push(system, atom)?;
                    } else if let Some(system) = line.strip_prefix("-*") {
                        packages.system.push(&format!("-{}", system), atom)?;
                    } else {
                        packages.visibility.push(line, atom)?;
                    }
                }
                Ok(packages)
            })
            .map(Option::unwrap_or_default)
        })
    }

    /// `package.mask`
    pub fn masks(&self) -> Result<&AtomDiff> {
        self.masks.get_or_try_init(|| self.atom_diff("package.mask"))
    }

    /// `package.unmask`
    pub fn unmasks(&self) -> Result<&AtomDiff> {
        self.unmasks.get_or_try_init(|| self.atom_diff("package.unmask"))
    }

    /// `package.provided`, ignored from EAPI 7 on
    pub fn pkg_provided(&self) -> Result<&Diff<Package>> {
        self.pkg_provided.get_or_try_init(|| {
            let allowed = self.eapi()?.options().profile_pkg_provided;
            let content = self.read_gated("package.provided", allowed, "EAPI < 7")?;
            Self::parse_content(content, &self.path, "package.provided", |content| {
                let mut diff = Diff::default();
                for line in read_lines(content) {
                    diff.push(line, Package::parse_cpv)?;
                }
                Ok(diff)
            })
            .map(Option::unwrap_or_default)
        })
    }

    /// `package.keywords`
    pub fn pkg_keywords(&self) -> Result<&AtomTokens> {
        self.pkg_keywords
            .get_or_try_init(|| self.atom_tokens("package.keywords", true))
    }

    /// `package.accept_keywords`
    pub fn pkg_accept_keywords(&self) -> Result<&AtomTokens> {
        self.pkg_accept_keywords
            .get_or_try_init(|| self.atom_tokens("package.accept_keywords", true))
    }

    /// `use.force` followed by `package.use.force`
    pub fn forced_use(&self) -> Result<&ChunkedSettings> {
        self.forced_use
            .get_or_try_init(|| self.use_settings("use.force", "package.use.force", true))
    }

    /// `use.mask` followed by `package.use.mask`
    pub fn masked_use(&self) -> Result<&ChunkedSettings> {
        self.masked_use
            .get_or_try_init(|| self.use_settings("use.mask", "package.use.mask", true))
    }

    /// `package.use`
    pub fn pkg_use(&self) -> Result<&ChunkedSettings> {
        self.pkg_use.get_or_try_init(|| {
            let mut settings = ChunkedSettings::new();
            self.add_package_use(&mut settings, "package.use", true)?;
            Ok(settings)
        })
    }

    /// Forced flags with the `.stable.` files layered on top
    pub fn stable_forced_use(&self) -> Result<&ChunkedSettings> {
        self.stable_forced_use.get_or_try_init(|| {
            self.stable_settings(self.forced_use()?, "use.stable.force", "package.use.stable.force")
        })
    }

    /// Masked flags with the `.stable.` files layered on top
    pub fn stable_masked_use(&self) -> Result<&ChunkedSettings> {
        self.stable_masked_use.get_or_try_init(|| {
            self.stable_settings(self.masked_use()?, "use.stable.mask", "package.use.stable.mask")
        })
    }

    /// Unexpanded `make.defaults` assignments
    pub fn make_defaults(&self) -> Result<&[Assignment]> {
        self.make_defaults
            .get_or_try_init(|| {
                self.parse("make.defaults", parse_make_defaults)
                    .map(Option::unwrap_or_default)
            })
            .map(Vec::as_slice)
    }

    /// `virtuals`: virtual package name to its default provider
    pub fn virtuals(&self) -> Result<&IndexMap<String, PackageAtom>> {
        self.virtuals.get_or_try_init(|| {
            let eapi = *self.eapi()?;
            self.parse("virtuals", |content| {
                let mut virtuals = IndexMap::new();
                for line in read_lines(content) {
                    let (name, provider) = match line.split_whitespace().collect::<Vec<_>>()[..] {
                        [name, provider] => (name, provider),
                        _ => {
                            return Err(Error::Invalid(format!(
                                "expected `virtual/name atom`: {}",
                                line
                            )))
                        }
                    };
                    let virtual_atom = PackageAtom::parse_with_eapi(name, &eapi)?;
                    if virtual_atom.category != "virtual" || !virtual_atom.is_simple() {
                        return Err(Error::InvalidAtom(format!("not a virtual: {}", name)));
                    }
                    virtuals.insert(
                        virtual_atom.key(),
                        PackageAtom::parse_with_eapi(provider, &eapi)?,
                    );
                }
                Ok(virtuals)
            })
            .map(Option::unwrap_or_default)
        })
    }

    /// `deprecated`: replacement profile and message
    pub fn deprecated(&self) -> Result<Option<&Deprecation>> {
        self.deprecated
            .get_or_try_init(|| {
                self.parse("deprecated", |content| {
                    let mut lines = content.lines().map(str::trim);
                    let replacement = lines
                        .by_ref()
                        .find(|line| !line.is_empty())
                        .ok_or_else(|| Error::Invalid("empty deprecated file".to_string()))?;
                    let message = lines.collect::<Vec<_>>().join("\n").trim().to_string();
                    Ok(Deprecation {
                        replacement: replacement.to_string(),
                        message,
                    })
                })
            })
            .map(Option::as_ref)
    }

    /// `profile.bashrc`, when present
    pub fn bashrc(&self) -> Option<PathBuf> {
        let path = self.path.join("profile.bashrc");
        path.is_file().then_some(path)
    }

    fn directory_mode(&self) -> DirectoryMode {
        if self.options.pms_strict {
            DirectoryMode::Reject
        } else {
            DirectoryMode::Fragments
        }
    }

    fn read(&self, filename: &str) -> Result<Option<String>> {
        read_config_path(&self.path.join(filename), self.directory_mode())
            .map_err(|e| e.in_profile(&self.path, filename))
    }

    /// Read a file the profile's EAPI may not allow
    fn read_gated(&self, filename: &str, allowed: bool, requirement: &str) -> Result<Option<String>> {
        let content = match self.read(filename)? {
            Some(content) if !allowed => content,
            other => return Ok(other),
        };
        let eapi = self.eapi()?;
        if self.options.eapi_strict && read_lines(&content).next().is_some() {
            return Err(Error::EapiRestricted {
                filename: filename.to_string(),
                eapi: eapi.to_string(),
                requirement: requirement.to_string(),
            }
            .in_profile(&self.path, filename));
        }
        warn!(
            "Ignoring {} in {}: EAPI {} profile, file requires {}",
            filename,
            self.path.display(),
            eapi,
            requirement
        );
        Ok(None)
    }

    fn parse<T>(&self, filename: &str, parse: impl FnOnce(&str) -> Result<T>) -> Result<Option<T>> {
        let content = self.read(filename)?;
        Self::parse_content(content, &self.path, filename, parse)
    }

    fn parse_content<T>(
        content: Option<String>,
        path: &Path,
        filename: &str,
        parse: impl FnOnce(&str) -> Result<T>,
    ) -> Result<Option<T>> {
        match content {
            Some(content) => {
                debug!("Parsing {} in {}", filename, path.display());
                parse(&content)
                    .map(Some)
                    .map_err(|e| e.in_profile(path, filename))
            }
            None => Ok(None),
        }
    }

    fn atom_diff(&self, filename: &str) -> Result<AtomDiff> {
        let eapi = *self.eapi()?;
        self.parse(filename, |content| {
            let mut diff = Diff::default();
            for line in read_lines(content) {
                diff.push(line, |s| PackageAtom::parse_with_eapi(s, &eapi))?;
            }
            Ok(diff)
        })
        .map(Option::unwrap_or_default)
    }

    fn atom_tokens(&self, filename: &str, allow_empty: bool) -> Result<AtomTokens> {
        let eapi = *self.eapi()?;
        self.parse(filename, |content| parse_atom_tokens(content, &eapi, allow_empty))
            .map(Option::unwrap_or_default)
    }

    fn use_settings(&self, use_file: &str, package_file: &str, allowed: bool) -> Result<ChunkedSettings> {
        let mut settings = ChunkedSettings::new();
        self.add_global_use(&mut settings, use_file, allowed)?;
        self.add_package_use(&mut settings, package_file, allowed)?;
        Ok(settings)
    }

    fn stable_settings(
        &self,
        base: &ChunkedSettings,
        use_file: &str,
        package_file: &str,
    ) -> Result<ChunkedSettings> {
        let allowed = self.eapi()?.options().profile_stable_use;
        let mut settings = base.clone();
        self.add_global_use(&mut settings, use_file, allowed)?;
        self.add_package_use(&mut settings, package_file, allowed)?;
        Ok(settings)
    }

    fn add_global_use(&self, settings: &mut ChunkedSettings, filename: &str, allowed: bool) -> Result<()> {
        let content = self.read_gated(filename, allowed, "EAPI >= 5")?;
        if let Some(record) = Self::parse_content(content, &self.path, filename, |content| {
            let tokens = Token::parse_all(read_lines(content).flat_map(str::split_whitespace))?;
            Ok(ChunkedRecord::from_tokens(Scope::GLOBAL, &tokens))
        })? {
            settings.add_global(record);
        }
        Ok(())
    }

    fn add_package_use(&self, settings: &mut ChunkedSettings, filename: &str, allowed: bool) -> Result<()> {
        let eapi = *self.eapi()?;
        let content = self.read_gated(filename, allowed, "EAPI >= 5")?;
        let entries = Self::parse_content(content, &self.path, filename, |content| {
            parse_atom_tokens(content, &eapi, false)
        })?;
        for (atom, tokens) in entries.into_iter().flatten() {
            settings.add(ChunkedRecord::from_tokens(Scope::Atom(atom), &tokens));
        }
        Ok(())
    }
}

/// Parse `atom token token ...` lines
pub(crate) fn parse_atom_tokens(content: &str, eapi: &Eapi, allow_empty: bool) -> Result<AtomTokens> {
    let mut entries = Vec::new();
    for line in read_lines(content) {
        let mut parts = line.split_whitespace();
        let atom = match parts.next() {
            Some(atom) => PackageAtom::parse_with_eapi(atom, eapi)?,
            None => continue,
        };
        let tokens = Token::parse_all(parts)?;
        if tokens.is_empty() && !allow_empty {
            return Err(Error::Invalid(format!("{} lists no flags", atom)));
        }
        entries.push((atom, tokens));
    }
    Ok(entries)
}
