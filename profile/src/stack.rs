//! Profile inheritance
//!
//! A profile names its parents in a `parent` file, forming a DAG. The
//! stack loads every reachable directory once into an arena, linearizes the
//! DAG depth-first (parents before children, diamond duplicates kept) and
//! folds each setting over that order on first access.

use crate::chunked::ChunkedSettings;
use crate::env::DefaultEnv;
use crate::node::{AtomTokens, Deprecation, Diff, ProfileNode, ProfileOptions};
use crate::{Eapi, Error, Package, PackageAtom, Result};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A resolved profile and its ancestry
#[derive(Debug)]
pub struct ProfileStack {
    nodes: Vec<ProfileNode>,
    order: Vec<usize>,
    root: usize,
    masks: OnceCell<Vec<PackageAtom>>,
    unmasks: OnceCell<Vec<PackageAtom>>,
    system: OnceCell<Vec<PackageAtom>>,
    visibility: OnceCell<Vec<PackageAtom>>,
    pkg_provided: OnceCell<Vec<Package>>,
    pkg_keywords: OnceCell<AtomTokens>,
    pkg_accept_keywords: OnceCell<AtomTokens>,
    forced_use: OnceCell<ChunkedSettings>,
    masked_use: OnceCell<ChunkedSettings>,
    pkg_use: OnceCell<ChunkedSettings>,
    stable_forced_use: OnceCell<ChunkedSettings>,
    stable_masked_use: OnceCell<ChunkedSettings>,
    default_env: OnceCell<DefaultEnv>,
    virtuals: OnceCell<IndexMap<String, PackageAtom>>,
}

struct Loader {
    options: ProfileOptions,
    nodes: Vec<ProfileNode>,
    index: HashMap<PathBuf, usize>,
    visiting: Vec<PathBuf>,
}

impl Loader {
    fn load(&mut self, path: &Path) -> Result<usize> {
        let canonical = path
            .canonicalize()
            .map_err(|_| Error::ProfileNotFound(path.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(Error::ProfileNotFound(path.to_path_buf()));
        }
        if self.visiting.contains(&canonical) {
            return Err(Error::CircularProfile(canonical));
        }
        if let Some(&idx) = self.index.get(&canonical) {
            return Ok(idx);
        }

        debug!("Loading profile: {}", canonical.display());
        self.visiting.push(canonical.clone());
        let mut node = ProfileNode::new(&canonical, self.options);
        for parent in node.parent_paths()? {
            let idx = self.load(&parent)?;
            node.parents.push(idx);
        }
        self.visiting.pop();

        let idx = self.nodes.len();
        self.nodes.push(node);
        self.index.insert(canonical, idx);
        Ok(idx)
    }
}

impl ProfileStack {
    /// Load a profile directory and everything it inherits from
    pub fn load(path: &Path, options: ProfileOptions) -> Result<Self> {
        let mut loader = Loader {
            options,
            nodes: Vec::new(),
            index: HashMap::new(),
            visiting: Vec::new(),
        };
        let root = loader.load(path)?;

        let mut order = Vec::new();
        linearize(&loader.nodes, root, &mut order);

        let stack = Self {
            nodes: loader.nodes,
            order,
            root,
            masks: OnceCell::new(),
            unmasks: OnceCell::new(),
            system: OnceCell::new(),
            visibility: OnceCell::new(),
            pkg_provided: OnceCell::new(),
            pkg_keywords: OnceCell::new(),
            pkg_accept_keywords: OnceCell::new(),
            forced_use: OnceCell::new(),
            masked_use: OnceCell::new(),
            pkg_use: OnceCell::new(),
            stable_forced_use: OnceCell::new(),
            stable_masked_use: OnceCell::new(),
            default_env: OnceCell::new(),
            virtuals: OnceCell::new(),
        };
        info!(
            "Loaded profile {} ({} directories, {} stacked)",
            stack.root().path().display(),
            stack.nodes.len(),
            stack.order.len()
        );
        if let Ok(Some(deprecated)) = stack.deprecated() {
            warn!(
                "Profile {} is deprecated, migrate to {}",
                stack.root().path().display(),
                deprecated.replacement
            );
        }
        Ok(stack)
    }

    /// The profile the stack was loaded from
    pub fn root(&self) -> &ProfileNode {
        &self.nodes[self.root]
    }

    /// Profiles in inheritance order, root last, duplicates kept
    pub fn nodes(&self) -> impl Iterator<Item = &ProfileNode> {
        self.order.iter().map(|&idx| &self.nodes[idx])
    }

    /// Distinct profile directories loaded
    pub fn unique_nodes(&self) -> &[ProfileNode] {
        &self.nodes
    }

    /// Package masks after folding every profile
    pub fn masks(&self) -> Result<&[PackageAtom]> {
        self.masks
            .get_or_try_init(|| self.fold_diffs(|n| n.masks()))
            .map(Vec::as_slice)
    }

    /// Package unmasks after folding every profile
    pub fn unmasks(&self) -> Result<&[PackageAtom]> {
        self.unmasks
            .get_or_try_init(|| self.fold_diffs(|n| n.unmasks()))
            .map(Vec::as_slice)
    }

    /// The system set
    pub fn system(&self) -> Result<&[PackageAtom]> {
        self.system
            .get_or_try_init(|| self.fold_diffs(|n| n.packages().map(|p| &p.system)))
            .map(Vec::as_slice)
    }

    /// Visibility restrictions from `packages`
    pub fn visibility(&self) -> Result<&[PackageAtom]> {
        self.visibility
            .get_or_try_init(|| self.fold_diffs(|n| n.packages().map(|p| &p.visibility)))
            .map(Vec::as_slice)
    }

    /// Packages declared as provided outside the package manager
    pub fn pkg_provided(&self) -> Result<&[Package]> {
        self.pkg_provided
            .get_or_try_init(|| self.fold_diffs(|n| n.pkg_provided()))
            .map(Vec::as_slice)
    }

    /// `package.keywords` entries of every profile, in stack order
    pub fn pkg_keywords(&self) -> Result<&AtomTokens> {
        self.pkg_keywords
            .get_or_try_init(|| self.concat(|n| n.pkg_keywords()))
    }

    /// `package.accept_keywords` entries of every profile, in stack order
    pub fn pkg_accept_keywords(&self) -> Result<&AtomTokens> {
        self.pkg_accept_keywords
            .get_or_try_init(|| self.concat(|n| n.pkg_accept_keywords()))
    }

    /// Forced USE flags
    pub fn forced_use(&self) -> Result<&ChunkedSettings> {
        self.forced_use
            .get_or_try_init(|| self.fold_chunked(|n| n.forced_use()))
    }

    /// Masked USE flags
    pub fn masked_use(&self) -> Result<&ChunkedSettings> {
        self.masked_use
            .get_or_try_init(|| self.fold_chunked(|n| n.masked_use()))
    }

    /// Per-package USE defaults from `package.use`
    pub fn pkg_use(&self) -> Result<&ChunkedSettings> {
        self.pkg_use.get_or_try_init(|| self.fold_chunked(|n| n.pkg_use()))
    }

    /// Forced USE flags for packages stable on the profile's arch
    pub fn stable_forced_use(&self) -> Result<&ChunkedSettings> {
        self.stable_forced_use
            .get_or_try_init(|| self.fold_chunked(|n| n.stable_forced_use()))
    }

    /// Masked USE flags for packages stable on the profile's arch
    pub fn stable_masked_use(&self) -> Result<&ChunkedSettings> {
        self.stable_masked_use
            .get_or_try_init(|| self.fold_chunked(|n| n.stable_masked_use()))
    }

    /// Environment from every `make.defaults`
    pub fn default_env(&self) -> Result<&DefaultEnv> {
        self.default_env.get_or_try_init(|| {
            let mut env = DefaultEnv::new();
            for node in self.nodes() {
                env.apply(node.make_defaults()?);
            }
            Ok(env)
        })
    }

    /// Virtual providers; later profiles win
    pub fn virtuals(&self) -> Result<&IndexMap<String, PackageAtom>> {
        self.virtuals.get_or_try_init(|| {
            let mut virtuals = IndexMap::new();
            for node in self.nodes() {
                for (name, atom) in node.virtuals()? {
                    virtuals.insert(name.clone(), atom.clone());
                }
            }
            Ok(virtuals)
        })
    }

    /// `profile.bashrc` files in stack order
    pub fn bashrc(&self) -> Vec<PathBuf> {
        self.nodes().filter_map(ProfileNode::bashrc).collect()
    }

    /// EAPI of the root profile
    pub fn eapi(&self) -> Result<&Eapi> {
        self.root().eapi()
    }

    /// Deprecation notice of the root profile
    pub fn deprecated(&self) -> Result<Option<&Deprecation>> {
        self.root().deprecated()
    }

    /// `ARCH` from the folded environment
    pub fn arch(&self) -> Result<Option<String>> {
        Ok(self
            .default_env()?
            .value("ARCH")
            .filter(|arch| !arch.is_empty()))
    }

    fn fold_diffs<T, F>(&self, get: F) -> Result<Vec<T>>
    where
        T: PartialEq + Clone,
        F: Fn(&ProfileNode) -> Result<&Diff<T>>,
    {
        let mut items = Vec::new();
        for node in self.nodes() {
            get(node)?.apply(&mut items);
        }
        Ok(items)
    }

    fn fold_chunked<F>(&self, get: F) -> Result<ChunkedSettings>
    where
        F: Fn(&ProfileNode) -> Result<&ChunkedSettings>,
    {
        let mut settings = ChunkedSettings::new();
        for node in self.nodes() {
            settings.merge(get(node)?);
        }
        settings.optimize();
        Ok(settings)
    }

    fn concat<F>(&self, get: F) -> Result<AtomTokens>
    where
        F: Fn(&ProfileNode) -> Result<&AtomTokens>,
    {
        let mut entries = Vec::new();
        for node in self.nodes() {
            entries.extend(get(node)?.iter().cloned());
        }
        Ok(entries)
    }
}

fn linearize(nodes: &[ProfileNode], idx: usize, order: &mut Vec<usize>) {
    for &parent in nodes[idx].parents() {
        linearize(nodes, parent, order);
    }
    order.push(idx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_linear_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "base/make.defaults", "ARCH=x86\n");
        write(dir.path(), "arch/parent", "../base\n");
        write(dir.path(), "arch/make.defaults", "ARCH=amd64\n");
        write(dir.path(), "leaf/parent", "../arch\n");

        let stack = ProfileStack::load(&dir.path().join("leaf"), ProfileOptions::default()).unwrap();
        let names: Vec<_> = stack
            .nodes()
            .map(|n| n.path().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["base", "arch", "leaf"]);
        assert_eq!(stack.arch().unwrap().as_deref(), Some("amd64"));
    }

    #[test]
    fn test_missing_parent() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "leaf/parent", "../nowhere\n");
        let err = ProfileStack::load(&dir.path().join("leaf"), ProfileOptions::default()).unwrap_err();
        assert_matches!(err, Error::ProfileNotFound(_));
    }

    #[test]
    fn test_cycle() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/parent", "../b\n");
        write(dir.path(), "b/parent", "../a\n");
        let err = ProfileStack::load(&dir.path().join("a"), ProfileOptions::default()).unwrap_err();
        assert_matches!(err, Error::CircularProfile(_));
    }
}
