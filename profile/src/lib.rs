//! Buckos Profile Resolution
//!
//! This crate resolves Gentoo-style profiles and user configuration into
//! per-package decisions: whether a package is visible (masks, keywords,
//! licenses) and which USE flags it is built with.
//!
//! # Overview
//!
//! - [`incremental`]: `flag` / `-flag` / `-*` token folding
//! - [`classifier`]: global, category and per-atom override lookup
//! - [`chunked`]: layered per-package settings across profiles
//! - [`node`]: one profile directory and its files
//! - [`stack`]: profile inheritance and folded settings
//! - [`env`]: make.defaults parsing and variable stacking
//! - [`domain`]: profile plus user configuration, queried per package
//! - [`config`]: resolver configuration (TOML)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use buckos_profile::{Package, ResolverConfig};
//!
//! let domain = ResolverConfig::default().build_domain().unwrap();
//! let pkg = Package::parse_cpv("app-editors/vim-9.0.1")
//!     .unwrap()
//!     .with_keywords("amd64 ~arm64")
//!     .with_iuse("+acl X python");
//!
//! println!("visible: {:?}", domain.visibility(&pkg));
//! println!("USE: {:?}", domain.use_state(&pkg).enabled);
//! ```
//!
//! # Profile Layout
//!
//! ```text
//! profiles/default/linux/amd64/
//! ├── eapi                   # EAPI of the files in this directory
//! ├── parent                 # Profiles inherited from, in order
//! ├── make.defaults          # ARCH, USE, ACCEPT_KEYWORDS, ...
//! ├── packages               # System set and visibility atoms
//! ├── package.mask           # Masked atoms
//! ├── package.unmask         # Unmasked atoms
//! ├── package.use            # Per-package USE defaults
//! ├── use.force / use.mask   # Forced and masked flags
//! ├── package.use.force      # Per-package forced flags
//! ├── package.use.mask       # Per-package masked flags
//! └── profile.bashrc         # Hook sourced by the build environment
//! ```

// Collaborators
pub mod atom;
pub mod eapi;
pub mod error;
pub mod license;
pub mod package;
pub mod reader;
pub mod scope;
pub mod version;

// Resolution
pub mod chunked;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod env;
pub mod incremental;
pub mod node;
pub mod stack;

// Re-exports for convenience
pub use atom::{PackageAtom, UseDep, VersionOp};
pub use chunked::{ChunkedRecord, ChunkedSettings};
pub use classifier::{NonIncrementalClassifier, OverrideClassifier};
pub use config::ResolverConfig;
pub use domain::{Domain, HiddenReason, UseState, UserConfig, Visibility};
pub use eapi::{Eapi, EapiOptions};
pub use env::{DefaultEnv, EnvValue};
pub use error::{Error, Result};
pub use incremental::{Token, WorkingSet};
pub use license::LicenseGroups;
pub use node::{Deprecation, ProfileNode, ProfileOptions};
pub use package::Package;
pub use scope::{PackageRestriction, Scope};
pub use stack::ProfileStack;
pub use version::Version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ChunkedSettings, Domain, Error, LicenseGroups, Package, PackageAtom, ProfileOptions,
        ProfileStack, ResolverConfig, Result, Scope, Token, UseState, UserConfig, Visibility,
    };
}
