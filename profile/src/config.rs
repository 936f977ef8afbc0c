//! Resolver configuration
//!
//! Where the profile and user configuration live, read from a TOML file:
//!
//! ```toml
//! profile = "/etc/buckos/make.profile"
//! user_config = "/etc/buckos"
//! license_groups = "/var/db/repos/gentoo/profiles/license_groups"
//! arch = "amd64"
//!
//! [options]
//! pms_strict = true
//! eapi_strict = false
//! ```

use crate::domain::{Domain, UserConfig};
use crate::license::LicenseGroups;
use crate::node::ProfileOptions;
use crate::stack::ProfileStack;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default profile link
pub const DEFAULT_PROFILE: &str = "/etc/buckos/make.profile";

/// Default user configuration directory
pub const DEFAULT_USER_CONFIG: &str = "/etc/buckos";

/// Inputs for building a [`Domain`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Profile directory (usually the `make.profile` symlink)
    pub profile: PathBuf,
    /// Directory holding make.conf and the package.* files
    pub user_config: PathBuf,
    /// `license_groups` file
    pub license_groups: Option<PathBuf>,
    /// Overrides the profile's ARCH
    pub arch: Option<String>,
    /// Profile parsing strictness
    pub options: ProfileOptions,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            profile: PathBuf::from(DEFAULT_PROFILE),
            user_config: PathBuf::from(DEFAULT_USER_CONFIG),
            license_groups: None,
            arch: None,
            options: ProfileOptions::default(),
        }
    }
}

impl ResolverConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load the configured profile stack
    pub fn load_stack(&self) -> Result<ProfileStack> {
        ProfileStack::load(&self.profile, self.options)
    }

    /// Load the user configuration; a missing directory is empty
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config.is_dir() {
            debug!(
                "No user configuration at {}, using defaults",
                self.user_config.display()
            );
            return Ok(UserConfig::default());
        }
        UserConfig::load(&self.user_config)
    }

    /// Load the license groups, empty when none are configured
    pub fn load_license_groups(&self) -> Result<LicenseGroups> {
        match &self.license_groups {
            Some(path) => LicenseGroups::load(path),
            None => Ok(LicenseGroups::new()),
        }
    }

    /// Build the domain described by this configuration
    pub fn build_domain(&self) -> Result<Domain> {
        Domain::with_arch(
            self.load_stack()?,
            self.load_user_config()?,
            self.load_license_groups()?,
            self.arch.clone(),
        )
    }
}
