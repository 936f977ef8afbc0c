//! Profile detection for buckos-profile
//!
//! Finds the active profile directory when none is given on the command
//! line. The profile is normally a `make.profile` symlink pointing into a
//! repository's `profiles/` tree.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Standard `make.profile` locations (in search order)
pub const STANDARD_PROFILE_LOCATIONS: &[&str] = &[
    "/etc/buckos/make.profile",  // Buckos system configuration
    "/etc/portage/make.profile", // Gentoo-compatible location
];

/// Files at least one of which every profile directory carries
const PROFILE_MARKERS: &[&str] = &["parent", "make.defaults", "eapi", "packages"];

/// Detect the profile directory
///
/// Searches in order:
/// 1. User-specified path (if provided via --profile)
/// 2. BUCKOS_PROFILE environment variable
/// 3. /etc/buckos/make.profile
/// 4. /etc/portage/make.profile
///
/// Returns the canonicalized profile directory.
pub fn detect_profile_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom_path {
        return validate_profile(path);
    }

    if let Some(env_path) = std::env::var_os("BUCKOS_PROFILE") {
        let path = PathBuf::from(env_path);
        match validate_profile(&path) {
            Ok(p) => {
                info!("Using profile from BUCKOS_PROFILE: {}", p.display());
                return Ok(p);
            }
            Err(e) => warn!("BUCKOS_PROFILE set but invalid: {:#}", e),
        }
    }

    for location in STANDARD_PROFILE_LOCATIONS {
        let path = Path::new(location);
        if path.exists() {
            if let Ok(p) = validate_profile(path) {
                info!("Found profile at: {}", p.display());
                return Ok(p);
            }
        }
    }

    bail!(
        "Could not find an active profile.\n\
        \n\
        Searched locations:\n{}\n\
        \n\
        Set BUCKOS_PROFILE, use --profile, or point /etc/buckos/make.profile at a profile directory.",
        STANDARD_PROFILE_LOCATIONS
            .iter()
            .map(|p| format!("  - {}", p))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// Validate that a path looks like a profile directory
pub fn validate_profile(path: &Path) -> Result<PathBuf> {
    let canonical_path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve profile path: {}", path.display()))?;

    if !canonical_path.is_dir() {
        bail!("Profile path is not a directory: {}", canonical_path.display());
    }

    if !PROFILE_MARKERS
        .iter()
        .any(|marker| canonical_path.join(marker).exists())
    {
        bail!(
            "Not a profile directory: {} (expected one of {})",
            canonical_path.display(),
            PROFILE_MARKERS.join(", ")
        );
    }

    Ok(canonical_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_standard_locations_defined() {
        assert_eq!(STANDARD_PROFILE_LOCATIONS[0], "/etc/buckos/make.profile");
    }

    #[test]
    fn test_explicit_path() {
        let dir = TempDir::new().unwrap();
        assert!(detect_profile_path(Some(dir.path())).is_err());

        std::fs::write(dir.path().join("make.defaults"), "ARCH=amd64\n").unwrap();
        let found = detect_profile_path(Some(dir.path())).unwrap();
        assert_eq!(found, dir.path().canonicalize().unwrap());
    }
}
