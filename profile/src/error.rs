//! Error types for profile and configuration resolution

use std::path::PathBuf;
use thiserror::Error;

/// Profile resolution errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid package atom: {0}")]
    InvalidAtom(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Unsupported restriction scope: {0}")]
    InvalidScope(String),

    #[error("Unsupported EAPI: {0}")]
    UnsupportedEapi(String),

    #[error("{filename} requires {requirement}, profile declares EAPI {eapi}")]
    EapiRestricted {
        filename: String,
        eapi: String,
        requirement: String,
    },

    #[error("Profile not found: {}", .0.display())]
    ProfileNotFound(PathBuf),

    #[error("Circular profile inheritance: {}", .0.display())]
    CircularProfile(PathBuf),

    #[error("Failed parsing {filename} in profile {}: {source}", .path.display())]
    Profile {
        path: PathBuf,
        filename: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed parsing {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with the profile file it came from.
    ///
    /// Already-wrapped errors are returned untouched so parents don't stack
    /// context on top of a child's failure.
    pub fn in_profile(self, path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        match self {
            err @ Error::Profile { .. } => err,
            err => Error::Profile {
                path: path.into(),
                filename: filename.into(),
                source: Box::new(err),
            },
        }
    }

    /// Wrap an error with the user configuration file it came from
    pub fn in_config(self, path: impl Into<PathBuf>) -> Self {
        match self {
            err @ Error::Config { .. } => err,
            err => Error::Config {
                path: path.into(),
                source: Box::new(err),
            },
        }
    }
}

/// Result type alias for profile resolution
pub type Result<T> = std::result::Result<T, Error>;
