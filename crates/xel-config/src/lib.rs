//! Xel Configuration System
//!
//! Provides configuration management for Xel projects including:
//! - Global user configuration (~/.xel/config.json)
//! - Project manifests (xel.json)
//! - Upward manifest discovery with a per-directory cache
//!
//! # Configuration Hierarchy
//!
//! User configuration is loaded in the following order (later overrides earlier):
//! 1. Built-in defaults (written to ~/.xel/config.json on first use)
//! 2. Global config file (~/.xel/config.json)
//! 3. Environment variables (XEL_*)
//!
//! # Example
//!
//! ```no_run
//! use xel_config::{ConfigLoader, ManifestLocator};
//! use std::path::Path;
//!
//! let config = ConfigLoader::new().load().unwrap();
//! let locator = ManifestLocator::new();
//! let project = locator.locate_from(Path::new(".")).unwrap();
//! ```

pub mod global;
pub mod loader;
pub mod locator;
pub mod manifest;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {file}: {error}")]
    Json {
        file: PathBuf,
        error: serde_json::Error,
    },

    #[error("failed to parse manifest at {path}: {error}")]
    ManifestParse {
        path: PathBuf,
        error: serde_json::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// File name of the project manifest
pub const MANIFEST_FILE: &str = "xel.json";

// Re-export main types
pub use global::GlobalConfig;
pub use loader::ConfigLoader;
pub use locator::{LocatedManifest, ManifestLocator};
pub use manifest::ProjectManifest;
