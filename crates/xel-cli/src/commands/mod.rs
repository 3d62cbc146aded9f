pub mod add;
pub mod list;
pub mod remove;

use anyhow::{Context, Result};
use std::path::Path;
use xel_config::{ConfigLoader, LocatedManifest, ManifestLocator};
use xel_package::{PackageManager, RuntimeVersions};

/// Package manager built from the global configuration
pub fn package_manager(versions: RuntimeVersions) -> Result<PackageManager> {
    let config = ConfigLoader::new()
        .load()
        .context("Failed to load xel configuration")?;
    PackageManager::from_config(&config, versions).context("Failed to set up package manager")
}

/// Nearest `xel.json` at or above `dir`
pub fn find_manifest(dir: &Path) -> Result<Option<LocatedManifest>> {
    let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    ManifestLocator::new()
        .locate_from(&dir)
        .with_context(|| format!("Failed to read manifest above {}", dir.display()))
}

/// Green checkmark
fn green_check() -> String {
    use colored::Colorize;
    "\u{2713}".green().to_string()
}

/// Yellow warning sign
fn yellow_warning() -> String {
    use colored::Colorize;
    "\u{26a0}".yellow().to_string()
}
