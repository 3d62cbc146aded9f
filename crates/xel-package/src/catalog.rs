//! Locally installed package versions
//!
//! Packages live at `<module path>/<package dir>/<version>/xel.json`. The
//! catalog scans every configured module path for a name and keeps the result
//! until it is invalidated.

use crate::constraint::parse_version;
use crate::read_manifest;
use semver::Version;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use xel_config::{ProjectManifest, MANIFEST_FILE};

/// One installed version of a package
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest: Arc<ProjectManifest>,
}

/// Per-name cache of installed versions
#[derive(Debug)]
pub struct VersionCatalog {
    module_paths: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Arc<Vec<CatalogEntry>>>>,
}

impl VersionCatalog {
    pub fn new(module_paths: Vec<PathBuf>) -> Self {
        Self {
            module_paths,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn module_paths(&self) -> &[PathBuf] {
        &self.module_paths
    }

    /// Installed versions of `name`, ascending
    pub fn versions(&self, name: &str) -> Arc<Vec<CatalogEntry>> {
        if let Some(entries) = self.lock().get(name) {
            tracing::debug!(name, "version cache hit");
            return Arc::clone(entries);
        }

        let entries = Arc::new(self.scan(name));
        tracing::debug!(name, found = entries.len(), "scanned module paths");
        // Keep whichever scan landed first so concurrent callers agree.
        Arc::clone(
            self.lock()
                .entry(name.to_string())
                .or_insert(entries),
        )
    }

    /// Forget the cached versions of `name`
    pub fn invalidate(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Forget every cached name
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn scan(&self, name: &str) -> Vec<CatalogEntry> {
        if self.module_paths.is_empty() {
            tracing::warn!("no module paths configured");
        }

        let mut entries: Vec<CatalogEntry> = Vec::new();
        for root in &self.module_paths {
            for package_dir in subdirectories(root) {
                for version_dir in subdirectories(&package_dir) {
                    if let Some(entry) = read_entry(name, &version_dir) {
                        // The first module path wins on duplicates.
                        if !entries.iter().any(|e| e.version == entry.version) {
                            entries.push(entry);
                        }
                    }
                }
            }
        }
        entries.sort_by(|a, b| a.version.cmp(&b.version));
        entries
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<CatalogEntry>>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read.filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect()
}

/// Read a version directory, rejecting anything whose manifest disagrees with
/// the requested name or with the directory's version
fn read_entry(name: &str, version_dir: &Path) -> Option<CatalogEntry> {
    let dir_name = version_dir.file_name()?.to_str()?;
    let version = parse_version(dir_name).ok()?;
    let manifest_path = version_dir.join(MANIFEST_FILE);
    let manifest = read_manifest(&manifest_path).ok()?;

    if manifest.name != name {
        return None;
    }
    if manifest.version != version.to_string() {
        tracing::debug!(
            dir = %version_dir.display(),
            declared = %manifest.version,
            "manifest version does not match its directory, skipping"
        );
        return None;
    }

    Some(CatalogEntry {
        version,
        manifest_path,
        manifest: Arc::new(manifest),
    })
}
