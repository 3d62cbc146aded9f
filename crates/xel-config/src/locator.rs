//! Manifest discovery
//!
//! Walks from a starting directory towards the filesystem root looking for
//! `xel.json`, memoizing both hits and misses per directory.

use crate::manifest::ProjectManifest;
use crate::{ConfigResult, MANIFEST_FILE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A manifest found on disk together with the path it was read from
#[derive(Debug, Clone)]
pub struct LocatedManifest {
    pub manifest: Arc<ProjectManifest>,
    pub path: PathBuf,
}

impl LocatedManifest {
    /// Directory containing the manifest (the project root)
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Found(LocatedManifest),
    NotFound,
}

/// Upward manifest search with a per-directory cache
#[derive(Debug, Default)]
pub struct ManifestLocator {
    cache: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl ManifestLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the nearest manifest at or above `dir`
    pub fn locate_from(&self, dir: &Path) -> ConfigResult<Option<LocatedManifest>> {
        self.locate(dir, dir)
    }

    /// Find the nearest manifest at or above `start`.
    ///
    /// `original` is the directory the search was first issued from; a hit is
    /// cached under both the directory it was found in and `original`, a miss
    /// is cached under `original` only. Parse failures are returned and never
    /// cached.
    pub fn locate(&self, start: &Path, original: &Path) -> ConfigResult<Option<LocatedManifest>> {
        let mut current = start.to_path_buf();
        loop {
            if let Some(entry) = self.lock().get(&current) {
                tracing::debug!(dir = %current.display(), "manifest cache hit");
                return Ok(match entry {
                    CacheEntry::Found(found) => Some(found.clone()),
                    CacheEntry::NotFound => None,
                });
            }

            let candidate = current.join(MANIFEST_FILE);
            if candidate.is_file() {
                let manifest = ProjectManifest::from_file(&candidate)?;
                let located = LocatedManifest {
                    manifest: Arc::new(manifest),
                    path: candidate,
                };

                let mut cache = self.lock();
                cache.insert(current.clone(), CacheEntry::Found(located.clone()));
                if current != original {
                    cache.insert(original.to_path_buf(), CacheEntry::Found(located.clone()));
                }
                return Ok(Some(located));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        tracing::debug!(dir = %original.display(), "no manifest found");
        self.lock()
            .insert(original.to_path_buf(), CacheEntry::NotFound);
        Ok(None)
    }

    /// Drop cached entries that resolve to the manifest in `dir`, plus `dir` itself
    pub fn invalidate(&self, dir: &Path) {
        let manifest_path = dir.join(MANIFEST_FILE);
        self.lock().retain(|key, entry| {
            if key == dir {
                return false;
            }
            match entry {
                CacheEntry::Found(found) => found.path != manifest_path,
                CacheEntry::NotFound => !key.starts_with(dir),
            }
        });
    }

    /// Forget every cached lookup
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, CacheEntry>> {
        // Entries are plain data; a poisoned map is still consistent.
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
