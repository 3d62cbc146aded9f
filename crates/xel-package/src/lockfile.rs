//! Package lockfile (xel.lock) for reproducible installs
//!
//! The lockfile is a flat JSON object mapping a dependency name to the exact
//! source it was installed from:
//!
//! ```json
//! {
//!   "http": {
//!     "algorithm": "sha256",
//!     "hash": "9f86d0...",
//!     "url": "https://cdn.example.com/http-1.2.0.tar.gz",
//!     "version": "1.2.0"
//!   }
//! }
//! ```

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// File name of the lockfile, stored next to `xel.json`
pub const LOCKFILE_NAME: &str = "xel.lock";

/// Lockfile path for a manifest path
pub fn lockfile_path_for(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LOCKFILE_NAME)
}

/// Exact source of an installed dependency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockedSource {
    pub algorithm: String,
    pub hash: String,
    pub url: String,
    pub version: String,
}

/// Lockfile structure (xel.lock)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Lockfile {
    entries: BTreeMap<String, LockedSource>,
}

impl Lockfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse lockfile from a JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_str(content)?)
    }

    /// Load a lockfile; a missing file is an empty lockfile
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize to pretty JSON
    pub fn to_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rewrite the whole lockfile
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string()?)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LockedSource> {
        self.entries.get(name)
    }

    /// Pin a dependency, replacing any previous pin
    pub fn set(&mut self, name: impl Into<String>, source: LockedSource) {
        self.entries.insert(name.into(), source);
    }

    pub fn remove(&mut self, name: &str) -> Option<LockedSource> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LockedSource)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug)]
struct StoredLockfile {
    lockfile: Lockfile,
    dirty: bool,
}

/// Every lockfile touched by one install session.
///
/// Lockfiles are loaded once, updated in memory, and written by a single
/// [`flush`](LockfileStore::flush) at the end of the session.
#[derive(Debug, Default)]
pub struct LockfileStore {
    files: Mutex<BTreeMap<PathBuf, StoredLockfile>>,
}

impl LockfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of the lockfile at `path`, loading it on first use
    pub fn load(&self, path: &Path) -> Result<Lockfile> {
        let mut files = self.lock();
        if let Some(stored) = files.get(path) {
            return Ok(stored.lockfile.clone());
        }
        let lockfile = Lockfile::load(path)?;
        files.insert(
            path.to_path_buf(),
            StoredLockfile {
                lockfile: lockfile.clone(),
                dirty: false,
            },
        );
        Ok(lockfile)
    }

    /// Replace the in-memory lockfile at `path`
    pub fn store(&self, path: &Path, lockfile: Lockfile) {
        let mut files = self.lock();
        match files.get_mut(path) {
            Some(stored) => {
                if stored.lockfile != lockfile {
                    stored.lockfile = lockfile;
                    stored.dirty = true;
                }
            }
            None => {
                files.insert(
                    path.to_path_buf(),
                    StoredLockfile {
                        lockfile,
                        dirty: true,
                    },
                );
            }
        }
    }

    /// Write every changed lockfile
    pub fn flush(&self) -> Result<()> {
        let mut files = self.lock();
        for (path, stored) in files.iter_mut().filter(|(_, s)| s.dirty) {
            stored.lockfile.save(path)?;
            stored.dirty = false;
            tracing::debug!(path = %path.display(), "lockfile written");
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, StoredLockfile>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn source(version: &str) -> LockedSource {
        LockedSource {
            algorithm: "sha256".to_string(),
            hash: "abc123".to_string(),
            url: format!("https://cdn.example.com/foo-{}.tar.gz", version),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let lockfile = Lockfile::load(&temp.path().join(LOCKFILE_NAME)).unwrap();
        assert!(lockfile.is_empty());
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LOCKFILE_NAME);

        let mut lockfile = Lockfile::new();
        lockfile.set("foo", source("1.2.0"));
        lockfile.set("bar", source("0.3.1"));
        lockfile.save(&path).unwrap();

        let loaded = Lockfile::load(&path).unwrap();
        assert_eq!(loaded, lockfile);
        assert_eq!(loaded.get("foo"), Some(&source("1.2.0")));
    }

    #[test]
    fn test_flat_schema() {
        let mut lockfile = Lockfile::new();
        lockfile.set("foo", source("1.0.0"));

        insta::assert_snapshot!(lockfile.to_string().unwrap(), @r###"
        {
          "foo": {
            "algorithm": "sha256",
            "hash": "abc123",
            "url": "https://cdn.example.com/foo-1.0.0.tar.gz",
            "version": "1.0.0"
          }
        }
        "###);
    }

    #[test]
    fn test_remove() {
        let mut lockfile = Lockfile::new();
        lockfile.set("foo", source("1.0.0"));
        assert!(lockfile.remove("foo").is_some());
        assert!(lockfile.remove("foo").is_none());
        assert!(!lockfile.contains("foo"));
    }

    #[test]
    fn test_lockfile_path_for_manifest() {
        assert_eq!(
            lockfile_path_for(Path::new("/proj/xel.json")),
            PathBuf::from("/proj/xel.lock")
        );
    }

    #[test]
    fn test_store_writes_only_changed_files() {
        let temp = TempDir::new().unwrap();
        let touched = temp.path().join("a.lock");
        let untouched = temp.path().join("b.lock");

        let store = LockfileStore::new();
        let mut lockfile = store.load(&touched).unwrap();
        lockfile.set("foo", source("1.0.0"));
        store.store(&touched, lockfile);
        store.load(&untouched).unwrap();
        store.flush().unwrap();

        assert!(touched.exists());
        assert!(!untouched.exists());
        assert!(store.load(&touched).unwrap().contains("foo"));
    }
}
