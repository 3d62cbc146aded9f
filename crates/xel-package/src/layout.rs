//! Install directory layout
//!
//! `<module path>/mod-<sha256 hex of source id>/<version>/`, where the source
//! id is the registry name or the git URL.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directory holding every installed version of a source
pub fn package_dir(module_path: &Path, source_id: &str) -> PathBuf {
    let digest = Sha256::digest(source_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    module_path.join(format!("mod-{}", hex))
}

/// Directory holding one installed version
pub fn install_dir(module_path: &Path, source_id: &str, version: &str) -> PathBuf {
    package_dir(module_path, source_id).join(version)
}

/// Remove a directory tree, ignoring one that is already gone
pub(crate) fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove directory");
        }
    }
}
