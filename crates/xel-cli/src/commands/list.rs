//! List declared dependencies (xel pkg list)

use super::find_manifest;
use anyhow::Result;
use std::path::Path;
use xel_config::ProjectManifest;
use xel_package::PackageError;

/// Run the list command
pub fn run(project_dir: &Path) -> Result<()> {
    let located = find_manifest(project_dir)?
        .ok_or_else(|| PackageError::ManifestNotFound(project_dir.to_path_buf()))?;
    print!("{}", render(&located.manifest));
    Ok(())
}

/// `name@constraint` lines sorted by name
pub fn render(manifest: &ProjectManifest) -> String {
    let mut deps: Vec<(&str, &str)> = manifest.dependencies().collect();
    if deps.is_empty() {
        return "No packages installed\n".to_string();
    }
    deps.sort_unstable_by_key(|(name, _)| *name);
    deps.iter()
        .map(|(name, constraint)| format!("{}@{}\n", name, constraint))
        .collect()
}
