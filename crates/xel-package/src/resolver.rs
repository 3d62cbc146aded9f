//! Local version resolution

use crate::catalog::VersionCatalog;
use crate::constraint::Constraint;
use crate::{PackageError, Result};
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xel_config::ProjectManifest;

/// An installed package selected for a constraint
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest: Arc<ProjectManifest>,
}

impl ResolvedPackage {
    /// Directory holding the package
    pub fn root(&self) -> &Path {
        self.manifest_path.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Entry file named by the package's `main`
    pub fn entry_point(&self) -> PathBuf {
        self.root().join(&self.manifest.main)
    }
}

/// Selects the highest installed version satisfying a constraint
#[derive(Debug)]
pub struct VersionResolver {
    catalog: VersionCatalog,
}

impl VersionResolver {
    pub fn new(catalog: VersionCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    /// Resolve `name` against a constraint string (aliases allowed)
    pub fn resolve(&self, name: &str, constraint: &str) -> Result<ResolvedPackage> {
        let parsed = Constraint::parse(constraint)?;
        self.resolve_with(name, &parsed)
    }

    /// Resolve `name` against an already parsed constraint
    pub fn resolve_with(&self, name: &str, constraint: &Constraint) -> Result<ResolvedPackage> {
        let entries = self.catalog.versions(name);
        entries
            .iter()
            .rev()
            .find(|entry| constraint.matches(&entry.version))
            .map(|entry| ResolvedPackage {
                name: name.to_string(),
                version: entry.version.clone(),
                manifest_path: entry.manifest_path.clone(),
                manifest: Arc::clone(&entry.manifest),
            })
            .ok_or_else(|| PackageError::NoSatisfyingVersion {
                name: name.to_string(),
                constraint: constraint.to_string(),
            })
    }
}
