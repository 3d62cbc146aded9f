//! Installing packages
//!
//! [`PackageManager`] bundles the local resolver with the acquirer. It backs
//! two callers:
//!
//! - the runtime's `import`, through [`PackageManager::ensure`], which makes a
//!   single dependency available and saves the importing project's lockfile
//! - `xel pkg add`, through an [`InstallSession`], which installs a package
//!   and its transitive dependencies and writes every touched lockfile once

use crate::acquirer::{AcquisitionSource, PackageAcquirer};
use crate::catalog::VersionCatalog;
use crate::compat::RuntimeVersions;
use crate::constraint::{is_latest, Constraint};
use crate::lockfile::{lockfile_path_for, Lockfile, LockfileStore};
use crate::resolver::{ResolvedPackage, VersionResolver};
use crate::{PackageError, Result};
use semver::Version;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use xel_config::{GlobalConfig, ProjectManifest};

/// `name[@constraint]` as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub constraint: Option<String>,
}

impl PackageSpec {
    /// Split at the `@` following the name. A leading `@` belongs to the
    /// name, so `@scope/pkg@^1.0.0` is accepted.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = || PackageError::InvalidPackageSpec(raw.to_string());

        let separators = raw.char_indices().skip(1).filter(|(_, c)| *c == '@').count();
        if separators > 1 {
            return Err(invalid());
        }

        let (name, constraint) = match raw.char_indices().skip(1).find(|(_, c)| *c == '@') {
            Some((at, _)) => {
                let constraint = raw[at + 1..].trim();
                let constraint = (!constraint.is_empty()).then(|| constraint.to_string());
                (&raw[..at], constraint)
            }
            None => (raw, None),
        };

        if name.is_empty() || name == "@" {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
            constraint,
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{}@{}", self.name, constraint),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed(AcquisitionSource),
    AlreadyInstalled,
}

/// Result of installing one package
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub version: Version,
    pub manifest_path: PathBuf,
    pub manifest: Arc<ProjectManifest>,
    pub status: InstallStatus,
    /// Constraint the package was installed for
    pub requested: String,
    /// Transitive installs triggered by this package
    pub dependencies: Vec<InstallOutcome>,
}

impl InstallOutcome {
    fn new(package: ResolvedPackage, status: InstallStatus, requested: String) -> Self {
        Self {
            name: package.name,
            version: package.version,
            manifest_path: package.manifest_path,
            manifest: package.manifest,
            status,
            requested,
            dependencies: Vec::new(),
        }
    }
}

/// Local resolution with acquisition as the fallback
pub struct PackageManager {
    resolver: VersionResolver,
    acquirer: PackageAcquirer,
    lockfile_guard: Mutex<()>,
}

impl PackageManager {
    pub fn new(resolver: VersionResolver, acquirer: PackageAcquirer) -> Self {
        Self {
            resolver,
            acquirer,
            lockfile_guard: Mutex::new(()),
        }
    }

    pub fn from_config(config: &GlobalConfig, versions: RuntimeVersions) -> Result<Self> {
        let catalog = VersionCatalog::new(config.module_paths.clone());
        Ok(Self::new(
            VersionResolver::new(catalog),
            PackageAcquirer::from_config(config, versions)?,
        ))
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    pub fn acquirer(&self) -> &PackageAcquirer {
        &self.acquirer
    }

    pub fn catalog(&self) -> &VersionCatalog {
        self.resolver.catalog()
    }

    pub fn session(&self) -> InstallSession<'_> {
        InstallSession::new(self)
    }

    /// Resolve `name` locally, acquiring it when nothing installed satisfies
    /// `constraint`. A changed lockfile is saved to `lockfile_path`.
    ///
    /// Unlike `xel pkg add`, `latest` is satisfied by any installed version
    /// here, so repeated imports never reach the source.
    pub fn ensure(&self, name: &str, constraint: &str, lockfile_path: &Path) -> Result<ResolvedPackage> {
        let parsed = Constraint::parse(constraint)?;
        if let Ok(found) = self.resolver.resolve_with(name, &parsed) {
            return Ok(found);
        }

        let _guard = self.lockfile_guard.lock().unwrap_or_else(|e| e.into_inner());
        // Another import may have installed it while we waited.
        self.catalog().invalidate(name);
        if let Ok(found) = self.resolver.resolve_with(name, &parsed) {
            return Ok(found);
        }

        let mut lockfile = Lockfile::load(lockfile_path)?;
        let before = lockfile.clone();
        let acquired = self.acquirer.acquire(name, constraint, &mut lockfile)?;
        if lockfile != before {
            lockfile.save(lockfile_path)?;
        }

        self.catalog().invalidate(name);
        self.catalog().invalidate(&acquired.manifest.name);
        Ok(acquired.into_resolved())
    }
}

/// One `add` run: installs packages with their dependencies and writes the
/// touched lockfiles on [`finish`](InstallSession::finish)
pub struct InstallSession<'a> {
    manager: &'a PackageManager,
    lockfiles: LockfileStore,
    visiting: HashSet<String>,
}

impl<'a> InstallSession<'a> {
    pub fn new(manager: &'a PackageManager) -> Self {
        Self {
            manager,
            lockfiles: LockfileStore::new(),
            visiting: HashSet::new(),
        }
    }

    /// Install `spec` and, when newly acquired, its declared dependencies.
    ///
    /// Without an explicit constraint the one `declared` for the name is
    /// used, then `*`. Without a `lockfile_path` the package is installed
    /// globally and nothing is pinned for it.
    pub fn add(
        &mut self,
        spec: &PackageSpec,
        lockfile_path: Option<&Path>,
        declared: Option<&ProjectManifest>,
    ) -> Result<InstallOutcome> {
        let constraint = spec
            .constraint
            .clone()
            .or_else(|| {
                declared
                    .and_then(|m| m.dependency(&spec.name))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "*".to_string());
        let parsed = Constraint::parse(&constraint)?;

        if !is_latest(&constraint) {
            if let Ok(found) = self.manager.resolver.resolve_with(&spec.name, &parsed) {
                tracing::debug!(name = %spec.name, version = %found.version, "already installed");
                return Ok(InstallOutcome::new(found, InstallStatus::AlreadyInstalled, constraint));
            }
        }

        let mut lockfile = match lockfile_path {
            Some(path) => self.lockfiles.load(path)?,
            None => Lockfile::new(),
        };
        let acquired = self
            .manager
            .acquirer
            .acquire(&spec.name, &constraint, &mut lockfile)?;
        if let Some(path) = lockfile_path {
            self.lockfiles.store(path, lockfile);
        }

        let catalog = self.manager.catalog();
        catalog.invalidate(&spec.name);
        catalog.invalidate(&acquired.manifest.name);

        let status = InstallStatus::Installed(acquired.source);
        let mut outcome = InstallOutcome::new(acquired.into_resolved(), status, constraint);

        if self.visiting.insert(format!("{}@{}", outcome.name, outcome.version)) {
            let nested_lockfile = lockfile_path_for(&outcome.manifest_path);
            let manifest = Arc::clone(&outcome.manifest);
            for (name, constraint) in manifest.dependencies() {
                let dependency = PackageSpec {
                    name: name.to_string(),
                    constraint: Some(constraint.to_string()),
                };
                let installed = self.add(&dependency, Some(&nested_lockfile), Some(&manifest))?;
                outcome.dependencies.push(installed);
            }
        }
        Ok(outcome)
    }

    /// Write every lockfile changed during the session
    pub fn finish(self) -> Result<()> {
        self.lockfiles.flush()
    }
}
