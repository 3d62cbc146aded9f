//! Remove packages (xel pkg remove)
//!
//! A local removal drops the dependency from `xel.json` and its pin from
//! `xel.lock`. A global removal deletes the installed version directory.

use super::{find_manifest, green_check, yellow_warning};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use xel_config::LocatedManifest;
use xel_package::{lockfile_path_for, Lockfile, PackageManager, PackageSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    Local,
    Global,
    /// Local for declared dependencies, global otherwise
    Auto,
}

impl RemoveMode {
    pub fn from_flags(global: bool, local: bool) -> Result<Self> {
        match (global, local) {
            (true, true) => bail!("--global and --local cannot be used together"),
            (true, false) => Ok(Self::Global),
            (false, true) => Ok(Self::Local),
            (false, false) => Ok(Self::Auto),
        }
    }
}

/// Arguments for the remove command
#[derive(Debug, Clone)]
pub struct RemoveArgs {
    /// `name[@constraint]` specs
    pub packages: Vec<String>,
    pub mode: RemoveMode,
    /// Project directory (defaults to current)
    pub project_dir: PathBuf,
}

/// Run the remove command
pub fn run(args: RemoveArgs, manager: &PackageManager) -> Result<()> {
    if args.packages.is_empty() {
        bail!("No packages specified");
    }
    let specs = args
        .packages
        .iter()
        .map(|raw| PackageSpec::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let located = find_manifest(&args.project_dir)?;
    let mut local = located.map(LocalProject::new).transpose()?;

    for spec in &specs {
        let declared = local
            .as_ref()
            .is_some_and(|project| project.declares(&spec.name));
        let mode = match args.mode {
            RemoveMode::Auto if declared => RemoveMode::Local,
            RemoveMode::Auto => RemoveMode::Global,
            mode => mode,
        };

        match mode {
            RemoveMode::Local => {
                let Some(project) = local.as_mut() else {
                    bail!("No xel.json found in {} or its parents", args.project_dir.display());
                };
                if project.remove(&spec.name) {
                    println!("  {} Removed {} from dependencies", green_check(), spec.name);
                } else {
                    println!(
                        "  {} {} is not a dependency of this project",
                        yellow_warning(),
                        spec.name
                    );
                }
            }
            _ => remove_global(spec, manager)?,
        }
    }

    if let Some(project) = local {
        project.save()?;
    }
    Ok(())
}

/// Delete the installed version that `spec` resolves to
fn remove_global(spec: &PackageSpec, manager: &PackageManager) -> Result<()> {
    let constraint = spec.constraint.as_deref().unwrap_or("*");
    let package = manager
        .resolver()
        .resolve(&spec.name, constraint)
        .with_context(|| format!("Failed to find installed package {}", spec))?;

    let dir = package.root().to_path_buf();
    fs::remove_dir_all(&dir).with_context(|| format!("Failed to delete {}", dir.display()))?;
    manager.catalog().invalidate(&spec.name);
    manager.catalog().invalidate(&package.manifest.name);
    tracing::info!(name = %spec.name, version = %package.version, "removed installed package");

    println!(
        "  {} Deleted {}@{} from {}",
        green_check(),
        spec.name,
        package.version,
        dir.display()
    );
    Ok(())
}

/// Manifest and lockfile of the current project, written back once
struct LocalProject {
    located: LocatedManifest,
    manifest: xel_config::ProjectManifest,
    lockfile_path: PathBuf,
    lockfile: Lockfile,
    changed: bool,
}

impl LocalProject {
    fn new(located: LocatedManifest) -> Result<Self> {
        let lockfile_path = lockfile_path_for(&located.path);
        let lockfile = Lockfile::load(&lockfile_path)
            .with_context(|| format!("Failed to read {}", lockfile_path.display()))?;
        Ok(Self {
            manifest: located.manifest.as_ref().clone(),
            located,
            lockfile_path,
            lockfile,
            changed: false,
        })
    }

    fn declares(&self, name: &str) -> bool {
        self.manifest.has_dependency(name)
    }

    fn remove(&mut self, name: &str) -> bool {
        let removed = self.manifest.remove_dependency(name).is_some();
        let unlocked = self.lockfile.remove(name).is_some();
        self.changed |= removed || unlocked;
        removed
    }

    fn save(self) -> Result<()> {
        if !self.changed {
            return Ok(());
        }
        self.manifest
            .write_to_file(&self.located.path)
            .with_context(|| format!("Failed to write {}", self.located.path.display()))?;
        if self.lockfile_path.exists() || !self.lockfile.is_empty() {
            self.lockfile
                .save(&self.lockfile_path)
                .with_context(|| format!("Failed to write {}", self.lockfile_path.display()))?;
        }
        Ok(())
    }
}
