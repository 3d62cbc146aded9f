//! Install packages (xel pkg add)

use super::{find_manifest, green_check, yellow_warning};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use xel_package::constraint::Constraint;
use xel_package::{
    lockfile_path_for, AcquisitionSource, InstallOutcome, InstallStatus, PackageManager,
    PackageSpec,
};

/// Arguments for the add command
#[derive(Debug, Clone)]
pub struct AddArgs {
    /// `name[@constraint]` specs; empty installs every declared dependency
    pub packages: Vec<String>,
    /// Project directory (defaults to current)
    pub project_dir: PathBuf,
}

/// Run the add command.
///
/// Outside a project the packages are installed globally: nothing is recorded
/// and no project lockfile is written.
pub fn run(args: AddArgs, manager: &PackageManager) -> Result<()> {
    let located = find_manifest(&args.project_dir)?;
    let mut manifest = located.as_ref().map(|found| found.manifest.as_ref().clone());
    let lockfile_path = located.as_ref().map(|found| lockfile_path_for(&found.path));

    let record = !args.packages.is_empty();
    let specs = if record {
        args.packages
            .iter()
            .map(|raw| PackageSpec::parse(raw))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        manifest
            .iter()
            .flat_map(|manifest| manifest.dependencies())
            .map(|(name, constraint)| PackageSpec {
                name: name.to_string(),
                constraint: Some(constraint.to_string()),
            })
            .collect()
    };

    if specs.is_empty() {
        println!("No dependencies to install");
        return Ok(());
    }
    if located.is_none() {
        println!(
            "{} No xel.json found in {} or its parents, installing globally",
            yellow_warning(),
            args.project_dir.display()
        );
    }

    let mut session = manager.session();
    for spec in &specs {
        let outcome = session
            .add(spec, lockfile_path.as_deref(), manifest.as_ref())
            .with_context(|| format!("Failed to install {}", spec))?;
        warn_on_pin_mismatch(spec, &outcome)?;
        print_outcome(&outcome, 1);

        if let (true, Some(manifest)) = (record, manifest.as_mut()) {
            manifest.set_dependency(outcome.manifest.name.clone(), outcome.version.to_string());
        }
    }
    session.finish().context("Failed to write lockfiles")?;

    if let (true, Some(found), Some(manifest)) = (record, &located, &manifest) {
        manifest
            .write_to_file(&found.path)
            .with_context(|| format!("Failed to write {}", found.path.display()))?;
    }

    Ok(())
}

/// A lockfile pin wins over the requested constraint; say so
fn warn_on_pin_mismatch(spec: &PackageSpec, outcome: &InstallOutcome) -> Result<()> {
    let Some(requested) = &spec.constraint else {
        return Ok(());
    };
    if outcome.status != InstallStatus::Installed(AcquisitionSource::Locked) {
        return Ok(());
    }
    if !Constraint::parse(requested)?.matches(&outcome.version) {
        eprintln!(
            "{} {} is locked to {}, which does not satisfy `{}`",
            yellow_warning(),
            spec.name,
            outcome.version,
            requested
        );
        tracing::warn!(
            name = %spec.name,
            locked = %outcome.version,
            requested = %requested,
            "lockfile pin overrides constraint"
        );
    }
    Ok(())
}

fn print_outcome(outcome: &InstallOutcome, depth: usize) {
    let indent = "  ".repeat(depth);
    match outcome.status {
        InstallStatus::Installed(source) => {
            let from = match source {
                AcquisitionSource::Locked => "lockfile",
                AcquisitionSource::Git => "git",
                AcquisitionSource::Registry => "registry",
            };
            println!(
                "{}{} Installed {}@{} {}",
                indent,
                green_check(),
                outcome.name.bold(),
                outcome.version,
                format!("({})", from).dimmed()
            );
        }
        InstallStatus::AlreadyInstalled => {
            println!(
                "{}{} {}@{} already installed",
                indent,
                green_check(),
                outcome.name.bold(),
                outcome.version
            );
        }
    }
    for dependency in &outcome.dependencies {
        print_outcome(dependency, depth + 1);
    }
}
