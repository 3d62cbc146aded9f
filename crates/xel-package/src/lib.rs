//! Xel Package Management
//!
//! Version constraints, the local version catalog, lockfiles, and the
//! acquisition pipeline (lockfile pin, git source, registry tarball) used by
//! `xel pkg` and by the runtime's `import` of declared dependencies.

pub mod acquirer;
pub mod catalog;
pub mod compat;
pub mod constraint;
pub mod git;
pub mod install;
pub mod integrity;
pub mod layout;
pub mod lockfile;
pub mod registry;
pub mod resolver;
pub mod tarball;

pub use acquirer::{Acquired, AcquisitionSource, PackageAcquirer};
pub use catalog::{CatalogEntry, VersionCatalog};
pub use compat::RuntimeVersions;
pub use constraint::{parse_version, Constraint};
pub use git::{GitBackend, GitCli};
pub use install::{InstallOutcome, InstallSession, InstallStatus, PackageManager, PackageSpec};
pub use integrity::HashAlgorithm;
pub use lockfile::{lockfile_path_for, LockedSource, Lockfile, LockfileStore, LOCKFILE_NAME};
pub use registry::{DirectoryRegistry, HttpRegistry, RegistryApi};
pub use resolver::{ResolvedPackage, VersionResolver};

use std::path::{Path, PathBuf};
use xel_config::{ConfigError, ProjectManifest};

/// Package management errors
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Cannot find manifest at {0}")]
    ManifestNotFound(PathBuf),

    #[error("Failed to parse manifest at {path}: {message}")]
    ManifestParse { path: PathBuf, message: String },

    #[error("Invalid version constraint `{constraint}`: {reason}")]
    ConstraintSyntax { constraint: String, reason: String },

    #[error("Invalid version `{version}`: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Cannot resolve any module named `{name}` with version constraint `{constraint}`")]
    NoSatisfyingVersion { name: String, constraint: String },

    #[error("No tarballs found for {name}@{version}")]
    NoTarball { name: String, version: String },

    #[error("Integrity check failed for {algorithm}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported integrity algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Version spoof detected: tag `{tag}` does not match manifest version `{manifest}`")]
    VersionSpoof { tag: String, manifest: String },

    #[error("{component} version {version} does not satisfy required version {required}")]
    RuntimeIncompatible {
        component: String,
        version: String,
        required: String,
    },

    #[error("Invalid package format: {0}")]
    InvalidPackageSpec(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("Downloaded tarball is empty")]
    EmptyTarball,

    #[error("Possible path traversal attempt: {0}")]
    PathTraversal(PathBuf),

    #[error("git {args} failed: {stderr}")]
    Git { args: String, stderr: String },

    #[error("No valid semver tags found in {0}")]
    NoSemverTags(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, PackageError>;

/// Read the manifest of an installed or freshly fetched package
pub(crate) fn read_manifest(path: &Path) -> Result<ProjectManifest> {
    if !path.is_file() {
        return Err(PackageError::ManifestNotFound(path.to_path_buf()));
    }
    ProjectManifest::from_file(path).map_err(|err| match err {
        ConfigError::ManifestParse { path, error } => PackageError::ManifestParse {
            path,
            message: error.to_string(),
        },
        other => PackageError::Config(other),
    })
}
