//! Import specifier resolution
//!
//! `import(specifier)` is resolved in this order:
//!
//! 1. `xel:<name>` always names a native module
//! 2. a registered native module name
//! 3. `./` or `../`: a file relative to the importing module
//! 4. an absolute path
//! 5. anything else is a dependency declared in `proc.manifest.deps`
//!
//! File specifiers get a `.xel` extension when they lack one. A dependency
//! is resolved to its installed package (acquiring it when needed) and
//! evaluated with its own copy of `proc`, in which `manifest` and `root`
//! describe the dependency instead of the importer.

use crate::environment::Environment;
use crate::native::NativeModuleRegistry;
use crate::value::Value;
use crate::{Result, RuntimeError};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use xel_config::MANIFEST_FILE;
use xel_package::{lockfile_path_for, PackageManager};

/// Prefix forcing a native module lookup
pub const NATIVE_PREFIX: &str = "xel:";

pub const SCRIPT_EXTENSION: &str = "xel";

/// A classified `import` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSpecifier {
    Native(String),
    Relative(String),
    Absolute(PathBuf),
    Dependency(String),
}

impl ImportSpecifier {
    pub fn classify(raw: &str, natives: &NativeModuleRegistry) -> Result<Self> {
        if raw.is_empty() {
            return Err(RuntimeError::InvalidArgument(
                "`import` expects a non-empty module name".to_string(),
            ));
        }
        if let Some(name) = raw.strip_prefix(NATIVE_PREFIX) {
            return Ok(Self::Native(name.to_string()));
        }
        if natives.contains(raw) {
            return Ok(Self::Native(raw.to_string()));
        }
        // Any leading dot is relative, `.config/paths` included.
        if raw.starts_with('.') {
            return Ok(Self::Relative(raw.to_string()));
        }
        let path = Path::new(raw);
        if path.is_absolute() {
            return Ok(Self::Absolute(path.to_path_buf()));
        }
        Ok(Self::Dependency(raw.to_string()))
    }
}

/// What an import resolves to
#[derive(Debug, Clone)]
pub enum ImportTarget {
    /// Value produced by a native loader
    Native(Value),
    /// Source file to evaluate, with the `proc` visible to it
    Module { path: PathBuf, proc: Option<Value> },
}

pub struct ImportResolver {
    natives: Arc<NativeModuleRegistry>,
    packages: Option<Arc<PackageManager>>,
}

impl ImportResolver {
    /// Without a package manager, dependency imports fail with
    /// [`RuntimeError::Resolution`]
    pub fn new(natives: Arc<NativeModuleRegistry>, packages: Option<Arc<PackageManager>>) -> Self {
        Self { natives, packages }
    }

    pub fn natives(&self) -> &NativeModuleRegistry {
        &self.natives
    }

    pub fn packages(&self) -> Option<&Arc<PackageManager>> {
        self.packages.as_ref()
    }

    /// Resolve `raw` as imported from `scope`
    pub fn resolve(&self, raw: &str, scope: &Arc<Environment>) -> Result<ImportTarget> {
        match ImportSpecifier::classify(raw, &self.natives)? {
            ImportSpecifier::Native(name) => Ok(ImportTarget::Native(self.natives.load(&name)?)),
            ImportSpecifier::Relative(relative) => {
                let base = calling_dir(scope)?;
                Ok(ImportTarget::Module {
                    path: normalize(&base.join(with_script_extension(&relative))),
                    proc: scope.get("proc"),
                })
            }
            ImportSpecifier::Absolute(path) => Ok(ImportTarget::Module {
                path: normalize(Path::new(&with_script_extension(&path.to_string_lossy()))),
                proc: scope.get("proc"),
            }),
            ImportSpecifier::Dependency(name) => self.resolve_dependency(&name, scope),
        }
    }

    fn resolve_dependency(&self, name: &str, scope: &Arc<Environment>) -> Result<ImportTarget> {
        let proc = scope
            .lookup("proc")
            .map_err(|_| RuntimeError::MissingProc("`proc` is not defined".to_string()))?;
        let proc_map = proc.as_object().ok_or_else(|| {
            RuntimeError::MissingProc(format!(
                "expected 'proc' to be an object, but got {}",
                proc.type_name()
            ))
        })?;
        let deps = proc
            .get_path(&["manifest", "deps"])
            .and_then(Value::as_object)
            .ok_or_else(|| {
                RuntimeError::MissingProc(
                    "project manifest is missing or has an invalid 'deps' section".to_string(),
                )
            })?;

        let constraint = deps
            .get(name)
            .ok_or_else(|| RuntimeError::NotADeclaredDependency {
                name: name.to_string(),
            })?;
        let constraint = constraint.as_str().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!(
                "constraint for '{}' must be a string, but got {}",
                name,
                constraint.type_name()
            ))
        })?;

        let resolution_error = |message: String| RuntimeError::Resolution {
            name: name.to_string(),
            constraint: constraint.to_string(),
            message,
        };
        let packages = self
            .packages
            .as_ref()
            .ok_or_else(|| resolution_error("package management is not available".to_string()))?;
        let root = proc_map
            .get("root")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::MissingProc("project root is not available".to_string()))?;

        let lockfile = lockfile_path_for(&Path::new(root).join(MANIFEST_FILE));
        let package = packages
            .ensure(name, constraint, &lockfile)
            .map_err(|e| resolution_error(e.to_string()))?;
        tracing::debug!(name, version = %package.version, "resolved dependency import");

        let mut dependency_proc = proc.deep_copy();
        if let Some(map) = dependency_proc.as_object_mut() {
            map.insert("manifest", Value::from(package.manifest.as_ref()));
            map.insert("root", Value::from(package.root().display().to_string()));
        }

        Ok(ImportTarget::Module {
            path: package.entry_point(),
            proc: Some(dependency_proc),
        })
    }
}

/// Directory of the module executing in `scope`, or the working directory
/// outside of any module
fn calling_dir(scope: &Arc<Environment>) -> Result<PathBuf> {
    if let Some(filename) = scope.get("__filename__") {
        if let Some(dir) = filename.as_str().and_then(|f| Path::new(f).parent()) {
            return Ok(dir.to_path_buf());
        }
    }
    tracing::debug!("no __filename__ in scope, resolving against the working directory");
    std::env::current_dir().map_err(|e| {
        RuntimeError::InvalidArgument(format!("cannot determine the working directory: {}", e))
    })
}

/// Append `.xel` unless already present
pub fn with_script_extension(specifier: &str) -> String {
    let has_extension = Path::new(specifier)
        .extension()
        .is_some_and(|ext| ext == SCRIPT_EXTENSION);
    if has_extension {
        specifier.to_string()
    } else {
        format!("{}.{}", specifier, SCRIPT_EXTENSION)
    }
}

/// Remove `.` and `..` components without touching the file system
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
