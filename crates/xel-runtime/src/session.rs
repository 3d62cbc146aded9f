//! Script sessions
//!
//! A session owns the root environment, the module loader and the import
//! resolver. Running a file:
//!
//! 1. requires an existing `.xel` file
//! 2. loads `xel.json` from the file's directory when present
//! 3. checks the manifest's runtime and engine requirements
//! 4. declares `proc` in the root environment
//! 5. evaluates the file through the module loader
//!
//! `import` is a native function in the root environment that calls back
//! into the session.

use crate::engine::ScriptEngine;
use crate::environment::Environment;
use crate::import::{ImportResolver, ImportTarget, SCRIPT_EXTENSION};
use crate::module_loader::ModuleLoader;
use crate::native::NativeModuleRegistry;
use crate::value::{NativeFunction, Value, ValueArray, ValueMap};
use crate::{Result, RuntimeError};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};
use xel_config::{ProjectManifest, MANIFEST_FILE};
use xel_package::{PackageManager, RuntimeVersions};

pub struct Session {
    loader: ModuleLoader,
    resolver: ImportResolver,
    versions: RuntimeVersions,
}

impl Session {
    pub fn new(
        engine: Arc<dyn ScriptEngine>,
        natives: NativeModuleRegistry,
        packages: Option<Arc<PackageManager>>,
        versions: RuntimeVersions,
    ) -> Result<Arc<Self>> {
        let session = Arc::new(Self {
            loader: ModuleLoader::new(engine, Environment::root()),
            resolver: ImportResolver::new(Arc::new(natives), packages),
            versions,
        });
        let import = import_function(Arc::downgrade(&session));
        session
            .root()
            .declare("import", Value::NativeFunction(import), true)?;
        Ok(session)
    }

    pub fn root(&self) -> &Arc<Environment> {
        self.loader.root()
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn resolver(&self) -> &ImportResolver {
        &self.resolver
    }

    pub fn versions(&self) -> &RuntimeVersions {
        &self.versions
    }

    /// Resolve and load `specifier` as imported from `scope`
    pub fn import(&self, specifier: &str, scope: &Arc<Environment>) -> Result<Value> {
        match self.resolver.resolve(specifier, scope)? {
            ImportTarget::Native(value) => Ok(value),
            ImportTarget::Module { path, proc } => self.loader.load(&path, proc),
        }
    }

    /// Run an entry script with command line `args`
    pub fn run_file(&self, path: &Path, args: &[String]) -> Result<Value> {
        if path.extension().map_or(true, |ext| ext != SCRIPT_EXTENSION) {
            return Err(RuntimeError::InvalidArgument(
                "file must have .xel extension".to_string(),
            ));
        }
        let path = fs::canonicalize(path).map_err(|e| RuntimeError::ModuleRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("/"));

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            ProjectManifest::from_file(&manifest_path)?
        } else {
            ProjectManifest::default()
        };
        self.versions
            .check(&manifest)
            .map_err(|e| RuntimeError::Incompatible(e.to_string()))?;

        let proc = build_proc(args, &manifest, root, &self.versions);
        self.root().define("proc", proc, true);
        self.loader.load(&path, None)
    }
}

/// The `proc` object: `args`, `manifest`, `root`, `runtime_version`,
/// `engine_version`
pub fn build_proc(
    args: &[String],
    manifest: &ProjectManifest,
    root: &Path,
    versions: &RuntimeVersions,
) -> Value {
    let args = args.iter().map(|a| Value::from(a.as_str())).collect();
    let mut proc = ValueMap::new();
    proc.insert("args", Value::Array(ValueArray::from_vec(args)));
    proc.insert("manifest", Value::from(manifest));
    proc.insert("root", Value::from(root.display().to_string()));
    proc.insert(
        "runtime_version",
        Value::from(versions.runtime.as_deref().unwrap_or_default()),
    );
    proc.insert(
        "engine_version",
        Value::from(versions.engine.as_deref().unwrap_or_default()),
    );
    Value::Object(proc)
}

fn import_function(session: Weak<Session>) -> NativeFunction {
    NativeFunction::new("import", move |args, scope| {
        let session = session.upgrade().ok_or_else(|| {
            RuntimeError::InvalidArgument("`import` called after its session ended".to_string())
        })?;
        let specifier = match args {
            [Value::String(specifier)] => specifier,
            [other] => {
                return Err(RuntimeError::InvalidArgument(format!(
                    "`import` expects a string argument, but received {} ({})",
                    other,
                    other.type_name()
                )))
            }
            _ => {
                return Err(RuntimeError::InvalidArgument(format!(
                    "`import` requires exactly one argument, but received {}",
                    args.len()
                )))
            }
        };
        session.import(specifier, scope)
    })
}
