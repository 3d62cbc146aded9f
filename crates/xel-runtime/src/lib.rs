//! Xel runtime: module resolution and evaluation
//!
//! The language itself is evaluated by a [`ScriptEngine`] supplied by the
//! embedder. This crate owns everything around it:
//!
//! - the runtime [`Value`] model and scoped [`Environment`]s
//! - the registry of native modules
//! - `import` resolution (native, relative, absolute, declared dependency)
//! - the module loader with its import cache and cycle detection
//! - script sessions, which build `proc` and run an entry file

pub mod engine;
pub mod environment;
pub mod import;
pub mod module_loader;
pub mod native;
pub mod session;
pub mod value;

pub use engine::{EngineError, ScriptEngine};
pub use environment::Environment;
pub use import::{ImportResolver, ImportSpecifier, ImportTarget, NATIVE_PREFIX};
pub use module_loader::ModuleLoader;
pub use native::{NativeLoader, NativeModuleRegistry};
pub use session::Session;
pub use value::{NativeFn, NativeFunction, Value, ValueArray, ValueMap};

use std::path::PathBuf;
use xel_config::ConfigError;

/// Runtime errors surfaced to scripts and embedders
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Package '{name}' is not listed in the project's dependencies")]
    NotADeclaredDependency { name: String },

    #[error("Circular import detected while importing '{}'", path.display())]
    CircularImport { path: PathBuf },

    #[error("Native module '{name}' not found")]
    NativeModuleNotFound { name: String },

    #[error("Failed to read module file '{}': {message}", path.display())]
    ModuleRead { path: PathBuf, message: String },

    #[error("Syntax error in '{}': {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("Runtime error in '{}': {message}", path.display())]
    Evaluation { path: PathBuf, message: String },

    #[error("Failed to resolve package '{name}' (constraint: {constraint}): {message}")]
    Resolution {
        name: String,
        constraint: String,
        message: String,
    },

    #[error("Process information is unavailable: {0}")]
    MissingProc(String),

    #[error("{0}")]
    Incompatible(String),

    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("Cannot reassign constant '{0}'")]
    ConstantReassignment(String),

    #[error("Variable '{0}' is already declared in this scope")]
    AlreadyDeclared(String),

    #[error("Native module '{0}' is already registered")]
    DuplicateNativeModule(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),
}

impl From<ConfigError> for RuntimeError {
    fn from(err: ConfigError) -> Self {
        RuntimeError::Manifest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
