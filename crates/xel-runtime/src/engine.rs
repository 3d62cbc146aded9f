//! Boundary to the language evaluator

use crate::environment::Environment;
use crate::value::Value;
use crate::RuntimeError;
use std::path::Path;
use std::sync::Arc;

/// Parses and evaluates one source file in the given scope, returning the
/// module's value. Native functions called during evaluation receive `scope`
/// (or a descendant) as their calling scope.
pub trait ScriptEngine: Send + Sync {
    fn evaluate(
        &self,
        path: &Path,
        source: &str,
        scope: &Arc<Environment>,
    ) -> Result<Value, EngineError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Runtime(String),

    /// An error raised by a native function, passed through unchanged
    #[error(transparent)]
    Native(#[from] RuntimeError),
}

impl EngineError {
    /// Attach the module path
    pub(crate) fn into_runtime(self, path: &Path) -> RuntimeError {
        match self {
            EngineError::Syntax(message) => RuntimeError::Syntax {
                path: path.to_path_buf(),
                message,
            },
            EngineError::Runtime(message) => RuntimeError::Evaluation {
                path: path.to_path_buf(),
                message,
            },
            EngineError::Native(err) => err,
        }
    }
}
