//! Shared helpers for runtime tests
//!
//! `LineEngine` understands just enough to drive imports:
//!
//! ```text
//! let name = "text"
//! let name = import("specifier")
//! let name = proc.manifest.name
//! fail message
//! ```
//!
//! A module evaluates to an object holding its `let` bindings.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use xel_runtime::{EngineError, Environment, ScriptEngine, Value, ValueMap};

#[derive(Default)]
pub struct LineEngine {
    evaluated: Mutex<Vec<PathBuf>>,
}

impl LineEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times `path` was evaluated
    pub fn evaluations(&self, path: &Path) -> usize {
        self.evaluated
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_path() == path)
            .count()
    }

    fn expression(&self, expr: &str, scope: &Arc<Environment>) -> Result<Value, EngineError> {
        if let Some(spec) = expr
            .strip_prefix("import(\"")
            .and_then(|rest| rest.strip_suffix("\")"))
        {
            return match scope.lookup("import")? {
                Value::NativeFunction(import) => Ok(import.call(&[Value::from(spec)], scope)?),
                other => Err(EngineError::Runtime(format!("import is a {}", other.type_name()))),
            };
        }
        if let Some(text) = expr.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
            return Ok(Value::from(text));
        }
        let mut keys = expr.split('.');
        let head = keys.next().unwrap_or_default();
        let rest: Vec<&str> = keys.collect();
        let base = scope.lookup(head)?;
        base.get_path(&rest)
            .cloned()
            .ok_or_else(|| EngineError::Runtime(format!("cannot read {}", expr)))
    }
}

impl ScriptEngine for LineEngine {
    fn evaluate(
        &self,
        path: &Path,
        source: &str,
        scope: &Arc<Environment>,
    ) -> Result<Value, EngineError> {
        self.evaluated.lock().unwrap().push(path.to_path_buf());

        let mut exports = ValueMap::new();
        for line in source.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if let Some(message) = line.strip_prefix("fail ") {
                return Err(EngineError::Runtime(message.to_string()));
            }
            let binding = line
                .strip_prefix("let ")
                .and_then(|rest| rest.split_once(" = "))
                .ok_or_else(|| EngineError::Syntax(format!("cannot parse `{}`", line)))?;
            let (name, expr) = binding;
            let value = self.expression(expr.trim(), scope)?;
            scope.declare(name.trim(), value.clone(), false)?;
            exports.insert(name.trim(), value);
        }
        Ok(Value::Object(exports))
    }
}

pub fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
