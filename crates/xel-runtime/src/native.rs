//! Native module registry
//!
//! Built-in modules are registered by name; importing one never touches the
//! file system.

use crate::value::Value;
use crate::{Result, RuntimeError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Produces the value of a native module on import
pub type NativeLoader = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct NativeModuleRegistry {
    loaders: HashMap<String, NativeLoader>,
}

impl NativeModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, loader: F) -> Result<()>
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        if self.loaders.contains_key(name) {
            return Err(RuntimeError::DuplicateNativeModule(name.to_string()));
        }
        tracing::debug!(name, "registered native module");
        self.loaders.insert(name.to_string(), Arc::new(loader));
        Ok(())
    }

    /// Register a module whose value is fixed
    pub fn register_value(&mut self, name: &str, value: Value) -> Result<()> {
        self.register(name, move || Ok(value.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    pub fn load(&self, name: &str) -> Result<Value> {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| RuntimeError::NativeModuleNotFound {
                name: name.to_string(),
            })?;
        loader()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for NativeModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_load() {
        let mut registry = NativeModuleRegistry::new();
        registry.register_value("math", Value::Number(3.0)).unwrap();
        registry.register("fs", || Ok(Value::Boolean(true))).unwrap();

        assert_eq!(registry.load("math").unwrap(), Value::Number(3.0));
        assert_eq!(registry.names(), vec!["fs", "math"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = NativeModuleRegistry::new();
        registry.register_value("math", Value::Nil).unwrap();
        assert!(matches!(
            registry.register_value("math", Value::Nil),
            Err(RuntimeError::DuplicateNativeModule(_))
        ));
    }

    #[test]
    fn test_unknown_module() {
        let err = NativeModuleRegistry::new().load("nope").unwrap_err();
        assert_eq!(err.to_string(), "Native module 'nope' not found");
    }
}
