//! Lexical scopes
//!
//! Each module is evaluated in its own scope whose parent chain ends at the
//! session's root environment. Bindings may be constant.

use crate::value::Value;
use crate::{Result, RuntimeError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    constant: bool,
}

#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<Arc<Environment>>,
    bindings: Mutex<HashMap<String, Binding>>,
}

impl Environment {
    /// Scope without a parent
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn child(parent: &Arc<Environment>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            bindings: Mutex::new(HashMap::new()),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Environment>> {
        self.parent.as_ref()
    }

    /// Declare a new binding in this scope
    pub fn declare(&self, name: &str, value: Value, constant: bool) -> Result<()> {
        let mut bindings = self.lock();
        if bindings.contains_key(name) {
            return Err(RuntimeError::AlreadyDeclared(name.to_string()));
        }
        bindings.insert(name.to_string(), Binding { value, constant });
        Ok(())
    }

    /// Declare or replace a binding in this scope, constant or not
    pub fn define(&self, name: &str, value: Value, constant: bool) {
        self.lock()
            .insert(name.to_string(), Binding { value, constant });
    }

    /// Update the nearest binding named `name`
    pub fn assign(&self, name: &str, value: Value) -> Result<()> {
        {
            let mut bindings = self.lock();
            if let Some(binding) = bindings.get_mut(name) {
                if binding.constant {
                    return Err(RuntimeError::ConstantReassignment(name.to_string()));
                }
                binding.value = value;
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(RuntimeError::UndefinedVariable(name.to_string())),
        }
    }

    /// Value of the nearest binding named `name`
    pub fn lookup(&self, name: &str) -> Result<Value> {
        self.get(name)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.lock().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Whether `name` is bound in this scope itself
    pub fn has_local(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Binding>> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::root();
        root.declare("proc", Value::from("root"), true).unwrap();
        let child = Environment::child(&root);
        let grandchild = Environment::child(&child);

        assert_eq!(grandchild.lookup("proc").unwrap(), Value::from("root"));
        assert!(!grandchild.has_local("proc"));
    }

    #[test]
    fn test_shadowing() {
        let root = Environment::root();
        root.declare("x", Value::Number(1.0), false).unwrap();
        let child = Environment::child(&root);
        child.declare("x", Value::Number(2.0), false).unwrap();

        assert_eq!(child.lookup("x").unwrap(), Value::Number(2.0));
        assert_eq!(root.lookup("x").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_constants_cannot_be_reassigned() {
        let root = Environment::root();
        root.declare("__filename__", Value::from("/a.xel"), true).unwrap();
        let child = Environment::child(&root);

        assert!(matches!(
            child.assign("__filename__", Value::Nil),
            Err(RuntimeError::ConstantReassignment(_))
        ));
        assert!(matches!(
            root.declare("__filename__", Value::Nil, true),
            Err(RuntimeError::AlreadyDeclared(_))
        ));
    }

    #[test]
    fn test_assign_updates_nearest_binding() {
        let root = Environment::root();
        root.declare("count", Value::Number(0.0), false).unwrap();
        let child = Environment::child(&root);
        child.assign("count", Value::Number(1.0)).unwrap();
        assert_eq!(root.lookup("count").unwrap(), Value::Number(1.0));
        assert!(matches!(
            child.assign("missing", Value::Nil),
            Err(RuntimeError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn test_define_replaces() {
        let root = Environment::root();
        root.define("proc", Value::Number(1.0), true);
        root.define("proc", Value::Number(2.0), true);
        assert_eq!(root.lookup("proc").unwrap(), Value::Number(2.0));
    }
}
