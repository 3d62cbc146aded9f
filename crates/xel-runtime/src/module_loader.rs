//! Module evaluation and caching
//!
//! Each absolute module path is read, evaluated and cached at most once per
//! loader. The import cache and the set of modules being evaluated share one
//! mutex, so checking for a cycle, checking the cache and claiming a path is
//! a single atomic step.
//!
//! While a module evaluates, its cache slot holds a `Nil` placeholder and the
//! path is owned by the evaluating thread. Re-entering the path on that
//! thread is a circular import. Another thread importing the same path waits
//! for the owner to finish and then sees its result, unless the owner is
//! itself waiting, directly or through other threads, on a path the importer
//! owns. Such a wait would never end, so it fails as a circular import too.
//! A failed evaluation leaves neither a cache entry nor an in-flight marker
//! behind.

use crate::engine::ScriptEngine;
use crate::environment::Environment;
use crate::value::Value;
use crate::{Result, RuntimeError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct LoaderState {
    cache: HashMap<PathBuf, Value>,
    resolving: HashMap<PathBuf, ThreadId>,
    /// Path each blocked thread is waiting for
    waiting: HashMap<ThreadId, PathBuf>,
}

impl LoaderState {
    /// Whether `me` waiting on a path held by `owner` closes a wait cycle
    fn closes_cycle(&self, mut owner: ThreadId, me: ThreadId) -> bool {
        let mut seen = HashSet::new();
        loop {
            if owner == me {
                return true;
            }
            if !seen.insert(owner) {
                return false;
            }
            match self.waiting.get(&owner).and_then(|path| self.resolving.get(path)) {
                Some(next) => owner = *next,
                None => return false,
            }
        }
    }
}

pub struct ModuleLoader {
    engine: Arc<dyn ScriptEngine>,
    root: Arc<Environment>,
    state: Mutex<LoaderState>,
    settled: Condvar,
}

enum Claim<'a> {
    Cached(Value),
    Evaluate(Resolving<'a>),
}

/// In-flight marker for one path; dropping it publishes the result, or
/// removes the placeholder when there is none
struct Resolving<'a> {
    loader: &'a ModuleLoader,
    path: PathBuf,
    result: Option<Value>,
}

impl Resolving<'_> {
    fn finish(mut self, value: Value) {
        self.result = Some(value);
    }
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        let mut state = self.loader.lock();
        state.resolving.remove(&self.path);
        match self.result.take() {
            Some(value) => {
                state.cache.insert(self.path.clone(), value);
            }
            None => {
                state.cache.remove(&self.path);
            }
        }
        drop(state);
        self.loader.settled.notify_all();
    }
}

impl ModuleLoader {
    /// Modules are evaluated in scopes chained to `root`
    pub fn new(engine: Arc<dyn ScriptEngine>, root: Arc<Environment>) -> Self {
        Self {
            engine,
            root,
            state: Mutex::new(LoaderState::default()),
            settled: Condvar::new(),
        }
    }

    pub fn root(&self) -> &Arc<Environment> {
        &self.root
    }

    /// Evaluate the module at `path`, or return its cached value.
    ///
    /// `proc`, when given, is declared as a constant in the module's import
    /// scope, shadowing the root `proc`.
    pub fn load(&self, path: &Path, proc: Option<Value>) -> Result<Value> {
        let resolving = match self.claim(path)? {
            Claim::Cached(value) => return Ok(value),
            Claim::Evaluate(resolving) => resolving,
        };

        let value = self.evaluate(path, proc)?;
        resolving.finish(value.clone());
        Ok(value)
    }

    fn claim(&self, path: &Path) -> Result<Claim<'_>> {
        let me = thread::current().id();
        let mut state = self.lock();
        loop {
            if let Some(&owner) = state.resolving.get(path) {
                if state.closes_cycle(owner, me) {
                    return Err(RuntimeError::CircularImport {
                        path: path.to_path_buf(),
                    });
                }
                state.waiting.insert(me, path.to_path_buf());
                state = self
                    .settled
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
                state.waiting.remove(&me);
                continue;
            }

            if let Some(value) = state.cache.get(path) {
                tracing::debug!(path = %path.display(), "import cache hit");
                return Ok(Claim::Cached(value.clone()));
            }

            state.resolving.insert(path.to_path_buf(), me);
            state.cache.insert(path.to_path_buf(), Value::Nil);
            return Ok(Claim::Evaluate(Resolving {
                loader: self,
                path: path.to_path_buf(),
                result: None,
            }));
        }
    }

    fn evaluate(&self, path: &Path, proc: Option<Value>) -> Result<Value> {
        tracing::debug!(path = %path.display(), "evaluating module");
        let source = fs::read_to_string(path).map_err(|e| RuntimeError::ModuleRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let import_scope = Environment::child(&self.root);
        if let Some(proc) = proc {
            import_scope.declare("proc", proc, true)?;
        }

        let scope = Environment::child(&import_scope);
        let dirname = path.parent().unwrap_or_else(|| Path::new("/"));
        scope.declare("__filename__", Value::from(path.display().to_string()), true)?;
        scope.declare("__dirname__", Value::from(dirname.display().to_string()), true)?;

        self.engine
            .evaluate(path, &source, &scope)
            .map_err(|e| e.into_runtime(path))
    }

    /// Cached value of a fully evaluated module
    pub fn cached(&self, path: &Path) -> Option<Value> {
        let state = self.lock();
        if state.resolving.contains_key(path) {
            return None;
        }
        state.cache.get(path).cloned()
    }

    pub fn is_resolving(&self, path: &Path) -> bool {
        self.lock().resolving.contains_key(path)
    }

    /// Number of modules currently being evaluated
    pub fn resolving_count(&self) -> usize {
        self.lock().resolving.len()
    }

    /// Forget every cached module
    pub fn clear(&self) {
        self.lock().cache.clear();
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
