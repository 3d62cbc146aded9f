//! Runtime value representation
//!
//! - Nil, Number, Boolean: immediate values
//! - String: reference-counted, immutable
//! - Object, Array: copy-on-write containers; a clone shares storage until
//!   one side mutates, so a cached module value handed out twice is the same
//!   reference
//! - Function, Class: engine-owned handles the runtime never looks inside
//! - NativeFunction: Rust closures callable from scripts, receiving the
//!   calling scope

use crate::environment::Environment;
use crate::Result;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use xel_config::ProjectManifest;

/// Signature of a native function: arguments plus the calling scope
pub type NativeFn = Arc<dyn Fn(&[Value], &Arc<Environment>) -> Result<Value> + Send + Sync>;

/// Copy-on-write string-keyed map
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMap(Arc<BTreeMap<String, Value>>);

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Mutating access clones the map first when it is shared
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        Arc::make_mut(&mut self.0).insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        Arc::make_mut(&mut self.0).remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

/// Copy-on-write array
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueArray(Arc<Vec<Value>>);

impl ValueArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        Self(Arc::new(values))
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn push(&mut self, value: Value) {
        Arc::make_mut(&mut self.0).push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Native function with a name for diagnostics
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value], &Arc<Environment>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value], scope: &Arc<Environment>) -> Result<Value> {
        (self.func)(args, scope)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Engine-owned function or class
#[derive(Clone)]
pub struct EngineHandle {
    name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl EngineHandle {
    pub fn new<T: Any + Send + Sync>(name: &str, inner: T) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineHandle({})", self.name)
    }
}

/// Instance of an engine class
#[derive(Clone, Debug)]
pub struct ClassInstance {
    pub class: EngineHandle,
    pub fields: ValueMap,
}

#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Number(f64),
    Boolean(bool),
    String(Arc<str>),
    Object(ValueMap),
    Array(ValueArray),
    Function(EngineHandle),
    NativeFunction(NativeFunction),
    Class(EngineHandle),
    ClassInstance(ClassInstance),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Function(_) => "function",
            Value::NativeFunction(_) => "native function",
            Value::Class(_) => "class",
            Value::ClassInstance(_) => "class instance",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ValueMap> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Follow a chain of object keys
    pub fn get_path(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .try_fold(self, |value, key| value.as_object()?.get(key))
    }

    /// Copy every object, array and instance, so the copy shares no mutable
    /// storage with `self`. Functions and classes stay shared.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.deep_copy()))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(ValueArray::from_vec(items.iter().map(Value::deep_copy).collect()))
            }
            Value::ClassInstance(instance) => Value::ClassInstance(ClassInstance {
                class: instance.class.clone(),
                fields: instance
                    .fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.deep_copy()))
                    .collect(),
            }),
            Value::Nil
            | Value::Number(_)
            | Value::Boolean(_)
            | Value::String(_)
            | Value::Function(_)
            | Value::NativeFunction(_)
            | Value::Class(_) => self.clone(),
        }
    }

    /// Whether both values are the same reference. Immediate values and
    /// strings never are.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) | (Value::Class(a), Value::Class(b)) => {
                a.ptr_eq(b)
            }
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a.ptr_eq(b),
            (Value::ClassInstance(a), Value::ClassInstance(b)) => a.fields.ptr_eq(&b.fields),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::ClassInstance(a), Value::ClassInstance(b)) => {
                a.class.ptr_eq(&b.class) && a.fields == b.fields
            }
            _ => self.ptr_eq(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}{}: {}", sep, key, value)?;
                }
                if map.is_empty() {
                    write!(f, "}}")
                } else {
                    write!(f, " }}")
                }
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(handle) => write!(f, "<fn {}>", handle.name()),
            Value::NativeFunction(native) => write!(f, "<native fn {}>", native.name()),
            Value::Class(handle) => write!(f, "<class {}>", handle.name()),
            Value::ClassInstance(instance) => write!(f, "<{} instance>", instance.class.name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Object(map)
    }
}

/// Script view of a manifest; absent optional fields become empty strings
impl From<&ProjectManifest> for Value {
    fn from(manifest: &ProjectManifest) -> Self {
        let text = |s: &str| Value::from(s);
        let deps: ValueMap = manifest
            .dependencies()
            .map(|(name, constraint)| (name.to_string(), text(constraint)))
            .collect();

        let mut map = ValueMap::new();
        map.insert("name", text(&manifest.name));
        map.insert("description", text(&manifest.description));
        map.insert("version", text(&manifest.version));
        map.insert("xel", text(manifest.xel.as_deref().unwrap_or_default()));
        map.insert("engine", text(manifest.engine.as_deref().unwrap_or_default()));
        map.insert("main", text(&manifest.main));
        map.insert("author", text(&manifest.author));
        map.insert("license", text(&manifest.license));
        map.insert("deps", Value::Object(deps));
        Value::Object(map)
    }
}
