//! Project manifest (xel.json)
//!
//! Every project and every installed package carries one at its root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Project manifest
///
/// ```json
/// {
///     "name": "my-project",
///     "description": "A sample Xel project",
///     "version": "1.0.0",
///     "xel": "^0.6.0",
///     "engine": "^2.1.0",
///     "main": "src/main.xel",
///     "deps": { "my-package": "^1.0.0" },
///     "author": "John Doe",
///     "license": "MIT"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProjectManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// Required xel runtime version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xel: Option<String>,
    /// Required engine version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Entry point, relative to the project root
    #[serde(default)]
    pub main: String,
    /// Dependency name -> version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Deprecation message, if the package is deprecated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

impl ProjectManifest {
    /// Parse manifest from a JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Load manifest from file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content).map_err(|error| ConfigError::ManifestParse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Serialize to pretty JSON (two-space indent)
    pub fn to_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write manifest to file
    pub fn write_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_string().map_err(|error| ConfigError::ManifestParse {
            path: path.to_path_buf(),
            error,
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Declared constraint for a dependency
    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.deps.as_ref()?.get(name).map(String::as_str)
    }

    /// Iterate declared dependencies in name order
    pub fn dependencies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.deps
            .iter()
            .flat_map(|deps| deps.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Record or replace a dependency constraint
    pub fn set_dependency(&mut self, name: impl Into<String>, constraint: impl Into<String>) {
        self.deps
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), constraint.into());
    }

    /// Remove a dependency, returning its constraint if it was declared
    pub fn remove_dependency(&mut self, name: &str) -> Option<String> {
        self.deps.as_mut()?.remove(name)
    }

    /// Whether the name is a declared dependency
    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependency(name).is_some()
    }
}
