//! Runtime and engine compatibility checks
//!
//! A manifest may require a runtime (`xel`) and an engine (`engine`) version.
//! An unknown running version means development mode, where the check is
//! skipped with a warning.

use crate::constraint::{parse_version, Constraint};
use crate::{PackageError, Result};
use xel_config::ProjectManifest;

/// Versions of the running runtime and engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersions {
    pub runtime: Option<String>,
    pub engine: Option<String>,
}

impl RuntimeVersions {
    /// Empty strings mean "unknown"
    pub fn new(runtime: impl Into<String>, engine: impl Into<String>) -> Self {
        let known = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        Self {
            runtime: known(runtime.into()),
            engine: known(engine.into()),
        }
    }

    /// Both versions unknown
    pub fn development() -> Self {
        Self::default()
    }

    pub fn is_development(&self) -> bool {
        self.runtime.is_none() && self.engine.is_none()
    }

    /// Check the manifest's `xel` and `engine` requirements
    pub fn check(&self, manifest: &ProjectManifest) -> Result<()> {
        check_component("Xel", self.runtime.as_deref(), manifest.xel.as_deref())?;
        check_component("Engine", self.engine.as_deref(), manifest.engine.as_deref())
    }
}

fn check_component(component: &str, running: Option<&str>, required: Option<&str>) -> Result<()> {
    let Some(required) = required.filter(|r| !r.trim().is_empty()) else {
        return Ok(());
    };
    let Some(running) = running else {
        tracing::warn!(component, "development mode, skipping version check");
        return Ok(());
    };

    let constraint = Constraint::parse(required)?;
    let version = parse_version(running)?;
    if constraint.matches(&version) {
        Ok(())
    } else {
        Err(PackageError::RuntimeIncompatible {
            component: component.to_string(),
            version: running.to_string(),
            required: required.to_string(),
        })
    }
}
