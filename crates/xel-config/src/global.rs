//! Global Configuration (~/.xel/config.json)
//!
//! Handles user-level configuration stored in `~/.xel/config.json`.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default package registry base URI
pub const DEFAULT_REGISTRY_URI: &str = "https://pkg.xel.glitchiethedev.com/api/v1/";

/// Default timeout applied to registry requests and git invocations
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 60;

/// Global user configuration from ~/.xel/config.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalConfig {
    /// Template used by `xel init` when none is given
    #[serde(default = "default_template")]
    pub default_template: String,

    /// Roots scanned for installed packages; the first one receives new installs
    #[serde(default)]
    pub module_paths: Vec<PathBuf>,

    /// Base URI of the package registry
    #[serde(rename = "PackageRegistryURI", default = "default_registry")]
    pub package_registry_uri: String,

    /// Whether packages may run install scripts
    #[serde(default = "default_true")]
    pub allow_install_scripts: bool,

    /// Timeout for outbound HTTP requests and git invocations
    #[serde(default = "default_timeout")]
    pub network_timeout_secs: u64,
}

fn default_template() -> String {
    "default".to_string()
}

fn default_registry() -> String {
    DEFAULT_REGISTRY_URI.to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_NETWORK_TIMEOUT_SECS
}

impl GlobalConfig {
    /// Default configuration rooted at the given xel home directory
    pub fn with_home(xel_home: &Path) -> Self {
        Self {
            default_template: default_template(),
            module_paths: vec![xel_home.join("modules")],
            package_registry_uri: default_registry(),
            allow_install_scripts: true,
            network_timeout_secs: DEFAULT_NETWORK_TIMEOUT_SECS,
        }
    }

    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, path)
    }

    /// Parse configuration from JSON, `origin` is used for error reporting
    pub fn from_json(content: &str, origin: &Path) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|error| ConfigError::Json {
            file: origin.to_path_buf(),
            error,
        })
    }

    /// Write configuration as pretty JSON
    pub fn write_to_file(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|error| ConfigError::Json {
            file: path.to_path_buf(),
            error,
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.module_paths.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ModulePaths".to_string(),
                reason: "at least one module path is required".to_string(),
            });
        }

        let uri = self.package_registry_uri.as_str();
        if !(uri.starts_with("http://") || uri.starts_with("https://") || uri.starts_with("file://"))
        {
            return Err(ConfigError::InvalidValue {
                field: "PackageRegistryURI".to_string(),
                reason: format!("unsupported scheme in '{}'", uri),
            });
        }

        if self.network_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "NetworkTimeoutSecs".to_string(),
                reason: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Directory that receives newly installed packages
    pub fn install_root(&self) -> ConfigResult<&Path> {
        self.module_paths
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "ModulePaths".to_string(),
                reason: "no module path configured".to_string(),
            })
    }

    /// Registry base URI, always ending in '/'
    pub fn registry_base(&self) -> String {
        if self.package_registry_uri.ends_with('/') {
            self.package_registry_uri.clone()
        } else {
            format!("{}/", self.package_registry_uri)
        }
    }

    /// Network timeout as a duration
    pub fn network_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.network_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pascal_case_keys() {
        let json = r#"{
  "DefaultTemplate": "web",
  "ModulePaths": ["/opt/xel/modules"],
  "PackageRegistryURI": "https://registry.example.com/api/v1/",
  "AllowInstallScripts": false
}"#;

        let config = GlobalConfig::from_json(json, Path::new("config.json")).unwrap();
        assert_eq!(config.default_template, "web");
        assert_eq!(config.module_paths, vec![PathBuf::from("/opt/xel/modules")]);
        assert!(!config.allow_install_scripts);
        assert_eq!(config.network_timeout_secs, DEFAULT_NETWORK_TIMEOUT_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_registry_base_appends_slash() {
        let mut config = GlobalConfig::with_home(Path::new("/home/u/.xel"));
        config.package_registry_uri = "https://r.example.com/api".to_string();
        assert_eq!(config.registry_base(), "https://r.example.com/api/");
    }

    #[test]
    fn test_validate_rejects_empty_module_paths() {
        let mut config = GlobalConfig::with_home(Path::new("/home/u/.xel"));
        config.module_paths.clear();
        assert!(config.validate().is_err());
        assert!(config.install_root().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_scheme() {
        let mut config = GlobalConfig::with_home(Path::new("/home/u/.xel"));
        config.package_registry_uri = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_json_reports_file() {
        let err = GlobalConfig::from_json("{ not json", Path::new("/tmp/config.json")).unwrap_err();
        assert!(err.to_string().contains("/tmp/config.json"));
    }
}
