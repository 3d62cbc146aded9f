//! Configuration Loader
//!
//! Resolves the xel home directory, loads (or creates) the global config file,
//! and applies environment variable overrides.

use crate::global::GlobalConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::PathBuf;

/// Environment variable overriding the xel home directory
pub const ENV_HOME: &str = "XEL_HOME";
/// Environment variable overriding the module paths (OS path-list separated)
pub const ENV_MODULE_PATHS: &str = "XEL_MODULE_PATHS";
/// Environment variable overriding the registry base URI
pub const ENV_REGISTRY: &str = "XEL_REGISTRY";
/// Environment variable overriding the network timeout in seconds
pub const ENV_NETWORK_TIMEOUT: &str = "XEL_NETWORK_TIMEOUT";

/// Configuration loader
///
/// Precedence (later overrides earlier):
/// 1. Built-in defaults
/// 2. ~/.xel/config.json
/// 3. Environment variables (XEL_*)
pub struct ConfigLoader {
    home: Option<PathBuf>,
    use_env: bool,
}

impl ConfigLoader {
    /// Create a loader that resolves the home directory from the environment
    pub fn new() -> Self {
        Self {
            home: None,
            use_env: true,
        }
    }

    /// Create a loader rooted at an explicit xel home directory, ignoring XEL_* variables
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: Some(home.into()),
            use_env: false,
        }
    }

    /// Get the xel home directory (~/.xel unless overridden)
    pub fn xel_home(&self) -> ConfigResult<PathBuf> {
        if let Some(home) = &self.home {
            return Ok(home.clone());
        }
        if self.use_env {
            if let Some(home) = env::var_os(ENV_HOME) {
                return Ok(PathBuf::from(home));
            }
        }
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".xel"))
    }

    /// Path of the global config file
    pub fn config_path(&self) -> ConfigResult<PathBuf> {
        Ok(self.xel_home()?.join("config.json"))
    }

    /// Load the global configuration, creating it with defaults on first use
    pub fn load(&self) -> ConfigResult<GlobalConfig> {
        let home = self.xel_home()?;
        let path = home.join("config.json");

        let config = if path.exists() {
            GlobalConfig::load_from_file(&path)?
        } else {
            let config = GlobalConfig::with_home(&home);
            config.write_to_file(&path)?;
            tracing::debug!(path = %path.display(), "created default configuration");
            config
        };

        let config = if self.use_env {
            apply_env_overrides(config)?
        } else {
            config
        };

        if config.module_paths.is_empty() {
            tracing::warn!("no module paths configured");
        }

        config.validate()?;
        Ok(config)
    }

    /// Ensure the templates directory under the xel home exists
    pub fn ensure_home_layout(&self) -> ConfigResult<PathBuf> {
        let home = self.xel_home()?;
        std::fs::create_dir_all(home.join("templates"))?;
        Ok(home)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply XEL_* environment variable overrides to a loaded config
fn apply_env_overrides(mut config: GlobalConfig) -> ConfigResult<GlobalConfig> {
    if let Some(paths) = env::var_os(ENV_MODULE_PATHS) {
        let paths: Vec<PathBuf> = env::split_paths(&paths)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        if !paths.is_empty() {
            config.module_paths = paths;
        }
    }

    if let Ok(registry) = env::var(ENV_REGISTRY) {
        config.package_registry_uri = registry;
    }

    if let Ok(timeout) = env::var(ENV_NETWORK_TIMEOUT) {
        config.network_timeout_secs =
            timeout
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    field: ENV_NETWORK_TIMEOUT.to_string(),
                    reason: format!("expected a number of seconds, got '{}'", timeout),
                })?;
    }

    Ok(config)
}
