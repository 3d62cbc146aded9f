//! CLI configuration via environment variables
//!
//! Package settings (module paths, registry) live in `~/.xel/config.json`
//! and are loaded by `xel_config::ConfigLoader`. The variables here only
//! affect the binary itself.

use std::env;
use xel_package::RuntimeVersions;

/// Log filter (XEL_LOG, `tracing_subscriber::EnvFilter` syntax)
pub const ENV_LOG: &str = "XEL_LOG";
/// Engine version reported to compatibility checks
pub const ENV_ENGINE_VERSION: &str = "XEL_ENGINE_VERSION";
/// Treat both versions as unknown and skip compatibility checks
pub const ENV_DEV_MODE: &str = "XEL_DEV_MODE";

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub engine_version: String,
    pub dev_mode: bool,
    /// Disable colored output (XEL_NO_COLOR=1 or NO_COLOR=1)
    pub no_color: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            log_filter: env::var(ENV_LOG)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "warn".to_string()),
            engine_version: env::var(ENV_ENGINE_VERSION).unwrap_or_default(),
            dev_mode: env::var(ENV_DEV_MODE)
                .map(|v| {
                    let lower = v.to_lowercase();
                    lower == "1" || lower == "true" || lower == "on"
                })
                .unwrap_or(false),
            no_color: env::var("XEL_NO_COLOR").is_ok() || env::var("NO_COLOR").is_ok(),
        }
    }

    /// Versions checked against a package's `xel` and `engine` fields
    pub fn runtime_versions(&self) -> RuntimeVersions {
        if self.dev_mode {
            return RuntimeVersions::development();
        }
        RuntimeVersions::new(env!("CARGO_PKG_VERSION"), self.engine_version.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
