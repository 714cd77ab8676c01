//! Layered configuration for the watch service.
//!
//! Sources, later layers overriding earlier ones:
//! - Built-in defaults
//! - `msdwatch.toml` in the working directory
//! - Environment variables prefixed with `MSDWATCH_`, with double
//!   underscores separating nested levels:
//!   - `MSDWATCH_WATCHER__SETTLE_DELAY_MS=500` sets `watcher.settle_delay_ms`
//!   - `MSDWATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "msdwatch.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Directory trees to watch and mirror into the cache.
    #[serde(default)]
    pub paths: Vec<WatchPathConfig>,

    /// How long to let a newly created or moved-in directory settle before
    /// walking it for synthetic events.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchPathConfig {
    pub path: PathBuf,

    #[serde(default = "default_true")]
    pub recursive: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level for all modules.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl WatcherConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file, still layering defaults
    /// below it and environment variables above it.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nesting levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed("MSDWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.watcher.paths.is_empty());
        assert_eq!(settings.watcher.settle_delay_ms, 1000);
        assert_eq!(settings.watcher.settle_delay(), Duration::from_secs(1));
        assert_eq!(settings.logging.default, "warn");
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("msdwatch.toml");

        let toml_content = r#"
[watcher]
settle_delay_ms = 250

[[watcher.paths]]
path = "/data/stations"

[[watcher.paths]]
path = "/data/archive"
recursive = false

[logging]
default = "info"

[logging.modules]
msdwatch = "debug"
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watcher.settle_delay_ms, 250);
        assert_eq!(settings.watcher.paths.len(), 2);
        assert_eq!(settings.watcher.paths[0].path, PathBuf::from("/data/stations"));
        assert!(settings.watcher.paths[0].recursive);
        assert!(!settings.watcher.paths[1].recursive);
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["msdwatch"], "debug");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("msdwatch.toml");

        fs::write(&config_path, "[logging]\ndefault = \"debug\"\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.logging.default, "debug");
        assert_eq!(settings.watcher.settle_delay_ms, 1000);
    }

    #[test]
    fn test_env_overrides_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("msdwatch.toml");
        fs::write(&config_path, "[watcher]\nsettle_delay_ms = 250\n").unwrap();

        unsafe {
            std::env::set_var("MSDWATCH_WATCHER__SETTLE_DELAY_MS", "50");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("MSDWATCH_WATCHER__SETTLE_DELAY_MS");
        }

        assert_eq!(settings.watcher.settle_delay_ms, 50);
    }
}
