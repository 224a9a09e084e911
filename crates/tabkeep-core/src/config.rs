//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tabkeep/config.toml)
//! 3. Environment variables (TABKEEP_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable prefix
const ENV_PREFIX: &str = "TABKEEP";

/// Keys accepted by [`Config::set`], also the `TABKEEP_*` override names
pub const KEYS: &[&str] = &["data_dir", "debounce_ms", "recently_closed_limit", "log_level"];

/// Default debounce window for document writes
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default number of recently-closed entries kept
pub const DEFAULT_RECENTLY_CLOSED_LIMIT: usize = 50;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Trailing-edge debounce applied to document writes, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Maximum number of entries in the recently-closed list
    #[serde(default = "default_recently_closed_limit")]
    pub recently_closed_limit: usize,

    /// Log filter used by the CLI when TABKEEP_LOG is unset
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            recently_closed_limit: DEFAULT_RECENTLY_CLOSED_LIMIT,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TABKEEP_DATA_DIR, TABKEEP_DEBOUNCE_MS, ...)
    /// 2. Config file (~/.config/tabkeep/config.toml or TABKEEP_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration rooted at a specific data directory, everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Set one key from its text form
    ///
    /// Used for both `TABKEEP_*` overrides and `tabkeep config set`. An empty
    /// or "none" log level clears it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "debounce_ms" => {
                self.debounce_ms = value
                    .parse()
                    .with_context(|| format!("debounce_ms must be milliseconds, got '{}'", value))?;
            }
            "recently_closed_limit" => {
                self.recently_closed_limit = value.parse().with_context(|| {
                    format!("recently_closed_limit must be a whole number, got '{}'", value)
                })?;
            }
            "log_level" => {
                self.log_level = match value {
                    "" | "none" => None,
                    level => Some(level.to_string()),
                };
            }
            _ => bail!(
                "Unknown configuration key '{}'. Valid keys: {}",
                key,
                KEYS.join(", ")
            ),
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        for key in KEYS {
            let name = format!("{}_{}", ENV_PREFIX, key.to_uppercase());
            let Ok(value) = std::env::var(&name) else {
                continue;
            };
            // A bad override keeps the file/default value
            if let Err(e) = self.set(key, &value) {
                warn!("Ignoring {}: {:#}", name, e);
            }
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TABKEEP_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabkeep")
            .join("config.toml")
    }

    /// Get the path to the SQLite key-value store
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("tabkeep.db")
    }

    /// Debounce window as a `Duration`
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabkeep")
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_recently_closed_limit() -> usize {
    DEFAULT_RECENTLY_CLOSED_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TABKEEP_DATA_DIR",
        "TABKEEP_DEBOUNCE_MS",
        "TABKEEP_RECENTLY_CLOSED_LIMIT",
        "TABKEEP_LOG_LEVEL",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.debounce_ms, 300);
        assert_eq!(config.recently_closed_limit, 50);
        assert!(config.log_level.is_none());
        assert!(config.data_dir.ends_with("tabkeep"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::with_data_dir("/data/tabkeep");
        assert_eq!(config.sqlite_path(), PathBuf::from("/data/tabkeep/tabkeep.db"));
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TABKEEP_DATA_DIR", "/tmp/tabkeep-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/tabkeep-test"));
    }

    #[test]
    fn test_env_override_debounce() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TABKEEP_DEBOUNCE_MS", "25");
        config.apply_env_overrides();
        assert_eq!(config.debounce_ms, 25);

        // Garbage is ignored
        env::set_var("TABKEEP_DEBOUNCE_MS", "soon");
        config.apply_env_overrides();
        assert_eq!(config.debounce_ms, 25);
    }

    #[test]
    fn test_env_override_log_level() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TABKEEP_LOG_LEVEL", "debug");
        config.apply_env_overrides();
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        env::set_var("TABKEEP_LOG_LEVEL", "");
        config.apply_env_overrides();
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_set_known_keys() {
        let mut config = Config::with_data_dir("/tmp/tabkeep");
        config.set("debounce_ms", "50").unwrap();
        config.set("recently_closed_limit", " 7 ").unwrap();
        config.set("log_level", "debug").unwrap();
        config.set("data_dir", "/var/tabkeep").unwrap();

        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.recently_closed_limit, 7);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.data_dir, PathBuf::from("/var/tabkeep"));

        config.set("log_level", "none").unwrap();
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("debounce_ms", "soon").is_err());
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);

        let err = config.set("sync_url", "ws://x").unwrap_err();
        assert!(err.to_string().contains("recently_closed_limit"));
    }

    #[test]
    fn test_save_to_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::with_data_dir(temp_dir.path().join("data"));
        config.set("recently_closed_limit", "12").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.recently_closed_limit, 12);
        assert_eq!(loaded.data_dir, temp_dir.path().join("data"));
    }

    #[test]
    fn test_serialization() {
        let config = Config {
            data_dir: PathBuf::from("/data/tabkeep"),
            debounce_ms: 150,
            recently_closed_limit: 10,
            log_level: Some("info".to_string()),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("debounce_ms"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.debounce_ms, 150);
        assert_eq!(parsed.recently_closed_limit, 10);
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_str(r#"data_dir = "/custom/data""#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.recently_closed_limit, DEFAULT_RECENTLY_CLOSED_LIMIT);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("TABKEEP_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.data_dir.exists());
    }
}
