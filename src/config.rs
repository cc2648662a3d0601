use anyhow::{Context, Result};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for commitpulse
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub authentication and API settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Commit database settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token"

    /// Account whose commits are collected (auto-detected if null)
    pub username: Option<String>,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Value of the X-GitHub-Api-Version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Repository type passed to the listing endpoint
    #[serde(default = "default_repo_type")]
    pub repo_type: String, // "public", "private", "owner", "all"

    /// Page size for listing endpoints (GitHub caps this at 100)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Pages followed per listing before the sync fails instead of undercounting
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Lookback window in weeks
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: u32,

    /// Maximum concurrent repository fetches
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Retries for rate-limited or timed-out requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Storage configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// SQLite database location
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "full"
}

// Default value functions
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_api_version() -> String {
    "2022-11-28".to_string()
}
fn default_repo_type() -> String {
    "public".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    100
}
fn default_lookback_weeks() -> u32 {
    52
}
fn default_max_parallel() -> usize {
    4
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_database_path() -> String {
    if let Some(data_home) = data_dir() {
        data_home
            .join("commitpulse")
            .join("commits.db")
            .to_string_lossy()
            .into_owned()
    } else {
        "/tmp/commitpulse/commits.db".to_string()
    }
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8090
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            username: None,
            api_url: default_api_url(),
            api_version: default_api_version(),
            repo_type: default_repo_type(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_weeks: default_lookback_weeks(),
            max_parallel: default_max_parallel(),
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl GitHubConfig {
    /// Page size clamped to what the API accepts
    pub fn page_size(&self) -> u32 {
        self.per_page.clamp(1, 100)
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Worker pool size, never zero
    pub fn worker_limit(&self) -> usize {
        self.max_parallel.max(1)
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let mut config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;
            tracing::info!("Created default configuration at: {:?}", config_path);

            config.apply_env_overrides()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;
        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("commitpulse").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.storage.database_path = shellexpand::full(&self.storage.database_path)
            .context("Failed to expand database_path")?
            .into_owned();

        Ok(())
    }

    /// Apply HOST / PORT from the environment over the file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if !port.is_empty() {
                self.server.port = port
                    .parse()
                    .with_context(|| format!("PORT is not a valid port number: {}", port))?;
            }
        }

        Ok(())
    }

    /// Database location as a path
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.github.auth_method, "auto");
        assert!(config.github.username.is_none());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.api_version, "2022-11-28");
        assert_eq!(config.github.repo_type, "public");
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.github.max_pages, 100);
        assert_eq!(config.sync.lookback_weeks, 52);
        assert_eq!(config.sync.max_parallel, 4);
        assert_eq!(config.sync.request_timeout, 30);
        assert_eq!(config.server.port, 8090);
        assert!(config.storage.database_path.ends_with("commits.db"));
    }

    #[test]
    fn test_page_size_is_clamped() {
        let mut github = GitHubConfig::default();

        github.per_page = 500;
        assert_eq!(github.page_size(), 100);

        github.per_page = 0;
        assert_eq!(github.page_size(), 1);
    }

    #[test]
    fn test_worker_limit_never_zero() {
        let sync = SyncConfig {
            max_parallel: 0,
            ..Default::default()
        };
        assert_eq!(sync.worker_limit(), 1);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.github.username = Some("octocat".to_string());
        config.sync.max_parallel = 8;
        config.storage.database_path = "/custom/commits.db".to_string();

        config.save(&config_path).expect("Failed to save config");
        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.github.username, Some("octocat".to_string()));
        assert_eq!(loaded.sync.max_parallel, 8);
        assert_eq!(loaded.storage.database_path, "/custom/commits.db");
    }

    #[test]
    fn test_expand_paths() {
        let mut config = Config::default();
        config.storage.database_path = "${CARGO_MANIFEST_DIR}/commits.db".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(
            config.storage.database_path,
            format!("{}/commits.db", env!("CARGO_MANIFEST_DIR"))
        );
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
github:
  auth_method: "token"
  username: "octocat"
  api_url: "http://localhost:9000"
  repo_type: "all"
  per_page: 50
sync:
  lookback_weeks: 4
  max_parallel: 2
  request_timeout: 5
  max_retries: 0
storage:
  database_path: "/var/lib/commitpulse/commits.db"
logging:
  level: "debug"
  format: "full"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.github.auth_method, "token");
        assert_eq!(config.github.username, Some("octocat".to_string()));
        assert_eq!(config.github.api_url, "http://localhost:9000");
        assert_eq!(config.github.api_version, "2022-11-28");
        assert_eq!(config.github.repo_type, "all");
        assert_eq!(config.github.page_size(), 50);
        assert_eq!(config.sync.lookback_weeks, 4);
        assert_eq!(config.sync.worker_limit(), 2);
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.max_retries, 0);
        assert_eq!(config.sync.retry_backoff_ms, 500);
        assert_eq!(config.storage.database_path, "/var/lib/commitpulse/commits.db");
        assert_eq!(config.server.bind_address(), "127.0.0.1:8090");
        assert_eq!(config.logging.level, "debug");
    }
}
