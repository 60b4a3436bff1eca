use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Main configuration structure for RepoVault
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root directory that holds one mirror per repository
    #[serde(default = "default_backup_directory")]
    pub backup_directory: String,

    /// GitHub API access settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Mirror synchronization behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// HTTP control surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// API root, overridable for GitHub Enterprise
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Personal access token; GITHUB_TOKEN takes precedence when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Credential source
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "token", "gh_cli"

    /// Repositories requested per listing page
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Timeout for each API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Timeout for each git operation in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Repositories synced at once; 1 keeps runs strictly sequential
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Fast-forward only pulls
    #[serde(default = "default_true")]
    pub fast_forward_only: bool,

    /// Remove directories left behind by a failed fresh clone
    #[serde(default = "default_true")]
    pub cleanup_on_error: bool,

    /// Hand the API credential to git for https remotes
    #[serde(default = "default_true")]
    pub authenticate_git: bool,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static UI files served at the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,

    /// Start a backup as soon as the server is up
    #[serde(default = "default_true")]
    pub backup_on_start: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "pretty", "full"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_backup_directory() -> String {
    "${HOME}/github-backup".to_string()
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_request_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    300
}
fn default_max_parallel() -> usize {
    1
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
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
            api_url: default_api_url(),
            token: None,
            auth_method: default_auth_method(),
            per_page: default_per_page(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_parallel: default_max_parallel(),
            fast_forward_only: default_true(),
            cleanup_on_error: default_true(),
            authenticate_git: default_true(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            static_dir: None,
            backup_on_start: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            let mut config = Self::default();
            config.expand_paths()?;
            config
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file and apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repovault").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.backup_directory = shellexpand::full(&self.backup_directory)
            .context("Failed to expand backup_directory path")?
            .into_owned();

        if let Some(static_dir) = &self.server.static_dir {
            self.server.static_dir = Some(
                shellexpand::full(static_dir)
                    .context("Failed to expand static_dir path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Apply GITHUB_TOKEN, BACKUP_DIR and PORT from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(token) = non_empty_env("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }

        if let Some(dir) = non_empty_env("BACKUP_DIR") {
            self.backup_directory = shellexpand::full(&dir)
                .map(|expanded| expanded.into_owned())
                .unwrap_or(dir);
        }

        if let Some(port) = non_empty_env("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        Ok(())
    }

    /// Backup root as a path
    pub fn backup_path(&self) -> PathBuf {
        PathBuf::from(&self.backup_directory)
    }

    /// Effective worker count for a run
    pub fn effective_parallelism(&self) -> usize {
        self.sync.max_parallel.max(1)
    }

    /// Create the backup root if needed and verify it is writable
    pub fn prepare_backup_dir(&self) -> Result<PathBuf, ConfigError> {
        let path = self.backup_path();

        if !path.exists() {
            create_dir_with_mode(&path).map_err(|source| ConfigError::CreateBackupDir {
                path: path.clone(),
                source,
            })?;
            info!("Created backup directory at {}", path.display());
        }

        log_directory_diagnostics(&path);

        let probe = path.join(".test-write");
        std::fs::write(&probe, b"test")
            .and_then(|_| std::fs::remove_file(&probe))
            .map_err(|source| ConfigError::BackupDirUnwritable {
                path: path.clone(),
                source,
            })?;

        debug!("Backup directory is writable: {}", path.display());
        Ok(path)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(unix)]
fn create_dir_with_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o755)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir_with_mode(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

fn log_directory_diagnostics(path: &Path) {
    let entries = std::fs::read_dir(path).map(|dir| dir.count()).ok();

    match std::fs::metadata(path) {
        #[cfg(unix)]
        Ok(meta) => {
            use std::os::unix::fs::MetadataExt;
            debug!(
                path = %path.display(),
                mode = %format!("{:o}", meta.mode()),
                uid = meta.uid(),
                gid = meta.gid(),
                entries = ?entries,
                "Backup directory status"
            );
        }
        #[cfg(not(unix))]
        Ok(meta) => {
            debug!(
                path = %path.display(),
                readonly = meta.permissions().readonly(),
                entries = ?entries,
                "Backup directory status"
            );
        }
        Err(e) => debug!("Could not stat backup directory {}: {}", path.display(), e),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_directory: default_backup_directory(),
            github: GitHubConfig::default(),
            sync: SyncConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
