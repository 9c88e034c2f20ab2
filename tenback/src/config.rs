//! Backup configuration document.
//!
//! A single JSON file holds the remote connection details, credentials, and
//! tunables. On first run the file is created with defaults and the process
//! exits with instructions; missing credentials are a fatal precondition,
//! checked before any network activity.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TENBACK_CONFIG";

/// Default config file location when neither `--config` nor the environment
/// variable is set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tenback/config.json";

fn default_base_url() -> String {
    "http://localhost:8090".to_string()
}
fn default_rclone_remote() -> String {
    "gdrive".to_string()
}
fn default_remote_root() -> String {
    "Tenback-Backups".to_string()
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("/tmp/tenback")
}
fn default_keep_local_days() -> u64 {
    7
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("/tmp/tenback/tenback.log"))
}

/// Persisted configuration for backup and restore runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Record store base url
    pub base_url: String,

    /// Store admin email. Must be filled in before the first real run.
    pub admin_email: String,

    /// Store admin password. Must be filled in before the first real run.
    pub admin_password: String,

    /// Name of the configured rclone remote (without the trailing colon)
    pub rclone_remote: String,

    /// Folder under the remote that all backups live in
    pub remote_root: String,

    /// Local working root for staged archives
    pub work_dir: PathBuf,

    /// Local retention window in days; older files are deleted after a run
    pub keep_local_days: u64,

    /// Also produce a server-side full-database snapshot each run
    pub include_full_snapshot: bool,

    /// Download file attachments into tenant archives
    pub include_files: bool,

    /// Outer upload retry attempts (per archive)
    pub max_retries: u32,

    /// Base backoff delay between upload attempts; actual wait is
    /// `retry_delay_secs * attempt`
    pub retry_delay_secs: u64,

    /// Optional webhook url for run notifications (empty disables)
    pub webhook_url: String,

    /// Send a webhook on clean runs
    pub webhook_on_success: bool,

    /// Send a webhook on runs with errors
    pub webhook_on_failure: bool,

    /// Optional append-only log file, in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            base_url: default_base_url(),
            admin_email: String::new(),
            admin_password: String::new(),
            rclone_remote: default_rclone_remote(),
            remote_root: default_remote_root(),
            work_dir: default_work_dir(),
            keep_local_days: default_keep_local_days(),
            include_full_snapshot: true,
            include_files: true,
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            webhook_url: String::new(),
            webhook_on_success: false,
            webhook_on_failure: true,
            log_file: default_log_file(),
        }
    }
}

/// Outcome of [`load_or_init`].
pub enum ConfigLoad {
    /// Config file existed and parsed
    Loaded(BackupConfig),
    /// Config file was missing; a default was written at this path and the
    /// caller should exit with instructions
    Created(PathBuf),
}

/// Resolves the config path from an explicit flag, the `TENBACK_CONFIG`
/// environment variable, or the default location.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the configuration, writing a default file on first run.
pub fn load_or_init(path: &Path) -> Result<ConfigLoad> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&BackupConfig::default())?;
        std::fs::write(path, text)
            .with_context(|| format!("writing default config {}", path.display()))?;
        return Ok(ConfigLoad::Created(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: BackupConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(ConfigLoad::Loaded(config))
}

impl BackupConfig {
    /// Fails if admin credentials are missing. Called before any network
    /// activity so a bad config never results in a half-done run.
    pub fn require_credentials(&self) -> Result<()> {
        if self.admin_email.is_empty() || self.admin_password.is_empty() {
            bail!("admin_email / admin_password not set in config - edit the config file first");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let config = BackupConfig::default();
        let text = serde_json::to_string_pretty(&config).unwrap();
        let back: BackupConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.rclone_remote, "gdrive");
        assert_eq!(back.keep_local_days, 7);
        assert!(back.include_files);
        assert!(!back.webhook_on_success);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let back: BackupConfig =
            serde_json::from_str(r#"{"admin_email": "a@b.c", "max_retries": 5}"#).unwrap();
        assert_eq!(back.admin_email, "a@b.c");
        assert_eq!(back.max_retries, 5);
        assert_eq!(back.retry_delay_secs, 10);
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let config = BackupConfig::default();
        assert!(config.require_credentials().is_err());
        let config = BackupConfig {
            admin_email: "a@b.c".into(),
            admin_password: "pw".into(),
            ..BackupConfig::default()
        };
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn first_run_writes_default_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("conf/config.json");
        match load_or_init(&path).unwrap() {
            ConfigLoad::Created(created) => assert_eq!(created, path),
            ConfigLoad::Loaded(_) => panic!("expected Created"),
        }
        assert!(path.is_file());
        match load_or_init(&path).unwrap() {
            ConfigLoad::Loaded(config) => assert!(config.admin_email.is_empty()),
            ConfigLoad::Created(_) => panic!("expected Loaded"),
        }
    }
}
