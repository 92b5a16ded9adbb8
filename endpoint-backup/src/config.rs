//! Configuration management for the endpoint backup agent.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`ENDPOINT_BACKUP__BACKUP__RETENTION=3` sets `backup.retention`).

use crate::executor::BackupConfig;
use crate::storage::{LocalProvider, S3Provider, StorageProvider};
use crate::utils::errors::BackupError;
use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const ENV_PREFIX: &str = "ENDPOINT_BACKUP";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub backup: BackupSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Unique agent identifier
    pub id: String,

    /// HTTP control API port
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Start the periodic scheduler on launch
    pub enabled: bool,

    /// Storage backend (local, s3)
    pub provider: String,

    /// Files or directories to back up
    pub paths: Vec<PathBuf>,

    /// Seconds between scheduled runs (0 disables the scheduler)
    pub schedule_secs: u64,

    /// Snapshots to keep (0 or less disables pruning)
    pub retention: i64,

    /// Base directory for the local provider
    pub local_path: PathBuf,

    pub s3_bucket: String,
    pub s3_region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "endpoint-agent-01".to_string()),
            port: 9990,
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "local".to_string(),
            paths: Vec::new(),
            schedule_secs: 24 * 60 * 60,
            retention: 7,
            local_path: PathBuf::from("/var/lib/endpoint-backup/backups"),
            s3_bucket: String::new(),
            s3_region: String::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        Self::load(Some(path))
    }

    /// Defaults plus environment overrides, optionally layered over a file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("backup.paths"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Every problem in the configuration. Each one is also logged.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let backup = &self.backup;

        match backup.provider.as_str() {
            "local" => {
                if backup.local_path.as_os_str().is_empty() {
                    problems.push("backup.local_path is required for the local provider".to_string());
                }
            }
            "s3" => {
                if backup.s3_bucket.is_empty() {
                    problems.push("backup.s3_bucket is required for the s3 provider".to_string());
                }
                if backup.s3_region.is_empty() {
                    problems.push("backup.s3_region is required for the s3 provider".to_string());
                }
            }
            other => problems.push(format!("unknown backup.provider {:?}", other)),
        }

        if backup.enabled && backup.paths.is_empty() {
            problems.push("backup.paths is empty but backups are enabled".to_string());
        }
        if backup.paths.iter().any(|p| p.as_os_str().is_empty()) {
            problems.push("backup.paths contains an empty entry".to_string());
        }

        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            problems.push(format!("unknown log.level {:?}", self.log.level));
        }

        for problem in &problems {
            warn!(problem = %problem, "Invalid configuration");
        }
        problems
    }

    /// Storage backend named by `backup.provider`.
    pub fn provider(&self) -> crate::Result<Arc<dyn StorageProvider>> {
        let backup = &self.backup;
        match backup.provider.as_str() {
            "local" => Ok(Arc::new(LocalProvider::new(&backup.local_path))),
            "s3" => Ok(Arc::new(S3Provider::new(&backup.s3_bucket, &backup.s3_region))),
            other => Err(BackupError::Config(format!("unknown backup provider {:?}", other))),
        }
    }

    /// The immutable settings handed to the backup manager.
    pub fn backup_config(&self) -> crate::Result<BackupConfig> {
        Ok(BackupConfig {
            provider: Some(self.provider()?),
            paths: self.backup.paths.clone(),
            schedule: Duration::from_secs(self.backup.schedule_secs),
            retention: usize::try_from(self.backup.retention).unwrap_or(0),
        })
    }

    /// Effective configuration rendered back to TOML.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.port, 9990);
        assert_eq!(config.backup.provider, "local");
        assert_eq!(config.log.level, "info");
        assert!(!config.backup.enabled);
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
[backup]
enabled = true
paths = ["/etc", "/home/user/notes.txt"]
schedule_secs = 3600
retention = 3
local_path = "/srv/backups"
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.backup.enabled);
        assert_eq!(config.backup.paths.len(), 2);
        assert_eq!(config.backup.retention, 3);
        assert_eq!(config.agent.port, 9990);
        assert!(config.validate().is_empty());

        let backup = config.backup_config().unwrap();
        assert_eq!(backup.schedule, Duration::from_secs(3600));
        assert_eq!(backup.retention, 3);
        assert_eq!(backup.provider.unwrap().name(), "local");
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = Config::default();
        config.backup.provider = "s3".to_string();
        config.backup.enabled = true;
        config.log.level = "loud".to_string();

        let problems = config.validate();
        assert_eq!(problems.len(), 4, "{:?}", problems);
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.backup.provider = "ftp".to_string();
        assert_eq!(config.validate().len(), 1);
        assert!(matches!(config.backup_config(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_negative_retention_disables_pruning() {
        let mut config = Config::default();
        config.backup.retention = -1;
        assert_eq!(config.backup_config().unwrap().retention, 0);
    }

    #[test]
    fn test_toml_output_reloads() {
        let mut config = Config::default();
        config.backup.paths = vec![PathBuf::from("/data")];
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("[backup]"));

        let file = write_config(&rendered);
        let reloaded = Config::from_file(file.path()).unwrap();
        assert_eq!(reloaded.backup.paths, vec![PathBuf::from("/data")]);
        assert_eq!(reloaded.agent.id, config.agent.id);
    }
}
