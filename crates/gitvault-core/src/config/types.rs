use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::defaults::*;
use crate::forge::ForgeKind;

/// Fully loaded and validated settings snapshot. Immutable once built; the
/// scheduler captures a fresh `Arc<Settings>` at every iteration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub working_root: String,
    pub storage: StorageSettings,
    /// Credential names are canonicalized to lowercase at load time.
    pub credentials: BTreeMap<String, Credential>,
    pub repositories: Vec<RepositoryJob>,
    pub schedule: ScheduleSettings,
}

impl Settings {
    /// Case-insensitive credential lookup.
    pub fn credential(&self, name: &str) -> Option<&Credential> {
        self.credentials.get(&name.to_lowercase())
    }

    /// Jobs with `enabled: true`.
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &RepositoryJob> {
        self.repositories.iter().filter(|job| job.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default)]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StorageSettings {
    /// Absolute http/https URL of the S3-compatible endpoint.
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    #[serde(default)]
    pub force_path_style: bool,
    #[serde(default)]
    pub payload_signature_mode: PayloadSignatureMode,
    #[serde(default)]
    pub always_calculate_content_md5: bool,
    /// Snapshot age cutoff in days. Absent or non-positive disables
    /// retention entirely.
    #[serde(default)]
    pub retention: Option<i64>,
    /// Newest snapshots kept per repository regardless of age. Zero is
    /// allowed but warned about: a repository removed from the settings can
    /// then lose all of its snapshots.
    #[serde(default = "default_retention_minimum")]
    pub retention_minimum: u32,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSignatureMode {
    #[default]
    Full,
    Streaming,
    Unsigned,
}

/// Retry tuning for transient HTTP failures in the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Credential {
    #[serde(default)]
    pub username: Option<String>,
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    Provider,
    Url,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Provider => "provider",
            JobMode::Url => "url",
        }
    }
}

/// One entry in the `repositories:` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RepositoryJob {
    pub mode: JobMode,
    /// Provider mode only.
    #[serde(default)]
    pub provider: Option<ForgeKind>,
    /// Name of a `credentials` entry. Required in provider mode, optional
    /// in url mode.
    #[serde(default)]
    pub credential: Option<String>,
    /// Url mode only: the clone URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Provider mode only: forge API root. Required for forgejo, optional
    /// for github/gitlab.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub lfs: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleSettings {
    pub repositories: JobSchedule,
    // Removed job families; kept so the migration error can name them.
    #[serde(default)]
    pub backups: Option<serde_yaml::Value>,
    #[serde(default)]
    pub mirrors: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobSchedule {
    /// 5- or 6-field cron expression, evaluated in UTC.
    pub cron: String,
}
