use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid repository URL '{url}': {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("{provider} enumeration failed: {reason}")]
    ForgeEnumeration { provider: String, reason: String },

    #[error("git sync failed for '{url}': {reason}")]
    GitSync { url: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid cron expression: '{0}'")]
    CronInvalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
