use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use super::types::*;
use crate::error::{Result, VaultError};
use crate::forge::ForgeKind;
use crate::schedule;

/// Raw deserialization shape of the settings file. Deprecated top-level
/// keys are captured so the error can point at their replacement instead of
/// surfacing as an unknown-field failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsDocument {
    #[serde(default)]
    logging: LoggingSettings,
    #[serde(default = "super::defaults::default_working_root")]
    working_root: String,
    storage: StorageSettings,
    #[serde(default)]
    credentials: BTreeMap<String, Credential>,
    #[serde(default)]
    repositories: Vec<RepositoryJob>,
    schedule: ScheduleSettings,
    #[serde(default)]
    backups: Option<serde_yaml::Value>,
    #[serde(default)]
    mirrors: Option<serde_yaml::Value>,
}

/// Load, expand, parse, and validate a settings file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| VaultError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let expanded = expand_env_placeholders(&contents, path)?;
    let document: SettingsDocument = serde_yaml::from_str(&expanded)
        .map_err(|e| VaultError::Config(format!("invalid settings '{}': {e}", path.display())))?;
    validate_document(document)
}

fn validate_document(document: SettingsDocument) -> Result<Settings> {
    if document.backups.is_some() || document.mirrors.is_some() {
        return Err(VaultError::Config(
            "'backups' and 'mirrors' jobs were removed; move each entry into the \
             'repositories' list (mode: provider or mode: url)"
                .into(),
        ));
    }
    if document.schedule.backups.is_some() || document.schedule.mirrors.is_some() {
        return Err(VaultError::Config(
            "'schedule.backups' and 'schedule.mirrors' were removed; configure \
             'schedule.repositories.cron' instead"
                .into(),
        ));
    }

    validate_storage(&document.storage)?;

    schedule::parse_cron(&document.schedule.repositories.cron)?;

    if document.working_root.trim().is_empty() {
        return Err(VaultError::Config("'workingRoot' must not be blank".into()));
    }

    // Credential names are matched case-insensitively everywhere, so two
    // names that collide after lowering are ambiguous.
    let mut credentials: BTreeMap<String, Credential> = BTreeMap::new();
    for (name, credential) in document.credentials {
        if credential.api_key.trim().is_empty() {
            return Err(VaultError::Config(format!(
                "credential '{name}' has a blank apiKey"
            )));
        }
        if credentials.insert(name.to_lowercase(), credential).is_some() {
            return Err(VaultError::Config(format!(
                "credential '{name}' is defined more than once (names are case-insensitive)"
            )));
        }
    }

    for (position, job) in document.repositories.iter().enumerate() {
        validate_job(position, job)?;
    }

    Ok(Settings {
        logging: document.logging,
        working_root: document.working_root,
        storage: document.storage,
        credentials,
        repositories: document.repositories,
        schedule: document.schedule,
    })
}

fn validate_storage(storage: &StorageSettings) -> Result<()> {
    require_absolute_http(&storage.endpoint, "storage.endpoint")?;
    for (value, field) in [
        (&storage.region, "storage.region"),
        (&storage.access_key_id, "storage.accessKeyId"),
        (&storage.secret_access_key, "storage.secretAccessKey"),
        (&storage.bucket, "storage.bucket"),
    ] {
        if value.trim().is_empty() {
            return Err(VaultError::Config(format!("'{field}' must not be blank")));
        }
    }
    Ok(())
}

fn validate_job(position: usize, job: &RepositoryJob) -> Result<()> {
    let at = |message: String| VaultError::Config(format!("repositories[{position}]: {message}"));

    match job.mode {
        JobMode::Provider => {
            let provider = job
                .provider
                .ok_or_else(|| at("provider mode requires 'provider'".into()))?;
            if job.credential.is_none() {
                return Err(at("provider mode requires 'credential'".into()));
            }
            if job.url.is_some() {
                return Err(at("provider mode does not accept 'url'".into()));
            }
            match &job.base_url {
                Some(base_url) => require_absolute_http(base_url, "baseUrl")
                    .map_err(|e| at(e.to_string()))?,
                None => {
                    if provider == ForgeKind::Forgejo {
                        return Err(at("forgejo requires 'baseUrl'".into()));
                    }
                }
            }
        }
        JobMode::Url => {
            let url = job
                .url
                .as_deref()
                .ok_or_else(|| at("url mode requires 'url'".into()))?;
            require_absolute_http(url, "url").map_err(|e| at(e.to_string()))?;
            if job.provider.is_some() {
                return Err(at("url mode does not accept 'provider'".into()));
            }
            if job.base_url.is_some() {
                return Err(at("url mode does not accept 'baseUrl'".into()));
            }
        }
    }
    Ok(())
}

fn require_absolute_http(raw: &str, field: &str) -> Result<()> {
    let url = Url::parse(raw)
        .map_err(|e| VaultError::Config(format!("'{field}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(VaultError::Config(format!(
            "'{field}' must be an http or https URL, got scheme '{other}'"
        ))),
    }
}

/// Expand `${VAR}` and `${VAR:-default}` placeholders in the raw settings
/// text before YAML parsing.
fn expand_env_placeholders(input: &str, path: &Path) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0usize;

    while let Some(offset) = input[cursor..].find("${") {
        let start = cursor + offset;
        out.push_str(&input[cursor..start]);

        let token_start = start + 2;
        let Some(end_rel) = input[token_start..].find('}') else {
            return Err(VaultError::Config(format!(
                "invalid settings '{}': unterminated environment placeholder",
                path.display()
            )));
        };
        let token = &input[token_start..token_start + end_rel];
        out.push_str(&resolve_env_token(token, path)?);
        cursor = token_start + end_rel + 1;
    }

    out.push_str(&input[cursor..]);
    Ok(out)
}

fn resolve_env_token(token: &str, path: &Path) -> Result<String> {
    let (name, default) = match token.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (token, None),
    };
    if name.is_empty() || !is_valid_env_var_name(name) {
        return Err(VaultError::Config(format!(
            "invalid settings '{}': invalid environment placeholder '${{{token}}}'",
            path.display()
        )));
    }
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        Ok(_) | Err(std::env::VarError::NotPresent) => match default {
            Some(d) => Ok(d.to_string()),
            None => Err(VaultError::Config(format!(
                "invalid settings '{}': environment variable '{name}' is not set",
                path.display()
            ))),
        },
        Err(std::env::VarError::NotUnicode(_)) => Err(VaultError::Config(format!(
            "invalid settings '{}': environment variable '{name}' is not valid UTF-8",
            path.display()
        ))),
    }
}

fn is_valid_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Settings file candidates probed when no path is given, in order.
pub fn default_settings_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("gitvault.yaml"),
        PathBuf::from("settings.yaml"),
        PathBuf::from("/etc/gitvault/config.yaml"),
    ]
}

/// Resolve which settings file to use.
///
/// Priority: positional argument > `GITVAULT_CONFIG` env var > first
/// existing default candidate. `None` when nothing is found.
pub fn resolve_settings_path(cli_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(PathBuf::from(path));
    }
    if let Ok(value) = std::env::var("GITVAULT_CONFIG") {
        if !value.is_empty() {
            return Some(PathBuf::from(value));
        }
    }
    default_settings_candidates()
        .into_iter()
        .find(|candidate| candidate.exists())
}
