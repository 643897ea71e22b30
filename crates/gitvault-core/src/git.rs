//! Thin wrapper around the `git` command line used to maintain local bare
//! mirrors.

use std::path::Path;
use std::process::Command;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::config::Credential;
use crate::error::{Result, VaultError};

/// Maintains a local bare mirror of one remote repository.
pub trait GitService: Send + Sync {
    /// Ensure an up-to-date bare mirror of `remote_url` at `local_path`.
    ///
    /// `force` discards any existing directory before cloning. `include_lfs`
    /// additionally fetches all LFS objects.
    fn sync_bare_repository(
        &self,
        remote_url: &str,
        local_path: &Path,
        credential: Option<&Credential>,
        force: bool,
        include_lfs: bool,
    ) -> Result<()>;
}

/// Production implementation shelling out to `git`.
pub struct CommandGit {
    git_binary: String,
}

impl CommandGit {
    pub fn new() -> Self {
        Self {
            git_binary: "git".to_string(),
        }
    }

    fn run(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        credential: Option<&Credential>,
        remote_url: &str,
    ) -> Result<()> {
        let mut command = Command::new(&self.git_binary);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        command.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(credential) = credential {
            // The auth header goes through GIT_CONFIG_* so the secret never
            // appears on the command line.
            let user = credential.username.as_deref().unwrap_or("git");
            let token = BASE64.encode(format!("{user}:{}", credential.api_key));
            command.env("GIT_CONFIG_COUNT", "1");
            command.env("GIT_CONFIG_KEY_0", "http.extraHeader");
            command.env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {token}"));
        }

        let output = command.output().map_err(|e| VaultError::GitSync {
            url: remote_url.to_string(),
            reason: format!("failed to run git {}: {e}", args.first().unwrap_or(&"")),
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(VaultError::GitSync {
            url: remote_url.to_string(),
            reason: format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        })
    }
}

impl Default for CommandGit {
    fn default() -> Self {
        Self::new()
    }
}

fn is_bare_repository(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

impl GitService for CommandGit {
    fn sync_bare_repository(
        &self,
        remote_url: &str,
        local_path: &Path,
        credential: Option<&Credential>,
        force: bool,
        include_lfs: bool,
    ) -> Result<()> {
        if force && local_path.exists() {
            tracing::debug!(path = %local_path.display(), "discarding existing mirror (force)");
            std::fs::remove_dir_all(local_path)?;
        }

        if !is_bare_repository(local_path) {
            // A leftover partial clone cannot be fetched into; start over.
            if local_path.exists() {
                std::fs::remove_dir_all(local_path)?;
            }
            if let Some(parent) = local_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let path = local_path.to_string_lossy();
            tracing::debug!(url = remote_url, path = %path, "mirror-cloning");
            self.run(
                &["clone", "--mirror", remote_url, path.as_ref()],
                None,
                credential,
                remote_url,
            )?;
        } else {
            // The remote may have moved (renames, credential rotation into
            // the URL), so pin it to the current clone URL before fetching.
            self.run(
                &["remote", "set-url", "origin", remote_url],
                Some(local_path),
                credential,
                remote_url,
            )?;
            tracing::debug!(url = remote_url, path = %local_path.display(), "fetching");
            self.run(
                &["fetch", "--all", "--prune"],
                Some(local_path),
                credential,
                remote_url,
            )?;
        }

        if include_lfs {
            self.run(
                &["lfs", "fetch", "--all"],
                Some(local_path),
                credential,
                remote_url,
            )?;
        }

        Ok(())
    }
}
