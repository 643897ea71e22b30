//! Forge API clients used by provider-mode jobs to enumerate the clone
//! URLs of every repository a credential owns.

mod forgejo;
mod github;
mod gitlab;

pub use self::forgejo::ForgejoClient;
pub use self::github::GitHubClient;
pub use self::gitlab::GitLabClient;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Credential;
use crate::error::Result;

/// Supported forges. Resolved from the settings file at load time; there is
/// no string-keyed lookup at sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    GitHub,
    GitLab,
    Forgejo,
}

impl ForgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ForgeKind::GitHub => "github",
            ForgeKind::GitLab => "gitlab",
            ForgeKind::Forgejo => "forgejo",
        }
    }

    /// API root used when the job does not set `baseUrl`. Forgejo instances
    /// are always self-hosted, so there is no default to offer.
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            ForgeKind::GitHub => Some("https://api.github.com"),
            ForgeKind::GitLab => Some("https://gitlab.com"),
            ForgeKind::Forgejo => None,
        }
    }
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One repository as reported by a forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepository {
    pub clone_url: String,
    pub web_url: Option<String>,
}

/// A single forge's listing API.
pub trait ForgeClient: Send + Sync {
    fn list_owned_repositories(
        &self,
        base_url: &str,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>>;
}

/// The seam the sync pipeline enumerates repositories through. Production
/// code uses [`ForgeClients`]; tests substitute a canned directory.
pub trait ForgeDirectory: Send + Sync {
    fn list_owned(
        &self,
        kind: ForgeKind,
        base_url: &str,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>>;
}

/// All real forge clients behind one HTTP agent.
pub struct ForgeClients {
    github: GitHubClient,
    gitlab: GitLabClient,
    forgejo: ForgejoClient,
}

impl ForgeClients {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(120))
            .build();
        Self {
            github: GitHubClient::new(agent.clone()),
            gitlab: GitLabClient::new(agent.clone()),
            forgejo: ForgejoClient::new(agent),
        }
    }
}

impl Default for ForgeClients {
    fn default() -> Self {
        Self::new()
    }
}

impl ForgeDirectory for ForgeClients {
    fn list_owned(
        &self,
        kind: ForgeKind,
        base_url: &str,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>> {
        let client: &dyn ForgeClient = match kind {
            ForgeKind::GitHub => &self.github,
            ForgeKind::GitLab => &self.gitlab,
            ForgeKind::Forgejo => &self.forgejo,
        };
        client.list_owned_repositories(base_url, credential)
    }
}

/// Shared pagination cap; a forge that reports more pages than this is
/// cut off with an error rather than looping forever.
pub(crate) const MAX_PAGES: usize = 1000;

pub(crate) fn enumeration_error(provider: ForgeKind, reason: impl std::fmt::Display) -> crate::error::VaultError {
    crate::error::VaultError::ForgeEnumeration {
        provider: provider.as_str().to_string(),
        reason: reason.to_string(),
    }
}
