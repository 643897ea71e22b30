use serde::Deserialize;

use super::{enumeration_error, ForgeClient, ForgeKind, RemoteRepository, MAX_PAGES};
use crate::config::Credential;
use crate::error::Result;

const PER_PAGE: usize = 100;

/// GitHub REST v3 client listing repositories owned by the token's user.
pub struct GitHubClient {
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct RepoDto {
    clone_url: String,
    html_url: Option<String>,
}

impl GitHubClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl ForgeClient for GitHubClient {
    fn list_owned_repositories(
        &self,
        base_url: &str,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>> {
        let base = base_url.trim_end_matches('/');
        let mut repositories = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{base}/user/repos?affiliation=owner&per_page={PER_PAGE}&page={page}"
            );
            let response = self
                .agent
                .get(&url)
                .set("Authorization", &format!("token {}", credential.api_key))
                .set("Accept", "application/vnd.github+json")
                .set("User-Agent", "gitvault")
                .call()
                .map_err(|e| enumeration_error(ForgeKind::GitHub, e))?;
            let batch: Vec<RepoDto> = response
                .into_json()
                .map_err(|e| enumeration_error(ForgeKind::GitHub, e))?;
            let batch_len = batch.len();

            repositories.extend(batch.into_iter().map(|dto| RemoteRepository {
                clone_url: dto.clone_url,
                web_url: dto.html_url,
            }));

            if batch_len < PER_PAGE {
                return Ok(repositories);
            }
        }

        Err(enumeration_error(
            ForgeKind::GitHub,
            format!("more than {MAX_PAGES} result pages"),
        ))
    }
}
