use serde::Deserialize;

use super::{enumeration_error, ForgeClient, ForgeKind, RemoteRepository, MAX_PAGES};
use crate::config::Credential;
use crate::error::Result;

const PER_PAGE: usize = 100;

/// GitLab v4 API client listing projects owned by the token's user.
pub struct GitLabClient {
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct ProjectDto {
    http_url_to_repo: String,
    web_url: Option<String>,
}

impl GitLabClient {
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl ForgeClient for GitLabClient {
    fn list_owned_repositories(
        &self,
        base_url: &str,
        credential: &Credential,
    ) -> Result<Vec<RemoteRepository>> {
        let base = base_url.trim_end_matches('/');
        let mut repositories = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{base}/api/v4/projects?membership=true&owned=true&simple=true&per_page={PER_PAGE}&page={page}"
            );
            let response = self
                .agent
                .get(&url)
                .set("PRIVATE-TOKEN", &credential.api_key)
                .call()
                .map_err(|e| enumeration_error(ForgeKind::GitLab, e))?;
            let batch: Vec<ProjectDto> = response
                .into_json()
                .map_err(|e| enumeration_error(ForgeKind::GitLab, e))?;
            let batch_len = batch.len();

            repositories.extend(batch.into_iter().map(|dto| RemoteRepository {
                clone_url: dto.http_url_to_repo,
                web_url: dto.web_url,
            }));

            if batch_len < PER_PAGE {
                return Ok(repositories);
            }
        }

        Err(enumeration_error(
            ForgeKind::GitLab,
            format!("more than {MAX_PAGES} result pages"),
        ))
    }
}
