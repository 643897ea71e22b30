//! Parsing of clone URLs into the canonical path segments that drive both
//! object-key derivation and repository identity.

use url::Url;

use crate::error::{Result, VaultError};

/// Canonical path information derived from a repository clone URL.
///
/// Two URLs that normalize to the same `RepositoryPathInfo` address the same
/// storage location on purpose: `http://` vs `https://`, trailing slashes,
/// a `.git` suffix, and letter case all collapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryPathInfo {
    /// Registered domain: the last two dot-separated host labels.
    pub base_domain: String,
    /// The entire host, lowercased.
    pub full_domain: String,
    /// First path segment.
    pub owner: String,
    /// Second path segment, when the path has at least three segments.
    pub group: Option<String>,
    /// Any middle segments beyond the group, joined with `-`.
    pub secondary_group: Option<String>,
    /// Last path segment with a trailing `.git` stripped.
    pub repository_name: String,
}

impl RepositoryPathInfo {
    /// Parse an absolute `http`/`https` clone URL.
    pub fn from_url(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| VaultError::InvalidRepositoryUrl {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("URL is empty"));
        }

        let url = Url::parse(trimmed).map_err(|e| VaultError::InvalidRepositoryUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("URL has no host"))?
            .to_ascii_lowercase();

        let segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(invalid(
                "expected at least an owner and a repository name in the path",
            ));
        }

        let owner = sanitize_segment(segments[0]);
        let last = segments[segments.len() - 1];
        let repository_name = sanitize_segment(strip_git_suffix(last));

        let group = if segments.len() >= 3 {
            Some(sanitize_segment(segments[1]))
        } else {
            None
        };
        let secondary_group = if segments.len() >= 4 {
            let middle: Vec<String> = segments[2..segments.len() - 1]
                .iter()
                .map(|s| sanitize_segment(s))
                .collect();
            Some(middle.join("-"))
        } else {
            None
        };

        Ok(Self {
            base_domain: base_domain(&host),
            full_domain: host,
            owner,
            group,
            secondary_group,
            repository_name,
        })
    }

    /// Ordered path segments: owner, group?, secondary group?, name.
    pub fn hierarchy(&self) -> Vec<&str> {
        let mut parts = vec![self.owner.as_str()];
        if let Some(ref g) = self.group {
            parts.push(g.as_str());
        }
        if let Some(ref s) = self.secondary_group {
            parts.push(s.as_str());
        }
        parts.push(self.repository_name.as_str());
        parts
    }
}

fn strip_git_suffix(segment: &str) -> &str {
    if segment.len() > 4 && segment[segment.len() - 4..].eq_ignore_ascii_case(".git") {
        &segment[..segment.len() - 4]
    } else {
        segment
    }
}

/// Registered domain: the last two dot-separated labels. Hosts with two or
/// fewer labels (e.g. `localhost`, IPv4 addresses are left as-is) use the
/// whole host.
pub fn base_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host.to_ascii_lowercase()
    } else {
        labels[labels.len() - 2..].join(".").to_ascii_lowercase()
    }
}

/// Normalize one path segment for use in object keys: runs of characters
/// outside `[a-zA-Z0-9._-]` become a single `-`, the result is lowercased
/// and trimmed of surrounding `-`. An empty result becomes `unknown`.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut in_invalid_run = false;
    for ch in segment.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            out.push(ch.to_ascii_lowercase());
            in_invalid_run = false;
        } else if !in_invalid_run {
            out.push('-');
            in_invalid_run = true;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_name() {
        let info = RepositoryPathInfo::from_url("https://github.com/Owner/Repo.git").unwrap();
        assert_eq!(info.base_domain, "github.com");
        assert_eq!(info.full_domain, "github.com");
        assert_eq!(info.owner, "owner");
        assert_eq!(info.group, None);
        assert_eq!(info.secondary_group, None);
        assert_eq!(info.repository_name, "repo");
        assert_eq!(info.hierarchy(), vec!["owner", "repo"]);
    }

    #[test]
    fn scheme_and_case_and_suffix_collapse() {
        let a = RepositoryPathInfo::from_url("https://github.com/Owner/Repo.git").unwrap();
        let b = RepositoryPathInfo::from_url("http://github.com/owner/repo").unwrap();
        let c = RepositoryPathInfo::from_url("https://github.com/owner/repo/").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn group_and_secondary_group() {
        let info =
            RepositoryPathInfo::from_url("https://gitlab.example.com/team/sub/deep/project")
                .unwrap();
        assert_eq!(info.owner, "team");
        assert_eq!(info.group.as_deref(), Some("sub"));
        assert_eq!(info.secondary_group.as_deref(), Some("deep"));
        assert_eq!(info.repository_name, "project");
        assert_eq!(info.hierarchy(), vec!["team", "sub", "deep", "project"]);
    }

    #[test]
    fn multiple_middle_segments_join_with_dash() {
        let info =
            RepositoryPathInfo::from_url("https://gitlab.com/a/b/c/d/e").unwrap();
        assert_eq!(info.group.as_deref(), Some("b"));
        assert_eq!(info.secondary_group.as_deref(), Some("c-d"));
        assert_eq!(info.repository_name, "e");
    }

    #[test]
    fn base_domain_uses_last_two_labels() {
        assert_eq!(base_domain("git.internal.example.com"), "example.com");
        assert_eq!(base_domain("github.com"), "github.com");
        assert_eq!(base_domain("localhost"), "localhost");
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = RepositoryPathInfo::from_url("ssh://git@github.com/a/b").unwrap_err();
        assert!(matches!(err, VaultError::InvalidRepositoryUrl { .. }));
        assert!(RepositoryPathInfo::from_url("git@github.com:a/b.git").is_err());
    }

    #[test]
    fn rejects_short_paths() {
        assert!(RepositoryPathInfo::from_url("https://github.com/onlyowner").is_err());
        assert!(RepositoryPathInfo::from_url("https://github.com/").is_err());
    }

    #[test]
    fn sanitize_collapses_invalid_runs() {
        assert_eq!(sanitize_segment("My Repo!!Name"), "my-repo-name");
        assert_eq!(sanitize_segment("a--b"), "a--b");
        assert_eq!(sanitize_segment("..dots.."), "..dots..");
        assert_eq!(sanitize_segment("---"), "unknown");
        assert_eq!(sanitize_segment("ünïcode"), "n-code");
    }

    #[test]
    fn sanitize_trims_dashes_and_lowercases() {
        assert_eq!(sanitize_segment("-Hello-"), "hello");
        assert_eq!(sanitize_segment(""), "unknown");
    }
}
