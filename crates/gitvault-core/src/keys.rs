//! Object-key and local-path derivation.
//!
//! Every key returned here is free of leading and trailing `/`. Keys are
//! deterministic functions of the parsed URL and job mode so that separate
//! processes (and separate runs) address the same objects.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::JobMode;
use crate::paths::RepositoryPathInfo;

/// Fixed key of the bucket-wide repository registry document.
pub const REGISTRY_KEY: &str = "indexes/repositories/registry.json";

/// File name of the diagnostic marker object written at each repository
/// prefix.
pub const MARKER_FILE_NAME: &str = ".repository-root";

/// Normalize a key prefix: blank input becomes `""`, anything else is
/// trimmed of surrounding `/` and given a single trailing `/`.
pub fn ensure_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Strip surrounding `/` from an object key.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().trim_matches('/').to_string()
}

/// Stable identity string for one tracked repository. Feeds both the index
/// object key and the `repositoryIdentity` recorded inside the index
/// document.
pub fn repository_identity(mode: JobMode, provider: Option<&str>, info: &RepositoryPathInfo) -> String {
    let hierarchy = info.hierarchy().join("/");
    match mode {
        JobMode::Provider => {
            let provider = provider.unwrap_or("unknown");
            format!("provider/{provider}/{}/{hierarchy}", info.base_domain)
        }
        JobMode::Url => format!("url/{}/{hierarchy}", info.full_domain),
    }
}

/// Storage prefix under which a repository's archives and marker live.
pub fn repository_prefix(mode: JobMode, provider: Option<&str>, info: &RepositoryPathInfo) -> String {
    let hierarchy = info.hierarchy().join("/");
    match mode {
        JobMode::Provider => {
            let provider = provider.unwrap_or("unknown");
            format!("repositories/provider/{provider}/{hierarchy}")
        }
        JobMode::Url => format!("repositories/url/{}/{hierarchy}", info.full_domain),
    }
}

/// Object key of one snapshot archive.
pub fn archive_object_key(repository_prefix: &str, timestamp_unix_seconds: i64) -> String {
    format!("{repository_prefix}/{timestamp_unix_seconds}_repo.tar.gz")
}

/// Object key of the `.repository-root` marker.
pub fn marker_object_key(repository_prefix: &str) -> String {
    format!("{repository_prefix}/{MARKER_FILE_NAME}")
}

/// Object key of a per-repository index document.
pub fn index_object_key(identity: &str) -> String {
    format!("indexes/repositories/{identity}/index.json")
}

/// Everything the sync pipeline needs to address one repository, resolved
/// once per repository per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub identity: String,
    pub prefix: String,
    pub index_key: String,
    pub local_path: PathBuf,
}

impl RepositoryLocation {
    pub fn resolve(
        mode: JobMode,
        provider: Option<&str>,
        clone_url: &str,
        info: &RepositoryPathInfo,
        working_root: &Path,
    ) -> Self {
        let identity = repository_identity(mode, provider, info);
        let prefix = repository_prefix(mode, provider, info);
        let index_key = index_object_key(&identity);
        let local_path = match mode {
            // Provider-discovered URLs can collide after sanitization, so the
            // local directory is keyed by a hash of the raw URL instead.
            JobMode::Provider => {
                let provider = provider.unwrap_or("unknown");
                let mut hasher = Sha256::new();
                hasher.update(provider.as_bytes());
                hasher.update(b":");
                hasher.update(clone_url.as_bytes());
                let digest = hex::encode(hasher.finalize());
                working_root
                    .join("repositories")
                    .join("provider")
                    .join(digest)
            }
            JobMode::Url => {
                let mut path = working_root.to_path_buf();
                for part in prefix.split('/') {
                    path.push(part);
                }
                path
            }
        };
        Self {
            identity,
            prefix,
            index_key,
            local_path,
        }
    }

    pub fn archive_key(&self, timestamp_unix_seconds: i64) -> String {
        archive_object_key(&self.prefix, timestamp_unix_seconds)
    }

    pub fn marker_key(&self) -> String {
        marker_object_key(&self.prefix)
    }
}
