use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Credential;
use crate::error::{Result, VaultError};
use crate::forge::{ForgeDirectory, ForgeKind, RemoteRepository};
use crate::git::GitService;
use crate::storage::ObjectStorage;

/// In-memory object storage for engine tests. Counts operations so tests
/// can assert on write suppression and on the no-listing rule.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, String>,
    put_count: usize,
    upload_count: usize,
    delete_count: usize,
    list_count: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), body.to_string());
    }

    pub fn object(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().put_count
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().upload_count
    }

    pub fn delete_count(&self) -> usize {
        self.state.lock().unwrap().delete_count
    }

    pub fn list_count(&self) -> usize {
        self.state.lock().unwrap().list_count
    }
}

impl ObjectStorage for MemoryStorage {
    fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().objects.get(key).cloned())
    }

    fn put_text(&self, key: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.put_count += 1;
        state.objects.insert(key.to_string(), body.to_string());
        Ok(())
    }

    fn upload_dir_as_tar_gz(&self, local_path: &Path, key: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.upload_count += 1;
        state
            .objects
            .insert(key.to_string(), format!("tar.gz of {}", local_path.display()));
        Ok(())
    }

    fn delete_objects(&self, keys: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.delete_count += 1;
            state.objects.remove(key);
        }
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.objects.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.list_count += 1;
        Ok(state
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Recording git fake: every sync call is captured, nothing touches disk.
#[derive(Default)]
pub struct RecordingGit {
    pub calls: Mutex<Vec<GitCall>>,
    /// URLs whose sync should fail.
    pub fail_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCall {
    pub remote_url: String,
    pub local_path: PathBuf,
    pub force: bool,
    pub include_lfs: bool,
}

impl GitService for RecordingGit {
    fn sync_bare_repository(
        &self,
        remote_url: &str,
        local_path: &Path,
        _credential: Option<&Credential>,
        force: bool,
        include_lfs: bool,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(GitCall {
            remote_url: remote_url.to_string(),
            local_path: local_path.to_path_buf(),
            force,
            include_lfs,
        });
        if self.fail_urls.iter().any(|u| u == remote_url) {
            return Err(VaultError::GitSync {
                url: remote_url.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

/// Canned forge directory: returns a fixed listing per forge kind, or an
/// enumeration error.
#[derive(Default)]
pub struct CannedForges {
    pub repositories: Vec<(ForgeKind, RemoteRepository)>,
    pub fail_kinds: Vec<ForgeKind>,
}

impl ForgeDirectory for CannedForges {
    fn list_owned(
        &self,
        kind: ForgeKind,
        _base_url: &str,
        _credential: &Credential,
    ) -> Result<Vec<RemoteRepository>> {
        if self.fail_kinds.contains(&kind) {
            return Err(VaultError::ForgeEnumeration {
                provider: kind.as_str().to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(self
            .repositories
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, repo)| repo.clone())
            .collect())
    }
}
