use std::sync::atomic::{AtomicBool, Ordering};

use super::helpers::{provider_job, test_settings, url_job, with_credential};
use crate::documents::{RepositoryIndex, RepositoryRegistry};
use crate::forge::{ForgeKind, RemoteRepository};
use crate::keys::REGISTRY_KEY;
use crate::sync::{run_repositories, SyncServices};
use crate::testutil::{CannedForges, MemoryStorage, RecordingGit};

const GITHUB_INDEX_KEY: &str =
    "indexes/repositories/provider/github/github.com/owner/repo/index.json";
const URL_INDEX_KEY: &str = "indexes/repositories/url/github.com/owner/repo/index.json";

fn remote(url: &str) -> RemoteRepository {
    RemoteRepository {
        clone_url: url.to_string(),
        web_url: None,
    }
}

fn registry_of(storage: &MemoryStorage) -> RepositoryRegistry {
    serde_json::from_str(&storage.object(REGISTRY_KEY).unwrap()).unwrap()
}

fn index_of(storage: &MemoryStorage, key: &str) -> RepositoryIndex {
    serde_json::from_str(&storage.object(key).unwrap()).unwrap()
}

#[test]
fn first_time_provider_sync_creates_archive_index_registry_and_marker() {
    let mut settings = with_credential(test_settings(), "main");
    settings.repositories = vec![provider_job(ForgeKind::GitHub, "main")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges {
        repositories: vec![(
            ForgeKind::GitHub,
            remote("https://github.com/Owner/Repo.git"),
        )],
        ..Default::default()
    };
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };
    let shutdown = AtomicBool::new(false);

    let summary = run_repositories(&settings, &services, &shutdown).unwrap();
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.failed, 0);

    // One archive at the provider prefix, named by unix timestamp.
    assert_eq!(storage.upload_count(), 1);
    let archives: Vec<String> = storage
        .keys()
        .into_iter()
        .filter(|k| k.ends_with("_repo.tar.gz"))
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("repositories/provider/github/owner/repo/"));

    // One index with one snapshot referencing the archive.
    let index = index_of(&storage, GITHUB_INDEX_KEY);
    assert_eq!(index.mode, "provider");
    assert_eq!(
        index.repository_identity,
        "provider/github/github.com/owner/repo"
    );
    assert_eq!(index.snapshots.len(), 1);
    assert_eq!(index.snapshots[0].root_prefix, archives[0]);
    assert!(index.snapshots[0].timestamp_unix_seconds > 0);

    // The registry lists exactly that index.
    let registry = registry_of(&storage);
    assert!(registry.contains(GITHUB_INDEX_KEY));
    assert_eq!(registry.index_keys.len(), 1);

    // Marker records mode and clone URL.
    let marker = storage
        .object("repositories/provider/github/owner/repo/.repository-root")
        .unwrap();
    assert!(marker.contains("mode=provider"));
    assert!(marker.contains("repository=https://github.com/Owner/Repo.git"));
    assert!(marker.contains("updatedAt="));

    // Provider mode forces a fresh mirror of the discovered clone URL.
    let calls = git.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].remote_url, "https://github.com/Owner/Repo.git");
    assert!(calls[0].force);
    assert!(!calls[0].include_lfs);
}

#[test]
fn url_job_uses_url_identity_and_mirrored_local_path() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.synced, 1);

    let index = index_of(&storage, URL_INDEX_KEY);
    assert_eq!(index.mode, "url");
    assert_eq!(index.repository_identity, "url/github.com/owner/repo");

    let calls = git.calls.lock().unwrap();
    assert!(!calls[0].force);
    assert_eq!(
        calls[0].local_path,
        std::path::Path::new("/tmp/gitvault-test/repositories/url/github.com/owner/repo")
    );
}

#[test]
fn second_run_keeps_registry_closed_over_known_indexes() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    let first = registry_of(&storage);
    run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    let second = registry_of(&storage);

    assert_eq!(first, second);
    assert!(second.contains(URL_INDEX_KEY));
}

#[test]
fn per_repository_failures_do_not_abort_the_run() {
    let mut settings = test_settings();
    settings.repositories = vec![
        url_job("https://github.com/owner/broken"),
        url_job("https://github.com/owner/repo"),
    ];

    let storage = MemoryStorage::new();
    let git = RecordingGit {
        fail_urls: vec!["https://github.com/owner/broken".to_string()],
        ..Default::default()
    };
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.synced, 1);

    // Only the healthy repository produced an index.
    assert!(storage.object(URL_INDEX_KEY).is_some());
    assert!(storage
        .object("indexes/repositories/url/github.com/owner/broken/index.json")
        .is_none());
}

#[test]
fn forge_enumeration_failure_aborts_only_that_job() {
    let mut settings = with_credential(test_settings(), "main");
    settings.repositories = vec![
        provider_job(ForgeKind::GitHub, "main"),
        provider_job(ForgeKind::GitLab, "main"),
    ];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges {
        repositories: vec![(
            ForgeKind::GitLab,
            remote("https://gitlab.com/owner/repo.git"),
        )],
        fail_kinds: vec![ForgeKind::GitHub],
    };
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.synced, 1);
    let registry = registry_of(&storage);
    assert_eq!(registry.index_keys.len(), 1);
}

#[test]
fn missing_credential_skips_the_job_without_error() {
    let mut settings = test_settings();
    settings.repositories = vec![provider_job(ForgeKind::GitHub, "nonexistent")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(git.calls.lock().unwrap().is_empty());
    // Nothing was written: no registry either.
    assert!(storage.object(REGISTRY_KEY).is_none());
}

#[test]
fn invalid_clone_url_from_forge_is_isolated() {
    let mut settings = with_credential(test_settings(), "main");
    settings.repositories = vec![provider_job(ForgeKind::GitHub, "main")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges {
        repositories: vec![
            (ForgeKind::GitHub, remote("git@github.com:owner/ssh-only.git")),
            (ForgeKind::GitHub, remote("https://github.com/owner/repo")),
        ],
        ..Default::default()
    };
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.synced, 1);
}

#[test]
fn disabled_jobs_are_not_processed() {
    let mut settings = test_settings();
    let mut job = url_job("https://github.com/owner/repo");
    job.enabled = false;
    settings.repositories = vec![job];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let summary =
        run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(summary, Default::default());
    assert!(git.calls.lock().unwrap().is_empty());
}

#[test]
fn corrupt_index_is_rebuilt_on_sync() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    storage.insert(URL_INDEX_KEY, ">>> garbage <<<");
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();

    let index = index_of(&storage, URL_INDEX_KEY);
    assert_eq!(index.snapshots.len(), 1);
    assert_eq!(index.repository_identity, "url/github.com/owner/repo");
}

#[test]
fn existing_index_gains_snapshots_across_runs() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    // A prior run left one snapshot behind.
    storage.insert(
        URL_INDEX_KEY,
        r#"{"mode":"url","repositoryIdentity":"url/github.com/owner/repo","snapshots":[{"rootPrefix":"repositories/url/github.com/owner/repo/100_repo.tar.gz","timestampUnixSeconds":100}]}"#,
    );
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();

    let index = index_of(&storage, URL_INDEX_KEY);
    assert_eq!(index.snapshots.len(), 2);
    // Newest first.
    assert!(index.snapshots[0].timestamp_unix_seconds > index.snapshots[1].timestamp_unix_seconds);
}

#[test]
fn shutdown_between_repositories_stops_the_run() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    let shutdown = AtomicBool::new(true);
    shutdown.store(true, Ordering::SeqCst);
    let summary = run_repositories(&settings, &services, &shutdown).unwrap();
    assert_eq!(summary, Default::default());
    assert!(git.calls.lock().unwrap().is_empty());
}

#[test]
fn sync_never_lists_the_bucket() {
    let mut settings = test_settings();
    settings.repositories = vec![url_job("https://github.com/owner/repo")];

    let storage = MemoryStorage::new();
    let git = RecordingGit::default();
    let forges = CannedForges::default();
    let services = SyncServices {
        storage: &storage,
        git: &git,
        forges: &forges,
    };

    run_repositories(&settings, &services, &AtomicBool::new(false)).unwrap();
    assert_eq!(storage.list_count(), 0);
}
