//! The per-run sync pipeline: enumerate configured repositories, bring
//! each local bare mirror up to date, archive it into object storage, and
//! record the snapshot in the per-repository index.
//!
//! Repositories are processed strictly sequentially. Failures are isolated
//! per repository: one broken clone URL or unreachable forge never aborts
//! the rest of the run.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};

use crate::config::{Credential, JobMode, RepositoryJob, Settings};
use crate::documents::SnapshotRef;
use crate::error::Result;
use crate::forge::ForgeDirectory;
use crate::git::GitService;
use crate::index_store::IndexStore;
use crate::keys::RepositoryLocation;
use crate::paths::RepositoryPathInfo;
use crate::storage::ObjectStorage;

/// External services one run executes against.
pub struct SyncServices<'a> {
    pub storage: &'a dyn ObjectStorage,
    pub git: &'a dyn GitService,
    pub forges: &'a dyn ForgeDirectory,
}

/// Per-run counters, logged when the run finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Execute one full run across all enabled repository jobs.
///
/// The registry is read once at the start and written back at the end iff
/// the set of known index keys changed.
pub fn run_repositories(
    settings: &Settings,
    services: &SyncServices<'_>,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    let index_store = IndexStore::new(services.storage);
    let mut registry = index_store.load_registry()?;
    let mut summary = RunSummary::default();

    for job in settings.enabled_repositories() {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("shutdown requested, skipping remaining repositories");
            break;
        }
        match job.mode {
            JobMode::Provider => run_provider_job(
                settings,
                services,
                &index_store,
                &mut registry.document,
                job,
                shutdown,
                &mut summary,
            ),
            JobMode::Url => run_url_job(
                settings,
                services,
                &index_store,
                &mut registry.document,
                job,
                &mut summary,
            ),
        }
    }

    if index_store.save_registry(&registry.document, registry.raw.as_deref())? {
        tracing::debug!(
            indexes = registry.document.index_keys.len(),
            "registry updated"
        );
    }

    tracing::info!(
        synced = summary.synced,
        skipped = summary.skipped,
        failed = summary.failed,
        "repository run finished"
    );
    Ok(summary)
}

#[allow(clippy::too_many_arguments)]
fn run_provider_job(
    settings: &Settings,
    services: &SyncServices<'_>,
    index_store: &IndexStore<'_>,
    registry: &mut crate::documents::RepositoryRegistry,
    job: &RepositoryJob,
    shutdown: &AtomicBool,
    summary: &mut RunSummary,
) {
    let Some(provider) = job.provider else {
        tracing::warn!("provider job has no provider set, skipping");
        summary.skipped += 1;
        return;
    };
    let Some(credential) = resolve_credential(settings, job, summary) else {
        return;
    };
    let base_url = match job.base_url.as_deref().or(provider.default_base_url()) {
        Some(base) => base,
        None => {
            tracing::warn!(provider = %provider, "no baseUrl available, skipping job");
            summary.skipped += 1;
            return;
        }
    };

    let remotes = match services.forges.list_owned(provider, base_url, credential) {
        Ok(remotes) => remotes,
        Err(e) => {
            // The whole provider job aborts; sibling jobs keep running.
            tracing::error!(provider = %provider, error = %e, "repository enumeration failed");
            summary.failed += 1;
            return;
        }
    };
    tracing::info!(provider = %provider, count = remotes.len(), "enumerated repositories");

    for remote in &remotes {
        if shutdown.load(Ordering::SeqCst) {
            tracing::info!("shutdown requested, skipping remaining repositories");
            return;
        }
        if remote.clone_url.trim().is_empty() {
            tracing::warn!(provider = %provider, "forge returned a blank clone URL, skipping");
            summary.skipped += 1;
            continue;
        }
        let outcome = sync_one(
            settings,
            services,
            index_store,
            registry,
            JobMode::Provider,
            Some(provider.as_str()),
            &remote.clone_url,
            Some(credential),
            true,
            job.lfs,
        );
        record_outcome(outcome, &remote.clone_url, summary);
    }
}

fn run_url_job(
    settings: &Settings,
    services: &SyncServices<'_>,
    index_store: &IndexStore<'_>,
    registry: &mut crate::documents::RepositoryRegistry,
    job: &RepositoryJob,
    summary: &mut RunSummary,
) {
    let Some(url) = job.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        tracing::warn!("url job has a blank URL, skipping");
        summary.skipped += 1;
        return;
    };
    let credential = match &job.credential {
        Some(_) => match resolve_credential(settings, job, summary) {
            Some(credential) => Some(credential),
            None => return,
        },
        None => None,
    };
    let outcome = sync_one(
        settings,
        services,
        index_store,
        registry,
        JobMode::Url,
        None,
        url,
        credential,
        false,
        job.lfs,
    );
    record_outcome(outcome, url, summary);
}

fn resolve_credential<'a>(
    settings: &'a Settings,
    job: &RepositoryJob,
    summary: &mut RunSummary,
) -> Option<&'a Credential> {
    let Some(name) = job.credential.as_deref() else {
        tracing::warn!("job names no credential, skipping");
        summary.skipped += 1;
        return None;
    };
    match settings.credential(name) {
        Some(credential) => Some(credential),
        None => {
            tracing::warn!(credential = name, "credential is not defined, skipping job");
            summary.skipped += 1;
            None
        }
    }
}

fn record_outcome(outcome: Result<()>, url: &str, summary: &mut RunSummary) {
    match outcome {
        Ok(()) => summary.synced += 1,
        Err(e) => {
            tracing::error!(repo = url, error = %e, "repository sync failed");
            summary.failed += 1;
        }
    }
}

/// Sync a single repository: mirror, archive, index, marker.
#[allow(clippy::too_many_arguments)]
fn sync_one(
    settings: &Settings,
    services: &SyncServices<'_>,
    index_store: &IndexStore<'_>,
    registry: &mut crate::documents::RepositoryRegistry,
    mode: JobMode,
    provider: Option<&str>,
    clone_url: &str,
    credential: Option<&Credential>,
    force: bool,
    include_lfs: bool,
) -> Result<()> {
    let info = RepositoryPathInfo::from_url(clone_url)?;
    let location = RepositoryLocation::resolve(
        mode,
        provider,
        clone_url,
        &info,
        Path::new(&settings.working_root),
    );

    let mut loaded = index_store.load_index(&location.index_key)?;
    if loaded.corrupt {
        tracing::warn!(
            key = %location.index_key,
            "rebuilding unparseable index from scratch"
        );
    }
    loaded.document.mode = mode.as_str().to_string();
    loaded.document.repository_identity = location.identity.clone();

    services.git.sync_bare_repository(
        clone_url,
        &location.local_path,
        credential,
        force,
        include_lfs,
    )?;

    let timestamp = Utc::now().timestamp();
    let archive_key = location.archive_key(timestamp);
    services
        .storage
        .upload_dir_as_tar_gz(&location.local_path, &archive_key)?;

    loaded
        .document
        .record_snapshot(SnapshotRef::new(archive_key.clone(), timestamp));
    index_store.save_index(&location.index_key, &loaded.document, loaded.raw.as_deref())?;
    registry.insert(&location.index_key);

    services
        .storage
        .put_text(&location.marker_key(), &marker_text(mode, clone_url))?;

    tracing::info!(repo = clone_url, archive = %archive_key, "snapshot recorded");
    Ok(())
}

fn marker_text(mode: JobMode, clone_url: &str) -> String {
    let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    format!(
        "mode={}\nrepository={}\nupdatedAt={}\n",
        mode.as_str(),
        clone_url,
        updated_at
    )
}
