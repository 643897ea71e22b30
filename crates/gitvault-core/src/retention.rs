//! Retention: walk the registry, delete snapshots past the age cutoff, and
//! rewrite the indexes that changed.
//!
//! Two hard rules shape everything here. The newest snapshots of every
//! repository are protected by `retentionMinimum` no matter how old they
//! are, and retention never enumerates the bucket: the registry is the only
//! source of index keys, and expired archives are deleted by exact key.

use chrono::{DateTime, Duration, Utc};

use crate::config::Settings;
use crate::documents::SnapshotRef;
use crate::error::Result;
use crate::index_store::IndexStore;
use crate::storage::ObjectStorage;

/// Upper bound on keys per delete call, matching the S3 batch limit.
const DELETE_BATCH: usize = 1000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionStats {
    pub indexes_visited: usize,
    pub indexes_rewritten: usize,
    pub indexes_removed: usize,
    pub indexes_skipped_corrupt: usize,
    pub snapshots_deleted: usize,
}

/// Warn when the configuration permits a repository's entire history to be
/// purged. Called at startup and on reload transitions back to zero.
pub fn warn_if_unprotected(settings: &Settings) {
    if settings.storage.retention_minimum == 0 {
        tracing::warn!(
            "retentionMinimum is 0: repositories removed from the settings can have \
             all of their snapshots deleted once they age past the cutoff"
        );
    }
}

/// Run one retention pass over every index named by the registry.
pub fn run(settings: &Settings, storage: &dyn ObjectStorage, now: DateTime<Utc>) -> Result<RetentionStats> {
    let mut stats = RetentionStats::default();

    let retention_days = match settings.storage.retention {
        Some(days) if days > 0 => days,
        _ => {
            tracing::info!("retention disabled, nothing to prune");
            return Ok(stats);
        }
    };
    let minimum = settings.storage.retention_minimum as usize;
    let cutoff = now - Duration::days(retention_days);

    let index_store = IndexStore::new(storage);
    let mut registry = index_store.load_registry()?;
    let keys: Vec<String> = registry.document.index_keys.iter().cloned().collect();

    for index_key in keys {
        stats.indexes_visited += 1;
        let loaded = index_store.load_index(&index_key)?;

        if loaded.missing() {
            tracing::warn!(key = %index_key, "index object is gone, dropping from registry");
            registry.document.remove(&index_key);
            stats.indexes_removed += 1;
            continue;
        }
        if loaded.corrupt {
            // Preserved untouched so an operator can inspect it; the next
            // successful sync rebuilds it.
            tracing::warn!(key = %index_key, "index is unparseable, leaving it for triage");
            stats.indexes_skipped_corrupt += 1;
            continue;
        }

        let normalized = loaded.document.normalized_snapshots();
        if normalized.is_empty() {
            tracing::info!(key = %index_key, "index holds no valid snapshots, dropping");
            registry.document.remove(&index_key);
            stats.indexes_removed += 1;
            continue;
        }

        let protected_count = minimum.min(normalized.len());
        let (expired, retained) = split_expired(&normalized, protected_count, cutoff);

        if !expired.is_empty() {
            let expired_keys: Vec<String> =
                expired.iter().map(|s| s.root_prefix.clone()).collect();
            for batch in expired_keys.chunks(DELETE_BATCH) {
                storage.delete_objects(batch)?;
            }
            stats.snapshots_deleted += expired.len();
            tracing::info!(
                key = %index_key,
                deleted = expired.len(),
                retained = retained.len(),
                "expired snapshots deleted"
            );
        }

        // The index is rewritten only after every expired archive for it has
        // been deleted, so a crash in between is retried next pass.
        if retained != loaded.document.snapshots {
            let mut document = loaded.document.clone();
            document.snapshots = retained;
            if index_store.save_index(&index_key, &document, loaded.raw.as_deref())? {
                stats.indexes_rewritten += 1;
            }
        }
    }

    if index_store.save_registry(&registry.document, registry.raw.as_deref())? {
        tracing::debug!("registry rewritten after retention");
    }

    Ok(stats)
}

/// Partition normalized (newest-first) snapshots into expired and retained.
/// The first `protected_count` entries are retained regardless of age.
fn split_expired(
    normalized: &[SnapshotRef],
    protected_count: usize,
    cutoff: DateTime<Utc>,
) -> (Vec<SnapshotRef>, Vec<SnapshotRef>) {
    let cutoff_seconds = cutoff.timestamp();
    let mut expired = Vec::new();
    let mut retained = Vec::new();

    for (position, snapshot) in normalized.iter().enumerate() {
        if position < protected_count || snapshot.timestamp_unix_seconds >= cutoff_seconds {
            retained.push(snapshot.clone());
        } else {
            expired.push(snapshot.clone());
        }
    }

    (expired, retained)
}
