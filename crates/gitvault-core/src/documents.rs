//! The two JSON documents persisted to object storage: the bucket-wide
//! registry and the per-repository snapshot index.
//!
//! Both are serialized compact with camelCase keys. Deserialization is
//! tolerant: unknown fields are ignored, `null` collections are empty, and
//! snapshot entries that fail validity are filtered on every read.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::keys::normalize_key;

/// Bucket-wide registry: the set of per-repository index object keys known
/// to exist. Kept so that neither sync nor retention ever has to list the
/// bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryRegistry {
    #[serde(deserialize_with = "null_as_default")]
    pub index_keys: BTreeSet<String>,
}

impl RepositoryRegistry {
    /// Re-normalize all keys: surrounding `/` stripped, blanks dropped.
    /// The backing set keeps the result sorted and unique.
    pub fn normalize(&mut self) {
        let keys = std::mem::take(&mut self.index_keys);
        self.index_keys = keys
            .into_iter()
            .map(|k| normalize_key(&k))
            .filter(|k| !k.is_empty())
            .collect();
    }

    pub fn insert(&mut self, key: &str) -> bool {
        let key = normalize_key(key);
        if key.is_empty() {
            return false;
        }
        self.index_keys.insert(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.index_keys.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index_keys.contains(key)
    }
}

/// One snapshot archive reference inside a repository index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotRef {
    /// Full object key of the archive (ends in `.tar.gz`).
    pub root_prefix: String,
    pub timestamp_unix_seconds: i64,
}

impl SnapshotRef {
    pub fn new(root_prefix: impl Into<String>, timestamp_unix_seconds: i64) -> Self {
        Self {
            root_prefix: root_prefix.into(),
            timestamp_unix_seconds,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.root_prefix.trim().is_empty() && self.timestamp_unix_seconds > 0
    }
}

/// Per-repository index document: ordered list of snapshot archive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepositoryIndex {
    pub mode: String,
    pub repository_identity: String,
    #[serde(deserialize_with = "null_as_default")]
    pub snapshots: Vec<SnapshotRef>,
}

impl RepositoryIndex {
    pub fn new(mode: &str, repository_identity: &str) -> Self {
        Self {
            mode: mode.to_string(),
            repository_identity: repository_identity.to_string(),
            snapshots: Vec::new(),
        }
    }

    /// Valid snapshots, deduplicated by `rootPrefix` (keeping the entry with
    /// the largest timestamp), sorted newest-first.
    pub fn normalized_snapshots(&self) -> Vec<SnapshotRef> {
        let mut by_key: Vec<SnapshotRef> = Vec::with_capacity(self.snapshots.len());
        for snap in self.snapshots.iter().filter(|s| s.is_valid()) {
            match by_key.iter_mut().find(|s| s.root_prefix == snap.root_prefix) {
                Some(existing) => {
                    if snap.timestamp_unix_seconds > existing.timestamp_unix_seconds {
                        existing.timestamp_unix_seconds = snap.timestamp_unix_seconds;
                    }
                }
                None => by_key.push(snap.clone()),
            }
        }
        sort_newest_first(&mut by_key);
        by_key
    }

    /// Record a freshly uploaded snapshot: invalid entries and any prior
    /// entry with the same `rootPrefix` are dropped, the new entry inserted,
    /// and descending order restored.
    pub fn record_snapshot(&mut self, snapshot: SnapshotRef) {
        self.snapshots
            .retain(|s| s.is_valid() && s.root_prefix != snapshot.root_prefix);
        self.snapshots.push(snapshot);
        sort_newest_first(&mut self.snapshots);
    }
}

/// Descending timestamp; key as a tie-breaker so the order is total.
pub fn sort_newest_first(snapshots: &mut [SnapshotRef]) {
    snapshots.sort_by(|a, b| {
        b.timestamp_unix_seconds
            .cmp(&a.timestamp_unix_seconds)
            .then_with(|| a.root_prefix.cmp(&b.root_prefix))
    });
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_serializes_camel_case_and_sorted() {
        let mut reg = RepositoryRegistry::default();
        reg.insert("/b/index.json/");
        reg.insert("a/index.json");
        let json = serde_json::to_string(&reg).unwrap();
        assert_eq!(json, r#"{"indexKeys":["a/index.json","b/index.json"]}"#);
    }

    #[test]
    fn registry_tolerates_null_and_unknown_fields() {
        let reg: RepositoryRegistry =
            serde_json::from_str(r#"{"indexKeys":null,"futureField":42}"#).unwrap();
        assert!(reg.index_keys.is_empty());

        let reg: RepositoryRegistry = serde_json::from_str("{}").unwrap();
        assert!(reg.index_keys.is_empty());
    }

    #[test]
    fn registry_normalize_strips_and_dedupes() {
        let mut reg: RepositoryRegistry =
            serde_json::from_str(r#"{"indexKeys":["/a/","a","","b"]}"#).unwrap();
        reg.normalize();
        let keys: Vec<&String> = reg.index_keys.iter().collect();
        assert_eq!(keys, [&"a".to_string(), &"b".to_string()]);
    }

    #[test]
    fn index_serializes_camel_case() {
        let mut index = RepositoryIndex::new("url", "url/github.com/owner/repo");
        index.record_snapshot(SnapshotRef::new("p/1_repo.tar.gz", 1));
        let json = serde_json::to_string(&index).unwrap();
        assert_eq!(
            json,
            r#"{"mode":"url","repositoryIdentity":"url/github.com/owner/repo","snapshots":[{"rootPrefix":"p/1_repo.tar.gz","timestampUnixSeconds":1}]}"#
        );
    }

    #[test]
    fn index_tolerates_null_snapshots() {
        let index: RepositoryIndex =
            serde_json::from_str(r#"{"mode":"url","repositoryIdentity":"x","snapshots":null}"#)
                .unwrap();
        assert!(index.snapshots.is_empty());
    }

    #[test]
    fn invalid_snapshots_are_filtered() {
        let index: RepositoryIndex = serde_json::from_str(
            r#"{"snapshots":[
                {"rootPrefix":"","timestampUnixSeconds":5},
                {"rootPrefix":"a.tar.gz","timestampUnixSeconds":0},
                {"rootPrefix":"a.tar.gz","timestampUnixSeconds":-3},
                {"rootPrefix":"ok.tar.gz","timestampUnixSeconds":7}
            ]}"#,
        )
        .unwrap();
        let normalized = index.normalized_snapshots();
        assert_eq!(normalized, vec![SnapshotRef::new("ok.tar.gz", 7)]);
    }

    #[test]
    fn duplicates_keep_largest_timestamp() {
        let index = RepositoryIndex {
            mode: "url".into(),
            repository_identity: "x".into(),
            snapshots: vec![
                SnapshotRef::new("a.tar.gz", 10),
                SnapshotRef::new("a.tar.gz", 30),
                SnapshotRef::new("a.tar.gz", 20),
                SnapshotRef::new("b.tar.gz", 25),
            ],
        };
        let normalized = index.normalized_snapshots();
        assert_eq!(
            normalized,
            vec![
                SnapshotRef::new("a.tar.gz", 30),
                SnapshotRef::new("b.tar.gz", 25),
            ]
        );
    }

    #[test]
    fn record_snapshot_replaces_same_key() {
        let mut index = RepositoryIndex::new("url", "x");
        index.record_snapshot(SnapshotRef::new("a.tar.gz", 10));
        index.record_snapshot(SnapshotRef::new("b.tar.gz", 20));
        index.record_snapshot(SnapshotRef::new("a.tar.gz", 30));
        assert_eq!(
            index.snapshots,
            vec![
                SnapshotRef::new("a.tar.gz", 30),
                SnapshotRef::new("b.tar.gz", 20),
            ]
        );
    }

    #[test]
    fn ordering_is_newest_first() {
        let mut snaps = vec![
            SnapshotRef::new("c.tar.gz", 1),
            SnapshotRef::new("a.tar.gz", 3),
            SnapshotRef::new("b.tar.gz", 2),
        ];
        sort_newest_first(&mut snaps);
        let keys: Vec<&str> = snaps.iter().map(|s| s.root_prefix.as_str()).collect();
        assert_eq!(keys, ["a.tar.gz", "b.tar.gz", "c.tar.gz"]);
    }
}
