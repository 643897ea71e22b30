//! Reading and writing the registry and per-repository index documents.
//!
//! Every load remembers the raw content string it read; saves re-serialize
//! and compare against that string, issuing a `PUT` only when the content
//! actually changed. That comparison is what keeps steady-state runs free
//! of index and registry writes.

use crate::documents::{RepositoryIndex, RepositoryRegistry};
use crate::error::Result;
use crate::keys::REGISTRY_KEY;
use crate::storage::ObjectStorage;

/// A registry document together with the raw text it was parsed from
/// (`None` when the object did not exist).
#[derive(Debug, Clone)]
pub struct LoadedRegistry {
    pub document: RepositoryRegistry,
    pub raw: Option<String>,
}

/// An index document together with its read state. `corrupt` is set when
/// the object existed but did not parse; the document is then empty and
/// `raw` still holds the original text.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub document: RepositoryIndex,
    pub raw: Option<String>,
    pub corrupt: bool,
}

impl LoadedIndex {
    pub fn missing(&self) -> bool {
        self.raw.is_none()
    }
}

pub struct IndexStore<'a> {
    storage: &'a dyn ObjectStorage,
}

impl<'a> IndexStore<'a> {
    pub fn new(storage: &'a dyn ObjectStorage) -> Self {
        Self { storage }
    }

    pub fn load_registry(&self) -> Result<LoadedRegistry> {
        let raw = self.storage.get_text(REGISTRY_KEY)?;
        let mut document = match raw.as_deref() {
            Some(text) => match serde_json::from_str::<RepositoryRegistry>(text) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(
                        key = REGISTRY_KEY,
                        error = %e,
                        "registry document is unparseable, starting from an empty registry"
                    );
                    RepositoryRegistry::default()
                }
            },
            None => RepositoryRegistry::default(),
        };
        document.normalize();
        Ok(LoadedRegistry { document, raw })
    }

    /// Write the registry if its serialized form differs from what was
    /// read. An empty registry is never created where none existed, so the
    /// document stays lazy until the first successful sync. Returns whether
    /// a `PUT` was issued.
    pub fn save_registry(&self, document: &RepositoryRegistry, prior_raw: Option<&str>) -> Result<bool> {
        if prior_raw.is_none() && document.index_keys.is_empty() {
            return Ok(false);
        }
        let serialized = serde_json::to_string(document)?;
        if prior_raw == Some(serialized.as_str()) {
            return Ok(false);
        }
        self.storage.put_text(REGISTRY_KEY, &serialized)?;
        Ok(true)
    }

    pub fn load_index(&self, key: &str) -> Result<LoadedIndex> {
        let raw = self.storage.get_text(key)?;
        let (document, corrupt) = match raw.as_deref() {
            Some(text) => match serde_json::from_str::<RepositoryIndex>(text) {
                Ok(doc) => (doc, false),
                Err(e) => {
                    tracing::warn!(key, error = %e, "index document is unparseable");
                    (RepositoryIndex::default(), true)
                }
            },
            None => (RepositoryIndex::default(), false),
        };
        Ok(LoadedIndex {
            document,
            raw,
            corrupt,
        })
    }

    /// Write an index if its serialized form differs from what was read.
    /// Returns whether a `PUT` was issued.
    pub fn save_index(
        &self,
        key: &str,
        document: &RepositoryIndex,
        prior_raw: Option<&str>,
    ) -> Result<bool> {
        let serialized = serde_json::to_string(document)?;
        if prior_raw == Some(serialized.as_str()) {
            return Ok(false);
        }
        self.storage.put_text(key, &serialized)?;
        Ok(true)
    }
}
