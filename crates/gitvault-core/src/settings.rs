//! The live settings handle shared between the scheduler loop and the
//! settings-file watcher.

use std::sync::{Arc, RwLock};

use crate::config::Settings;

/// Cheap-to-clone accessor around the current settings snapshot. Readers
/// take an `Arc<Settings>` and keep using it for the duration of one piece
/// of work; a reload swaps the inner pointer without disturbing them.
#[derive(Clone)]
pub struct LiveSettings {
    inner: Arc<RwLock<Arc<Settings>>>,
}

impl LiveSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the snapshot, returning the previous one.
    pub fn replace(&self, settings: Settings) -> Arc<Settings> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::new(settings))
    }
}
