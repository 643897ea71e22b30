//! Settings file watcher: reload-on-change with a debounce window. An
//! invalid file keeps the previous snapshot in place.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};

use gitvault_core::config::load_settings;
use gitvault_core::retention;
use gitvault_core::settings::LiveSettings;

const DEBOUNCE: Duration = Duration::from_millis(500);

pub fn spawn_settings_watcher(path: PathBuf, live: LiveSettings) {
    thread::spawn(move || {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = match RecommendedWatcher::new(
            move |res| {
                let _ = notify_tx.send(res);
            },
            NotifyConfig::default(),
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                tracing::error!(error = %e, "cannot create settings watcher, hot reload disabled");
                return;
            }
        };

        if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "cannot watch settings file, hot reload disabled"
            );
            return;
        }
        tracing::info!(path = %path.display(), "watching settings file for changes");

        let mut last_reload = Instant::now() - DEBOUNCE;
        while let Ok(event) = notify_rx.recv() {
            if event.is_err() || last_reload.elapsed() < DEBOUNCE {
                continue;
            }
            last_reload = Instant::now();
            reload(&path, &live);
        }
    });
}

fn reload(path: &std::path::Path, live: &LiveSettings) {
    match load_settings(path) {
        Ok(settings) => {
            let previous = live.replace(settings);
            let current = live.snapshot();
            if current.storage.retention_minimum == 0 && previous.storage.retention_minimum != 0 {
                retention::warn_if_unprotected(&current);
            }
            tracing::info!(path = %path.display(), "settings reloaded");
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "settings reload failed, keeping previous configuration"
            );
        }
    }
}
