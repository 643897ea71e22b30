//! The cooperative scheduler loop for the `repositories` job family.
//!
//! One iteration: read the cron expression from the live settings, compute
//! the next occurrence in UTC, wait for it in short slices (reacting to
//! shutdown and to settings edits), run the sync pipeline, then run
//! retention under its mutex.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::retention;
use crate::schedule::{next_occurrence, parse_cron};
use crate::settings::LiveSettings;
use crate::sync::{self, SyncServices};

/// Upper bound on one wait slice; shutdown and settings edits are noticed
/// at this granularity.
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Pause before re-reading an unparseable cron expression.
const INVALID_CRON_PAUSE: Duration = Duration::from_secs(1);

pub struct SchedulerContext<'a> {
    pub settings: &'a LiveSettings,
    pub services: SyncServices<'a>,
    pub shutdown: &'a AtomicBool,
    pub retention_mutex: &'a Mutex<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target instant arrived.
    Reached,
    /// The live cron expression no longer matches the one scheduled for.
    Rescheduled,
    /// Cancellation was signalled.
    Shutdown,
}

/// Run the repositories loop until shutdown. Never panics out; all run
/// errors are logged and the loop continues with the next occurrence.
pub fn run_repositories_loop(ctx: &SchedulerContext<'_>) {
    let mut last_invalid_cron: Option<String> = None;

    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            tracing::info!("scheduler stopping");
            return;
        }

        let expression = ctx
            .settings
            .snapshot()
            .schedule
            .repositories
            .cron
            .clone();
        let schedule = match parse_cron(&expression) {
            Ok(schedule) => {
                last_invalid_cron = None;
                schedule
            }
            Err(e) => {
                // Warn once per distinct bad value, then keep rechecking so
                // a settings fix takes effect without restart.
                if last_invalid_cron.as_deref() != Some(expression.as_str()) {
                    tracing::warn!(cron = %expression, error = %e, "invalid cron expression");
                    last_invalid_cron = Some(expression);
                }
                std::thread::sleep(INVALID_CRON_PAUSE);
                continue;
            }
        };

        let Some(target) = next_occurrence(&schedule, Utc::now()) else {
            tracing::error!(cron = %expression, "cron expression has no future occurrence, stopping loop");
            return;
        };
        tracing::info!(cron = %expression, next_run = %target.to_rfc3339(), "next repository run scheduled");

        match wait_until(target, &expression, ctx.settings, ctx.shutdown, WAIT_SLICE) {
            WaitOutcome::Shutdown => {
                tracing::info!("scheduler stopping");
                return;
            }
            WaitOutcome::Rescheduled => {
                tracing::info!("cron expression changed, rescheduling");
                continue;
            }
            WaitOutcome::Reached => {}
        }

        let run_settings = ctx.settings.snapshot();
        let started = Instant::now();
        match sync::run_repositories(&run_settings, &ctx.services, ctx.shutdown) {
            Ok(summary) => tracing::info!(
                duration = ?started.elapsed(),
                synced = summary.synced,
                skipped = summary.skipped,
                failed = summary.failed,
                "repository run completed"
            ),
            Err(e) => tracing::error!(
                duration = ?started.elapsed(),
                error = %e,
                "repository run failed"
            ),
        }

        // A shutdown that arrived during the run ends the loop before
        // retention starts.
        if ctx.shutdown.load(Ordering::SeqCst) {
            tracing::info!("scheduler stopping");
            return;
        }

        let _retention_guard = ctx
            .retention_mutex
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match retention::run(&run_settings, ctx.services.storage, Utc::now()) {
            Ok(stats) => tracing::info!(
                visited = stats.indexes_visited,
                deleted = stats.snapshots_deleted,
                rewritten = stats.indexes_rewritten,
                removed = stats.indexes_removed,
                "retention pass completed"
            ),
            Err(e) => tracing::error!(error = %e, "retention pass failed"),
        }
    }
}

/// Sleep in `slice`-bounded increments until the target instant is reached,
/// cancellation is signalled, or the live cron expression changes.
pub fn wait_until(
    target: DateTime<Utc>,
    scheduled_expression: &str,
    settings: &LiveSettings,
    shutdown: &AtomicBool,
    slice: Duration,
) -> WaitOutcome {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return WaitOutcome::Shutdown;
        }
        if settings.snapshot().schedule.repositories.cron != scheduled_expression {
            return WaitOutcome::Rescheduled;
        }
        let now = Utc::now();
        if now >= target {
            return WaitOutcome::Reached;
        }
        let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
        std::thread::sleep(remaining.min(slice));
    }
}
