mod signal;
mod watch;

use std::sync::Mutex;

use clap::Parser;

use gitvault_core::config::{self, Settings};
use gitvault_core::forge::ForgeClients;
use gitvault_core::git::CommandGit;
use gitvault_core::retention;
use gitvault_core::scheduler::{run_repositories_loop, SchedulerContext};
use gitvault_core::settings::LiveSettings;
use gitvault_core::sync::SyncServices;
use gitvault_storage::S3Storage;

#[derive(Parser)]
#[command(
    name = "gitvault",
    about = "Scheduled Git repository snapshots into S3-compatible storage",
    after_help = "\
Settings file lookup order:
  1. <SETTINGS>                  (positional argument)
  2. $GITVAULT_CONFIG            (environment variable)
  3. ./gitvault.yaml
  4. ./settings.yaml
  5. /etc/gitvault/config.yaml"
)]
struct Cli {
    /// Path to the YAML settings file.
    settings: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let Some(settings_path) = config::resolve_settings_path(cli.settings.as_deref()) else {
        eprintln!("Error: no settings file found.");
        eprintln!("Searched:");
        for candidate in config::default_settings_candidates() {
            eprintln!("  {}", candidate.display());
        }
        std::process::exit(1);
    };

    let settings: Settings = match config::load_settings(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(settings.logging.log_level.as_str())
        .with_target(false)
        .init();

    let git_tag = std::env::var("GIT_TAG").unwrap_or_default();
    let git_hash = std::env::var("GIT_HASH").unwrap_or_default();
    tracing::info!(
        settings = %settings_path.display(),
        tag = %git_tag,
        hash = %git_hash,
        "gitvault starting"
    );
    retention::warn_if_unprotected(&settings);

    let storage = match S3Storage::from_settings(&settings.storage) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let git = CommandGit::new();
    let forges = ForgeClients::new();
    let live = LiveSettings::new(settings);

    signal::install();
    watch::spawn_settings_watcher(settings_path, live.clone());

    let retention_mutex = Mutex::new(());
    let ctx = SchedulerContext {
        settings: &live,
        services: SyncServices {
            storage: &storage,
            git: &git,
            forges: &forges,
        },
        shutdown: signal::shutdown_flag(),
        retention_mutex: &retention_mutex,
    };
    run_repositories_loop(&ctx);

    tracing::info!("gitvault stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_accepts_a_single_positional_settings_path() {
        let cli = Cli::parse_from(["gitvault", "/etc/gitvault/config.yaml"]);
        assert_eq!(cli.settings.as_deref(), Some("/etc/gitvault/config.yaml"));
    }

    #[test]
    fn settings_path_is_optional() {
        let cli = Cli::parse_from(["gitvault"]);
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
