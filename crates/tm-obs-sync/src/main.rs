//! TM-OBS-Sync: entry point.
//!
//! Keeps the OBS program scene and a VEX Tournament Manager fieldset's
//! audience display in step, in whichever directions the settings enable.
//!
//! # Usage
//!
//! ```text
//! tm-obs-sync [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>   Settings file [env: TM_OBS_SYNC_CONFIG]
//!       --debug           Log at debug level unless RUST_LOG is set
//!       --init <PATH>     Write an example settings file and exit
//!   -V, --version         Print version
//! ```
//!
//! Without `--config`, `settings.toml` is looked up in the working directory
//! and then in the platform config directory.
//!
//! # Log level precedence
//!
//! `RUST_LOG` > `--debug` > `log_level` in the settings file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tm_obs_sync::application::{EngineSettings, EngineStatus, SyncEngine};
use tm_obs_sync::domain::Settings;
use tm_obs_sync::infrastructure::{
    find_settings_file, load_settings, save_settings, ObsClientConfig, ObsSceneClient,
    TmClientConfig, TmDisplayClient,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bidirectional OBS scene / VEX Tournament Manager display sync.
#[derive(Debug, Parser)]
#[command(
    name = "tm-obs-sync",
    about = "Keeps OBS scenes and a VEX Tournament Manager audience display in sync",
    version
)]
struct Cli {
    /// Path to the settings file.
    #[arg(short = 'c', long, env = "TM_OBS_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level (ignored when RUST_LOG is set).
    #[arg(long)]
    debug: bool,

    /// Write an example settings file to PATH and exit.
    #[arg(long, value_name = "PATH")]
    init: Option<PathBuf>,
}

impl Cli {
    /// The filter directive to use when `RUST_LOG` is absent.
    fn default_directive(&self, settings: &Settings) -> String {
        if self.debug {
            "debug".to_string()
        } else {
            settings.log_level.clone()
        }
    }
}

fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.init {
        save_settings(path, &Settings::example())
            .with_context(|| format!("failed to write example settings to {}", path.display()))?;
        println!("wrote example settings to {}", path.display());
        return Ok(());
    }

    let path = find_settings_file(cli.config.as_deref())?;
    let settings = load_settings(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    init_logging(&cli.default_directive(&settings));

    let table = settings.mapping_table()?;
    let engine_settings = EngineSettings::from_section(&settings.engine);

    info!("TM-OBS-Sync {} starting", env!("CARGO_PKG_VERSION"));
    info!("settings: {}", path.display());
    info!("OBS: {}:{}", settings.obs.host, settings.obs.port);
    info!(
        "VEX TM: {}:{} ({}, fieldset '{}')",
        settings.vex_tm.host,
        settings.vex_tm.port,
        settings.vex_tm.competition,
        settings.vex_tm.fieldset_title
    );
    info!(
        "{} field scene(s), {} other scene mapping(s)",
        table.field_count(),
        table.direct_count()
    );
    if settings.is_observe_only() {
        warn!("sync_obs_to_tm and sync_tm_to_obs are both false; nothing will be mirrored");
    }

    let scenes = Arc::new(ObsSceneClient::new(ObsClientConfig::from_settings(
        &settings.obs,
        engine_settings.command_timeout,
    )));
    let display = Arc::new(TmDisplayClient::new(TmClientConfig::from_settings(
        &settings.vex_tm,
        engine_settings.command_timeout,
    )));
    let engine = SyncEngine::new(
        table,
        settings.directions(),
        engine_settings,
        scenes,
        display,
    );

    let mut status = engine.status();
    engine.start().await?;

    let failure = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("received Ctrl+C, shutting down"),
                Err(e) => error!("failed to listen for Ctrl+C: {e}"),
            }
            None
        }
        failed = status.wait_for(|s| matches!(s, EngineStatus::Failed(_))) => {
            failed.ok().and_then(|s| match &*s {
                EngineStatus::Failed(reason) => Some(reason.clone()),
                _ => None,
            })
        }
    };

    engine.stop().await;

    match failure {
        Some(reason) => anyhow::bail!("sync engine failed: {reason}"),
        None => {
            info!("TM-OBS-Sync stopped");
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["tm-obs-sync"]).unwrap();
        assert!(!cli.debug);
        assert!(cli.init.is_none());
    }

    #[test]
    fn test_cli_short_config_flag() {
        let cli = Cli::parse_from(["tm-obs-sync", "-c", "event.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("event.toml")));
    }

    #[test]
    fn test_cli_init_takes_path() {
        let cli = Cli::parse_from(["tm-obs-sync", "--init", "new.toml"]);
        assert_eq!(cli.init, Some(PathBuf::from("new.toml")));
    }

    #[test]
    fn test_cli_init_requires_value() {
        assert!(Cli::try_parse_from(["tm-obs-sync", "--init"]).is_err());
    }

    #[test]
    fn test_debug_flag_overrides_settings_level() {
        let settings = Settings {
            log_level: "warn".to_string(),
            ..Settings::default()
        };

        let quiet = Cli::parse_from(["tm-obs-sync"]);
        let loud = Cli::parse_from(["tm-obs-sync", "--debug"]);

        assert_eq!(quiet.default_directive(&settings), "warn");
        assert_eq!(loud.default_directive(&settings), "debug");
    }
}
