//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! mod discovery, loading, the tick loop and graceful shutdown.

use crate::{cli::CliArgs, config::AppConfig, logging::display_banner, signals::wait_for_shutdown};
use mod_runtime::{
    manager_version, FramePhase, HttpFetcher, ModParams, ModRuntime, UpdateChecker, Version,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Main application struct.
///
/// Manages the complete lifecycle of the mod host: configuration loading,
/// mod discovery and activation, the tick loop that fans frame phases out
/// to active mods, and graceful shutdown with state persistence.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// The mod runtime instance
    runtime: ModRuntime,
    /// Resolved path to the mod-parameters file
    params_path: PathBuf,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// builds the mod runtime.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Build the runtime with the manager and host versions
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(mods_dir) = args.mods_dir {
            config.mods.directory = mods_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if args.no_update_check {
            config.mods.check_updates = false;
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let host_version = Version::parse(&config.host.version);
        let runtime = ModRuntime::new(manager_version(), host_version);
        info!(
            "🚀 Modhost v{} | host API v{}",
            manager_version(),
            host_version
        );
        info!(
            "📂 Config: {} | Mods: {}",
            args.config_path.display(),
            config.mods.directory
        );

        let params_path = config.params_path();
        Ok(Self {
            config,
            runtime,
            params_path,
        })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Discovers and loads mods, optionally kicks off the release-feed
    /// check, then drives the tick loop. On shutdown every active mod
    /// receives the save notification and the enabled flags are persisted.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mods_dir = PathBuf::from(&self.config.mods.directory);
        if !mods_dir.is_dir() {
            tokio::fs::create_dir_all(&mods_dir).await?;
            info!("📁 Created mods directory: {}", mods_dir.display());
        }

        let discovered = self
            .runtime
            .discover(&mods_dir, &self.config.mods.manifest_name)?;
        info!("🔍 Discovered {discovered} mod(s) in {}", mods_dir.display());

        self.runtime.apply_params(&ModParams::load(&self.params_path));

        if self.config.mods.auto_load {
            self.runtime.load_all();
        } else {
            info!("⏸️ Auto-load disabled; mods stay unloaded until activated");
        }

        if self.config.mods.check_updates {
            let checker =
                UpdateChecker::new(Arc::new(HttpFetcher::default()), self.runtime.update_sink());
            checker.check(&self.runtime.repository_urls());
        }

        let tick = Duration::from_millis(self.config.host.tick_interval_ms.max(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = Instant::now();

        info!("✅ Modhost is running - ticking every {:?}", tick);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;

                    self.runtime.dispatch(FramePhase::Update, dt);
                    self.runtime.dispatch(FramePhase::FixedUpdate, tick.as_secs_f32());
                    self.runtime.dispatch(FramePhase::LateUpdate, dt);
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Signal handling failed: {e}");
                    }
                    break;
                }
            }
        }

        info!("💾 Saving mod state...");
        self.runtime.save_all();
        if let Err(e) = self.runtime.collect_params().save(&self.params_path) {
            warn!(
                "Could not persist mod parameters to '{}': {e}",
                self.params_path.display()
            );
        }

        info!("✅ Modhost shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_with_config(path: PathBuf) -> CliArgs {
        CliArgs {
            config_path: path,
            mods_dir: None,
            log_level: None,
            json_logs: false,
            no_update_check: true,
        }
    }

    #[tokio::test]
    async fn application_builds_from_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mods_dir = dir.path().join("mods");

        let mut args = args_with_config(config_path.clone());
        args.mods_dir = Some(mods_dir.clone());

        let app = Application::new(args).await.unwrap();
        assert!(config_path.exists());
        assert_eq!(
            app.config.mods.directory,
            mods_dir.to_string_lossy().to_string()
        );
        assert!(!app.config.mods.check_updates);
        assert!(app.runtime.is_empty());
    }

    #[tokio::test]
    async fn invalid_log_level_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args_with_config(dir.path().join("config.toml"));
        args.log_level = Some("shouty".to_string());

        assert!(Application::new(args).await.is_err());
    }
}
