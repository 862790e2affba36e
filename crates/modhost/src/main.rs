//! # Modhost - Main Entry Point
//!
//! Standalone host process for the mod runtime. This entry point handles
//! CLI parsing, configuration loading, logging setup and the application
//! lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! modhost
//!
//! # Specify custom configuration
//! modhost --config production.toml
//!
//! # Override specific settings
//! modhost --mods /opt/modhost/mods --log-level debug
//!
//! # JSON logging for production
//! modhost --json-logs
//! ```
//!
//! ## Configuration
//!
//! The host loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! The host shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM (Unix),
//! broadcasting the save notification to every active mod before exiting.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the mod host.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
#[tokio::main]
async fn main() {
    // Parse CLI arguments first
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    // Create and run application
    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {e:?}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }
}
