//! Loft daemon binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use loft_core::config::AppConfig;
use loft_server::{AppState, metrics, signup, spawn_sweeper, sweep_temp_files};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Loft - file hierarchy and upload metadata service
#[derive(Parser, Debug)]
#[command(name = "loftd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "LOFT_CONFIG",
        default_value = "config/loft.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service until interrupted (default)
    Run,
    /// Run a single temp file sweep and exit
    Sweep,
    /// Register a member and create its root, home and trash containers
    Signup {
        /// External identifier of the member
        uuid_key: Uuid,
    },
}

/// Load configuration (file is optional, env vars override it).
fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = std::path::Path::new(path);
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}, using defaults", path);
    }

    figment
        .merge(Env::prefixed("LOFT_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Loft v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    metrics::register_metrics();

    let state = AppState::from_config(config).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(state).await,
        Command::Sweep => {
            let stats = sweep_temp_files(&state)
                .await
                .context("temp file sweep failed")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Signup { uuid_key } => {
            let outcome = signup(&state, uuid_key)
                .await
                .with_context(|| format!("signup of {uuid_key} failed"))?;
            println!(
                "member {} created: root={} home={} trash={}",
                outcome.member_id,
                outcome.root.key(),
                outcome.home.key(),
                outcome.trash.key()
            );
            Ok(())
        }
    }
}

async fn run(state: AppState) -> Result<()> {
    state
        .metadata
        .health_check()
        .await
        .context("metadata health check failed")?;

    let sweeper = if state.config.sweeper.enabled {
        Some(spawn_sweeper(state.clone()))
    } else {
        tracing::warn!("Temp file sweeper disabled; abandoned uploads will not be reclaimed");
        None
    };

    tracing::info!("Loft ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::debug!(metrics = %metrics::render(), "Final metrics");
    Ok(())
}
