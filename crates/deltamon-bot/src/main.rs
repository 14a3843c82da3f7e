//! DeltaMon - Entry Point

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use deltamon_bot::{AppConfig, Application, DEFAULT_CONFIG_PATH};
use std::path::{Path, PathBuf};
use tracing::info;

/// Screen-reading delta monitor with threshold alerts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via DELTAMON_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the demo screen and log-only alerts
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Discover accounts and monitor them (default)
    Run,
    /// Run account discovery once and print the accounts
    Discover,
    /// Load and validate the configuration, then print it
    CheckConfig,
    /// Send a test alert through the configured sink
    TestAlert,
}

/// CLI arg > DELTAMON_CONFIG > config/default.toml if present.
fn resolve_config_path(arg: Option<PathBuf>) -> Option<PathBuf> {
    arg.or_else(|| std::env::var_os("DELTAMON_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run);

    let config_path = resolve_config_path(args.config);
    let config = AppConfig::load(config_path.as_deref())?;

    if command == Command::CheckConfig {
        let source = config_path
            .as_deref()
            .map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
        println!("# configuration OK ({source})");
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    deltamon_telemetry::init_logging(&config.telemetry.log_level)?;
    info!("Starting DeltaMon v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!(config_path = %path.display(), "Configuration loaded");
    }

    let app = Application::new(config, config_path, args.dry_run)?;

    match command {
        Command::Run => app.run().await?,
        Command::Discover => {
            let report = app.discover_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::TestAlert => {
            let result = app.send_test_alert().await;
            if !result.is_success() {
                bail!("test alert failed: {result:?}");
            }
            println!("test alert delivered");
        }
        Command::CheckConfig => {}
    }

    Ok(())
}
