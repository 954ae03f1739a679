//! locsync CLI - follow and publish positions on a location hub.
//!
//! This is the main binary entry point. See the `locsync` library for the
//! client itself.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use locsync::{commands, Config};
use mimalloc::MiMalloc;

/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "locsync")]
#[command(version = VERSION)]
#[command(about = "Real-time location sharing over a SignalR hub")]
struct Cli {
    /// Hub endpoint, overriding the config file and LOCSYNC_HUB_URL
    #[arg(long, global = true)]
    hub_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print status changes and marker updates until ctrl-c
    Watch,
    /// Publish one position
    Send {
        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// User name to publish under (defaults to the configured name)
        #[arg(long)]
        user: Option<String>,
    },
    /// Show the configuration, or get/set a single key
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(hub_url) = cli.hub_url {
        config.hub_url = hub_url;
    }

    match cli.command {
        Commands::Watch => {
            let runtime = build_runtime()?;
            runtime.block_on(commands::watch(&config))?;
        }
        Commands::Send { lat, lon, user } => {
            let runtime = build_runtime()?;
            runtime.block_on(commands::send(&config, lat, lon, user.as_deref()))?;
        }
        Commands::Config { key, value } => match (key, value) {
            (None, _) => commands::config::show(&config)?,
            (Some(k), None) => {
                let value = commands::config::get(&config, &k)?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            (Some(k), Some(v)) => {
                let path = Config::config_path()?;
                commands::config::set(&path, &k, &v)?;
                println!("Set {} in {}", k, path.display());
            }
        },
    }

    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_negative_coordinates() {
        let cli = Cli::try_parse_from(["locsync", "send", "--lat", "-33.86", "--lon", "151.2", "--user", "sam"]).unwrap();
        match cli.command {
            Commands::Send { lat, lon, user } => {
                assert!((lat + 33.86).abs() < 1e-9);
                assert!((lon - 151.2).abs() < 1e-9);
                assert_eq!(user.as_deref(), Some("sam"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_global_hub_url_after_subcommand() {
        let cli = Cli::try_parse_from(["locsync", "watch", "--hub-url", "http://localhost:5000/Hub"]).unwrap();
        assert_eq!(cli.hub_url.as_deref(), Some("http://localhost:5000/Hub"));
        assert!(matches!(cli.command, Commands::Watch));
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
