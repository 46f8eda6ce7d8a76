//! Stream Mocker CLI - chat completion streaming mock server
//!
//! Usage:
//!   stream-mocker serve [OPTIONS]    Start the HTTP server
//!
//! Examples:
//!   stream-mocker serve --port 8000
//!   stream-mocker serve --config config.example.yaml
//!   stream-mocker serve --json-logs

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stream_mocker::cli::{Config, ConfigError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "stream_mocker=info,tower_http=info";

#[derive(Parser)]
#[command(name = "stream-mocker")]
#[command(author, version, about = "Chat completion streaming mock server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path (YAML)
        #[arg(short, long, env = "STREAM_MOCKER_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long, default_value = "8000", env = "STREAM_MOCKER_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "STREAM_MOCKER_HOST")]
        host: String,

        /// Enable JSON logging
        #[arg(long, env = "STREAM_MOCKER_JSON_LOGS")]
        json_logs: bool,
    },
}

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_config(
    config_file: Option<&PathBuf>,
    port: u16,
    host: String,
) -> Result<Config, ConfigError> {
    let mut config = if let Some(path) = config_file {
        tracing::info!("Loading configuration from {}", path.display());
        Config::from_file(path)?
    } else {
        Config::default()
    };

    // Override with CLI arguments
    config.server.port = port;
    config.server.host = host;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            json_logs,
        } => {
            init_tracing(json_logs);

            let settings = build_config(config.as_ref(), port, host)?;
            stream_mocker::cli::run_server(settings, config).await?;
        }
    }

    Ok(())
}
