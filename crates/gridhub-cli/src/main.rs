use std::time::Duration;

use clap::{Parser, Subcommand};

use gridhub_core::Capabilities;

mod commands;

#[derive(Parser)]
#[command(
    name = "gridhub",
    about = "gridhub — test-grid hub scheduling core",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a gridhub.toml
    Check {
        /// Path to the config file
        #[arg(short, long, default_value = "gridhub.toml")]
        config: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Write a starter gridhub.toml
    Init {
        #[arg(short, long, default_value = ".")]
        path: String,
    },
    /// Run concurrent clients against the fleet declared in the config.
    ///
    /// Each client verifies the fleet can serve the requested
    /// capabilities, takes a session, holds it and releases it. Misses
    /// are retried with linear backoff.
    Simulate {
        #[arg(short, long, default_value = "gridhub.toml")]
        config: String,
        /// Number of concurrent clients
        #[arg(long, default_value_t = 4)]
        clients: usize,
        /// Requests issued by each client
        #[arg(long, default_value_t = 10)]
        requests: usize,
        /// Requested capability as key=value (repeatable)
        #[arg(long = "capability", value_parser = parse_capability)]
        capabilities: Vec<(String, serde_json::Value)>,
        /// How long each session is held, in milliseconds
        #[arg(long, default_value_t = 20)]
        hold_ms: u64,
        /// Attempts per request before counting a miss
        #[arg(long, default_value_t = 50)]
        max_attempts: u32,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn parse_capability(raw: &str) -> Result<(String, serde_json::Value), String> {
    Capabilities::parse_pair(raw).ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridhub=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config, format } => commands::check::check(&config, &format),
        Commands::Init { path } => commands::check::init(&path),
        Commands::Simulate {
            config,
            clients,
            requests,
            capabilities,
            hold_ms,
            max_attempts,
            format,
        } => {
            let options = commands::simulate::SimulationOptions {
                clients,
                requests,
                requested: capabilities.into_iter().collect(),
                hold: Duration::from_millis(hold_ms),
                max_attempts,
                ..Default::default()
            };
            commands::simulate::simulate(&config, options, &format).await
        }
    }
}
