//! CLI for tether event-stream connections.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tether_core::config;

use commands::{run_config, run_probe, run_status, run_watch};

/// Top-level CLI for tether.
#[derive(Debug, Parser)]
#[command(name = "tether")]
#[command(about = "tether: resilient, resumable event-stream connections", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Connect every configured stream (plus any given here) and keep them up until Ctrl-C.
    Watch {
        /// Extra streams as NAME=URL.
        #[arg(value_name = "NAME=URL")]
        streams: Vec<String>,
        /// Header sent on every stream, as NAME:VALUE. Repeatable.
        #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
        headers: Vec<String>,
        /// Seconds between status lines.
        #[arg(long, default_value = "10", value_name = "SECS")]
        status_interval: u64,
    },

    /// Make one connection attempt (no retries) and report the outcome.
    Probe {
        /// Event-stream URL.
        url: String,
        /// Request header as NAME:VALUE. Repeatable.
        #[arg(long = "header", short = 'H', value_name = "NAME:VALUE")]
        headers: Vec<String>,
        /// Resume position sent as Last-Event-ID.
        #[arg(long, value_name = "ID")]
        last_event_id: Option<String>,
    },

    /// Print the effective retry policy and configured streams as JSON lines.
    Status,

    /// Print the path of the config file.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Watch {
                streams,
                headers,
                status_interval,
            } => {
                let every = Duration::from_secs(status_interval.max(1));
                run_watch(&cfg, &streams, &headers, every).await?;
            }
            CliCommand::Probe {
                url,
                headers,
                last_event_id,
            } => run_probe(&cfg, &url, &headers, last_event_id.as_deref()).await?,
            CliCommand::Status => run_status(&cfg)?,
            CliCommand::Config => run_config()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
