// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadflow - reliability layer for an SMS lead-response agent.
//!
//! This is the binary entry point: the long-running worker service plus the
//! operator commands that drive single passes and manage dead letters.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod adapters;
mod app;
mod ops;
mod serve;
mod status;

use std::path::PathBuf;

use chrono::Datelike;
use clap::{Parser, Subcommand};

use leadflow_config::{LeadflowConfig, LogConfig};
use leadflow_core::LeadflowError;

use crate::app::App;

/// Leadflow - keeps every inbound lead moving until it books, opts out or dies.
#[derive(Parser, Debug)]
#[command(name = "leadflow", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every worker until SIGTERM or Ctrl-C.
    Serve,
    /// Run one stuck-lead sweep.
    Sweep,
    /// Run one retry pass over due dead letters.
    Retry,
    /// Run one housekeeping pass (archive and due follow-ups).
    Housekeep,
    /// Ingest an inbound event from a JSON file (`-` for stdin).
    Ingest {
        file: PathBuf,
        /// Put the event on the durable queue for a running service.
        #[arg(long)]
        enqueue: bool,
    },
    /// Inspect and manage dead letters.
    Dlq {
        #[command(subcommand)]
        action: DlqCommand,
    },
    /// Show worker heartbeats and dead-letter totals.
    Status {
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
    /// List the dates outreach is blocked on.
    Holidays {
        /// Defaults to the current year.
        #[arg(long)]
        year: Option<i32>,
        /// Two-letter state code; strict states add their own holidays.
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DlqCommand {
    List {
        /// pending, retrying, resolved or dead.
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Mark an active entry resolved by hand.
    Resolve {
        id: String,
        #[arg(long, default_value = "operator")]
        operator: String,
    },
    /// Give a dead entry a fresh attempt budget.
    Requeue { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => leadflow_config::load_and_validate_path(path),
        None => leadflow_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            leadflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: LeadflowConfig) -> Result<(), LeadflowError> {
    match command {
        None => {
            println!("leadflow: use --help for available commands");
            Ok(())
        }
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Config) => ops::run_config(&config),
        Some(Commands::Holidays { year, state, json }) => {
            let year = year.unwrap_or_else(|| chrono::Utc::now().year());
            ops::run_holidays(&config, year, state.as_deref(), json)
        }
        Some(command) => {
            let app = App::open(config).await?;
            let result = run_with_app(&app, command).await;
            app.close().await?;
            result
        }
    }
}

async fn run_with_app(app: &App, command: Commands) -> Result<(), LeadflowError> {
    match command {
        Commands::Sweep => ops::run_sweep(app).await,
        Commands::Retry => ops::run_retry(app).await,
        Commands::Housekeep => ops::run_housekeep(app).await,
        Commands::Ingest { file, enqueue } => {
            let event = ops::read_event(&file)?;
            ops::run_ingest(app, &event, enqueue).await.map(|_| ())
        }
        Commands::Dlq { action } => match action {
            DlqCommand::List {
                status,
                limit,
                json,
            } => ops::run_dlq_list(app, status.as_deref(), limit, json)
                .await
                .map(|_| ()),
            DlqCommand::Resolve { id, operator } => ops::run_dlq_resolve(app, &id, &operator).await,
            DlqCommand::Requeue { id } => ops::run_dlq_requeue(app, &id).await,
        },
        Commands::Status { json, plain } => status::run_status(app, json, plain).await,
        Commands::Serve | Commands::Config | Commands::Holidays { .. } => Ok(()),
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log: &LogConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("leadflow={},warn", log.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config =
            leadflow_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.retry.backoff_minutes, vec![1, 5, 15, 60, 240]);
    }

    #[test]
    fn printed_config_is_itself_a_valid_config_file() {
        let rendered = toml::to_string_pretty(&LeadflowConfig::default()).unwrap();
        let reloaded = leadflow_config::load_and_validate_str(&rendered).unwrap();
        assert_eq!(reloaded.lock.ttl_secs, LeadflowConfig::default().lock.ttl_secs);
    }

    #[test]
    fn cli_parses_dlq_requeue() {
        let cli = Cli::try_parse_from(["leadflow", "dlq", "requeue", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Dlq {
                action: DlqCommand::Requeue { ref id }
            }) if id == "abc"
        ));
    }

    #[test]
    fn cli_accepts_global_config_flag() {
        let cli =
            Cli::try_parse_from(["leadflow", "sweep", "--config", "/tmp/leadflow.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/leadflow.toml")));
        assert!(matches!(cli.command, Some(Commands::Sweep)));
    }
}
