//! upwatchd — the uptime monitor binary.
//!
//! # Usage
//!
//! ```text
//! upwatchd run                      # one cycle, commit + push on change
//! upwatchd run --commit --no-push   # always write history, keep commits local
//! upwatchd watch --interval 300     # cycle every five minutes until Ctrl-C
//! upwatchd check api                # probe one site, no side effects
//! ```

mod runner;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use runner::RunOptions;

const DEFAULT_FILTER: &str = "info,upwatch=debug";

#[derive(Parser)]
#[command(name = "upwatchd", about = "Uptime monitor with issue-backed incidents")]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = ".upwatchrc.yml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single monitor cycle.
    Run {
        /// Write and commit history even when no status changed.
        #[arg(long)]
        commit: bool,

        /// Leave commits unpushed.
        #[arg(long)]
        no_push: bool,
    },
    /// Run monitor cycles on an interval until interrupted.
    Watch {
        /// Seconds between cycles.
        #[arg(long, default_value = "300")]
        interval: u64,

        #[arg(long)]
        commit: bool,

        #[arg(long)]
        no_push: bool,
    },
    /// Probe and classify one site without recording anything.
    Check {
        /// Site slug.
        slug: String,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Command::Run { commit, no_push } => {
            let opts = RunOptions {
                config: cli.config,
                force_write: commit,
                push: !no_push,
            };
            let report = runner::run_once(&opts).await?;
            runner::log_report(&report);
            Ok(())
        }
        Command::Watch {
            interval,
            commit,
            no_push,
        } => {
            let opts = RunOptions {
                config: cli.config,
                force_write: commit,
                push: !no_push,
            };
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("shutdown signal received");
                    let _ = shutdown_tx.send(true);
                }
            });
            runner::watch_loop(&opts, Duration::from_secs(interval), shutdown_rx).await;
            info!("upwatchd stopped");
            Ok(())
        }
        Command::Check { slug } => {
            let outcome = runner::check(&cli.config, &slug).await?;
            println!(
                "{slug}: {} ({} in {} ms)",
                outcome.status,
                outcome.raw.http_code,
                outcome.raw.response_time_ms()
            );
            Ok(())
        }
    }
}
