//! trapmon - trapmgrd cache and log inspection

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use sonic_trapmgrd::{TrapmgrdSettings, DEFAULT_SETTINGS_PATH};
use sonic_trapmon::commands;

/// Inspect and exercise the SONiC trap manager
#[derive(Parser, Debug)]
#[command(name = "trapmon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// trapmgrd settings (TOML)
    #[arg(short = 's', long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show cache counters and entries
    Stats,
    /// Show the end of the trapmgrd log
    Logs {
        /// Number of lines
        #[arg(short = 'l', long, default_value = "20")]
        lines: usize,
    },
    /// Remove expired cache entries
    CleanCache,
    /// Resolve synthetic requests concurrently
    TestConcurrent {
        /// Number of requests
        #[arg(short = 'r', long, default_value = "5")]
        requests: usize,
    },
    /// Print cache state and the last log line periodically
    Monitor {
        /// Seconds between updates
        #[arg(short = 'i', long, default_value = "5")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("trapmon: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = TrapmgrdSettings::load_or_default(&args.settings)?;

    match args.command {
        Command::Stats => print!("{}", commands::stats(&settings)?),
        Command::Logs { lines } => print!("{}", commands::logs(&settings, lines)?),
        Command::CleanCache => print!("{}", commands::clean_cache(&settings)?),
        Command::TestConcurrent { requests } => {
            print!("{}", commands::test_concurrent(&settings, requests).await?)
        }
        Command::Monitor { interval } => {
            commands::monitor(&settings, Duration::from_secs(interval.max(1))).await?
        }
    }
    Ok(())
}
