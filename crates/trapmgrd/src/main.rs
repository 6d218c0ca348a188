//! trapmgrd - SNMP trap manager
//!
//! Invoked by snmptrapd with one trap payload on stdin. Saved payloads can be
//! replayed with `trapmgrd replay <files...>`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sonic_macresolver::{AddressResolver, MacCache, SnmpWalkExecutor};
use sonic_trap_common::TrapError;
use sonic_trapmgrd::{
    init_logging, read_payload, replay, AnsiblePlaybookExecutor, DeviceConfig, EventDispatcher,
    PortLeaseManager, SavedTrap, TrapmgrdSettings, DEFAULT_CONFIG_PATH, DEFAULT_SETTINGS_PATH,
};

/// SONiC SNMP trap manager
#[derive(Parser, Debug)]
#[command(name = "trapmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device configuration (JSON)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Daemon settings (TOML)
    #[arg(short = 's', long, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Log directory, overrides the settings file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process saved trap payloads
    Replay {
        /// Payload files, one trap each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let settings = match TrapmgrdSettings::load_or_default(&args.settings) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("trapmgrd: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = args
        .log_dir
        .clone()
        .unwrap_or_else(|| settings.logging.log_dir.clone());
    init_logging(&log_dir);

    match run(args, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "trapmgrd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, settings: TrapmgrdSettings) -> anyhow::Result<()> {
    let payload = match &args.command {
        None => {
            let payload = read_payload(tokio::io::stdin())
                .await
                .context("reading trap payload")?;
            if payload.trim().is_empty() {
                info!("Empty trap payload, nothing to do");
                return Ok(());
            }
            Some(payload)
        }
        Some(Command::Replay { .. }) => None,
    };

    let config = DeviceConfig::load(&args.config).context("loading device configuration")?;
    let settings = Arc::new(settings);
    let cache = Arc::new(load_cache(&settings));

    let resolver = AddressResolver::new(
        Arc::new(SnmpWalkExecutor::new(settings.snmp.walk_cmd.as_str())),
        Arc::clone(&cache),
        settings.resolver_config(),
    );
    let playbooks = AnsiblePlaybookExecutor::new(
        settings.playbooks.ansible_cmd.as_str(),
        settings.playbooks.base_dir.as_path(),
    );
    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::new(config),
        Arc::clone(&settings),
        Arc::new(resolver),
        Arc::new(PortLeaseManager::new(settings.lease_timeout())),
        Arc::new(playbooks),
    ));

    match (args.command, payload) {
        (Some(Command::Replay { files }), _) => {
            replay_files(&dispatcher, &settings, &cache, files).await?
        }
        (None, Some(payload)) => match dispatcher.dispatch(&payload).await {
            Ok(report) => info!(outcome = %report.outcome, "Trap handled"),
            Err(TrapError::EmptyPayload) => info!("Empty trap payload, nothing to do"),
            Err(e) if e.is_fatal() => return Err(e).context("dispatching trap"),
            Err(e) => warn!(error = %e, "Trap not processed"),
        },
        (None, None) => {}
    }

    // Pending actions keep running past the dispatch wait; finish them first
    dispatcher.drain().await;
    save_cache(&cache, &settings.cache.state_file);
    Ok(())
}

async fn replay_files(
    dispatcher: &Arc<EventDispatcher>,
    settings: &TrapmgrdSettings,
    cache: &Arc<MacCache>,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut traps = Vec::with_capacity(files.len());
    for path in &files {
        let trap = SavedTrap::load(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        traps.push(trap);
    }

    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(
        Duration::from_secs(settings.cache.sweep_interval_secs.max(1)),
        cancel.clone(),
    );

    let results = replay(
        Arc::clone(dispatcher),
        traps,
        settings.dispatch.ingest_workers,
    )
    .await;

    cancel.cancel();
    let _ = sweeper.await;

    let failed = results.iter().filter(|r| r.result.is_err()).count();
    info!(total = results.len(), failed, "Replay complete");
    for result in results {
        match result.result {
            Ok(report) => {
                info!(file = %result.path.display(), outcome = %report.outcome, "Replayed trap")
            }
            Err(e) if e.is_fatal() => {
                return Err(e).with_context(|| format!("replaying {}", result.path.display()))
            }
            Err(_) => {}
        }
    }
    Ok(())
}

fn load_cache(settings: &TrapmgrdSettings) -> MacCache {
    let path = &settings.cache.state_file;
    match MacCache::load_snapshot(path, settings.cache_ttl()) {
        Ok(cache) => cache,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable cache snapshot");
            MacCache::new(settings.cache_ttl())
        }
    }
}

fn save_cache(cache: &MacCache, path: &Path) {
    if let Err(e) = cache.save_snapshot(path) {
        warn!(path = %path.display(), error = %e, "Failed to save cache snapshot");
    }
}
