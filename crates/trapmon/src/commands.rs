//! trapmon subcommands
//!
//! All commands work from the trapmgrd settings file: the cache snapshot and
//! the log directory it names.

use anyhow::Context;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use sonic_macresolver::{
    AddressResolver, BatchResolver, MacCache, ResolutionRequest, SnmpWalkExecutor,
};
use sonic_trapmgrd::{log_file_path, TrapmgrdSettings};

use crate::report::{format_entry, format_results, format_stats, last_lines};

/// Device used by the synthetic concurrency test.
pub const TEST_DEVICE: &str = "2001:db8::1";

/// First ifIndex of the synthetic requests.
pub const TEST_FIRST_IFINDEX: u32 = 10;

/// Prints cache counters and every entry.
pub fn stats(settings: &TrapmgrdSettings) -> anyhow::Result<String> {
    let cache = inspect_cache(settings)?;
    let mut out = format_stats(&cache.stats());
    for entry in cache.entries() {
        out.push_str(&format_entry(&entry));
        out.push('\n');
    }
    Ok(out)
}

/// Returns the last `lines` lines of the trapmgrd log.
pub fn logs(settings: &TrapmgrdSettings, lines: usize) -> anyhow::Result<String> {
    let path = log_file_path(&settings.logging.log_dir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(format!("No log file at {}\n", path.display()))
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };

    let mut out = String::new();
    for line in last_lines(&content, lines) {
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// Removes expired entries from the snapshot.
pub fn clean_cache(settings: &TrapmgrdSettings) -> anyhow::Result<String> {
    let cache = inspect_cache(settings)?;
    let removed = cache.sweep();
    cache
        .save_snapshot(&settings.cache.state_file)
        .with_context(|| format!("writing {}", settings.cache.state_file.display()))?;
    Ok(format!(
        "Removed {} expired entries, {} remaining\n",
        removed,
        cache.len()
    ))
}

/// Builds the synthetic requests of the concurrency test.
pub fn synthetic_requests(settings: &TrapmgrdSettings, count: usize) -> Vec<ResolutionRequest> {
    (0..count as u32)
        .map(|i| {
            let ifindex = TEST_FIRST_IFINDEX + i;
            ResolutionRequest::new(TEST_DEVICE, ifindex, settings.snmp.community.as_str())
                .with_max_retries(1)
                .with_initial_wait(Duration::from_secs(1))
        })
        .collect()
}

/// Resolves `count` synthetic requests through the batch resolver.
pub async fn test_concurrent(settings: &TrapmgrdSettings, count: usize) -> anyhow::Result<String> {
    let cache = Arc::new(load_cache(settings)?);
    let resolver = AddressResolver::new(
        Arc::new(SnmpWalkExecutor::new(settings.snmp.walk_cmd.as_str())),
        Arc::clone(&cache),
        settings.resolver_config(),
    );
    let batch = BatchResolver::new(Arc::new(resolver), settings.snmp.batch_workers);

    let requests = synthetic_requests(settings, count);
    let mut out = format!(
        "Resolving {} requests against {} with {} workers\n",
        requests.len(),
        TEST_DEVICE,
        batch.pool_size(requests.len())
    );

    let start = Instant::now();
    let results = batch.resolve_many(requests).await;
    out.push_str(&format_results(&results, start.elapsed()));

    cache
        .save_snapshot(&settings.cache.state_file)
        .with_context(|| format!("writing {}", settings.cache.state_file.display()))?;
    Ok(out)
}

/// One line of the monitor display.
pub fn monitor_line(settings: &TrapmgrdSettings) -> anyhow::Result<String> {
    let stats = inspect_cache(settings)?.stats();
    let last_log = fs::read_to_string(log_file_path(&settings.logging.log_dir))
        .ok()
        .and_then(|content| last_lines(&content, 1).first().map(|line| line.to_string()))
        .unwrap_or_else(|| "-".to_string());

    Ok(format!(
        "[{}] cache {}/{} valid | {}",
        chrono::Local::now().format("%H:%M:%S"),
        stats.valid_entries,
        stats.total_entries,
        last_log
    ))
}

/// Prints [`monitor_line`] every `interval` until Ctrl-C.
pub async fn monitor(settings: &TrapmgrdSettings, interval: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Monitor stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                println!("{}", monitor_line(settings)?);
            }
        }
    }
}

fn inspect_cache(settings: &TrapmgrdSettings) -> anyhow::Result<MacCache> {
    let path: &Path = &settings.cache.state_file;
    MacCache::inspect_snapshot(path, settings.cache_ttl())
        .with_context(|| format!("reading cache snapshot {}", path.display()))
}

fn load_cache(settings: &TrapmgrdSettings) -> anyhow::Result<MacCache> {
    let path: &Path = &settings.cache.state_file;
    MacCache::load_snapshot(path, settings.cache_ttl())
        .with_context(|| format!("reading cache snapshot {}", path.display()))
}
