//! TTL cache of resolved (device, ifIndex, community) -> MAC mappings.
//!
//! Entries are valid while `now - inserted < ttl`; an entry whose age equals
//! the TTL is already expired. Expired entries are removed, never flagged:
//! either lazily by the `get` that finds them or by [`MacCache::sweep`].
//!
//! Because `trapmgrd` runs once per trap, the cache can be persisted to a JSON
//! snapshot between invocations. The snapshot stores wall-clock insertion
//! times; in memory the cache works on `tokio::time::Instant` so tests can
//! drive expiry with a paused clock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sonic_trap_common::{MacAddress, TrapResult};

/// Default cache TTL in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Composite key of a cached resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Device (switch) address.
    pub device: String,
    /// Interface index on the device.
    pub ifindex: u32,
    /// Community the resolution was made with.
    pub community: String,
}

impl CacheKey {
    /// Creates a new cache key.
    pub fn new(device: impl Into<String>, ifindex: u32, community: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ifindex,
            community: community.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.ifindex)
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    mac: MacAddress,
    inserted: Instant,
}

/// Side-effect-free counters of the cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, 0.0 when none were made.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Point-in-time view of one entry, for operator display.
#[derive(Debug, Clone)]
pub struct CacheEntryView {
    pub key: CacheKey,
    pub mac: MacAddress,
    pub age: Duration,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(flatten)]
    key: CacheKey,
    mac: MacAddress,
    inserted_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    hits: u64,
    #[serde(default)]
    misses: u64,
    #[serde(default)]
    entries: Vec<SnapshotEntry>,
}

/// Thread-safe TTL cache of MAC resolutions.
#[derive(Debug)]
pub struct MacCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MacCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_valid(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted) < self.ttl
    }

    /// Returns the cached MAC if present and not expired.
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &CacheKey) -> Option<MacAddress> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key).copied() {
            Some(entry) if self.is_valid(&entry, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, mac = %entry.mac, "Cache hit");
                Some(entry.mac)
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache entry expired, removed");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or overwrites an entry, timestamped now.
    pub fn put(&self, key: CacheKey, mac: MacAddress) {
        debug!(key = %key, mac = %mac, "Cache store");
        self.entries.lock().insert(
            key,
            CacheEntry {
                mac,
                inserted: Instant::now(),
            },
        );
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted) < self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Cache sweep");
        }
        removed
    }

    /// Returns entry and lookup counters without modifying the cache.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();
        let valid = entries
            .values()
            .filter(|entry| self.is_valid(entry, now))
            .count();

        CacheStats {
            total_entries: entries.len(),
            valid_entries: valid,
            expired_entries: entries.len() - valid,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Returns every entry with its age, sorted by key.
    pub fn entries(&self) -> Vec<CacheEntryView> {
        let now = Instant::now();
        let mut views: Vec<CacheEntryView> = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| CacheEntryView {
                key: key.clone(),
                mac: entry.mac,
                age: now.saturating_duration_since(entry.inserted),
                valid: self.is_valid(entry, now),
            })
            .collect();
        views.sort_by(|a, b| {
            (a.key.device.as_str(), a.key.ifindex).cmp(&(b.key.device.as_str(), b.key.ifindex))
        });
        views
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Loads a cache from a snapshot file.
    ///
    /// A missing file yields an empty cache. Entries that expired while the
    /// snapshot sat on disk are dropped.
    pub fn load_snapshot(path: &Path, ttl: Duration) -> TrapResult<Self> {
        Self::read_snapshot(path, ttl, false)
    }

    /// Loads a snapshot keeping expired entries, for inspection and sweeping.
    ///
    /// Ages of expired entries are reported as at least the TTL.
    pub fn inspect_snapshot(path: &Path, ttl: Duration) -> TrapResult<Self> {
        Self::read_snapshot(path, ttl, true)
    }

    fn read_snapshot(path: &Path, ttl: Duration, keep_expired: bool) -> TrapResult<Self> {
        let cache = Self::new(ttl);
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cache),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        cache.hits.store(snapshot.hits, Ordering::Relaxed);
        cache.misses.store(snapshot.misses, Ordering::Relaxed);

        let wall_now = Utc::now();
        let now = Instant::now();
        let mut entries = cache.entries.lock();
        for entry in snapshot.entries {
            let age = (wall_now - entry.inserted_at).to_std().unwrap_or_default();
            if age >= ttl && !keep_expired {
                continue;
            }
            let inserted = now
                .checked_sub(age)
                .or_else(|| now.checked_sub(ttl))
                .unwrap_or(now);
            entries.insert(
                entry.key,
                CacheEntry {
                    mac: entry.mac,
                    inserted,
                },
            );
        }
        debug!(path = %path.display(), entries = entries.len(), "Loaded cache snapshot");
        drop(entries);

        Ok(cache)
    }

    /// Writes the cache to a snapshot file, replacing it atomically.
    pub fn save_snapshot(&self, path: &Path) -> TrapResult<()> {
        let wall_now = Utc::now();
        let now = Instant::now();

        let entries = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| {
                let age = now.saturating_duration_since(entry.inserted);
                SnapshotEntry {
                    key: key.clone(),
                    mac: entry.mac,
                    inserted_at: wall_now
                        - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero()),
                }
            })
            .collect();

        let snapshot = Snapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension(format!("{}.tmp", std::process::id()));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        debug!(path = %path.display(), entries = snapshot.entries.len(), "Saved cache snapshot");
        Ok(())
    }

    /// Runs [`MacCache::sweep`] every `period` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.sweep();
                    }
                }
            }
            info!("Cache sweeper stopped");
        })
    }
}

impl Default for MacCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECS))
    }
}
