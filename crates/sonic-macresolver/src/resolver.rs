//! MAC-by-ifIndex resolution with caching and linear-backoff retry.
//!
//! A resolution walks the bridge FDB and the bridge-port -> ifIndex table of
//! the device, then joins them on the bridge port. All walks issued by one
//! resolver are serialized through a single lock so a switch management plane
//! never sees concurrent walks from this process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use sonic_trap_common::{MacAddress, TrapResult};

use crate::cache::{CacheKey, MacCache};
use crate::fdb::{
    find_mac_for_ifindex, parse_base_port_ifindex, parse_fdb_ports, OID_BASE_PORT_IFINDEX,
    OID_FDB_PORT,
};
use crate::query::{DeviceQueryExecutor, DEFAULT_QUERY_TIMEOUT_SECS};

/// Default number of resolution attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait before the second attempt, in seconds.
pub const DEFAULT_INITIAL_WAIT_SECS: u64 = 5;

/// Default backoff increment per further attempt, in seconds.
pub const DEFAULT_BACKOFF_STEP_SECS: u64 = 5;

/// Resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound for a single table walk.
    pub query_timeout: Duration,
    /// Added to the wait for every attempt after the second.
    pub backoff_step: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            backoff_step: Duration::from_secs(DEFAULT_BACKOFF_STEP_SECS),
        }
    }
}

/// A request to resolve the MAC behind one interface of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Caller-chosen identity, `device:ifindex` by default.
    pub request_id: String,
    pub device: String,
    pub ifindex: u32,
    pub community: String,
    /// Physical-port allow-list; `None` accepts any ifIndex.
    pub valid_ports: Option<HashSet<u32>>,
    pub max_retries: u32,
    pub initial_wait: Duration,
}

impl ResolutionRequest {
    /// Creates a request with default retry settings.
    pub fn new(device: impl Into<String>, ifindex: u32, community: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            request_id: format!("{}:{}", device, ifindex),
            device,
            ifindex,
            community: community.into(),
            valid_ports: None,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_wait: Duration::from_secs(DEFAULT_INITIAL_WAIT_SECS),
        }
    }

    /// Overrides the request identity.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Restricts resolution to the given interface indexes.
    pub fn with_valid_ports(mut self, valid_ports: impl IntoIterator<Item = u32>) -> Self {
        self.valid_ports = Some(valid_ports.into_iter().collect());
        self
    }

    /// Sets the number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the wait before the second attempt.
    pub fn with_initial_wait(mut self, initial_wait: Duration) -> Self {
        self.initial_wait = initial_wait;
        self
    }

    /// Returns false if an allow-list is set and excludes this ifIndex.
    pub fn is_port_allowed(&self) -> bool {
        is_allowed(self.ifindex, self.valid_ports.as_ref())
    }
}

fn is_allowed(ifindex: u32, valid_ports: Option<&HashSet<u32>>) -> bool {
    valid_ports.map_or(true, |ports| ports.contains(&ifindex))
}

/// Resolves interface MACs over a [`DeviceQueryExecutor`].
pub struct AddressResolver {
    executor: Arc<dyn DeviceQueryExecutor>,
    cache: Arc<MacCache>,
    query_lock: Mutex<()>,
    config: ResolverConfig,
}

impl AddressResolver {
    /// Creates a resolver sharing the given cache.
    pub fn new(
        executor: Arc<dyn DeviceQueryExecutor>,
        cache: Arc<MacCache>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            executor,
            cache,
            query_lock: Mutex::new(()),
            config,
        }
    }

    /// Returns the cache this resolver populates.
    pub fn cache(&self) -> &Arc<MacCache> {
        &self.cache
    }

    /// Returns the wait before attempt number `attempt` (1-based).
    ///
    /// The first attempt never waits; attempt `n > 1` waits
    /// `initial_wait + (n - 1) * backoff_step`.
    pub fn backoff(&self, initial_wait: Duration, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            initial_wait + self.config.backoff_step * (attempt - 1)
        }
    }

    /// Resolves the MAC behind `ifindex` in a single attempt.
    ///
    /// Query failures are logged and reported as not found.
    pub async fn resolve(
        &self,
        device: &str,
        ifindex: u32,
        community: &str,
        valid_ports: Option<&HashSet<u32>>,
    ) -> Option<MacAddress> {
        if !is_allowed(ifindex, valid_ports) {
            info!(device, ifindex, "ifIndex is not a configured physical port, skipping");
            return None;
        }

        match self.lookup(device, ifindex, community).await {
            Ok(mac) => mac,
            Err(e) => {
                warn!(device, ifindex, error = %e, "MAC resolution attempt failed");
                None
            }
        }
    }

    /// Resolves a request, retrying with linear backoff.
    ///
    /// The allow-list is checked once, before any attempt. Errors that are
    /// not retryable, such as a missing query binary, end the request.
    #[instrument(
        skip(self, request),
        fields(request_id = %request.request_id, device = %request.device, ifindex = request.ifindex)
    )]
    pub async fn resolve_with_retry(&self, request: &ResolutionRequest) -> Option<MacAddress> {
        if !request.is_port_allowed() {
            info!("ifIndex is not a configured physical port, skipping resolution");
            return None;
        }

        for attempt in 1..=request.max_retries {
            let wait = self.backoff(request.initial_wait, attempt);
            if !wait.is_zero() {
                debug!(attempt, wait = ?wait, "Waiting before next attempt");
                tokio::time::sleep(wait).await;
            }

            info!(attempt, max_retries = request.max_retries, "Resolving MAC");
            match self
                .lookup(&request.device, request.ifindex, &request.community)
                .await
            {
                Ok(Some(mac)) => {
                    info!(attempt, mac = %mac, "MAC resolved");
                    return Some(mac);
                }
                Ok(None) => info!(attempt, "No MAC learned on port yet"),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "MAC resolution attempt failed")
                }
                Err(e) => {
                    warn!(attempt, error = %e, "MAC resolution failed, not retrying");
                    return None;
                }
            }
        }

        warn!(
            max_retries = request.max_retries,
            "MAC not resolved after exhausting retries"
        );
        None
    }

    /// Cache lookup, then the two walks and their join.
    async fn lookup(
        &self,
        device: &str,
        ifindex: u32,
        community: &str,
    ) -> TrapResult<Option<MacAddress>> {
        let key = CacheKey::new(device, ifindex, community);
        if let Some(mac) = self.cache.get(&key) {
            return Ok(Some(mac));
        }

        let fdb_output = self.walk(device, community, OID_FDB_PORT).await?;
        let fdb = parse_fdb_ports(&fdb_output);

        let ports_output = self.walk(device, community, OID_BASE_PORT_IFINDEX).await?;
        let base_ports = parse_base_port_ifindex(&ports_output);

        debug!(
            device,
            fdb_entries = fdb.len(),
            bridge_ports = base_ports.len(),
            "Walked forwarding tables"
        );

        let mac = find_mac_for_ifindex(&fdb, &base_ports, ifindex);
        if let Some(mac) = mac {
            self.cache.put(key, mac);
        }
        Ok(mac)
    }

    async fn walk(&self, device: &str, community: &str, oid: &str) -> TrapResult<String> {
        let _guard = self.query_lock.lock().await;
        self.executor
            .walk(device, community, oid, self.config.query_timeout)
            .await
    }
}
