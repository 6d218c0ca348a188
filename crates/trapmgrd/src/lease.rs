//! Exclusive, time-bounded claims on physical ports.
//!
//! A lease keeps two configuration actions from running against the same port
//! at once. Leases older than the abandonment timeout are treated as left
//! behind by a crashed worker and are silently replaced.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default lease abandonment timeout in seconds.
pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 300;

/// Result of a lease request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDecision {
    Granted,
    /// Another action holds the port; `age` is how long it has held it.
    Denied { age: Duration },
}

impl LeaseDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, LeaseDecision::Granted)
    }
}

/// Process-wide port lease table.
#[derive(Debug)]
pub struct PortLeaseManager {
    timeout: Duration,
    leases: Mutex<HashMap<String, Instant>>,
}

impl PortLeaseManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Claims `port` unless a live lease exists.
    pub fn try_acquire(&self, port: &str) -> LeaseDecision {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        if let Some(acquired) = leases.get(port) {
            let age = now.saturating_duration_since(*acquired);
            if age <= self.timeout {
                info!(port, age_secs = age.as_secs(), "Port is leased by another action");
                return LeaseDecision::Denied { age };
            }
            info!(port, age_secs = age.as_secs(), "Replacing abandoned port lease");
        }

        leases.insert(port.to_string(), now);
        debug!(port, "Port lease granted");
        LeaseDecision::Granted
    }

    /// Claims `port` and returns a guard that releases it on drop.
    pub fn acquire_guard(self: &Arc<Self>, port: &str) -> Result<LeaseGuard, Duration> {
        match self.try_acquire(port) {
            LeaseDecision::Granted => Ok(LeaseGuard {
                manager: Arc::clone(self),
                port: port.to_string(),
            }),
            LeaseDecision::Denied { age } => Err(age),
        }
    }

    /// Removes the lease on `port`, if any.
    pub fn release(&self, port: &str) {
        if self.leases.lock().remove(port).is_some() {
            debug!(port, "Port lease released");
        }
    }

    pub fn is_leased(&self, port: &str) -> bool {
        self.leases.lock().contains_key(port)
    }

    pub fn len(&self) -> usize {
        self.leases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.lock().is_empty()
    }
}

impl Default for PortLeaseManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_LEASE_TIMEOUT_SECS))
    }
}

/// Holds a port lease until dropped.
#[derive(Debug)]
pub struct LeaseGuard {
    manager: Arc<PortLeaseManager>,
    port: String,
}

impl LeaseGuard {
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.manager.release(&self.port);
    }
}
