//! MAC address resolution for switch ports.
//!
//! Answers "which host MAC is attached to ifIndex N of switch S" by walking
//! the switch's bridge forwarding tables:
//!
//! - [`cache`]: TTL cache of previous answers, optionally persisted
//! - [`fdb`]: Parsing and joining of the two BRIDGE-MIB walks
//! - [`query`]: The [`DeviceQueryExecutor`] seam and its `snmpwalk` implementation
//! - [`resolver`]: Single resolutions and retry with linear backoff
//! - [`batch`]: Bounded concurrent resolution of many requests
//!
//! # Example
//!
//! ```ignore
//! use sonic_macresolver::{AddressResolver, MacCache, ResolutionRequest, ResolverConfig, SnmpWalkExecutor};
//! use std::sync::Arc;
//!
//! let resolver = AddressResolver::new(
//!     Arc::new(SnmpWalkExecutor::default()),
//!     Arc::new(MacCache::default()),
//!     ResolverConfig::default(),
//! );
//! let request = ResolutionRequest::new("2001:db8::1", 10, "public");
//! let mac = resolver.resolve_with_retry(&request).await;
//! ```

pub mod batch;
pub mod cache;
pub mod fdb;
pub mod query;
pub mod resolver;

pub use batch::{BatchResolver, ResolutionResults, DEFAULT_BATCH_WORKERS};
pub use cache::{CacheEntryView, CacheKey, CacheStats, MacCache, DEFAULT_CACHE_TTL_SECS};
pub use fdb::{FdbEntry, OID_BASE_PORT_IFINDEX, OID_FDB_PORT};
pub use query::{DeviceQueryExecutor, SnmpWalkExecutor, DEFAULT_QUERY_TIMEOUT_SECS, SNMPWALK_CMD};
pub use resolver::{
    AddressResolver, ResolutionRequest, ResolverConfig, DEFAULT_BACKOFF_STEP_SECS,
    DEFAULT_INITIAL_WAIT_SECS, DEFAULT_MAX_RETRIES,
};
