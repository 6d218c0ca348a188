//! Concurrent resolution of independent requests.

use std::cmp;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use sonic_trap_common::MacAddress;

use crate::resolver::{AddressResolver, ResolutionRequest};

/// Default upper bound of concurrent resolutions.
pub const DEFAULT_BATCH_WORKERS: usize = 5;

/// Request id -> resolved MAC (`None` when not found or failed).
pub type ResolutionResults = HashMap<String, Option<MacAddress>>;

/// Fans requests out over a bounded pool of resolution workers.
pub struct BatchResolver {
    resolver: Arc<AddressResolver>,
    max_workers: usize,
}

impl BatchResolver {
    /// Creates a batch resolver with at most `max_workers` concurrent requests.
    pub fn new(resolver: Arc<AddressResolver>, max_workers: usize) -> Self {
        Self {
            resolver,
            max_workers: max_workers.max(1),
        }
    }

    /// Returns the pool size used for a batch of `requests` requests.
    pub fn pool_size(&self, requests: usize) -> usize {
        cmp::min(requests, self.max_workers)
    }

    /// Resolves every request and returns once all have finished.
    ///
    /// A request whose task fails (including by panicking) is reported as
    /// `None` without affecting the others.
    pub async fn resolve_many(&self, requests: Vec<ResolutionRequest>) -> ResolutionResults {
        let mut results: ResolutionResults = requests
            .iter()
            .map(|request| (request.request_id.clone(), None))
            .collect();
        if requests.is_empty() {
            return results;
        }

        let workers = self.pool_size(requests.len());
        info!(requests = requests.len(), workers, "Starting batch resolution");

        let slots = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for request in requests {
            let resolver = Arc::clone(&self.resolver);
            let slots = Arc::clone(&slots);
            let span = info_span!("resolve", request_id = %request.request_id);
            tasks.spawn(
                async move {
                    let Ok(_slot) = slots.acquire_owned().await else {
                        return (request.request_id, None);
                    };
                    let mac = resolver.resolve_with_retry(&request).await;
                    (request.request_id, mac)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((request_id, mac)) => {
                    results.insert(request_id, mac);
                }
                Err(e) => warn!(error = %e, "Resolution task failed, result recorded as absent"),
            }
        }

        let resolved = results.values().filter(|mac| mac.is_some()).count();
        info!(resolved, total = results.len(), "Batch resolution complete");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MacCache;
    use crate::fdb::OID_FDB_PORT;
    use crate::query::DeviceQueryExecutor;
    use crate::resolver::ResolverConfig;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sonic_trap_common::{TrapError, TrapResult};
    use std::time::Duration;

    /// Device `10.0.0.x` has MAC `00:00:00:00:00:0x` on ifIndex 10.
    /// `unreachable` times out; `explode` panics.
    struct LabExecutor;

    #[async_trait]
    impl DeviceQueryExecutor for LabExecutor {
        async fn walk(
            &self,
            device: &str,
            _community: &str,
            oid: &str,
            timeout: Duration,
        ) -> TrapResult<String> {
            match device {
                "unreachable" => Err(TrapError::QueryTimeout {
                    device: device.to_string(),
                    oid: oid.to_string(),
                    timeout,
                }),
                "explode" => panic!("executor bug"),
                _ => {
                    let host: u8 = device.rsplit('.').next().unwrap().parse().unwrap();
                    Ok(if oid == OID_FDB_PORT {
                        format!(".1.3.6.1.2.1.17.4.3.1.2.0.0.0.0.0.{} = INTEGER: 5", host)
                    } else {
                        ".1.3.6.1.2.1.17.1.4.1.2.5 = INTEGER: 10".to_string()
                    })
                }
            }
        }
    }

    fn batch() -> BatchResolver {
        let resolver = AddressResolver::new(
            Arc::new(LabExecutor),
            Arc::new(MacCache::default()),
            ResolverConfig::default(),
        );
        BatchResolver::new(Arc::new(resolver), DEFAULT_BATCH_WORKERS)
    }

    fn request(device: &str) -> ResolutionRequest {
        ResolutionRequest::new(device, 10, "public")
            .with_max_retries(1)
            .with_initial_wait(Duration::ZERO)
    }

    #[test]
    fn test_pool_size() {
        let batch = batch();
        assert_eq!(batch.pool_size(2), 2);
        assert_eq!(batch.pool_size(5), 5);
        assert_eq!(batch.pool_size(12), 5);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(batch().resolve_many(Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolves_all_requests() {
        let requests: Vec<_> = (1..=8).map(|i| request(&format!("10.0.0.{}", i))).collect();
        let results = batch().resolve_many(requests).await;

        assert_eq!(results.len(), 8);
        for i in 1..=8 {
            let mac = results[&format!("10.0.0.{}:10", i)].unwrap();
            assert_eq!(mac.as_bytes()[5], i as u8);
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let requests = vec![
            request("10.0.0.1"),
            request("unreachable").with_request_id("down"),
            request("explode").with_request_id("bug"),
            request("10.0.0.2"),
        ];
        let results = batch().resolve_many(requests).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results["down"], None);
        assert_eq!(results["bug"], None);
        assert_eq!(
            results["10.0.0.1:10"].map(|m| m.to_string()),
            Some("00:00:00:00:00:01".to_string())
        );
        assert_eq!(
            results["10.0.0.2:10"].map(|m| m.to_string()),
            Some("00:00:00:00:00:02".to_string())
        );
    }
}
