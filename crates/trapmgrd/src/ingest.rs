//! Trap ingestion.
//!
//! snmptrapd hands one payload per invocation on stdin. Saved payloads can
//! also be replayed in bulk; they are processed on the ingestion pool, a
//! bounded number at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{info, info_span, warn, Instrument};

use sonic_trap_common::{TrapError, TrapResult};

use crate::dispatcher::{DispatchReport, EventDispatcher};
use crate::pool::WorkerPool;

/// Name of the trap ingestion pool.
pub const INGEST_POOL: &str = "ingest";

/// Reads a whole payload.
pub async fn read_payload<R>(mut reader: R) -> TrapResult<String>
where
    R: AsyncRead + Unpin,
{
    let mut payload = String::new();
    reader.read_to_string(&mut payload).await?;
    Ok(payload)
}

/// A payload read from disk for replay.
#[derive(Debug, Clone)]
pub struct SavedTrap {
    pub path: PathBuf,
    pub payload: String,
}

impl SavedTrap {
    pub async fn load(path: &Path) -> TrapResult<Self> {
        let payload = tokio::fs::read_to_string(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            payload,
        })
    }
}

/// Outcome of one replayed payload.
#[derive(Debug)]
pub struct ReplayResult {
    pub path: PathBuf,
    pub result: TrapResult<DispatchReport>,
}

/// Dispatches `traps` on an ingestion pool of `workers` slots.
///
/// Results are returned in input order.
pub async fn replay(
    dispatcher: Arc<EventDispatcher>,
    traps: Vec<SavedTrap>,
    workers: usize,
) -> Vec<ReplayResult> {
    let pool = WorkerPool::new(INGEST_POOL, workers);
    info!(traps = traps.len(), workers = pool.capacity(), "Replaying saved traps");

    let mut pending = Vec::with_capacity(traps.len());
    for trap in traps {
        let dispatcher = Arc::clone(&dispatcher);
        let span = info_span!("trap", file = %trap.path.display());
        let path = trap.path.clone();
        let task = async move { dispatcher.dispatch(&trap.payload).await }.instrument(span);
        pending.push((path, pool.spawn(task).await));
    }

    let mut results = Vec::with_capacity(pending.len());
    for (path, spawned) in pending {
        let result = match spawned {
            Ok(handle) => handle
                .await
                .unwrap_or_else(|e| Err(TrapError::internal(format!("trap task failed: {}", e)))),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(file = %path.display(), error = %e, "Replayed trap not processed");
        }
        results.push(ReplayResult { path, result });
    }

    pool.drain().await;
    results
}
