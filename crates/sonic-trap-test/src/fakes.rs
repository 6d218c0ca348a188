//! In-memory stand-ins for the external collaborators
//!
//! [`FakeQueryExecutor`] answers forwarding-table walks from a scripted lab
//! topology; [`FakePlaybookExecutor`] records playbook runs instead of
//! touching a switch. Both can be told to fail, hang or panic.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sonic_macresolver::{DeviceQueryExecutor, OID_BASE_PORT_IFINDEX, OID_FDB_PORT};
use sonic_trap_common::{MacAddress, TrapError, TrapResult};
use sonic_trapmgrd::{PlaybookExecutor, PlaybookParams, PlaybookReport};

/// How a scripted device misbehaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// Every walk times out.
    Timeout,
    /// Every walk exits with this status.
    Status(i32),
    /// The first `n` walks time out, later ones succeed.
    TimeoutTimes(usize),
    /// The executor panics.
    Panic,
}

#[derive(Debug, Default)]
struct FakeDevice {
    /// bridge port -> ifIndex
    bridge_ports: BTreeMap<u32, u32>,
    /// MAC -> bridge port
    fdb: BTreeMap<MacAddress, u32>,
    failure: Option<QueryFailure>,
    failed: usize,
}

/// One recorded walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCall {
    pub device: String,
    pub community: String,
    pub oid: String,
}

/// Scripted [`DeviceQueryExecutor`].
///
/// Each host added with [`FakeQueryExecutor::with_host`] gets its own bridge
/// port; walks render the tables the way `snmpwalk -On` prints them.
#[derive(Debug, Default)]
pub struct FakeQueryExecutor {
    devices: Mutex<HashMap<String, FakeDevice>>,
    calls: Mutex<Vec<QueryCall>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `mac` behind `ifindex` on `device`.
    pub fn with_host(self, device: &str, ifindex: u32, mac: MacAddress) -> Self {
        {
            let mut devices = self.devices.lock();
            let dev = devices.entry(device.to_string()).or_default();
            let bridge_port = dev.bridge_ports.len() as u32 + 1;
            dev.bridge_ports.insert(bridge_port, ifindex);
            dev.fdb.insert(mac, bridge_port);
        }
        self
    }

    /// Makes every walk against `device` fail as described.
    pub fn with_failure(self, device: &str, failure: QueryFailure) -> Self {
        self.devices
            .lock()
            .entry(device.to_string())
            .or_default()
            .failure = Some(failure);
        self
    }

    /// Delays every walk.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, device: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.device == device)
            .count()
    }

    /// Highest number of walks seen running at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn render(device: &FakeDevice, oid: &str) -> String {
        if oid == OID_FDB_PORT {
            device
                .fdb
                .iter()
                .map(|(mac, port)| {
                    let suffix: Vec<String> = mac.as_bytes().iter().map(u8::to_string).collect();
                    format!(".{}.{} = INTEGER: {}", oid, suffix.join("."), port)
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else if oid == OID_BASE_PORT_IFINDEX {
            device
                .bridge_ports
                .iter()
                .map(|(port, ifindex)| format!(".{}.{} = INTEGER: {}", oid, port, ifindex))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            format!(".{} = No Such Object available on this agent at this OID", oid)
        }
    }

    fn answer(&self, device: &str, oid: &str, timeout: Duration) -> TrapResult<String> {
        let mut devices = self.devices.lock();
        let Some(dev) = devices.get_mut(device) else {
            return Err(TrapError::QueryTimeout {
                device: device.to_string(),
                oid: oid.to_string(),
                timeout,
            });
        };

        let timed_out = TrapError::QueryTimeout {
            device: device.to_string(),
            oid: oid.to_string(),
            timeout,
        };
        match dev.failure.clone() {
            Some(QueryFailure::Timeout) => Err(timed_out),
            Some(QueryFailure::Status(exit_code)) => Err(TrapError::QueryFailed {
                device: device.to_string(),
                oid: oid.to_string(),
                exit_code,
                output: "Timeout: No Response".to_string(),
            }),
            Some(QueryFailure::TimeoutTimes(n)) if dev.failed < n => {
                dev.failed += 1;
                Err(timed_out)
            }
            Some(QueryFailure::Panic) => panic!("scripted executor panic for {}", device),
            _ => Ok(Self::render(dev, oid)),
        }
    }
}

#[async_trait]
impl DeviceQueryExecutor for FakeQueryExecutor {
    async fn walk(
        &self,
        device: &str,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> TrapResult<String> {
        self.calls.lock().push(QueryCall {
            device: device.to_string(),
            community: community.to_string(),
            oid: oid.to_string(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.answer(device, oid, timeout);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// One recorded playbook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookRun {
    pub playbook: String,
    pub params: PlaybookParams,
}

/// Recording [`PlaybookExecutor`].
///
/// The timeout argument is ignored, so a delay longer than it exercises the
/// caller's own deadline.
#[derive(Debug, Default)]
pub struct FakePlaybookExecutor {
    runs: Mutex<Vec<PlaybookRun>>,
    finished: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<String>>,
}

impl FakePlaybookExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every run.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Makes runs of `playbook` exit non-zero.
    pub fn with_failure(self, playbook: &str) -> Self {
        self.failing.lock().insert(playbook.to_string());
        self
    }

    /// Runs started so far, in start order.
    pub fn runs(&self) -> Vec<PlaybookRun> {
        self.runs.lock().clone()
    }

    pub fn playbooks(&self) -> Vec<String> {
        self.runs.lock().iter().map(|run| run.playbook.clone()).collect()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    /// Runs that returned, as opposed to being cut off.
    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybookExecutor for FakePlaybookExecutor {
    async fn run(
        &self,
        playbook: &str,
        params: &PlaybookParams,
        _timeout: Duration,
    ) -> TrapResult<PlaybookReport> {
        self.runs.lock().push(PlaybookRun {
            playbook: playbook.to_string(),
            params: params.clone(),
        });
        tracing::debug!(playbook, "Fake playbook started");

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().contains(playbook) {
            return Err(TrapError::PlaybookFailed {
                playbook: playbook.to_string(),
                exit_code: 2,
                output: "fatal: [switch]: UNREACHABLE!".to_string(),
            });
        }
        Ok(PlaybookReport {
            playbook: playbook.to_string(),
            output: "ok=1 changed=1".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonic_macresolver::fdb::{find_mac_for_ifindex, parse_base_port_ifindex, parse_fdb_ports};

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_rendered_tables_join_back() {
        let fake = FakeQueryExecutor::new()
            .with_host("sw1", 10, mac("00:11:22:33:44:55"))
            .with_host("sw1", 11, mac("00:11:22:33:44:66"));
        let timeout = Duration::from_secs(1);

        let fdb = parse_fdb_ports(&fake.walk("sw1", "public", OID_FDB_PORT, timeout).await.unwrap());
        let ports = parse_base_port_ifindex(
            &fake
                .walk("sw1", "public", OID_BASE_PORT_IFINDEX, timeout)
                .await
                .unwrap(),
        );
        assert_eq!(
            find_mac_for_ifindex(&fdb, &ports, 11),
            Some(mac("00:11:22:33:44:66"))
        );
        assert_eq!(fake.call_count(), 2);
        assert_eq!(fake.calls()[0].oid, OID_FDB_PORT);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let fake = FakeQueryExecutor::new()
            .with_host("sw1", 10, mac("00:11:22:33:44:55"))
            .with_failure("sw1", QueryFailure::TimeoutTimes(1))
            .with_failure("sw2", QueryFailure::Status(1));
        let timeout = Duration::from_secs(1);

        assert!(fake.walk("sw1", "public", OID_FDB_PORT, timeout).await.is_err());
        assert!(fake.walk("sw1", "public", OID_FDB_PORT, timeout).await.is_ok());
        assert!(matches!(
            fake.walk("sw2", "public", OID_FDB_PORT, timeout).await,
            Err(TrapError::QueryFailed { exit_code: 1, .. })
        ));
        assert!(fake.walk("unknown", "public", OID_FDB_PORT, timeout).await.is_err());
        assert_eq!(fake.calls_for("sw1"), 2);
    }

    #[tokio::test]
    async fn test_playbook_recording() {
        let fake = FakePlaybookExecutor::new().with_failure("clean.yml");
        let params = PlaybookParams::new("sw1", "Fa0/1");

        assert!(fake.run("vlan.yml", &params, Duration::ZERO).await.is_ok());
        assert!(fake.run("clean.yml", &params, Duration::ZERO).await.is_err());
        assert_eq!(fake.playbooks(), vec!["vlan.yml", "clean.yml"]);
        assert_eq!(fake.finished_count(), 2);
    }
}
