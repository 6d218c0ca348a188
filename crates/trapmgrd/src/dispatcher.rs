//! Trap event dispatch.
//!
//! A trap moves through these states:
//!
//! ```text
//! received -> parsed -> filtered
//!                    -> resolving -> resolved -> leased -> dispatched -> completed
//!                                             -> lease_denied
//! ```
//!
//! Only traps for configured physical ports get past `parsed`. Resolution
//! runs inline with retries. Connect and disconnect actions take the port
//! lease and then run their playbooks on the action pool, where the lease is
//! released however the task ends.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use sonic_macresolver::{AddressResolver, ResolutionRequest};
use sonic_trap_common::{MacAddress, TrapError, TrapResult, VlanId};

use crate::config::{DeviceConfig, TrapAction};
use crate::lease::{LeaseGuard, PortLeaseManager};
use crate::parser::{ParsedTrap, TrapParser, UNKNOWN};
use crate::playbook::{PlaybookExecutor, PlaybookParams};
use crate::pool::WorkerPool;
use crate::settings::TrapmgrdSettings;

/// Name of the configuration action pool.
pub const ACTION_POOL: &str = "actions";

/// A parsed trap with its device name and resolved MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapEvent {
    pub source: Option<String>,
    pub device_name: String,
    pub event: String,
    pub action: Option<TrapAction>,
    pub port_name: Option<String>,
    pub ifindex: Option<u32>,
    pub mac: Option<MacAddress>,
}

impl TrapEvent {
    fn new(trap: ParsedTrap, config: &DeviceConfig) -> Self {
        let device_name = trap
            .source
            .as_deref()
            .map(|address| config.device_name(address))
            .unwrap_or(crate::config::UNKNOWN_DEVICE)
            .to_string();
        Self {
            source: trap.source,
            device_name,
            event: trap.event,
            action: trap.action,
            port_name: trap.port_name,
            ifindex: trap.ifindex,
            mac: None,
        }
    }

    fn source_or_unknown(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN)
    }

    fn port_or_unknown(&self) -> &str {
        self.port_name.as_deref().unwrap_or(UNKNOWN)
    }

    fn mac_or_unknown(&self) -> String {
        self.mac
            .map(|mac| mac.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// Where a trap ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a configured physical port; nothing was queried.
    Filtered,
    /// Logged only: no action, or the action lacked a port or MAC.
    NoAction,
    /// Another action holds the port.
    LeaseDenied { age: Duration },
    /// The action pool was saturated; the lease was returned.
    Rejected,
    /// The action finished within the dispatch wait.
    Completed { success: bool },
    /// The action is still running after the dispatch wait.
    Pending,
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Filtered => f.write_str("filtered"),
            DispatchOutcome::NoAction => f.write_str("no-action"),
            DispatchOutcome::LeaseDenied { age } => write!(f, "lease-denied ({}s)", age.as_secs()),
            DispatchOutcome::Rejected => f.write_str("rejected"),
            DispatchOutcome::Completed { success: true } => f.write_str("completed"),
            DispatchOutcome::Completed { success: false } => f.write_str("failed"),
            DispatchOutcome::Pending => f.write_str("pending"),
        }
    }
}

/// Result of dispatching one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event: TrapEvent,
    pub outcome: DispatchOutcome,
}

/// Playbooks to run in order, with their shared parameters.
#[derive(Debug, Clone)]
struct ActionPlan {
    action: TrapAction,
    playbooks: Vec<String>,
    params: PlaybookParams,
}

/// Turns trap payloads into configuration actions.
pub struct EventDispatcher {
    config: Arc<DeviceConfig>,
    settings: Arc<TrapmgrdSettings>,
    resolver: Arc<AddressResolver>,
    leases: Arc<PortLeaseManager>,
    playbooks: Arc<dyn PlaybookExecutor>,
    actions: WorkerPool,
}

impl EventDispatcher {
    pub fn new(
        config: Arc<DeviceConfig>,
        settings: Arc<TrapmgrdSettings>,
        resolver: Arc<AddressResolver>,
        leases: Arc<PortLeaseManager>,
        playbooks: Arc<dyn PlaybookExecutor>,
    ) -> Self {
        let actions = WorkerPool::new(ACTION_POOL, settings.dispatch.action_workers);
        Self {
            config,
            settings,
            resolver,
            leases,
            playbooks,
            actions,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn leases(&self) -> &Arc<PortLeaseManager> {
        &self.leases
    }

    pub fn resolver(&self) -> &Arc<AddressResolver> {
        &self.resolver
    }

    pub fn action_pool(&self) -> &WorkerPool {
        &self.actions
    }

    /// Processes one trap payload.
    ///
    /// Returns [`TrapError::EmptyPayload`] for a blank payload. Playbook
    /// failures are reported through the outcome, never as errors.
    pub async fn dispatch(&self, payload: &str) -> TrapResult<DispatchReport> {
        if payload.trim().is_empty() {
            return Err(TrapError::EmptyPayload);
        }

        let parsed =
            TrapParser::new(&self.config, &self.settings.trap.interface_prefixes).parse(payload);
        let mut event = TrapEvent::new(parsed, &self.config);

        let Some(ifindex) = event.ifindex.filter(|i| self.config.is_physical_port(*i)) else {
            info!(
                device = %event.source_or_unknown(),
                ifindex = ?event.ifindex,
                trap = %event.event,
                "Trap is not for a configured physical port, filtered"
            );
            return Ok(DispatchReport {
                event,
                outcome: DispatchOutcome::Filtered,
            });
        };

        event.mac = self.resolve(&event, ifindex).await;
        self.log_summary(&event, payload);

        let outcome = match self.plan(&event) {
            Some(plan) => self.run_plan(plan).await,
            None => DispatchOutcome::NoAction,
        };
        info!(
            trap = %event.event,
            port = %event.port_or_unknown(),
            outcome = %outcome,
            "Trap dispatched"
        );
        Ok(DispatchReport { event, outcome })
    }

    /// Waits for every action spawned so far.
    pub async fn drain(&self) {
        self.actions.drain().await;
    }

    async fn resolve(&self, event: &TrapEvent, ifindex: u32) -> Option<MacAddress> {
        let Some(device) = event.source.as_deref() else {
            warn!(ifindex, "Trap source address unknown, skipping MAC resolution");
            return None;
        };

        let snmp = &self.settings.snmp;
        let request = ResolutionRequest::new(device, ifindex, snmp.community.as_str())
            .with_valid_ports(self.config.valid_ports())
            .with_max_retries(snmp.max_retries)
            .with_initial_wait(self.settings.initial_wait());
        self.resolver.resolve_with_retry(&request).await
    }

    fn log_summary(&self, event: &TrapEvent, payload: &str) {
        info!(
            trap = %event.event,
            device_name = %event.device_name,
            device = %event.source_or_unknown(),
            port = %event.port_or_unknown(),
            ifindex = ?event.ifindex,
            mac = %event.mac_or_unknown(),
            payload,
            "Trap received"
        );
    }

    fn plan(&self, event: &TrapEvent) -> Option<ActionPlan> {
        let action = event.action?;
        let Some(port) = event.port_name.as_deref() else {
            info!(action = %action, "Trap lacks a port, no action taken");
            return None;
        };

        let playbooks = &self.settings.playbooks;
        let mut params = PlaybookParams::new(event.source_or_unknown(), port);
        if let Some(mac) = event.mac {
            params = params.with_mac(mac);
        }

        match action {
            TrapAction::Connect => {
                let Some(mac) = event.mac else {
                    info!(port, "MAC unknown, connect action skipped");
                    return None;
                };
                let vlan: Option<VlanId> = self.config.vlan_for(&mac);
                let names = match vlan {
                    Some(vlan) => {
                        params = params.with_vlan(vlan);
                        vec![playbooks.vlan_create.clone(), playbooks.vlan_assign.clone()]
                    }
                    None => Vec::new(),
                };
                Some(ActionPlan {
                    action,
                    playbooks: names,
                    params,
                })
            }
            TrapAction::Disconnect => Some(ActionPlan {
                action,
                playbooks: vec![playbooks.port_cleanup.clone()],
                params,
            }),
        }
    }

    async fn run_plan(&self, plan: ActionPlan) -> DispatchOutcome {
        let port = plan.params.interface_name.clone();
        let lease = match self.leases.acquire_guard(&port) {
            Ok(lease) => lease,
            Err(age) => return DispatchOutcome::LeaseDenied { age },
        };

        let span = info_span!("action", action = %plan.action, port = %port);
        let task = run_action(
            Arc::clone(&self.playbooks),
            plan,
            self.settings.playbook_timeout(),
            lease,
        )
        .instrument(span);

        // On rejection the task, and with it the lease, is dropped here
        let mut handle = match self.actions.try_spawn(task) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(port = %port, error = %e, "Action rejected");
                return DispatchOutcome::Rejected;
            }
        };

        let wait = self.settings.dispatch_wait();
        match tokio::time::timeout(wait, &mut handle).await {
            Ok(Ok(success)) => DispatchOutcome::Completed { success },
            Ok(Err(e)) => {
                error!(port = %port, error = %e, "Action task failed");
                DispatchOutcome::Completed { success: false }
            }
            Err(_) => {
                info!(port = %port, wait = ?wait, "Action still running, continuing in background");
                DispatchOutcome::Pending
            }
        }
    }
}

/// Runs the playbooks of `plan` in order, stopping at the first failure.
///
/// `_lease` is held for the whole run.
async fn run_action(
    executor: Arc<dyn PlaybookExecutor>,
    plan: ActionPlan,
    timeout: Duration,
    _lease: LeaseGuard,
) -> bool {
    if plan.playbooks.is_empty() {
        info!(
            mac = ?plan.params.mac_address.map(|m| m.to_string()),
            "No VLAN assigned to MAC, nothing to configure"
        );
        return true;
    }

    for playbook in &plan.playbooks {
        let run = executor.run(playbook, &plan.params, timeout);
        let result = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(TrapError::PlaybookTimeout {
                playbook: playbook.clone(),
                timeout,
            }),
        };

        match result {
            Ok(report) => info!(
                playbook = %report.playbook,
                output = %report.output.trim_end(),
                "Playbook output"
            ),
            Err(e) => {
                warn!(playbook = %playbook, error = %e, "Action failed");
                return false;
            }
        }
    }

    info!(playbooks = plan.playbooks.len(), "Action completed");
    true
}
