//! Playbook execution.
//!
//! Configuration changes on access switches are made by Ansible playbooks.
//! [`PlaybookExecutor`] is the seam the dispatcher talks to;
//! [`AnsiblePlaybookExecutor`] runs `ansible-playbook` with the action
//! parameters passed as `--extra-vars`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use sonic_trap_common::exec::{self, ExecOutcome};
use sonic_trap_common::{MacAddress, TrapError, TrapResult, VlanId};

/// Named parameters handed to a playbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookParams {
    pub device_address: String,
    pub interface_name: String,
    pub mac_address: Option<MacAddress>,
    pub vlan_id: Option<VlanId>,
}

impl PlaybookParams {
    pub fn new(device_address: impl Into<String>, interface_name: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            interface_name: interface_name.into(),
            mac_address: None,
            vlan_id: None,
        }
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac_address = Some(mac);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan_id = Some(vlan);
        self
    }

    /// Renders the `key=value` pairs passed to `--extra-vars`.
    pub fn extra_vars(&self) -> String {
        let mut vars = Vec::with_capacity(4);
        if let Some(mac) = &self.mac_address {
            vars.push(format!("mac_address={}", mac));
        }
        vars.push(format!("interface_name={}", self.interface_name));
        if let Some(vlan) = &self.vlan_id {
            vars.push(format!("vlan_id={}", vlan));
        }
        vars.push(format!("device_address={}", self.device_address));
        vars.join(" ")
    }
}

/// Successful playbook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookReport {
    pub playbook: String,
    pub output: String,
}

/// Runs named configuration procedures.
///
/// Failures are returned as [`TrapError::PlaybookTimeout`] or
/// [`TrapError::PlaybookFailed`].
#[async_trait]
pub trait PlaybookExecutor: Send + Sync {
    async fn run(
        &self,
        playbook: &str,
        params: &PlaybookParams,
        timeout: Duration,
    ) -> TrapResult<PlaybookReport>;
}

/// [`PlaybookExecutor`] backed by the `ansible-playbook` binary.
#[derive(Debug, Clone)]
pub struct AnsiblePlaybookExecutor {
    program: String,
    base_dir: PathBuf,
}

impl AnsiblePlaybookExecutor {
    /// Playbook paths are resolved relative to `base_dir`.
    pub fn new(program: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            base_dir: base_dir.into(),
        }
    }

    fn args(playbook: &str, params: &PlaybookParams) -> Vec<String> {
        vec![
            playbook.to_string(),
            "--extra-vars".to_string(),
            params.extra_vars(),
        ]
    }
}

#[async_trait]
impl PlaybookExecutor for AnsiblePlaybookExecutor {
    async fn run(
        &self,
        playbook: &str,
        params: &PlaybookParams,
        timeout: Duration,
    ) -> TrapResult<PlaybookReport> {
        info!(
            playbook,
            device = %params.device_address,
            port = %params.interface_name,
            "Running playbook"
        );

        let args = Self::args(playbook, params);
        match exec::run(&self.program, &args, Some(&self.base_dir), timeout).await? {
            ExecOutcome::Finished(result) if result.success() => {
                info!(playbook, "Playbook completed");
                Ok(PlaybookReport {
                    playbook: playbook.to_string(),
                    output: result.stdout,
                })
            }
            ExecOutcome::Finished(result) => {
                warn!(playbook, exit_code = result.exit_code, "Playbook failed");
                Err(TrapError::PlaybookFailed {
                    playbook: playbook.to_string(),
                    exit_code: result.exit_code,
                    output: result.combined_output(),
                })
            }
            ExecOutcome::TimedOut => {
                warn!(playbook, timeout = ?timeout, "Playbook timed out");
                Err(TrapError::PlaybookTimeout {
                    playbook: playbook.to_string(),
                    timeout,
                })
            }
        }
    }
}
