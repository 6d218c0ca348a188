//! Device query executor seam.
//!
//! The resolver only needs "walk this table on that device". The production
//! implementation shells out to net-snmp's `snmpwalk`; tests substitute
//! scripted executors.

use async_trait::async_trait;
use std::time::Duration;

use sonic_trap_common::exec::{self, ExecOutcome};
use sonic_trap_common::{TrapError, TrapResult};

/// Default path of the `snmpwalk` binary.
pub const SNMPWALK_CMD: &str = "/usr/bin/snmpwalk";

/// Default per-query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

/// Walks a table on a network device and returns the raw text response.
#[async_trait]
pub trait DeviceQueryExecutor: Send + Sync {
    /// Walks `oid` on `device` using `community`.
    ///
    /// Returns the multi-line response, or `QueryTimeout` / `QueryFailed`.
    async fn walk(
        &self,
        device: &str,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> TrapResult<String>;
}

/// SNMPv2c walks through the `snmpwalk` program.
#[derive(Debug, Clone)]
pub struct SnmpWalkExecutor {
    program: String,
}

impl SnmpWalkExecutor {
    /// Creates an executor running the given `snmpwalk` binary.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Formats a device address as a net-snmp agent specifier.
    ///
    /// Bare IPv6 addresses need the `udp6:[addr]` transport form.
    pub fn agent_address(device: &str) -> String {
        if device.contains(':') && !device.starts_with("udp6:") && !device.starts_with('[') {
            format!("udp6:[{}]", device)
        } else {
            device.to_string()
        }
    }

    fn args(device: &str, community: &str, oid: &str) -> Vec<String> {
        vec![
            "-v2c".to_string(),
            "-c".to_string(),
            community.to_string(),
            "-On".to_string(),
            Self::agent_address(device),
            oid.to_string(),
        ]
    }
}

impl Default for SnmpWalkExecutor {
    fn default() -> Self {
        Self::new(SNMPWALK_CMD)
    }
}

#[async_trait]
impl DeviceQueryExecutor for SnmpWalkExecutor {
    async fn walk(
        &self,
        device: &str,
        community: &str,
        oid: &str,
        timeout: Duration,
    ) -> TrapResult<String> {
        let args = Self::args(device, community, oid);
        match exec::run(&self.program, &args, None, timeout).await? {
            ExecOutcome::Finished(result) if result.success() => Ok(result.stdout),
            ExecOutcome::Finished(result) => Err(TrapError::QueryFailed {
                device: device.to_string(),
                oid: oid.to_string(),
                exit_code: result.exit_code,
                output: result.combined_output(),
            }),
            ExecOutcome::TimedOut => Err(TrapError::QueryTimeout {
                device: device.to_string(),
                oid: oid.to_string(),
                timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_address() {
        assert_eq!(SnmpWalkExecutor::agent_address("10.0.0.1"), "10.0.0.1");
        assert_eq!(SnmpWalkExecutor::agent_address("2001:db8::1"), "udp6:[2001:db8::1]");
        assert_eq!(
            SnmpWalkExecutor::agent_address("udp6:[2001:db8::1]"),
            "udp6:[2001:db8::1]"
        );
    }

    #[test]
    fn test_args() {
        let args = SnmpWalkExecutor::args("10.0.0.1", "public", "1.3.6.1.2.1.17.4.3.1.2");
        assert_eq!(
            args,
            vec!["-v2c", "-c", "public", "-On", "10.0.0.1", "1.3.6.1.2.1.17.4.3.1.2"]
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_query_failure() {
        // `false` ignores its arguments and exits 1
        let executor = SnmpWalkExecutor::new("/bin/false");
        let result = executor
            .walk("10.0.0.1", "public", "1.3.6.1", Duration::from_secs(5))
            .await;
        assert!(matches!(
            result,
            Err(TrapError::QueryFailed { exit_code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let executor = SnmpWalkExecutor::new("/nonexistent/snmpwalk");
        let result = executor
            .walk("10.0.0.1", "public", "1.3.6.1", Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(TrapError::ProcessSpawn { .. })));
    }
}
