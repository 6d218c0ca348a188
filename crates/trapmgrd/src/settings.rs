//! Daemon settings for trapmgrd
//!
//! Loads and validates runtime settings from a TOML file.
//! Default location: /etc/sonic/trapmgrd.toml. Every field has a default, so
//! a missing file or a partial file is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sonic_macresolver::{
    ResolverConfig, DEFAULT_BACKOFF_STEP_SECS, DEFAULT_BATCH_WORKERS, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_INITIAL_WAIT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_QUERY_TIMEOUT_SECS, SNMPWALK_CMD,
};
use sonic_trap_common::{TrapError, TrapResult};

/// Default settings file location.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/sonic/trapmgrd.toml";

/// Device query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpSettings {
    /// SNMPv2c community used for forwarding-table walks
    #[serde(default = "default_community")]
    pub community: String,

    /// Path of the snmpwalk binary
    #[serde(default = "default_walk_cmd")]
    pub walk_cmd: String,

    /// Per-walk timeout in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Resolution attempts per trap
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the second attempt in seconds
    #[serde(default = "default_initial_wait")]
    pub initial_wait_secs: u64,

    /// Additional wait per further attempt in seconds
    #[serde(default = "default_backoff_step")]
    pub backoff_step_secs: u64,

    /// Concurrent resolutions in a batch
    #[serde(default = "default_batch_workers")]
    pub batch_workers: usize,
}

/// MAC cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Snapshot shared between invocations
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Sweep period for long-running modes in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Age in seconds after which a port lease counts as abandoned
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_secs: u64,

    /// How long a dispatch waits for its action before returning, in seconds
    #[serde(default = "default_dispatch_wait")]
    pub dispatch_wait_secs: u64,

    /// Concurrent trap-processing tasks
    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,

    /// Concurrent configuration actions
    #[serde(default = "default_action_workers")]
    pub action_workers: usize,
}

/// Playbook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookSettings {
    /// Path of the ansible-playbook binary
    #[serde(default = "default_ansible_cmd")]
    pub ansible_cmd: String,

    /// Working directory; playbook paths are relative to it
    #[serde(default = "default_playbook_dir")]
    pub base_dir: PathBuf,

    /// Hard timeout per playbook run in seconds
    #[serde(default = "default_playbook_timeout")]
    pub timeout_secs: u64,

    /// Creates or updates the VLAN for a MAC
    #[serde(default = "default_vlan_create")]
    pub vlan_create: String,

    /// Assigns the VLAN to the port
    #[serde(default = "default_vlan_assign")]
    pub vlan_assign: String,

    /// Restores a port after disconnection
    #[serde(default = "default_port_cleanup")]
    pub port_cleanup: String,
}

/// Trap parsing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapSettings {
    /// Interface name prefixes recognized in ifDescr records
    #[serde(default = "default_interface_prefixes")]
    pub interface_prefixes: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory holding trapmgrd.log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/// Complete trapmgrd settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrapmgrdSettings {
    #[serde(default)]
    pub snmp: SnmpSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub playbooks: PlaybookSettings,

    #[serde(default)]
    pub trap: TrapSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

// Default functions
fn default_community() -> String {
    "public".to_string()
}

fn default_walk_cmd() -> String {
    SNMPWALK_CMD.to_string()
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_wait() -> u64 {
    DEFAULT_INITIAL_WAIT_SECS
}

fn default_backoff_step() -> u64 {
    DEFAULT_BACKOFF_STEP_SECS
}

fn default_batch_workers() -> usize {
    DEFAULT_BATCH_WORKERS
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/var/lib/sonic/trapmgrd/mac_cache.json")
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_lease_timeout() -> u64 {
    300
}

fn default_dispatch_wait() -> u64 {
    30
}

fn default_ingest_workers() -> usize {
    3
}

fn default_action_workers() -> usize {
    3
}

fn default_ansible_cmd() -> String {
    "/usr/bin/ansible-playbook".to_string()
}

fn default_playbook_dir() -> PathBuf {
    PathBuf::from("/etc/sonic/trapmgrd")
}

fn default_playbook_timeout() -> u64 {
    120
}

fn default_vlan_create() -> String {
    "playbooks/vlan_config.yml".to_string()
}

fn default_vlan_assign() -> String {
    "playbooks/assign_vlan_by_mac.yml".to_string()
}

fn default_port_cleanup() -> String {
    "playbooks/clean_port.yml".to_string()
}

fn default_interface_prefixes() -> Vec<String> {
    vec!["FastEthernet".to_string(), "GigabitEthernet".to_string()]
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/sonic/trapmgrd")
}

// Default implementations
impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            community: default_community(),
            walk_cmd: default_walk_cmd(),
            query_timeout_secs: default_query_timeout(),
            max_retries: default_max_retries(),
            initial_wait_secs: default_initial_wait(),
            backoff_step_secs: default_backoff_step(),
            batch_workers: default_batch_workers(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            state_file: default_state_file(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            lease_timeout_secs: default_lease_timeout(),
            dispatch_wait_secs: default_dispatch_wait(),
            ingest_workers: default_ingest_workers(),
            action_workers: default_action_workers(),
        }
    }
}

impl Default for PlaybookSettings {
    fn default() -> Self {
        Self {
            ansible_cmd: default_ansible_cmd(),
            base_dir: default_playbook_dir(),
            timeout_secs: default_playbook_timeout(),
            vlan_create: default_vlan_create(),
            vlan_assign: default_vlan_assign(),
            port_cleanup: default_port_cleanup(),
        }
    }
}

impl Default for TrapSettings {
    fn default() -> Self {
        Self {
            interface_prefixes: default_interface_prefixes(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

impl TrapmgrdSettings {
    /// Load settings from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> TrapResult<Self> {
        let path = path.as_ref();

        let settings: Self = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| TrapError::config_load(path, e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(TrapError::config_load(path, e.to_string())),
        };

        settings.validate().map_err(|msg| TrapError::config_load(path, msg))?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), String> {
        if self.snmp.max_retries == 0 {
            return Err("snmp.max_retries must be > 0".to_string());
        }
        if self.snmp.query_timeout_secs == 0 {
            return Err("snmp.query_timeout_secs must be > 0".to_string());
        }
        if self.snmp.batch_workers == 0 {
            return Err("snmp.batch_workers must be > 0".to_string());
        }
        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".to_string());
        }
        if self.dispatch.ingest_workers == 0 || self.dispatch.action_workers == 0 {
            return Err("dispatch worker counts must be > 0".to_string());
        }
        if self.playbooks.timeout_secs == 0 {
            return Err("playbooks.timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Resolver tuning derived from the SNMP section
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            query_timeout: Duration::from_secs(self.snmp.query_timeout_secs),
            backoff_step: Duration::from_secs(self.snmp.backoff_step_secs),
        }
    }

    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Get initial retry wait as Duration
    pub fn initial_wait(&self) -> Duration {
        Duration::from_secs(self.snmp.initial_wait_secs)
    }

    /// Get lease abandonment timeout as Duration
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.lease_timeout_secs)
    }

    /// Get dispatch wait as Duration
    pub fn dispatch_wait(&self) -> Duration {
        Duration::from_secs(self.dispatch.dispatch_wait_secs)
    }

    /// Get playbook timeout as Duration
    pub fn playbook_timeout(&self) -> Duration {
        Duration::from_secs(self.playbooks.timeout_secs)
    }
}
