//! SNMP trap manager
//!
//! Turns port-state traps from access switches into configuration actions:
//! a host coming up on a port gets its VLAN assigned, a port going down is
//! cleaned. The host MAC behind the port is resolved through
//! `sonic-macresolver`, and configuration runs through Ansible playbooks.

pub mod config;
pub mod dispatcher;
pub mod ingest;
pub mod lease;
pub mod logging;
pub mod parser;
pub mod playbook;
pub mod pool;
pub mod settings;

pub use config::{ActionRule, DeviceConfig, TrapAction, DEFAULT_CONFIG_PATH, UNKNOWN_DEVICE};
pub use dispatcher::{DispatchOutcome, DispatchReport, EventDispatcher, TrapEvent, ACTION_POOL};
pub use ingest::{read_payload, replay, ReplayResult, SavedTrap, INGEST_POOL};
pub use lease::{LeaseDecision, LeaseGuard, PortLeaseManager, DEFAULT_LEASE_TIMEOUT_SECS};
pub use logging::{init_logging, log_file_path, LOG_FILE_NAME};
pub use parser::{sanitize_port_name, ParsedTrap, TrapParser, UNKNOWN, UNKNOWN_EVENT};
pub use playbook::{AnsiblePlaybookExecutor, PlaybookExecutor, PlaybookParams, PlaybookReport};
pub use pool::WorkerPool;
pub use settings::{TrapmgrdSettings, DEFAULT_SETTINGS_PATH};
