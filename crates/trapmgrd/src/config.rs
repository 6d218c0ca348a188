//! Device configuration document.
//!
//! Loaded once per dispatch invocation from JSON:
//!
//! ```json
//! {
//!   "devices_by_address": { "2001:db8::1": "SW-ACCESS-1" },
//!   "ifindex_to_interface": { "10": "FastEthernet0/1" },
//!   "actions": [
//!     { "keyword": "linkUp", "event": "LINK UP", "action": "connect" },
//!     { "keyword": "linkDown", "event": "LINK DOWN", "action": "disconnect" }
//!   ],
//!   "vlan_by_mac": { "00:11:22:33:44:55": 20 }
//! }
//! ```
//!
//! `ifindex_to_interface` lists the physical ports; traps for any other
//! ifIndex are filtered. `actions` is ordered and the first keyword found in a
//! payload wins.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use sonic_trap_common::{MacAddress, TrapError, TrapResult, VlanId};

/// Default device configuration location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/trapmgrd/devices.json";

/// Name reported for devices missing from `devices_by_address`.
pub const UNKNOWN_DEVICE: &str = "UNKNOWN";

/// Configuration action attached to a trap keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrapAction {
    /// A host came up on the port: assign its VLAN.
    Connect,
    /// The port went down: clean its configuration.
    Disconnect,
}

impl TrapAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrapAction::Connect => "connect",
            TrapAction::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for TrapAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the keyword table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    /// Substring searched for in the trap payload.
    pub keyword: String,
    /// Event label logged for matching traps.
    pub event: String,
    /// Action to run, if any.
    #[serde(default)]
    pub action: Option<TrapAction>,
}

impl ActionRule {
    pub fn new(
        keyword: impl Into<String>,
        event: impl Into<String>,
        action: Option<TrapAction>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            event: event.into(),
            action,
        }
    }
}

/// Devices, physical ports, trap keywords and VLAN assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub devices_by_address: HashMap<String, String>,

    #[serde(default)]
    pub ifindex_to_interface: BTreeMap<u32, String>,

    #[serde(default)]
    pub actions: Vec<ActionRule>,

    #[serde(default)]
    pub vlan_by_mac: HashMap<MacAddress, VlanId>,
}

impl DeviceConfig {
    /// Loads the configuration; a missing or malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> TrapResult<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| TrapError::config_load(path, e.to_string()))?;
        Self::from_json(&content).map_err(|e| TrapError::config_load(path, e.to_string()))
    }

    /// Parses the configuration from JSON text.
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Returns the configured name of a device, or [`UNKNOWN_DEVICE`].
    pub fn device_name(&self, address: &str) -> &str {
        self.devices_by_address
            .get(address)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_DEVICE)
    }

    /// Returns the interface name of a physical port.
    pub fn interface_for(&self, ifindex: u32) -> Option<&str> {
        self.ifindex_to_interface.get(&ifindex).map(String::as_str)
    }

    /// Returns true if `ifindex` is a configured physical port.
    pub fn is_physical_port(&self, ifindex: u32) -> bool {
        self.ifindex_to_interface.contains_key(&ifindex)
    }

    /// Returns the set of configured physical ports.
    pub fn valid_ports(&self) -> HashSet<u32> {
        self.ifindex_to_interface.keys().copied().collect()
    }

    /// Returns the VLAN assigned to a MAC.
    pub fn vlan_for(&self, mac: &MacAddress) -> Option<VlanId> {
        self.vlan_by_mac.get(mac).copied()
    }
}
