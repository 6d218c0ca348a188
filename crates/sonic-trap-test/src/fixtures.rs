//! Lab topology, payloads and a ready-wired dispatcher
//!
//! The lab is one access switch `2001:db8::1` (SW-ACCESS-1) with three
//! physical ports. A known host sits on FastEthernet0/1 and has VLAN 20; a
//! guest host on FastEthernet0/2 has no VLAN.

use std::sync::Arc;
use std::time::Duration;

use sonic_macresolver::{AddressResolver, MacCache};
use sonic_trap_common::MacAddress;
use sonic_trapmgrd::{DeviceConfig, EventDispatcher, PortLeaseManager, TrapmgrdSettings};

use crate::fakes::{FakePlaybookExecutor, FakeQueryExecutor};

pub const LAB_DEVICE: &str = "2001:db8::1";
pub const LAB_DEVICE_NAME: &str = "SW-ACCESS-1";
pub const LAB_DEVICE_V4: &str = "192.0.2.10";

pub const KNOWN_PORT: u32 = 10;
pub const KNOWN_PORT_NAME: &str = "FastEthernet0/1";
pub const KNOWN_HOST_MAC: &str = "00:11:22:33:44:55";
pub const KNOWN_HOST_VLAN: u16 = 20;

pub const GUEST_PORT: u32 = 11;
pub const GUEST_PORT_NAME: &str = "FastEthernet0/2";
pub const GUEST_HOST_MAC: &str = "00:11:22:33:44:66";

pub const UPLINK_PORT: u32 = 12;
pub const UPLINK_PORT_NAME: &str = "GigabitEthernet0/1";

/// An ifIndex the switch reports but that is not a physical port.
pub const VLAN_IFINDEX: u32 = 5020;

/// Device configuration of the lab.
pub const DEVICE_CONFIG_JSON: &str = r#"{
    "devices_by_address": {
        "2001:db8::1": "SW-ACCESS-1",
        "192.0.2.10": "SW-ACCESS-2"
    },
    "ifindex_to_interface": {
        "10": "FastEthernet0/1",
        "11": "FastEthernet0/2",
        "12": "GigabitEthernet0/1"
    },
    "actions": [
        { "keyword": "linkUp", "event": "LINK UP", "action": "connect" },
        { "keyword": "linkDown", "event": "LINK DOWN", "action": "disconnect" },
        { "keyword": "coldStart", "event": "COLD START" }
    ],
    "vlan_by_mac": {
        "00:11:22:33:44:55": 20
    }
}"#;

pub fn device_config() -> DeviceConfig {
    DeviceConfig::from_json(DEVICE_CONFIG_JSON).expect("lab device configuration is valid")
}

pub fn mac(s: &str) -> MacAddress {
    s.parse().expect("valid MAC address")
}

/// Settings tuned for fast tests: one resolution attempt, no backoff.
pub fn lab_settings() -> TrapmgrdSettings {
    let mut settings = TrapmgrdSettings::default();
    settings.snmp.max_retries = 1;
    settings.snmp.initial_wait_secs = 0;
    settings
}

/// The lab switch with both hosts learned.
pub fn lab_switch() -> FakeQueryExecutor {
    FakeQueryExecutor::new()
        .with_host(LAB_DEVICE, KNOWN_PORT, mac(KNOWN_HOST_MAC))
        .with_host(LAB_DEVICE, GUEST_PORT, mac(GUEST_HOST_MAC))
        .with_host(LAB_DEVICE_V4, KNOWN_PORT, mac(KNOWN_HOST_MAC))
}

/// Builds a trap payload as snmptrapd formats it.
pub fn trap_payload(source: &str, trap: &str, ifindex: u32) -> String {
    let transport = if source.contains(':') {
        format!("UDP/IPv6: [{}]:161->[2001:db8::100]:162", source)
    } else {
        format!("UDP: [{}]:161->[192.0.2.1]:162", source)
    };
    format!(
        "switch.lab\n\
         {}\n\
         DISMAN-EVENT-MIB::sysUpTimeInstance 12:3:04:05.06\n\
         SNMPv2-MIB::snmpTrapOID.0 IF-MIB::{}\n\
         IF-MIB::ifIndex.{} {}\n\
         IF-MIB::ifAdminStatus.{} up\n",
        transport, trap, ifindex, ifindex, ifindex
    )
}

pub fn link_up(ifindex: u32) -> String {
    trap_payload(LAB_DEVICE, "linkUp", ifindex)
}

pub fn link_down(ifindex: u32) -> String {
    trap_payload(LAB_DEVICE, "linkDown", ifindex)
}

/// Fakes, shared state and settings for one test.
pub struct TestLab {
    pub queries: Arc<FakeQueryExecutor>,
    pub playbooks: Arc<FakePlaybookExecutor>,
    pub cache: Arc<MacCache>,
    pub leases: Arc<PortLeaseManager>,
    pub settings: TrapmgrdSettings,
    pub config: DeviceConfig,
}

impl TestLab {
    pub fn new() -> Self {
        Self::with_fakes(lab_switch(), FakePlaybookExecutor::new())
    }

    pub fn with_fakes(queries: FakeQueryExecutor, playbooks: FakePlaybookExecutor) -> Self {
        let settings = lab_settings();
        Self {
            queries: Arc::new(queries),
            playbooks: Arc::new(playbooks),
            cache: Arc::new(MacCache::new(settings.cache_ttl())),
            leases: Arc::new(PortLeaseManager::new(settings.lease_timeout())),
            settings,
            config: device_config(),
        }
    }

    /// Adjusts the settings before the dispatcher is built.
    pub fn tune(mut self, f: impl FnOnce(&mut TrapmgrdSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn resolver(&self) -> AddressResolver {
        AddressResolver::new(
            self.queries.clone(),
            Arc::clone(&self.cache),
            self.settings.resolver_config(),
        )
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(
            Arc::new(self.config.clone()),
            Arc::new(self.settings.clone()),
            Arc::new(self.resolver()),
            Arc::clone(&self.leases),
            self.playbooks.clone(),
        )
    }

    pub fn playbook_timeout(&self) -> Duration {
        self.settings.playbook_timeout()
    }
}

impl Default for TestLab {
    fn default() -> Self {
        Self::new()
    }
}
