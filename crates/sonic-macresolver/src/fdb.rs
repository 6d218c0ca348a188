//! Parsing of bridge forwarding-table walks.
//!
//! Two BRIDGE-MIB tables are needed to answer "which MAC sits behind ifIndex N":
//!
//! | Table | OID | Row index | Value |
//! |-------|-----|-----------|-------|
//! | dot1dTpFdbPort | `1.3.6.1.2.1.17.4.3.1.2` | MAC (6 decimal octets) | bridge port |
//! | dot1dBasePortIfIndex | `1.3.6.1.2.1.17.1.4.1.2` | bridge port | ifIndex |
//!
//! Walk output is read one `OID = TYPE: value` record per line, as printed by
//! `snmpwalk -On`. Records that do not parse are skipped and logged at debug.

use std::collections::HashMap;
use tracing::debug;

use sonic_trap_common::{MacAddress, TrapError, TrapResult};

/// dot1dTpFdbPort: MAC -> bridge port number.
pub const OID_FDB_PORT: &str = "1.3.6.1.2.1.17.4.3.1.2";

/// dot1dBasePortIfIndex: bridge port number -> ifIndex.
pub const OID_BASE_PORT_IFINDEX: &str = "1.3.6.1.2.1.17.1.4.1.2";

/// One learned forwarding-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdbEntry {
    pub mac: MacAddress,
    pub bridge_port: u32,
}

/// Splits `OID = TYPE: value` into its OID and value halves.
fn split_record(line: &str) -> Option<(&str, &str)> {
    let (oid, value) = line.split_once(" = ")?;
    Some((oid.trim(), value.trim()))
}

/// Extracts the integer from a typed value such as `INTEGER: 5` or `Gauge32: 10`.
fn typed_integer(record: &str, value: &str) -> TrapResult<u32> {
    let (_, number) = value
        .rsplit_once(':')
        .ok_or_else(|| TrapError::record_parse(record, "untyped value"))?;
    number
        .trim()
        .parse()
        .map_err(|_| TrapError::record_parse(record, format!("not an integer: '{}'", number.trim())))
}

fn parse_fdb_record(line: &str) -> TrapResult<Option<FdbEntry>> {
    let Some((oid, value)) = split_record(line) else {
        return Ok(None);
    };
    let mac = MacAddress::from_oid_suffix(oid)
        .map_err(|e| TrapError::record_parse(line, e.to_string()))?;
    let bridge_port = typed_integer(line, value)?;
    Ok(Some(FdbEntry { mac, bridge_port }))
}

fn parse_base_port_record(line: &str) -> TrapResult<Option<(u32, u32)>> {
    let Some((oid, value)) = split_record(line) else {
        return Ok(None);
    };
    let port = oid
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|_| TrapError::record_parse(line, "bridge port index is not numeric"))?;
    let ifindex = typed_integer(line, value)?;
    Ok(Some((port, ifindex)))
}

/// Parses a dot1dTpFdbPort walk, keeping rows in walk order.
pub fn parse_fdb_ports(output: &str) -> Vec<FdbEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        match parse_fdb_record(line) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Skipping FDB record"),
        }
    }
    entries
}

/// Parses a dot1dBasePortIfIndex walk into bridge port -> ifIndex.
pub fn parse_base_port_ifindex(output: &str) -> HashMap<u32, u32> {
    let mut ports = HashMap::new();
    for line in output.lines() {
        match parse_base_port_record(line) {
            Ok(Some((port, ifindex))) => {
                ports.insert(port, ifindex);
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Skipping base port record"),
        }
    }
    ports
}

/// Returns the first MAC learned on the bridge port that maps to `ifindex`.
pub fn find_mac_for_ifindex(
    fdb: &[FdbEntry],
    base_ports: &HashMap<u32, u32>,
    ifindex: u32,
) -> Option<MacAddress> {
    fdb.iter()
        .find(|entry| base_ports.get(&entry.bridge_port) == Some(&ifindex))
        .map(|entry| entry.mac)
}
