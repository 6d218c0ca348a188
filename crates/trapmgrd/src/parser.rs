//! Trap payload parsing.
//!
//! A payload as handed over by snmptrapd looks like:
//!
//! ```text
//! switch1.lab
//! UDP/IPv6: [2001:db8::1]:161->[2001:db8::100]:162
//! DISMAN-EVENT-MIB::sysUpTimeInstance 1:2:03:04.05
//! SNMPv2-MIB::snmpTrapOID.0 IF-MIB::linkUp
//! IF-MIB::ifIndex.10 10
//! IF-MIB::ifDescr.10 = STRING: FastEthernet0/1
//! ```
//!
//! Port fields come from an ordered table of line rules. For each line the
//! first rule that claims it is applied. An interface description naming a
//! known interface type sets the port name outright and from then on index
//! records can no longer change it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{DeviceConfig, TrapAction};

/// Sentinel used in logs for fields that could not be determined.
pub const UNKNOWN: &str = "unknown";

/// Event label for payloads matching no configured keyword.
pub const UNKNOWN_EVENT: &str = "UNKNOWN TRAP";

static SOURCE_IPV6_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"UDP/IPv6:\s+\[([0-9a-fA-F:]+)\]").expect("Invalid regex pattern"));

static SOURCE_IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"UDP:\s+\[(\d{1,3}(?:\.\d{1,3}){3})\]").expect("Invalid regex pattern")
});

/// Fields extracted from one trap payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrap {
    /// Address of the device that sent the trap.
    pub source: Option<String>,
    /// Sanitized interface name.
    pub port_name: Option<String>,
    /// Interface index the trap refers to.
    pub ifindex: Option<u32>,
    /// Event label from the keyword table.
    pub event: String,
    /// Configured action for the event.
    pub action: Option<TrapAction>,
}

impl ParsedTrap {
    pub fn source_or_unknown(&self) -> &str {
        self.source.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn port_or_unknown(&self) -> &str {
        self.port_name.as_deref().unwrap_or(UNKNOWN)
    }
}

#[derive(Debug, Default)]
struct PortFields {
    port_name: Option<String>,
    from_description: bool,
    ifindex: Option<u32>,
}

/// A line predicate with its field extraction; returns true if it claimed the line.
struct LineRule {
    name: &'static str,
    apply: fn(&TrapParser<'_>, &str, &mut PortFields) -> bool,
}

/// Rules in priority order.
const LINE_RULES: &[LineRule] = &[
    LineRule {
        name: "interface-description",
        apply: description_rule,
    },
    LineRule {
        name: "interface-index",
        apply: index_rule,
    },
];

/// `IF-MIB::ifDescr.10 = STRING: FastEthernet0/1`
fn description_rule(parser: &TrapParser<'_>, line: &str, fields: &mut PortFields) -> bool {
    if !line.contains("ifDescr") || !parser.names_interface(line) {
        return false;
    }

    if let Some((_, value)) = line.trim().split_once(" = ") {
        if parser.names_interface(value) {
            let name = value.replace("STRING: ", "");
            fields.port_name = Some(name.trim().trim_matches('"').to_string());
            fields.from_description = true;
        }
    }
    true
}

/// `IF-MIB::ifIndex.10 10` or `IF-MIB::ifIndex.10 = INTEGER: 10`
fn index_rule(parser: &TrapParser<'_>, line: &str, fields: &mut PortFields) -> bool {
    if !line.contains("ifIndex") {
        return false;
    }

    let Some(ifindex) = line
        .split_whitespace()
        .find(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
        .and_then(|token| token.parse::<u32>().ok())
    else {
        return true;
    };

    if fields.from_description {
        // The name is settled; only record the index if none was seen.
        fields.ifindex.get_or_insert(ifindex);
    } else if fields.port_name.is_none() {
        fields.ifindex = Some(ifindex);
        fields.port_name = parser.config.interface_for(ifindex).map(str::to_string);
    }
    true
}

/// Keeps only `[A-Za-z0-9/]`.
pub fn sanitize_port_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '/')
        .collect()
}

/// Parses trap payloads against a device configuration.
pub struct TrapParser<'a> {
    config: &'a DeviceConfig,
    interface_prefixes: &'a [String],
}

impl<'a> TrapParser<'a> {
    pub fn new(config: &'a DeviceConfig, interface_prefixes: &'a [String]) -> Self {
        Self {
            config,
            interface_prefixes,
        }
    }

    fn names_interface(&self, text: &str) -> bool {
        self.interface_prefixes
            .iter()
            .any(|prefix| text.contains(prefix.as_str()))
    }

    /// Extracts the sending device address.
    pub fn source_address(payload: &str) -> Option<String> {
        SOURCE_IPV6_RE
            .captures(payload)
            .or_else(|| SOURCE_IPV4_RE.captures(payload))
            .map(|caps| caps[1].to_string())
    }

    /// Returns the event label and action of the first matching keyword.
    pub fn classify(&self, payload: &str) -> (String, Option<TrapAction>) {
        self.config
            .actions
            .iter()
            .find(|rule| payload.contains(rule.keyword.as_str()))
            .map(|rule| (rule.event.clone(), rule.action))
            .unwrap_or_else(|| (UNKNOWN_EVENT.to_string(), None))
    }

    fn port_fields(&self, payload: &str) -> PortFields {
        let mut fields = PortFields::default();
        for line in payload.lines() {
            for rule in LINE_RULES {
                if (rule.apply)(self, line, &mut fields) {
                    tracing::trace!(rule = rule.name, line, "Trap line matched");
                    break;
                }
            }
        }
        fields
    }

    /// Parses a full payload.
    pub fn parse(&self, payload: &str) -> ParsedTrap {
        let (event, action) = self.classify(payload);
        let fields = self.port_fields(payload);
        let port_name = fields
            .port_name
            .map(|name| sanitize_port_name(&name))
            .filter(|name| !name.is_empty());

        ParsedTrap {
            source: Self::source_address(payload),
            port_name,
            ifindex: fields.ifindex,
            event,
            action,
        }
    }
}
