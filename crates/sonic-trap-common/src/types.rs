//! MAC address and VLAN identifier types with safe parsing and formatting.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}

/// A 48-bit Ethernet MAC address.
///
/// # Examples
///
/// ```
/// use sonic_trap_common::MacAddress;
///
/// let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:11:22:33:44:55");
///
/// // Also supports hyphen-separated and upper-case formats
/// let mac2: MacAddress = "00-11-22-33-44-55".parse().unwrap();
/// let mac3: MacAddress = "00:11:22:33:44:55".to_uppercase().parse().unwrap();
/// assert_eq!(mac, mac2);
/// assert_eq!(mac, mac3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Creates a new MAC address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Returns the raw bytes of the MAC address.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Builds a MAC address from the last six decimal components of an OID.
    ///
    /// Forwarding tables index their rows by the MAC itself, so
    /// `.1.3.6.1.2.1.17.4.3.1.2.0.17.34.51.68.85` names `00:11:22:33:44:55`.
    pub fn from_oid_suffix(oid: &str) -> Result<Self, ParseError> {
        let components: Vec<&str> = oid.trim().trim_start_matches('.').split('.').collect();
        if components.len() < 6 {
            return Err(ParseError::InvalidMacAddress(oid.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in components[components.len() - 6..].iter().enumerate() {
            bytes[i] = part
                .parse()
                .map_err(|_| ParseError::InvalidMacAddress(oid.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || part.len() > 2 {
                return Err(ParseError::InvalidMacAddress(s.to_string()));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

/// IEEE 802.1Q VLAN identifier (1-4094).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID.
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX: u16 = 4094;

    /// Creates a new VLAN ID, rejecting the reserved values 0 and 4095.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the VLAN ID as a u16.
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_colon_format() {
        let mac: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_parse_uppercase_hyphen_format() {
        let mac: MacAddress = "AA-BB-CC-DD-EE-0F".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:0f");
    }

    #[test]
    fn test_from_oid_suffix() {
        let mac = MacAddress::from_oid_suffix(".1.3.6.1.2.1.17.4.3.1.2.0.0.0.0.0.1").unwrap();
        assert_eq!(mac.to_string(), "00:00:00:00:00:01");

        let mac = MacAddress::from_oid_suffix("1.3.6.1.2.1.17.4.3.1.2.0.17.34.51.68.255").unwrap();
        assert_eq!(mac.to_string(), "00:11:22:33:44:ff");
    }

    #[test]
    fn test_from_oid_suffix_invalid() {
        assert!(MacAddress::from_oid_suffix("1.2.3").is_err());
        assert!(MacAddress::from_oid_suffix(".1.3.6.1.0.0.0.0.0.256").is_err());
        assert!(MacAddress::from_oid_suffix(".1.3.6.1.0.0.x.0.0.1").is_err());
    }

    #[test]
    fn test_invalid_format() {
        assert!("invalid".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44".parse::<MacAddress>().is_err());
        assert!("00:11:22:33:44:55:66".parse::<MacAddress>().is_err());
        assert!("gg:11:22:33:44:55".parse::<MacAddress>().is_err());
        assert!("000:11:22:33:44:55".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_serde_roundtrip_string() {
        let mac: MacAddress = serde_json::from_str("\"00:11:22:33:44:55\"").unwrap();
        assert_eq!(serde_json::to_string(&mac).unwrap(), "\"00:11:22:33:44:55\"");
    }

    #[test]
    fn test_vlan_id_range() {
        assert_eq!(VlanId::new(100).unwrap().as_u16(), 100);
        assert_eq!(VlanId::new(0), Err(ParseError::InvalidVlanId(0)));
        assert_eq!(VlanId::new(4095), Err(ParseError::InvalidVlanId(4095)));
    }
}
