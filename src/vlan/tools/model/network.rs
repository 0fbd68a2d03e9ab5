//! Network value objects shared by the validator and the reconciler.
//!
//! Every type here validates on construction, so a value that exists is a
//! value that can be written to a lease file or an authentication store.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Network validation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid VLAN id: {0} (must be 1-4094)")]
    InvalidVlanId(i64),

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("{0} has host bits set")]
    HostBitsSet(String),

    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid hostname: {0}")]
    InvalidHostname(String),
}

/// IEEE 802.1Q VLAN tag. 0 and 4095 are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    pub fn new(id: i64) -> Result<Self, NetworkError> {
        if id < i64::from(Self::MIN) || id > i64::from(Self::MAX) {
            return Err(NetworkError::InvalidVlanId(id));
        }
        Ok(Self(id as u16))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = NetworkError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(i64::from(value))
    }
}

/// 48-bit hardware address.
///
/// Accepted input forms, case-insensitive:
/// - six groups of one or two hex digits separated by `:` or `-`
/// - three groups of four hex digits separated by `.`
/// - twelve bare hex digits
///
/// `Display` renders the canonical colon-separated lowercase form used in
/// lease files; [`MacAddress::bare`] renders the separator-less form used as
/// the RADIUS username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(mac: impl AsRef<str>) -> Result<Self, NetworkError> {
        let mac = mac.as_ref();
        let invalid = || NetworkError::InvalidMacAddress(mac.to_string());

        let groups: Vec<&str> = if mac.contains([':', '-']) {
            mac.split([':', '-']).collect()
        } else if mac.contains('.') {
            mac.split('.').collect()
        } else {
            vec![mac]
        };

        let digits = match groups.len() {
            6 if groups.iter().all(|g| (1..=2).contains(&g.len())) => groups
                .iter()
                .map(|g| format!("{g:0>2}"))
                .collect::<String>(),
            3 if groups.iter().all(|g| g.len() == 4) => groups.concat(),
            1 if mac.len() == 12 => mac.to_string(),
            _ => return Err(invalid()),
        };

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| invalid())?;
            octets[i] = u8::from_str_radix(hex, 16).map_err(|_| invalid())?;
        }

        Ok(Self(octets))
    }

    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Lowercase hex without separators, e.g. `aabbccddeeff`.
    pub fn bare(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// IPv4 network in CIDR notation. The address part must be the network
/// address itself; `10.61.0.5/24` is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Network {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Network {
    pub const MAX_PREFIX: u8 = 32;

    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, NetworkError> {
        if prefix > Self::MAX_PREFIX {
            return Err(NetworkError::InvalidPrefixLength(prefix));
        }
        let mask = prefix_mask(prefix);
        if u32::from(network) & !mask != 0 {
            return Err(NetworkError::HostBitsSet(format!("{network}/{prefix}")));
        }
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = prefix_mask(self.prefix);
        u32::from(addr) & mask == u32::from(self.network)
    }
}

fn prefix_mask(prefix: u8) -> u32 {
    let right = u32::from(Ipv4Network::MAX_PREFIX - prefix);
    ((u64::from(u32::MAX) >> right) << right) as u32
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || NetworkError::InvalidCidr(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s, Self::MAX_PREFIX),
        };
        let addr = Ipv4Addr::from_str(addr).map_err(|_| invalid())?;
        Self::new(addr, prefix)
    }
}

/// RFC 1123 host name: dot-separated labels of ASCII letters, digits and
/// inner hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hostname(String);

impl Hostname {
    pub const MAX_LENGTH: usize = 253;
    pub const MAX_LABEL_LENGTH: usize = 63;

    pub fn new(hostname: impl Into<String>) -> Result<Self, NetworkError> {
        let hostname = hostname.into();
        if hostname.is_empty()
            || hostname.len() > Self::MAX_LENGTH
            || !hostname.split('.').all(Self::is_valid_label)
        {
            return Err(NetworkError::InvalidHostname(hostname));
        }
        Ok(Self(hostname))
    }

    fn is_valid_label(label: &str) -> bool {
        !label.is_empty()
            && label.len() <= Self::MAX_LABEL_LENGTH
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlan_id_range() {
        assert!(VlanId::new(1).is_ok());
        assert!(VlanId::new(4094).is_ok());
        assert!(VlanId::new(0).is_err());
        assert!(VlanId::new(4095).is_err());
        assert!(VlanId::new(-3).is_err());
    }

    #[test]
    fn test_mac_address_formats() {
        let expected = MacAddress::from_octets([0xaa, 0xbb, 0xcc, 0x0d, 0xee, 0xff]);
        for input in [
            "aa:bb:cc:0d:ee:ff",
            "AA-BB-CC-0D-EE-FF",
            "aa:bb:cc:d:ee:ff",
            "aabb.cc0d.eeff",
            "AABBCC0DEEFF",
        ] {
            assert_eq!(MacAddress::new(input).unwrap(), expected, "{input}");
        }
        assert_eq!(expected.to_string(), "aa:bb:cc:0d:ee:ff");
        assert_eq!(expected.bare(), "aabbcc0deeff");
    }

    #[test]
    fn test_mac_address_rejects_garbage() {
        for input in [
            "not-a-mac",
            "",
            "aa:bb:cc:dd:ee",
            "aa:bb:cc:dd:ee:ff:00",
            "gg:bb:cc:dd:ee:ff",
            "aabbccddeef",
            "+a:bb:cc:dd:ee:ff",
        ] {
            assert!(MacAddress::new(input).is_err(), "{input}");
        }
    }

    #[test]
    fn test_network_contains() {
        let net: Ipv4Network = "10.61.0.0/24".parse().unwrap();
        assert!(net.contains("10.61.0.5".parse().unwrap()));
        assert!(net.contains("10.61.0.255".parse().unwrap()));
        assert!(!net.contains("10.99.0.5".parse().unwrap()));
        assert_eq!(net.to_string(), "10.61.0.0/24");

        let any: Ipv4Network = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn test_network_rejects_bad_cidr() {
        assert!("10.61.0.5/24".parse::<Ipv4Network>().is_err());
        assert!("10.61.0.0/33".parse::<Ipv4Network>().is_err());
        assert!("10.61.0/24".parse::<Ipv4Network>().is_err());
        assert_eq!("10.61.0.7".parse::<Ipv4Network>().unwrap().prefix(), 32);
    }

    #[test]
    fn test_hostname_labels() {
        assert!(Hostname::new("web01").is_ok());
        assert!(Hostname::new("lab-pc.example.org").is_ok());
        assert!(Hostname::new("a").is_ok());
        assert!(Hostname::new("-lead").is_err());
        assert!(Hostname::new("trail-").is_err());
        assert!(Hostname::new("two..dots").is_err());
        assert!(Hostname::new("under_score").is_err());
        assert!(Hostname::new("x".repeat(64)).is_err());
    }
}
