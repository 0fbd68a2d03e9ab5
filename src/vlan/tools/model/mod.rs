pub mod network;

use std::net::Ipv4Addr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use network::{Hostname, Ipv4Network, MacAddress, NetworkError, VlanId};

/// Column headers of the inventory sheet, in the order they are written to
/// snapshots.
pub const HOSTNAME_HEADER: &str = "Hostname";
pub const MAC_HEADER: &str = "Mac Address";
pub const IPV4_HEADER: &str = "IPv4 address";
pub const NOTE_HEADER: &str = "Note/commenti";
pub const OS_HEADER: &str = "Sistema operativo";
pub const RESPONSIBLE_HEADER: &str = "Referente";
pub const ROOM_HEADER: &str = "Stanza";
pub const DESCRIPTION_HEADER: &str = "Descrizione";

pub const RECORD_HEADERS: [&str; 8] = [
    HOSTNAME_HEADER,
    MAC_HEADER,
    IPV4_HEADER,
    NOTE_HEADER,
    OS_HEADER,
    RESPONSIBLE_HEADER,
    ROOM_HEADER,
    DESCRIPTION_HEADER,
];

/// How a validator reacts to a single malformed field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Abort the whole VLAN.
    #[default]
    Strict,
    /// Log a warning and drop the offending record.
    LenientSkip,
}

/// Immutable per-VLAN settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanIdentity {
    pub vlan_id: VlanId,
    pub cidr_network: Ipv4Network,
    /// Name of the inventory sheet backing this VLAN.
    pub display_name: String,
    /// File name of the generated lease file.
    pub output_label: String,
    pub comment: Option<String>,
}

impl VlanIdentity {
    pub fn new(
        vlan_id: i64,
        cidr_network: &str,
        display_name: impl Into<String>,
        output_label: impl Into<String>,
    ) -> Result<Self, NetworkError> {
        Ok(Self {
            vlan_id: VlanId::new(vlan_id)?,
            cidr_network: cidr_network.parse()?,
            display_name: display_name.into(),
            output_label: output_label.into(),
            comment: None,
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// One inventory row as fetched from the spreadsheet. All fields are free
/// text; missing columns deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawHostRecord {
    #[serde(rename = "Hostname", deserialize_with = "lenient_string")]
    pub hostname: String,
    #[serde(
        rename = "Mac Address",
        alias = "MAC address",
        deserialize_with = "lenient_string"
    )]
    pub mac: String,
    #[serde(
        rename = "IPv4 address",
        alias = "IPv4",
        deserialize_with = "lenient_string"
    )]
    pub ipv4: String,
    #[serde(
        rename = "Note/commenti",
        alias = "Note",
        deserialize_with = "lenient_string"
    )]
    pub note: String,
    #[serde(
        rename = "Sistema operativo",
        alias = "OS",
        deserialize_with = "lenient_string"
    )]
    pub os: String,
    #[serde(
        rename = "Referente",
        alias = "Responsible",
        deserialize_with = "lenient_string"
    )]
    pub responsible: String,
    #[serde(rename = "Stanza", alias = "Room", deserialize_with = "lenient_string")]
    pub room: String,
    #[serde(
        rename = "Descrizione",
        alias = "Description",
        deserialize_with = "lenient_string"
    )]
    pub description: String,
}

impl RawHostRecord {
    /// Values in [`RECORD_HEADERS`] order.
    pub fn cells(&self) -> [&str; 8] {
        [
            self.hostname.as_str(),
            self.mac.as_str(),
            self.ipv4.as_str(),
            self.note.as_str(),
            self.os.as_str(),
            self.responsible.as_str(),
            self.room.as_str(),
            self.description.as_str(),
        ]
    }
}

// Spreadsheet exports carry numbers and booleans for cells that look numeric.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(value) => value,
        Value::Number(number) => number.to_string(),
        Value::Bool(value) => value.to_string(),
        other => other.to_string(),
    })
}

/// Lease-file metadata carried alongside a validated host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostMetadata {
    pub comment: String,
    pub os: String,
    pub responsible: String,
    pub room: String,
    pub description: String,
}

/// A host that passed DHCP validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDhcpHost {
    pub hostname: Hostname,
    pub mac: MacAddress,
    pub ipv4: Ipv4Addr,
    pub metadata: HostMetadata,
}

/// A host that passed RADIUS validation. Hosts without a fixed address get
/// their IPv4 from DHCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRadiusHost {
    pub mac: MacAddress,
    pub ipv4: Option<Ipv4Addr>,
}

/// Per-host state observed in the authentication store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStoreRow {
    /// RADIUS username, i.e. the bare MAC address.
    pub username: String,
    /// Value of the VLAN tag reply attribute.
    pub vlan: String,
    /// Value of the fixed-IP reply attribute, if any.
    pub framed_ip: Option<String>,
    /// Attribute names of the authentication check rows, sorted and
    /// without repeats.
    pub check_attributes: Vec<String>,
}
