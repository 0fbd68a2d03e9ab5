use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

use crate::vlan::tools::model::network::{Ipv4Network, MacAddress, NetworkError, VlanId};

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Host field that failed to parse during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostField {
    Hostname,
    Mac,
    Ipv4,
}

impl std::fmt::Display for HostField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostField::Hostname => write!(f, "hostname"),
            HostField::Mac => write!(f, "MAC address"),
            HostField::Ipv4 => write!(f, "IPv4 address"),
        }
    }
}

/// Error type covering the different failure cases that can occur when the
/// tool ingests inventory rows, validates them, or pushes them downstream.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when a VLAN id, CIDR network, or similar value object is invalid.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A single host field could not be parsed under the strict policy.
    #[error("VLAN {vlan}: '{value}' is not a well-formed {field}")]
    MalformedField {
        vlan: VlanId,
        field: HostField,
        value: String,
    },

    /// The host address lies outside the VLAN's network.
    #[error("VLAN {vlan}: IPv4 address {ipv4} of host {host} is outside of {network}")]
    OutsideNetwork {
        vlan: VlanId,
        host: String,
        ipv4: Ipv4Addr,
        network: Ipv4Network,
    },

    /// Two records in the same batch share a MAC address.
    #[error("VLAN {vlan}: duplicated MAC address {mac}")]
    DuplicateMac { vlan: VlanId, mac: MacAddress },

    /// Two records in the same batch share an IPv4 address.
    #[error("VLAN {vlan}: duplicated IPv4 address {ipv4}")]
    DuplicateIpv4 { vlan: VlanId, ipv4: Ipv4Addr },

    /// Nothing survived DHCP validation, so there is nothing to write.
    #[error("no DHCP config, refusing to write an empty lease file to {0}")]
    EmptyDhcpConfig(PathBuf),

    /// Raised when a lease file cannot be parsed back into host bindings.
    #[error("invalid lease file at line {line}: {reason}")]
    InvalidLeaseFile { line: usize, reason: String },

    /// Nothing survived RADIUS validation, so there is nothing to synchronise.
    #[error("VLAN {0}: no RADIUS config, refusing to synchronise an empty host set")]
    EmptyRadiusConfig(VlanId),

    /// Raised when neither a workbook nor a JSON snapshot exists for a VLAN.
    #[error("no record source for sheet '{sheet}' in {dir}")]
    MissingSource { sheet: String, dir: PathBuf },

    /// Raised when a configuration file is structurally valid JSON but
    /// semantically wrong.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Errors bubbled up from the MySQL driver.
    #[cfg(feature = "mysql")]
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Failures reported by an authentication store backend.
    #[error("authentication store error: {0}")]
    Store(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
