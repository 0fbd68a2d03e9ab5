//! Turns raw inventory rows into duplicate-free host sets.
//!
//! Two kinds of failure are distinguished. A malformed field (unparseable
//! MAC, hostname or IPv4) is handled according to the caller's
//! [`ValidationPolicy`]. An integrity violation (address outside the VLAN
//! network, duplicated MAC or IPv4) always aborts the VLAN.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::{debug, info, instrument, warn};

use crate::vlan::tools::error::{HostField, Result, ToolError};
use crate::vlan::tools::model::network::{Hostname, MacAddress, VlanId};
use crate::vlan::tools::model::{
    HostMetadata, RawHostRecord, ValidatedDhcpHost, ValidatedRadiusHost, ValidationPolicy,
    VlanIdentity,
};

/// Validates records for the lease file. Rows missing a hostname, MAC or
/// IPv4 are skipped silently; output keeps the input row order.
#[instrument(level = "info", skip_all, fields(vlan = %vlan.vlan_id, ?policy))]
pub fn generate_dhcp_config(
    records: &[RawHostRecord],
    vlan: &VlanIdentity,
    policy: ValidationPolicy,
) -> Result<Vec<ValidatedDhcpHost>> {
    let mut seen = Uniqueness::new(vlan);
    let mut hosts = Vec::new();

    for record in records {
        let hostname = record.hostname.trim().to_lowercase();
        let raw_mac = record.mac.trim();
        let raw_ipv4 = record.ipv4.trim();

        if hostname.is_empty() || raw_mac.is_empty() || raw_ipv4.is_empty() {
            debug!(%hostname, mac = raw_mac, ipv4 = raw_ipv4, "incomplete row skipped");
            continue;
        }

        let Ok(mac) = MacAddress::new(raw_mac) else {
            tolerate(policy, vlan.vlan_id, HostField::Mac, raw_mac)?;
            continue;
        };
        let Ok(hostname) = Hostname::new(hostname.as_str()) else {
            tolerate(policy, vlan.vlan_id, HostField::Hostname, &hostname)?;
            continue;
        };
        let Ok(ipv4) = Ipv4Addr::from_str(raw_ipv4) else {
            tolerate(policy, vlan.vlan_id, HostField::Ipv4, raw_ipv4)?;
            continue;
        };

        seen.check_network(hostname.as_str(), ipv4)?;
        seen.claim_mac(mac)?;
        seen.claim_ipv4(ipv4)?;

        hosts.push(ValidatedDhcpHost {
            hostname,
            mac,
            ipv4,
            metadata: HostMetadata {
                comment: record.note.trim().to_string(),
                os: record.os.trim().to_string(),
                responsible: record.responsible.trim().to_string(),
                room: record.room.trim().to_string(),
                description: record.description.trim().to_string(),
            },
        });
    }

    info!(
        host_count = hosts.len(),
        row_count = records.len(),
        "validated DHCP hosts"
    );
    Ok(hosts)
}

/// Validates records for the authentication store. Rows without a MAC are
/// not RADIUS-eligible and are skipped; the IPv4 column is optional.
#[instrument(level = "info", skip_all, fields(vlan = %vlan.vlan_id, ?policy))]
pub fn generate_radius_config(
    records: &[RawHostRecord],
    vlan: &VlanIdentity,
    policy: ValidationPolicy,
) -> Result<Vec<ValidatedRadiusHost>> {
    let mut seen = Uniqueness::new(vlan);
    let mut hosts = Vec::new();

    for record in records {
        let raw_mac = record.mac.trim();
        let raw_ipv4 = record.ipv4.trim();

        if raw_mac.is_empty() {
            continue;
        }

        let Ok(mac) = MacAddress::new(raw_mac) else {
            tolerate(policy, vlan.vlan_id, HostField::Mac, raw_mac)?;
            continue;
        };

        let ipv4 = if raw_ipv4.is_empty() {
            None
        } else {
            let Ok(ipv4) = Ipv4Addr::from_str(raw_ipv4) else {
                tolerate(policy, vlan.vlan_id, HostField::Ipv4, raw_ipv4)?;
                continue;
            };
            seen.check_network(&mac.to_string(), ipv4)?;
            Some(ipv4)
        };

        seen.claim_mac(mac)?;
        if let Some(ipv4) = ipv4 {
            seen.claim_ipv4(ipv4)?;
        }

        hosts.push(ValidatedRadiusHost { mac, ipv4 });
    }

    info!(
        host_count = hosts.len(),
        row_count = records.len(),
        "validated RADIUS hosts"
    );
    Ok(hosts)
}

fn tolerate(policy: ValidationPolicy, vlan: VlanId, field: HostField, value: &str) -> Result<()> {
    match policy {
        ValidationPolicy::Strict => Err(ToolError::MalformedField {
            vlan,
            field,
            value: value.to_string(),
        }),
        ValidationPolicy::LenientSkip => {
            warn!(%vlan, %field, value, "malformed field, skipping record");
            Ok(())
        }
    }
}

/// Addresses claimed so far by one validation call.
struct Uniqueness<'a> {
    vlan: &'a VlanIdentity,
    macs: HashSet<MacAddress>,
    ipv4s: HashSet<Ipv4Addr>,
}

impl<'a> Uniqueness<'a> {
    fn new(vlan: &'a VlanIdentity) -> Self {
        Self {
            vlan,
            macs: HashSet::new(),
            ipv4s: HashSet::new(),
        }
    }

    fn check_network(&self, host: &str, ipv4: Ipv4Addr) -> Result<()> {
        if self.vlan.cidr_network.contains(ipv4) {
            Ok(())
        } else {
            Err(ToolError::OutsideNetwork {
                vlan: self.vlan.vlan_id,
                host: host.to_string(),
                ipv4,
                network: self.vlan.cidr_network,
            })
        }
    }

    fn claim_mac(&mut self, mac: MacAddress) -> Result<()> {
        if self.macs.insert(mac) {
            Ok(())
        } else {
            Err(ToolError::DuplicateMac {
                vlan: self.vlan.vlan_id,
                mac,
            })
        }
    }

    fn claim_ipv4(&mut self, ipv4: Ipv4Addr) -> Result<()> {
        if self.ipv4s.insert(ipv4) {
            Ok(())
        } else {
            Err(ToolError::DuplicateIpv4 {
                vlan: self.vlan.vlan_id,
                ipv4,
            })
        }
    }
}
