use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, instrument};

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::ValidatedDhcpHost;
use crate::vlan::tools::model::network::MacAddress;

/// Host binding recovered from a lease file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseBinding {
    pub hostname: String,
    pub mac: MacAddress,
    pub ipv4: Ipv4Addr,
}

/// Renders one `host` stanza per validated host, each preceded by its
/// inventory comments and followed by a blank line.
pub fn render_lease_file(hosts: &[ValidatedDhcpHost]) -> String {
    let mut out = String::new();
    for host in hosts {
        let meta = &host.metadata;
        out.push_str(&format!("# {} [{}]\n", meta.responsible, meta.room));
        out.push_str(&format!("# {}, {}\n", meta.os, meta.description));
        if !meta.comment.is_empty() {
            out.push_str(&format!("# {}\n", meta.comment));
        }
        out.push_str(&format!(
            "host {} {{\n  hardware ethernet {};\n  fixed-address {};\n}}\n\n",
            host.hostname, host.mac, host.ipv4
        ));
    }
    out
}

/// Overwrites `destination` with the lease file for `hosts`.
///
/// The file is replaced in place without a temporary copy, so a single
/// writer per destination is assumed. An empty host set is refused: it
/// almost always means the upstream fetch went wrong.
#[instrument(level = "info", skip_all, fields(destination = %destination.display()))]
pub fn dump_to_dhcpd(hosts: &[ValidatedDhcpHost], destination: &Path) -> Result<()> {
    if hosts.is_empty() {
        return Err(ToolError::EmptyDhcpConfig(destination.to_path_buf()));
    }
    fs::write(destination, render_lease_file(hosts))?;
    info!(host_count = hosts.len(), "lease file written");
    Ok(())
}

/// Parses the `host` stanzas of a lease file. Comment lines are ignored.
pub fn parse_lease_file(contents: &str) -> Result<Vec<LeaseBinding>> {
    let mut bindings = Vec::new();
    let mut current: Option<PartialBinding> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        let invalid = |reason: &str| ToolError::InvalidLeaseFile {
            line: line_no,
            reason: reason.to_string(),
        };

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("host ") {
            if current.is_some() {
                return Err(invalid("nested host declaration"));
            }
            let hostname = rest
                .strip_suffix('{')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| invalid("expected 'host <name> {'"))?;
            current = Some(PartialBinding::new(hostname));
            continue;
        }

        let binding = current
            .as_mut()
            .ok_or_else(|| invalid("statement outside of a host declaration"))?;

        if line == "}" {
            let finished = current
                .take()
                .and_then(PartialBinding::finish)
                .ok_or_else(|| invalid("host declaration is missing an address"))?;
            bindings.push(finished);
        } else if let Some(value) = statement_value(line, "hardware ethernet") {
            binding.mac = Some(MacAddress::new(value).map_err(|err| invalid(&err.to_string()))?);
        } else if let Some(value) = statement_value(line, "fixed-address") {
            binding.ipv4 = Some(
                Ipv4Addr::from_str(value).map_err(|_| invalid("malformed fixed-address"))?,
            );
        } else {
            return Err(invalid("unknown statement"));
        }
    }

    if current.is_some() {
        return Err(ToolError::InvalidLeaseFile {
            line: contents.lines().count(),
            reason: "unterminated host declaration".to_string(),
        });
    }
    Ok(bindings)
}

fn statement_value<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    line.strip_prefix(keyword)?
        .trim()
        .strip_suffix(';')
        .map(str::trim)
}

struct PartialBinding {
    hostname: String,
    mac: Option<MacAddress>,
    ipv4: Option<Ipv4Addr>,
}

impl PartialBinding {
    fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            mac: None,
            ipv4: None,
        }
    }

    fn finish(self) -> Option<LeaseBinding> {
        Some(LeaseBinding {
            hostname: self.hostname,
            mac: self.mac?,
            ipv4: self.ipv4?,
        })
    }
}
