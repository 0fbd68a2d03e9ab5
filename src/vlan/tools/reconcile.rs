//! Brings the authentication store's membership of one VLAN in line with a
//! validated host set.
//!
//! The pass is a set difference keyed on the MAC address, which doubles as
//! the RADIUS username. Stored usernames are parsed back into MAC addresses,
//! so a member written in another notation (`AABBCCDDEEFF`,
//! `aa:bb:cc:dd:ee:ff`) is rewritten under the canonical username instead of
//! being added and evicted. Members that already match are left untouched, so
//! a second pass over the same input issues no mutations at all.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{info, instrument, warn};

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::network::{MacAddress, VlanId};
use crate::vlan::tools::model::{AuthStoreRow, ValidatedRadiusHost};
use crate::vlan::tools::store::{
    AttributeRow, AuthScheme, AuthStore, FRAMED_IP_ATTRIBUTE, Mutation, StoreConnector,
    VLAN_ATTRIBUTE,
};

/// Structural change applied to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The host was admitted to the VLAN.
    Added {
        vlan: VlanId,
        mac: MacAddress,
        ipv4: Option<Ipv4Addr>,
    },
    /// The host had authentication rows outside this VLAN; they were dropped
    /// before admitting it here.
    MovedIn { vlan: VlanId, mac: MacAddress },
    /// The fixed-IP attribute of an existing member was replaced or cleared.
    FixedIpChanged {
        vlan: VlanId,
        mac: MacAddress,
        previous: Option<String>,
        current: Option<Ipv4Addr>,
    },
    /// The authentication rows of an existing member were rewritten to the
    /// configured scheme.
    AuthMigrated {
        vlan: VlanId,
        mac: MacAddress,
        previous: Vec<String>,
    },
    /// A member stored under non-canonical usernames was rewritten under the
    /// canonical one.
    Renamed {
        vlan: VlanId,
        mac: MacAddress,
        previous: Vec<String>,
    },
    /// A member no longer in the inventory was deleted.
    Removed { vlan: VlanId, username: String },
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Added { vlan, mac, ipv4 } => match ipv4 {
                Some(ip) => write!(f, "adding host {mac} to VLAN {vlan} with fixed address {ip}"),
                None => write!(f, "adding host {mac} to VLAN {vlan}"),
            },
            SyncEvent::MovedIn { vlan, mac } => write!(
                f,
                "host {mac} is already present outside VLAN {vlan}; removing it"
            ),
            SyncEvent::FixedIpChanged {
                vlan,
                mac,
                previous,
                current,
            } => write!(
                f,
                "VLAN {vlan}: fixed address of host {mac} changed from {} to {}",
                previous.as_deref().unwrap_or("none"),
                current.map_or_else(|| "none".to_string(), |ip| ip.to_string())
            ),
            SyncEvent::AuthMigrated {
                vlan,
                mac,
                previous,
            } => write!(
                f,
                "VLAN {vlan}: authentication of host {mac} migrated from {}",
                previous.join(", ")
            ),
            SyncEvent::Renamed {
                vlan,
                mac,
                previous,
            } => write!(
                f,
                "VLAN {vlan}: host {mac} rewritten from username {}",
                previous.join(", ")
            ),
            SyncEvent::Removed { vlan, username } => {
                write!(f, "removing host {username} from VLAN {vlan}")
            }
        }
    }
}

/// Receives every structural change of a committed pass.
pub trait SyncSink {
    fn record(&mut self, event: &SyncEvent);
}

impl SyncSink for Vec<SyncEvent> {
    fn record(&mut self, event: &SyncEvent) {
        self.push(event.clone());
    }
}

/// Emits one log line per change.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SyncSink for TracingSink {
    fn record(&mut self, event: &SyncEvent) {
        info!("{event}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub auth_scheme: AuthScheme,
    /// Rewrite authentication rows of existing members that use another
    /// scheme.
    pub migrate_auth: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            auth_scheme: AuthScheme::Accept,
            migrate_auth: true,
        }
    }
}

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub moved_in: usize,
    pub ip_changed: usize,
    pub auth_migrated: usize,
    pub renamed: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Statements executed against the store.
    pub mutations: usize,
}

/// Opens a unit of work on `connector` and runs [`sync`] in it.
pub fn sync_vlan(
    connector: &dyn StoreConnector,
    vlan: VlanId,
    desired: &[ValidatedRadiusHost],
    options: &SyncOptions,
    sink: &mut dyn SyncSink,
) -> Result<SyncReport> {
    if desired.is_empty() {
        return Err(ToolError::EmptyRadiusConfig(vlan));
    }
    let mut store = connector.open()?;
    sync(vlan, desired, store.as_mut(), options, sink)
}

/// Reconciles the members of `vlan` with `desired` and commits.
///
/// Events reach `sink` only after the commit succeeded. On any error the
/// unit of work is rolled back and nothing is reported.
#[instrument(level = "info", skip_all, fields(%vlan, desired = desired.len()))]
pub fn sync(
    vlan: VlanId,
    desired: &[ValidatedRadiusHost],
    store: &mut dyn AuthStore,
    options: &SyncOptions,
    sink: &mut dyn SyncSink,
) -> Result<SyncReport> {
    if desired.is_empty() {
        return Err(ToolError::EmptyRadiusConfig(vlan));
    }

    let mut pass = Pass {
        vlan,
        options,
        store,
        report: SyncReport::default(),
        events: Vec::new(),
    };

    if let Err(err) = pass.run(desired) {
        if let Err(rollback_err) = pass.store.rollback() {
            warn!(%vlan, error = %rollback_err, "rollback failed");
        }
        return Err(err);
    }
    pass.store.commit()?;

    for event in &pass.events {
        sink.record(event);
    }
    let report = pass.report;
    info!(
        %vlan,
        added = report.added,
        moved_in = report.moved_in,
        ip_changed = report.ip_changed,
        auth_migrated = report.auth_migrated,
        renamed = report.renamed,
        removed = report.removed,
        unchanged = report.unchanged,
        mutations = report.mutations,
        "authentication store synchronised"
    );
    Ok(report)
}

struct Pass<'a, 's> {
    vlan: VlanId,
    options: &'a SyncOptions,
    store: &'a mut (dyn AuthStore + 's),
    report: SyncReport,
    events: Vec<SyncEvent>,
}

impl Pass<'_, '_> {
    fn run(&mut self, desired: &[ValidatedRadiusHost]) -> Result<()> {
        let mut claimed = HashSet::new();
        if let Some(host) = desired.iter().find(|host| !claimed.insert(host.mac)) {
            return Err(ToolError::DuplicateMac {
                vlan: self.vlan,
                mac: host.mac,
            });
        }

        let mut remaining: BTreeMap<MacAddress, Vec<AuthStoreRow>> = BTreeMap::new();
        let mut unparseable = Vec::new();
        for row in self.store.fetch_vlan_members(self.vlan)? {
            match MacAddress::new(&row.username) {
                Ok(mac) => remaining.entry(mac).or_default().push(row),
                Err(_) => unparseable.push(row.username),
            }
        }

        for host in desired {
            let username = host.mac.bare();
            match remaining.remove(&host.mac) {
                Some(rows) => match rows.as_slice() {
                    [member] if member.username == username => {
                        self.update_member(host, &username, member)?
                    }
                    _ => self.canonicalise(host, &username, &rows)?,
                },
                None => self.admit(host, &username)?,
            }
        }

        let stale = remaining
            .into_values()
            .flatten()
            .map(|row| row.username)
            .chain(unparseable);
        for username in stale {
            self.evict(username)?;
        }
        Ok(())
    }

    fn execute(&mut self, mutation: Mutation) -> Result<u64> {
        self.report.mutations += 1;
        self.store.execute(&mutation)
    }

    fn update_member(
        &mut self,
        host: &ValidatedRadiusHost,
        username: &str,
        member: &AuthStoreRow,
    ) -> Result<()> {
        let mut changed = false;
        let scheme = self.options.auth_scheme;

        let current_scheme =
            matches!(member.check_attributes.as_slice(), [only] if only == scheme.attribute());
        if self.options.migrate_auth && !current_scheme {
            self.execute(Mutation::DeleteCheck {
                username: username.to_string(),
            })?;
            self.execute(Mutation::InsertCheck(scheme.check_row(username)))?;
            self.report.auth_migrated += 1;
            self.events.push(SyncEvent::AuthMigrated {
                vlan: self.vlan,
                mac: host.mac,
                previous: member.check_attributes.clone(),
            });
            changed = true;
        }

        let wanted = host.ipv4.map(|ip| ip.to_string());
        if member.framed_ip.as_deref().map(str::trim) != wanted.as_deref() {
            self.execute(Mutation::DeleteReply {
                username: username.to_string(),
                attribute: Some(FRAMED_IP_ATTRIBUTE.to_string()),
            })?;
            if let Some(ip) = wanted {
                self.execute(Mutation::InsertReply(AttributeRow::assign(
                    username,
                    FRAMED_IP_ATTRIBUTE,
                    ip,
                )))?;
            }
            self.report.ip_changed += 1;
            self.events.push(SyncEvent::FixedIpChanged {
                vlan: self.vlan,
                mac: host.mac,
                previous: member.framed_ip.clone(),
                current: host.ipv4,
            });
            changed = true;
        }

        if !changed {
            self.report.unchanged += 1;
        }
        Ok(())
    }

    // A MAC belongs to one VLAN only, so any rows it still has elsewhere go.
    fn admit(&mut self, host: &ValidatedRadiusHost, username: &str) -> Result<()> {
        let displaced = self.write_member(host, username)?;
        if displaced > 0 {
            self.report.moved_in += 1;
            self.events.push(SyncEvent::MovedIn {
                vlan: self.vlan,
                mac: host.mac,
            });
        }

        self.report.added += 1;
        self.events.push(SyncEvent::Added {
            vlan: self.vlan,
            mac: host.mac,
            ipv4: host.ipv4,
        });
        Ok(())
    }

    // Legacy usernames go before the canonical rows are written. Under a
    // case-insensitive collation `AABBCCDDEEFF` also matches the canonical
    // username, so deleting it afterwards would drop the fresh rows.
    fn canonicalise(
        &mut self,
        host: &ValidatedRadiusHost,
        username: &str,
        rows: &[AuthStoreRow],
    ) -> Result<()> {
        let previous: Vec<String> = rows
            .iter()
            .map(|row| row.username.clone())
            .filter(|name| name != username)
            .collect();
        for name in &previous {
            self.execute(Mutation::DeleteCheck {
                username: name.clone(),
            })?;
            self.execute(Mutation::DeleteReply {
                username: name.clone(),
                attribute: None,
            })?;
        }
        self.write_member(host, username)?;

        self.report.renamed += 1;
        self.events.push(SyncEvent::Renamed {
            vlan: self.vlan,
            mac: host.mac,
            previous,
        });
        Ok(())
    }

    /// Replaces every row of `username` with a fresh member of this VLAN and
    /// returns how many check rows were displaced.
    fn write_member(&mut self, host: &ValidatedRadiusHost, username: &str) -> Result<u64> {
        let displaced = self.execute(Mutation::DeleteCheck {
            username: username.to_string(),
        })?;
        self.execute(Mutation::DeleteReply {
            username: username.to_string(),
            attribute: None,
        })?;
        self.execute(Mutation::InsertCheck(
            self.options.auth_scheme.check_row(username),
        ))?;
        self.execute(Mutation::InsertReply(AttributeRow::assign(
            username,
            VLAN_ATTRIBUTE,
            self.vlan.to_string(),
        )))?;
        if let Some(ip) = host.ipv4 {
            self.execute(Mutation::InsertReply(AttributeRow::assign(
                username,
                FRAMED_IP_ATTRIBUTE,
                ip.to_string(),
            )))?;
        }
        Ok(displaced)
    }

    fn evict(&mut self, username: String) -> Result<()> {
        self.execute(Mutation::DeleteCheck {
            username: username.clone(),
        })?;
        self.execute(Mutation::DeleteReply {
            username: username.clone(),
            attribute: None,
        })?;
        self.report.removed += 1;
        self.events.push(SyncEvent::Removed {
            vlan: self.vlan,
            username,
        });
        Ok(())
    }
}
