//! Drives every configured VLAN through validation, lease-file generation and
//! store synchronisation. A failing VLAN is logged and skipped; it never stops
//! the others.

use std::path::PathBuf;

use tracing::{error, info, instrument, warn};

use crate::vlan::tools::config::VlanDescriptor;
use crate::vlan::tools::error::Result;
use crate::vlan::tools::io::dhcpd::dump_to_dhcpd;
use crate::vlan::tools::io::sheet_read::RecordSource;
use crate::vlan::tools::io::sheet_write::{SnapshotFormat, write_records};
use crate::vlan::tools::model::{RawHostRecord, VlanIdentity};
use crate::vlan::tools::reconcile::{SyncOptions, SyncSink, sync_vlan};
use crate::vlan::tools::store::StoreConnector;
use crate::vlan::tools::validate::{generate_dhcp_config, generate_radius_config};

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    pub generate_lease_files: bool,
    pub sync_store: bool,
    /// Restricts the run to these VLAN ids; empty means all.
    pub only_vlans: Vec<i64>,
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_format: SnapshotFormat,
    pub sync_options: SyncOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    NotRequested,
    Succeeded { hosts: usize },
    Failed { reason: String },
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    fn failed(reason: impl ToString) -> Self {
        StageOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanOutcome {
    pub vlan_id: i64,
    pub dhcp: StageOutcome,
    pub radius: StageOutcome,
}

impl VlanOutcome {
    fn failed(vlan_id: i64, options: &BatchOptions, reason: &str) -> Self {
        let stage = |requested: bool| {
            if requested {
                StageOutcome::failed(reason)
            } else {
                StageOutcome::NotRequested
            }
        };
        Self {
            vlan_id,
            dhcp: stage(options.generate_lease_files),
            radius: stage(options.sync_store),
        }
    }
}

/// Processes each descriptor in order. `connector` may be `None` when the
/// store settings could not be loaded; store stages then fail per VLAN.
#[instrument(level = "info", skip_all, fields(vlan_count = descriptors.len()))]
pub fn run_batch(
    descriptors: &[VlanDescriptor],
    source: &dyn RecordSource,
    connector: Option<&dyn StoreConnector>,
    options: &BatchOptions,
    sink: &mut dyn SyncSink,
) -> Vec<VlanOutcome> {
    let mut outcomes = Vec::new();

    for descriptor in descriptors {
        if !options.only_vlans.is_empty() && !options.only_vlans.contains(&descriptor.vlan_id) {
            continue;
        }

        let vlan = match descriptor.identity() {
            Ok(vlan) => vlan,
            Err(err) => {
                error!(vlan = descriptor.vlan_id, error = %err, "skipping invalid VLAN entry");
                outcomes.push(VlanOutcome::failed(
                    descriptor.vlan_id,
                    options,
                    &err.to_string(),
                ));
                continue;
            }
        };

        let records = match source.fetch(&vlan) {
            Ok(records) => records,
            Err(err) => {
                error!(vlan = %vlan.vlan_id, error = %err, "unable to retrieve inventory");
                outcomes.push(VlanOutcome::failed(
                    descriptor.vlan_id,
                    options,
                    &err.to_string(),
                ));
                continue;
            }
        };

        if let Some(dir) = &options.snapshot_dir {
            let path = dir.join(format!(
                "vlan{}.{}",
                vlan.vlan_id,
                options.snapshot_format.extension()
            ));
            if let Err(err) = write_records(&path, &records, options.snapshot_format) {
                warn!(vlan = %vlan.vlan_id, error = %err, "unable to write record snapshot");
            }
        }

        let dhcp = if options.generate_lease_files {
            match lease_stage(&vlan, descriptor, &records, options) {
                Ok(hosts) => {
                    info!(vlan = %vlan.vlan_id, hosts, "successfully generated DHCP config");
                    StageOutcome::Succeeded { hosts }
                }
                Err(err) => {
                    error!(vlan = %vlan.vlan_id, error = %err, "skipping DHCP config");
                    StageOutcome::failed(err)
                }
            }
        } else {
            StageOutcome::NotRequested
        };

        let radius = if options.sync_store {
            match connector {
                Some(connector) => {
                    match store_stage(&vlan, descriptor, &records, connector, options, sink) {
                        Ok(hosts) => {
                            info!(vlan = %vlan.vlan_id, hosts, "successfully synchronised RADIUS config");
                            StageOutcome::Succeeded { hosts }
                        }
                        Err(err) => {
                            error!(vlan = %vlan.vlan_id, error = %err, "skipping RADIUS config");
                            StageOutcome::failed(err)
                        }
                    }
                }
                None => {
                    error!(vlan = %vlan.vlan_id, "skipping RADIUS config: no authentication store");
                    StageOutcome::failed("authentication store unavailable")
                }
            }
        } else {
            StageOutcome::NotRequested
        };

        outcomes.push(VlanOutcome {
            vlan_id: descriptor.vlan_id,
            dhcp,
            radius,
        });
    }

    outcomes
}

fn lease_stage(
    vlan: &VlanIdentity,
    descriptor: &VlanDescriptor,
    records: &[RawHostRecord],
    options: &BatchOptions,
) -> Result<usize> {
    let hosts = generate_dhcp_config(records, vlan, descriptor.dhcp_policy)?;
    dump_to_dhcpd(&hosts, &options.output_dir.join(&vlan.output_label))?;
    Ok(hosts.len())
}

fn store_stage(
    vlan: &VlanIdentity,
    descriptor: &VlanDescriptor,
    records: &[RawHostRecord],
    connector: &dyn StoreConnector,
    options: &BatchOptions,
    sink: &mut dyn SyncSink,
) -> Result<usize> {
    let hosts = generate_radius_config(records, vlan, descriptor.radius_policy)?;
    sync_vlan(connector, vlan.vlan_id, &hosts, &options.sync_options, sink)?;
    Ok(hosts.len())
}
