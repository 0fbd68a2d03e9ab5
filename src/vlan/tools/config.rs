use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::{ValidationPolicy, VlanIdentity};
use crate::vlan::tools::store::AuthScheme;

/// One entry of the VLAN list file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanDescriptor {
    pub vlan_id: i64,
    #[serde(alias = "cidr_network")]
    pub ip_network: String,
    #[serde(alias = "display_name")]
    pub sheet_name: String,
    #[serde(alias = "output_label")]
    pub dhcpd_out_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub dhcp_policy: ValidationPolicy,
    #[serde(default)]
    pub radius_policy: ValidationPolicy,
}

impl VlanDescriptor {
    pub fn identity(&self) -> Result<VlanIdentity> {
        if self.dhcpd_out_file.trim().is_empty() {
            return Err(ToolError::InvalidConfig(format!(
                "VLAN {} has an empty output file name",
                self.vlan_id
            )));
        }
        let identity = VlanIdentity::new(
            self.vlan_id,
            &self.ip_network,
            self.sheet_name.clone(),
            self.dhcpd_out_file.clone(),
        )?;
        Ok(match &self.comment {
            Some(comment) if !comment.is_empty() => identity.with_comment(comment.clone()),
            _ => identity,
        })
    }
}

/// Loads the JSON array of VLAN descriptors.
pub fn load_vlan_list(path: &Path) -> Result<Vec<VlanDescriptor>> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn default_port() -> u16 {
    3306
}

/// Connection settings of the authentication store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_scheme: AuthScheme,
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("auth_scheme", &self.auth_scheme)
            .finish()
    }
}

pub fn load_store_settings(path: &Path) -> Result<StoreSettings> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
