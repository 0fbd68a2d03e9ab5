//! Capability interface to the RADIUS authentication/authorization tables.
//!
//! The schema is the stock FreeRADIUS SQL one: `radcheck` decides whether a
//! username (the bare MAC address) is admitted, `radreply` carries the VLAN
//! tag and optional fixed address handed back on admission, and `radacct`
//! holds accounting sessions.

pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::vlan::tools::error::Result;
use crate::vlan::tools::model::AuthStoreRow;
use crate::vlan::tools::model::network::VlanId;

pub const AUTH_TYPE_ATTRIBUTE: &str = "Auth-Type";
pub const CLEARTEXT_PASSWORD_ATTRIBUTE: &str = "Cleartext-Password";
pub const VLAN_ATTRIBUTE: &str = "Tunnel-Private-Group-ID";
pub const FRAMED_IP_ATTRIBUTE: &str = "Framed-IP-Address";
pub const ASSIGN_OP: &str = ":=";

/// One `radcheck` or `radreply` row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttributeRow {
    pub username: String,
    pub attribute: String,
    pub op: String,
    pub value: String,
}

impl AttributeRow {
    pub fn assign(
        username: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            attribute: attribute.into(),
            op: ASSIGN_OP.to_string(),
            value: value.into(),
        }
    }
}

/// How admitted hosts authenticate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Auth-Type := Accept`.
    #[default]
    Accept,
    /// `Cleartext-Password := <username>`, as expected by MAC-auth switches
    /// that send the MAC as password.
    CleartextPassword,
}

impl AuthScheme {
    pub fn attribute(&self) -> &'static str {
        match self {
            AuthScheme::Accept => AUTH_TYPE_ATTRIBUTE,
            AuthScheme::CleartextPassword => CLEARTEXT_PASSWORD_ATTRIBUTE,
        }
    }

    pub fn check_row(&self, username: &str) -> AttributeRow {
        match self {
            AuthScheme::Accept => AttributeRow::assign(username, AUTH_TYPE_ATTRIBUTE, "Accept"),
            AuthScheme::CleartextPassword => {
                AttributeRow::assign(username, CLEARTEXT_PASSWORD_ATTRIBUTE, username)
            }
        }
    }
}

/// A single write statement against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Delete every `radcheck` row of a username.
    DeleteCheck { username: String },
    /// Delete the `radreply` rows of a username, optionally only one attribute.
    DeleteReply {
        username: String,
        attribute: Option<String>,
    },
    InsertCheck(AttributeRow),
    InsertReply(AttributeRow),
}

/// Cut-off instants for the accounting purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountingCutoffs {
    /// Sessions that never stopped and started before this are dropped.
    pub stale_started_before: NaiveDateTime,
    /// Stopped sessions that ended before this are dropped.
    pub stopped_before: NaiveDateTime,
}

/// Row counts removed by an accounting purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountingPurge {
    pub stale: u64,
    pub expired: u64,
}

/// An open unit of work against the authentication store.
///
/// Nothing is visible to other readers until [`AuthStore::commit`];
/// dropping the store without committing discards the pending writes.
pub trait AuthStore {
    /// Members of one VLAN: usernames with an authentication row and a VLAN
    /// tag reply equal to `vlan`.
    fn fetch_vlan_members(&mut self, vlan: VlanId) -> Result<Vec<AuthStoreRow>>;

    /// Applies one mutation and returns the number of affected rows.
    fn execute(&mut self, mutation: &Mutation) -> Result<u64>;

    fn purge_accounting(&mut self, cutoffs: &AccountingCutoffs) -> Result<AccountingPurge>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

/// Opens units of work. A failed open is a connectivity failure.
pub trait StoreConnector {
    fn open(&self) -> Result<Box<dyn AuthStore + '_>>;
}
