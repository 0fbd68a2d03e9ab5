use std::collections::BTreeMap;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{MySql, Transaction};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::vlan::tools::config::StoreSettings;
use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::AuthStoreRow;
use crate::vlan::tools::model::network::VlanId;
use crate::vlan::tools::store::{
    AccountingCutoffs, AccountingPurge, AuthStore, FRAMED_IP_ATTRIBUTE, Mutation, StoreConnector,
    VLAN_ATTRIBUTE,
};

const MEMBERS_QUERY: &str = "SELECT radcheck.username, radcheck.attribute, framed.value \
     FROM radcheck \
     INNER JOIN radreply AS tag \
        ON tag.username = radcheck.username AND tag.attribute = ? AND tag.value = ? \
     LEFT JOIN radreply AS framed \
        ON framed.username = radcheck.username AND framed.attribute = ?";

/// Opens transactions against a FreeRADIUS MySQL database.
///
/// The driver is async; this connector owns a current-thread runtime and
/// blocks on every statement so the rest of the crate stays synchronous.
pub struct MySqlConnector {
    runtime: Runtime,
    pool: MySqlPool,
}

impl MySqlConnector {
    /// Prepares a lazily connecting pool. No connection is attempted until
    /// the first [`StoreConnector::open`].
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        let pool = runtime.block_on(async {
            MySqlPoolOptions::new()
                .max_connections(1)
                .connect_lazy_with(options)
        });
        Ok(Self { runtime, pool })
    }
}

impl StoreConnector for MySqlConnector {
    fn open(&self) -> Result<Box<dyn AuthStore + '_>> {
        let transaction = self.runtime.block_on(self.pool.begin())?;
        Ok(Box::new(MySqlStore {
            runtime: &self.runtime,
            transaction: Some(transaction),
        }))
    }
}

struct MySqlStore<'a> {
    runtime: &'a Runtime,
    transaction: Option<Transaction<'static, MySql>>,
}

impl MySqlStore<'_> {
    fn transaction(&mut self) -> Result<&mut Transaction<'static, MySql>> {
        self.transaction
            .as_mut()
            .ok_or_else(|| ToolError::Store("transaction already finished".to_string()))
    }
}

impl AuthStore for MySqlStore<'_> {
    fn fetch_vlan_members(&mut self, vlan: VlanId) -> Result<Vec<AuthStoreRow>> {
        let runtime = self.runtime;
        let tag = vlan.to_string();
        let transaction = self.transaction()?;
        let rows: Vec<(String, String, Option<String>)> = runtime.block_on(
            sqlx::query_as(MEMBERS_QUERY)
                .bind(VLAN_ATTRIBUTE)
                .bind(&tag)
                .bind(FRAMED_IP_ATTRIBUTE)
                .fetch_all(&mut **transaction),
        )?;

        let mut members: BTreeMap<String, AuthStoreRow> = BTreeMap::new();
        for (username, check_attribute, framed_ip) in rows {
            let member = members
                .entry(username.clone())
                .or_insert_with(|| AuthStoreRow {
                    username,
                    vlan: tag.clone(),
                    framed_ip,
                    check_attributes: Vec::new(),
                });
            if !member.check_attributes.contains(&check_attribute) {
                member.check_attributes.push(check_attribute);
            }
        }
        debug!(%vlan, member_count = members.len(), "fetched VLAN members");
        Ok(members
            .into_values()
            .map(|mut member| {
                member.check_attributes.sort();
                member
            })
            .collect())
    }

    fn execute(&mut self, mutation: &Mutation) -> Result<u64> {
        let runtime = self.runtime;
        let transaction = self.transaction()?;
        let query = match mutation {
            Mutation::DeleteCheck { username } => {
                sqlx::query("DELETE FROM radcheck WHERE username = ?").bind(username)
            }
            Mutation::DeleteReply {
                username,
                attribute: None,
            } => sqlx::query("DELETE FROM radreply WHERE username = ?").bind(username),
            Mutation::DeleteReply {
                username,
                attribute: Some(attribute),
            } => sqlx::query("DELETE FROM radreply WHERE username = ? AND attribute = ?")
                .bind(username)
                .bind(attribute),
            Mutation::InsertCheck(row) => sqlx::query(
                "INSERT INTO radcheck (username, attribute, op, value) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.username)
            .bind(&row.attribute)
            .bind(&row.op)
            .bind(&row.value),
            Mutation::InsertReply(row) => sqlx::query(
                "INSERT INTO radreply (username, attribute, op, value) VALUES (?, ?, ?, ?)",
            )
            .bind(&row.username)
            .bind(&row.attribute)
            .bind(&row.op)
            .bind(&row.value),
        };
        let result = runtime.block_on(query.execute(&mut **transaction))?;
        Ok(result.rows_affected())
    }

    fn purge_accounting(&mut self, cutoffs: &AccountingCutoffs) -> Result<AccountingPurge> {
        let runtime = self.runtime;
        let transaction = self.transaction()?;
        let stale = runtime.block_on(
            sqlx::query("DELETE FROM radacct WHERE acctstoptime IS NULL AND acctstarttime < ?")
                .bind(cutoffs.stale_started_before)
                .execute(&mut **transaction),
        )?;
        let expired = runtime.block_on(
            sqlx::query(
                "DELETE FROM radacct WHERE acctstoptime IS NOT NULL AND acctstoptime < ?",
            )
            .bind(cutoffs.stopped_before)
            .execute(&mut **transaction),
        )?;
        Ok(AccountingPurge {
            stale: stale.rows_affected(),
            expired: expired.rows_affected(),
        })
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(transaction) = self.transaction.take() {
            self.runtime.block_on(transaction.commit())?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(transaction) = self.transaction.take() {
            self.runtime.block_on(transaction.rollback())?;
        }
        Ok(())
    }
}
