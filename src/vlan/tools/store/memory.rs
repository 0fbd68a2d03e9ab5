use std::cell::RefCell;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::model::AuthStoreRow;
use crate::vlan::tools::model::network::VlanId;
use crate::vlan::tools::store::{
    AccountingCutoffs, AccountingPurge, AttributeRow, AuthScheme, AuthStore, FRAMED_IP_ATTRIBUTE,
    Mutation, StoreConnector, VLAN_ATTRIBUTE,
};

/// One `radacct` session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingSession {
    pub username: String,
    pub started: NaiveDateTime,
    pub stopped: Option<NaiveDateTime>,
}

/// Full contents of the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    pub check: Vec<AttributeRow>,
    pub reply: Vec<AttributeRow>,
    pub accounting: Vec<AccountingSession>,
}

impl Tables {
    /// Seeds a host the way a synchronisation pass would have written it.
    pub fn add_member(
        &mut self,
        username: &str,
        vlan: &str,
        framed_ip: Option<&str>,
        scheme: AuthScheme,
    ) {
        self.check.push(scheme.check_row(username));
        self.reply
            .push(AttributeRow::assign(username, VLAN_ATTRIBUTE, vlan));
        if let Some(ip) = framed_ip {
            self.reply
                .push(AttributeRow::assign(username, FRAMED_IP_ATTRIBUTE, ip));
        }
    }

    /// username → fixed address for every member of `vlan`.
    pub fn members(&self, vlan: VlanId) -> BTreeMap<String, Option<String>> {
        self.vlan_members(vlan)
            .into_iter()
            .map(|row| (row.username, row.framed_ip))
            .collect()
    }

    fn vlan_members(&self, vlan: VlanId) -> Vec<AuthStoreRow> {
        let tag = vlan.to_string();
        let mut members: BTreeMap<String, AuthStoreRow> = BTreeMap::new();
        for reply in &self.reply {
            if reply.attribute != VLAN_ATTRIBUTE || reply.value != tag {
                continue;
            }
            let mut check_attributes: Vec<String> = self
                .check
                .iter()
                .filter(|row| row.username == reply.username)
                .map(|row| row.attribute.clone())
                .collect();
            if check_attributes.is_empty() {
                continue;
            }
            check_attributes.sort();
            check_attributes.dedup();
            let framed_ip = self
                .reply
                .iter()
                .find(|row| row.username == reply.username && row.attribute == FRAMED_IP_ATTRIBUTE)
                .map(|row| row.value.clone());
            members
                .entry(reply.username.clone())
                .or_insert_with(|| AuthStoreRow {
                    username: reply.username.clone(),
                    vlan: reply.value.clone(),
                    framed_ip,
                    check_attributes,
                });
        }
        members.into_values().collect()
    }

    fn apply(&mut self, mutation: &Mutation) -> u64 {
        match mutation {
            Mutation::DeleteCheck { username } => {
                retain_counting(&mut self.check, |row| &row.username != username)
            }
            Mutation::DeleteReply {
                username,
                attribute,
            } => retain_counting(&mut self.reply, |row| {
                &row.username != username
                    || attribute.as_ref().is_some_and(|attr| &row.attribute != attr)
            }),
            Mutation::InsertCheck(row) => {
                self.check.push(row.clone());
                1
            }
            Mutation::InsertReply(row) => {
                self.reply.push(row.clone());
                1
            }
        }
    }
}

fn retain_counting<T>(rows: &mut Vec<T>, keep: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(|row| keep(row));
    (before - rows.len()) as u64
}

/// Single-threaded in-memory stand-in for the SQL store, with the same
/// commit/rollback visibility rules.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    committed: RefCell<Tables>,
    fail_at: Option<usize>,
    offline: bool,
}

impl MemoryConnector {
    pub fn new(tables: Tables) -> Self {
        Self {
            committed: RefCell::new(tables),
            fail_at: None,
            offline: false,
        }
    }

    /// Makes the `n`-th mutation (zero-based) of every unit of work fail.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Makes every [`StoreConnector::open`] fail.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Snapshot of the committed state.
    pub fn tables(&self) -> Tables {
        self.committed.borrow().clone()
    }
}

impl StoreConnector for MemoryConnector {
    fn open(&self) -> Result<Box<dyn AuthStore + '_>> {
        if self.offline {
            return Err(ToolError::Store("connection refused".to_string()));
        }
        Ok(Box::new(MemoryStore {
            committed: &self.committed,
            working: self.committed.borrow().clone(),
            executed: 0,
            fail_at: self.fail_at,
        }))
    }
}

struct MemoryStore<'a> {
    committed: &'a RefCell<Tables>,
    working: Tables,
    executed: usize,
    fail_at: Option<usize>,
}

impl AuthStore for MemoryStore<'_> {
    fn fetch_vlan_members(&mut self, vlan: VlanId) -> Result<Vec<AuthStoreRow>> {
        Ok(self.working.vlan_members(vlan))
    }

    fn execute(&mut self, mutation: &Mutation) -> Result<u64> {
        if self.fail_at == Some(self.executed) {
            return Err(ToolError::Store(format!("injected failure on {mutation:?}")));
        }
        self.executed += 1;
        Ok(self.working.apply(mutation))
    }

    fn purge_accounting(&mut self, cutoffs: &AccountingCutoffs) -> Result<AccountingPurge> {
        let stale = retain_counting(&mut self.working.accounting, |session| {
            !(session.stopped.is_none() && session.started < cutoffs.stale_started_before)
        });
        let expired = retain_counting(&mut self.working.accounting, |session| {
            !session
                .stopped
                .is_some_and(|stopped| stopped < cutoffs.stopped_before)
        });
        Ok(AccountingPurge { stale, expired })
    }

    fn commit(&mut self) -> Result<()> {
        *self.committed.borrow_mut() = self.working.clone();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.working = self.committed.borrow().clone();
        Ok(())
    }
}
