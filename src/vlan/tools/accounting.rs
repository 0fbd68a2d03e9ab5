use chrono::{Duration, NaiveDateTime};
use tracing::{info, instrument, warn};

use crate::vlan::tools::error::{Result, ToolError};
use crate::vlan::tools::store::{AccountingCutoffs, AccountingPurge, StoreConnector};

/// How long accounting sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Sessions still open after this many days are considered stale.
    pub days_stale: u32,
    /// Closed sessions are kept for this many days.
    pub maximum_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days_stale: 30,
            maximum_days: 90,
        }
    }
}

impl RetentionPolicy {
    pub fn cutoffs(&self, now: NaiveDateTime) -> Result<AccountingCutoffs> {
        let before = |days: u32| {
            Duration::try_days(i64::from(days))
                .and_then(|span| now.checked_sub_signed(span))
                .ok_or_else(|| ToolError::InvalidConfig(format!("retention of {days} days")))
        };
        Ok(AccountingCutoffs {
            stale_started_before: before(self.days_stale)?,
            stopped_before: before(self.maximum_days)?,
        })
    }
}

/// Deletes stale and expired accounting sessions in one unit of work.
#[instrument(level = "info", skip(connector))]
pub fn clean_accounting(
    connector: &dyn StoreConnector,
    policy: RetentionPolicy,
    now: NaiveDateTime,
) -> Result<AccountingPurge> {
    let cutoffs = policy.cutoffs(now)?;
    let mut store = connector.open()?;
    let purge = match store.purge_accounting(&cutoffs) {
        Ok(purge) => purge,
        Err(err) => {
            if let Err(rollback_err) = store.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }
    };
    store.commit()?;
    info!(stale = purge.stale, "deleted stale accounting sessions");
    info!(expired = purge.expired, "deleted old accounting sessions");
    Ok(purge)
}
