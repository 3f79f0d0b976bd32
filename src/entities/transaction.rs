// 🧾 Transaction Entity - one posting event and its splits
//
// A split only exists inside its transaction: both are written together in
// one SQL transaction and neither is ever updated afterwards.

use crate::amount::RationalAmount;
use crate::error::{LedgerError, LedgerResult};
use crate::guid::Guid;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

/// GnuCash posts date-only transactions at 10:59 UTC so the calendar day
/// survives every timezone between UTC-10 and UTC+13
pub const NEUTRAL_TIME: (u32, u32, u32) = (10, 59, 0);

pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Split not yet reconciled
pub const RECONCILE_NEW: char = 'n';

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Split {
    pub guid: Guid,
    pub tx_guid: Guid,
    pub account_guid: Guid,
    pub memo: String,
    pub action: String,
    pub reconcile_state: char,

    /// Amount in the transaction currency
    pub value: RationalAmount,

    /// Amount in the account commodity (equal to value for single-currency books)
    pub quantity: RationalAmount,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerTransaction {
    pub guid: Guid,
    pub currency_guid: Guid,
    pub currency_fraction: i64,
    pub num: String,
    pub post_date: NaiveDate,
    pub enter_date: DateTime<Utc>,
    pub description: String,
    pub splits: Vec<Split>,
}

impl LedgerTransaction {
    /// Sum of split values in the transaction currency's denominator
    pub fn balance(&self) -> LedgerResult<RationalAmount> {
        RationalAmount::sum(self.splits.iter().map(|s| &s.value), self.currency_fraction)
    }

    /// At least two splits that all belong here and sum to zero
    pub fn validate(&self) -> LedgerResult<()> {
        if self.splits.len() < 2 {
            return Err(LedgerError::ImbalancedTransaction(format!(
                "transaction {} has {} split(s), at least 2 required",
                self.guid,
                self.splits.len()
            )));
        }

        if let Some(stray) = self.splits.iter().find(|s| s.tx_guid != self.guid) {
            return Err(LedgerError::Internal(format!(
                "split {} belongs to {}, not {}",
                stray.guid, stray.tx_guid, self.guid
            )));
        }

        let balance = self.balance()?;
        if !balance.is_zero() {
            return Err(LedgerError::ImbalancedTransaction(format!(
                "transaction {} splits sum to {}",
                self.guid, balance
            )));
        }

        Ok(())
    }

    /// `post_date` column value
    pub fn post_timestamp(&self) -> String {
        let (h, m, s) = NEUTRAL_TIME;
        let time = NaiveTime::from_hms_opt(h, m, s).unwrap_or_default();
        self.post_date.and_time(time).format(SQL_TIMESTAMP_FORMAT).to_string()
    }

    /// `enter_date` column value
    pub fn enter_timestamp(&self) -> String {
        self.enter_date.format(SQL_TIMESTAMP_FORMAT).to_string()
    }

    /// Value of the `date-posted` gdate slot (YYYYMMDD)
    pub fn gdate(&self) -> String {
        self.post_date.format("%Y%m%d").to_string()
    }

    pub fn split_ids(&self) -> Vec<Guid> {
        self.splits.iter().map(|s| s.guid.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::new_id;

    fn split(tx: &Guid, numerator: i64) -> Split {
        let value = RationalAmount::new(numerator, 100).unwrap();
        Split {
            guid: new_id(),
            tx_guid: tx.clone(),
            account_guid: new_id(),
            memo: String::new(),
            action: String::new(),
            reconcile_state: RECONCILE_NEW,
            value,
            quantity: value,
        }
    }

    fn transaction(splits: Vec<Split>, guid: Guid) -> LedgerTransaction {
        LedgerTransaction {
            guid,
            currency_guid: new_id(),
            currency_fraction: 100,
            num: String::new(),
            post_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            enter_date: Utc::now(),
            description: "STARBUCKS #12345".to_string(),
            splits,
        }
    }

    #[test]
    fn test_validate_balanced() {
        let guid = new_id();
        let tx = transaction(vec![split(&guid, -1050), split(&guid, 1050)], guid);
        assert!(tx.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_split_and_imbalance() {
        let guid = new_id();
        let single = transaction(vec![split(&guid, 0)], guid.clone());
        assert!(matches!(
            single.validate(),
            Err(LedgerError::ImbalancedTransaction(_))
        ));

        let off_by_a_cent = transaction(vec![split(&guid, -1050), split(&guid, 1049)], guid);
        assert!(matches!(
            off_by_a_cent.validate(),
            Err(LedgerError::ImbalancedTransaction(_))
        ));
    }

    #[test]
    fn test_gnucash_timestamps() {
        let guid = new_id();
        let tx = transaction(vec![], guid);

        assert_eq!(tx.post_timestamp(), "2024-12-31 10:59:00");
        assert_eq!(tx.gdate(), "20241231");
        assert_eq!(tx.enter_timestamp().len(), 19);
    }
}
