// ⚖️ Split Balancer - balanced splits for one posting
//
// Simple postings are balanced BY CONSTRUCTION: the destination split is the
// exact negation of the source split. Decomposed postings (fees, taxes) carry
// caller-supplied legs and are checked to sum to zero before any row exists.

use crate::amount::RationalAmount;
use crate::entities::account::AccountRef;
use crate::entities::commodity::Commodity;
use crate::entities::transaction::{Split, RECONCILE_NEW};
use crate::error::{LedgerError, LedgerResult};
use crate::guid::{new_id, Guid};

/// Exact amounts of one normalized transaction
#[derive(Debug, Clone)]
pub struct Posting {
    /// Signed amount on the source account
    pub amount: RationalAmount,
    pub memo: String,

    /// Counter-side legs; empty means "one destination takes the negation"
    pub counter: Vec<CounterLeg>,
}

#[derive(Debug, Clone)]
pub struct CounterLeg {
    pub amount: RationalAmount,
    pub memo: String,
}

/// Account plus the signed value posted to it
#[derive(Debug, Clone)]
pub struct SplitLeg {
    pub account: AccountRef,
    pub value: RationalAmount,
    pub memo: String,
}

pub struct SplitBalancer<'a> {
    commodity: &'a Commodity,
}

impl<'a> SplitBalancer<'a> {
    pub fn new(commodity: &'a Commodity) -> Self {
        SplitBalancer { commodity }
    }

    /// Ordered splits: source first, then one per destination
    pub fn build(
        &self,
        tx_guid: &Guid,
        posting: &Posting,
        source: &AccountRef,
        destinations: &[AccountRef],
    ) -> LedgerResult<Vec<Split>> {
        if posting.counter.is_empty() {
            let [destination] = destinations else {
                return Err(LedgerError::Internal(format!(
                    "simple posting needs one destination, got {}",
                    destinations.len()
                )));
            };

            let amount = posting.amount.convert_to(self.commodity.fraction)?;
            return Ok(vec![
                self.split(tx_guid, source, amount, &posting.memo)?,
                self.split(tx_guid, destination, amount.negate(), &posting.memo)?,
            ]);
        }

        if posting.counter.len() != destinations.len() {
            return Err(LedgerError::Internal(format!(
                "{} counter legs but {} destinations",
                posting.counter.len(),
                destinations.len()
            )));
        }

        let mut legs = Vec::with_capacity(destinations.len() + 1);
        legs.push(SplitLeg {
            account: source.clone(),
            value: posting.amount,
            memo: posting.memo.clone(),
        });
        for (leg, destination) in posting.counter.iter().zip(destinations) {
            legs.push(SplitLeg {
                account: destination.clone(),
                value: leg.amount,
                memo: leg.memo.clone(),
            });
        }

        self.balance(tx_guid, legs)
    }

    /// Turn an arbitrary leg set into splits, rejecting anything unbalanced
    pub fn balance(&self, tx_guid: &Guid, legs: Vec<SplitLeg>) -> LedgerResult<Vec<Split>> {
        if legs.len() < 2 {
            return Err(LedgerError::ImbalancedTransaction(format!(
                "{} leg(s) given, a transaction needs at least 2",
                legs.len()
            )));
        }

        let fraction = self.commodity.fraction;
        let values = legs
            .iter()
            .map(|leg| leg.value.convert_to(fraction))
            .collect::<LedgerResult<Vec<_>>>()?;

        let total = RationalAmount::sum(&values, fraction)?;
        if !total.is_zero() {
            return Err(LedgerError::ImbalancedTransaction(format!(
                "legs sum to {} instead of zero",
                total
            )));
        }

        legs.iter()
            .zip(values)
            .map(|(leg, value)| self.split(tx_guid, &leg.account, value, &leg.memo))
            .collect()
    }

    fn split(
        &self,
        tx_guid: &Guid,
        account: &AccountRef,
        value: RationalAmount,
        memo: &str,
    ) -> LedgerResult<Split> {
        if account.commodity_guid.as_ref() != Some(&self.commodity.guid) {
            return Err(LedgerError::CommodityMismatch {
                account: account.path.to_string(),
                expected: self.commodity.mnemonic.clone(),
            });
        }

        Ok(Split {
            guid: new_id(),
            tx_guid: tx_guid.clone(),
            account_guid: account.guid.clone(),
            memo: memo.to_string(),
            action: String::new(),
            reconcile_state: RECONCILE_NEW,
            value,
            quantity: value,
        })
    }
}
