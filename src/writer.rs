// ✍️ Ledger Writer - normalized transaction in, balanced GnuCash rows out
//
// commit() is split in two halves:
// 1. prepare (caller's task, no storage): validate the record, look up the
//    commodity, convert amounts exactly, map category → account path
// 2. apply (write worker, one SQL transaction): idempotency check, resolve
//    accounts, balance splits, insert rows
//
// Anything rejected in half 1 never reaches the queue.

use crate::amount::RationalAmount;
use crate::balancer::{CounterLeg, Posting, SplitBalancer};
use crate::config::LedgerConfig;
use crate::db::{self, IDEMPOTENCY_SLOT};
use crate::entities::account::{AccountPath, AccountType};
use crate::entities::commodity::Commodity;
use crate::entities::transaction::LedgerTransaction;
use crate::error::{LedgerError, LedgerResult};
use crate::guid::{new_id, Guid};
use crate::normalize::NormalizedTransaction;
use crate::queue::{LedgerStore, WorkerHandle, WriteContext, WriteQueue};
use crate::reader::LedgerReader;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

pub const UNCATEGORIZED: &str = "Uncategorized";
const OUTFLOW_ROOT: &str = "Expenses";
const INFLOW_ROOT: &str = "Income";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    pub transaction_id: Guid,

    /// Source split first, then destinations in posting order
    pub split_ids: Vec<Guid>,

    /// Paths of accounts this commit had to create
    pub created_accounts: Vec<String>,
}

pub struct LedgerWriter {
    queue: WriteQueue,
    worker: WorkerHandle,
    commodities: HashMap<String, Commodity>,
    db_path: PathBuf,
    auto_create: bool,
    write_timeout: Option<Duration>,
}

impl LedgerWriter {
    /// Open (bootstrapping if needed) the ledger file and start the write worker
    pub fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let store = LedgerStore::open(&config.db_path, &config.default_currency)?;
        let commodities = store
            .commodities()?
            .into_iter()
            .map(|c| (c.mnemonic.clone(), c))
            .collect::<HashMap<_, _>>();
        let book = store.book().guid.clone();

        let (queue, worker) = WriteQueue::start(store, config.queue_capacity)?;

        info!(
            path = %config.db_path.display(),
            %book,
            commodities = commodities.len(),
            auto_create = config.auto_create_accounts,
            "ledger writer ready"
        );

        Ok(LedgerWriter {
            queue,
            worker,
            commodities,
            db_path: config.db_path.clone(),
            auto_create: config.auto_create_accounts,
            write_timeout: config.write_timeout(),
        })
    }

    /// Commit with the configured write timeout
    pub async fn commit(&self, record: NormalizedTransaction) -> LedgerResult<CommitResult> {
        let deadline = self.write_timeout.map(|timeout| Instant::now() + timeout);
        self.commit_with_deadline(record, deadline).await
    }

    pub async fn commit_with_deadline(
        &self,
        record: NormalizedTransaction,
        deadline: Option<Instant>,
    ) -> LedgerResult<CommitResult> {
        let span = info_span!(
            "commit",
            source = %record.source_account,
            category = %record.category,
            amount = %record.amount,
            currency = %record.currency,
        );

        async move {
            let prepared = self.prepare(&record)?;

            let result = self
                .queue
                .submit(deadline, move |ctx: &mut WriteContext<'_>| prepared.apply(ctx))
                .await;

            match &result {
                Ok(committed) => info!(
                    transaction = %committed.transaction_id,
                    splits = committed.split_ids.len(),
                    created_accounts = committed.created_accounts.len(),
                    "committed transaction"
                ),
                Err(e) => warn!(code = e.code(), error = %e, "commit failed"),
            }

            result
        }
        .instrument(span)
        .await
    }

    /// Everything that can be checked without touching storage
    fn prepare(&self, record: &NormalizedTransaction) -> LedgerResult<PreparedCommit> {
        record.validate()?;

        let commodity = self
            .commodities
            .get(&record.currency)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownCommodity(record.currency.clone()))?;

        let amount = RationalAmount::from_decimal(record.amount, commodity.fraction)?;
        let outflow = amount.is_negative();

        let source = AccountPath::parse(&record.source_account)?;
        let source_type = source.implied_type().unwrap_or(AccountType::Asset);

        let mut destinations = Vec::new();
        let mut counter = Vec::new();
        if record.allocations.is_empty() {
            destinations.push(category_path(&record.category, outflow)?);
        } else {
            for allocation in &record.allocations {
                destinations.push(category_path(&allocation.category, outflow)?);
                counter.push(CounterLeg {
                    amount: RationalAmount::from_decimal(allocation.amount, commodity.fraction)?,
                    memo: allocation.memo.clone().unwrap_or_default(),
                });
            }

            let total = RationalAmount::sum(
                std::iter::once(&amount).chain(counter.iter().map(|leg| &leg.amount)),
                commodity.fraction,
            )?;
            if !total.is_zero() {
                return Err(LedgerError::ImbalancedTransaction(format!(
                    "amount {} and its allocations sum to {} instead of zero",
                    record.amount, total
                )));
            }
        }

        Ok(PreparedCommit {
            post_date: record.date,
            description: record.description.clone(),
            idempotency_key: record.idempotency_key.clone(),
            commodity,
            source: (source, source_type),
            destinations,
            posting: Posting {
                amount,
                memo: record.memo.clone().unwrap_or_default(),
                counter,
            },
            auto_create: self.auto_create,
        })
    }

    /// Query surface over the same file; never goes through the queue
    pub fn reader(&self) -> LedgerReader {
        LedgerReader::new(&self.db_path)
    }

    /// Stop accepting writes, let the worker drain its inbox and exit
    pub async fn shutdown(self) -> LedgerResult<()> {
        let LedgerWriter { queue, worker, .. } = self;
        drop(queue);

        tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|e| LedgerError::Internal(format!("join write worker: {}", e)))??;

        info!("ledger writer shut down");
        Ok(())
    }
}

/// Map a category onto an account path
///
/// "Expenses:Travel" stays as is; "Dining" goes under Expenses for money
/// leaving the source and under Income otherwise; "" becomes *:Uncategorized.
/// A bare root such as "Expenses" is a placeholder, so it also becomes
/// Expenses:Uncategorized.
pub fn category_path(category: &str, outflow: bool) -> LedgerResult<(AccountPath, AccountType)> {
    let base = if outflow { OUTFLOW_ROOT } else { INFLOW_ROOT };

    let path = if category.trim().is_empty() {
        AccountPath::from_segments([base, UNCATEGORIZED])?
    } else {
        let parsed = AccountPath::parse(category)?;
        match parsed.implied_type() {
            Some(_) if parsed.segments().len() == 1 => {
                AccountPath::from_segments([parsed.top_level(), UNCATEGORIZED])?
            }
            Some(_) => parsed,
            None => parsed.under(base),
        }
    };

    let account_type = path.implied_type().unwrap_or(AccountType::Expense);
    Ok((path, account_type))
}

/// A commit that passed every storage-free check
struct PreparedCommit {
    post_date: NaiveDate,
    description: String,
    idempotency_key: Option<String>,
    commodity: Commodity,
    source: (AccountPath, AccountType),
    destinations: Vec<(AccountPath, AccountType)>,
    posting: Posting,
    auto_create: bool,
}

impl PreparedCommit {
    /// Runs on the write worker inside the request's SQL transaction
    fn apply(self, ctx: &mut WriteContext<'_>) -> LedgerResult<CommitResult> {
        if let Some(key) = &self.idempotency_key {
            if let Some(existing) = db::find_by_idempotency_key(ctx.conn(), key)? {
                return Err(LedgerError::DuplicateTransaction {
                    key: key.clone(),
                    existing,
                });
            }
        }

        let (source, destinations, created_accounts) = {
            let mut resolver = ctx.resolver();

            let (path, account_type) = &self.source;
            let source = resolver.resolve(path, *account_type, &self.commodity, self.auto_create)?;

            let destinations = self
                .destinations
                .iter()
                .map(|(path, account_type)| {
                    resolver.resolve(path, *account_type, &self.commodity, self.auto_create)
                })
                .collect::<LedgerResult<Vec<_>>>()?;

            let created = resolver.created().iter().map(ToString::to_string).collect();
            (source, destinations, created)
        };

        let tx_guid = new_id();
        let splits = SplitBalancer::new(&self.commodity).build(
            &tx_guid,
            &self.posting,
            &source,
            &destinations,
        )?;

        let transaction = LedgerTransaction {
            guid: tx_guid,
            currency_guid: self.commodity.guid.clone(),
            currency_fraction: self.commodity.fraction,
            num: String::new(),
            post_date: self.post_date,
            enter_date: Utc::now(),
            description: self.description,
            splits,
        };

        db::insert_transaction(ctx.conn(), &transaction)?;
        if let Some(key) = &self.idempotency_key {
            db::insert_string_slot(ctx.conn(), &transaction.guid, IDEMPOTENCY_SLOT, key)?;
        }

        Ok(CommitResult {
            split_ids: transaction.split_ids(),
            transaction_id: transaction.guid,
            created_accounts,
        })
    }
}
