// File-backed tests of the full commit path: writer → queue → SQLite

use chrono::NaiveDate;
use futures::future::join_all;
use ledger_writer::{
    AccountType, Guid, LedgerConfig, LedgerError, LedgerReader, LedgerWriter,
    NormalizedTransaction, RationalAmount, Table,
};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

struct Ledger {
    _dir: TempDir,
    path: PathBuf,
    writer: LedgerWriter,
}

impl Ledger {
    fn open(auto_create: bool) -> Ledger {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("finance.gnucash");
        let config = LedgerConfig {
            auto_create_accounts: auto_create,
            ..LedgerConfig::default()
        }
        .with_db_path(&path);

        Ledger {
            writer: LedgerWriter::open(&config).unwrap(),
            path,
            _dir: dir,
        }
    }

    fn reader(&self) -> LedgerReader {
        self.writer.reader()
    }

    fn raw(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }

    fn account(&self, path: &str) -> Option<Guid> {
        self.reader()
            .resolve_account_path(path)
            .unwrap()
            .map(|account| account.guid)
    }
}

fn record(amount: Decimal, category: &str) -> NormalizedTransaction {
    NormalizedTransaction::new(
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        amount,
        "USD",
        "Assets:Checking",
        category,
    )
    .with_description("STARBUCKS #12345")
}

fn cents(n: i64) -> RationalAmount {
    RationalAmount::new(n, 100).unwrap()
}

fn is_guid(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_simple_expense_posts_two_balanced_splits() {
    let ledger = Ledger::open(true);

    let result = ledger.writer.commit(record(dec!(-10.50), "Dining")).await.unwrap();

    let checking = ledger.account("Assets:Checking").unwrap();
    let dining = ledger.account("Expenses:Dining").unwrap();

    let splits = ledger.reader().transaction_splits(&result.transaction_id).unwrap();
    assert_eq!(splits.len(), 2);

    assert_eq!(splits[0].account_guid, checking);
    assert_eq!(splits[0].value.numerator(), -1050);
    assert_eq!(splits[0].value.denominator(), 100);

    assert_eq!(splits[1].account_guid, dining);
    assert_eq!(splits[1].value.numerator(), 1050);
    assert_eq!(splits[1].value.denominator(), 100);

    assert!(splits.iter().all(|s| s.tx_guid == result.transaction_id));
    assert_eq!(
        splits.iter().map(|s| s.guid.clone()).collect::<Vec<_>>(),
        result.split_ids
    );

    let dining_type = ledger
        .reader()
        .resolve_account_path("Expenses:Dining")
        .unwrap()
        .unwrap()
        .account_type;
    assert_eq!(dining_type, AccountType::Expense);
}

#[tokio::test]
async fn test_unmapped_category_without_auto_create_writes_nothing() {
    let ledger = Ledger::open(false);
    let accounts_before = ledger.reader().count(Table::Accounts).unwrap();

    let err = ledger
        .writer
        .commit(record(dec!(-10.50), "Unmapped:Category"))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::UnmappedAccount(ref p) if p == "Expenses:Unmapped:Category"));
    assert_eq!(ledger.reader().count(Table::Accounts).unwrap(), accounts_before);
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 0);
    assert_eq!(ledger.reader().count(Table::Splits).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_concurrent_commits_on_one_account() {
    let ledger = Ledger::open(true);

    let (first, second) = tokio::join!(
        ledger.writer.commit(record(dec!(-4.25), "Dining")),
        ledger.writer.commit(record(dec!(-19.99), "Groceries")),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first.transaction_id, second.transaction_id);

    let checking = ledger.account("Assets:Checking").unwrap();
    let posted: HashSet<Guid> = ledger
        .reader()
        .account_splits(&checking)
        .unwrap()
        .into_iter()
        .map(|s| s.tx_guid)
        .collect();

    assert!(posted.contains(&first.transaction_id));
    assert!(posted.contains(&second.transaction_id));
    assert_eq!(ledger.reader().account_balance(&checking).unwrap(), cents(-2424));
}

#[tokio::test]
async fn test_storage_failure_rolls_back_and_next_commit_succeeds() {
    let ledger = Ledger::open(true);

    ledger
        .raw()
        .execute_batch(
            "CREATE TRIGGER simulated_disk_failure BEFORE INSERT ON splits
             WHEN NEW.value_num = 424242
             BEGIN SELECT RAISE(ABORT, 'simulated disk failure'); END;",
        )
        .unwrap();

    let err = ledger
        .writer
        .commit(record(dec!(4242.42), "Consulting"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert!(err.is_retryable());

    // Nothing from the failed write survived, not even the new account
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 0);
    assert_eq!(ledger.reader().count(Table::Splits).unwrap(), 0);
    assert!(ledger.account("Income:Consulting").is_none());

    let ok = ledger.writer.commit(record(dec!(-10.50), "Dining")).await.unwrap();
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 1);
    assert_eq!(ok.created_accounts, vec!["Expenses:Dining".to_string()]);

    // The rolled-back account is created again rather than referenced stale
    let retry = ledger
        .writer
        .commit(record(dec!(100.00), "Consulting"))
        .await
        .unwrap();
    assert_eq!(retry.created_accounts, vec!["Income:Consulting".to_string()]);
}

#[tokio::test]
async fn test_sub_cent_amount_rejected_before_storage() {
    let ledger = Ledger::open(true);
    let accounts_before = ledger.reader().count(Table::Accounts).unwrap();

    let err = ledger
        .writer
        .commit(record(dec!(10.505), "Dining"))
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::PrecisionError { denominator: 100, .. }));
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 0);
    assert_eq!(ledger.reader().count(Table::Accounts).unwrap(), accounts_before);
}

#[tokio::test]
async fn test_unbalanced_allocations_rejected_before_storage() {
    let ledger = Ledger::open(true);
    let accounts_before = ledger.reader().count(Table::Accounts).unwrap();

    // Any account insert from this commit would surface as a storage error
    ledger
        .raw()
        .execute_batch(
            "CREATE TRIGGER no_account_writes BEFORE INSERT ON accounts
             BEGIN SELECT RAISE(ABORT, 'accounts touched'); END;",
        )
        .unwrap();

    let unbalanced = record(dec!(-110.00), "Travel").with_allocation("Travel", dec!(100.00), None);
    let err = ledger.writer.commit(unbalanced).await.unwrap_err();

    assert!(matches!(err, LedgerError::ImbalancedTransaction(_)));
    assert_eq!(ledger.reader().count(Table::Accounts).unwrap(), accounts_before);
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 0);
    assert!(ledger.account("Expenses:Travel").is_none());
}

// ============================================================================
// CONCURRENCY / IDEMPOTENCY / TIMEOUT
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_concurrent_commits_keep_balances_exact() {
    const N: i64 = 50;
    let ledger = Ledger::open(true);
    let writer = Arc::new(ledger.writer);

    let handles = (1..=N).map(|i| {
        let writer = writer.clone();
        tokio::spawn(async move {
            let amount = Decimal::new(-i, 2);
            writer.commit(record(amount, "Dining")).await
        })
    });

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let tx_ids: HashSet<_> = results.iter().map(|r| r.transaction_id.clone()).collect();
    assert_eq!(tx_ids.len(), N as usize);

    let created: usize = results.iter().map(|r| r.created_accounts.len()).sum();
    assert_eq!(created, 1, "Expenses:Dining created exactly once");

    let reader = writer.reader();
    assert_eq!(reader.count(Table::Transactions).unwrap(), N);
    assert_eq!(reader.count(Table::Splits).unwrap(), 2 * N);

    let total_cents: i64 = (1..=N).sum();
    let checking = reader.resolve_account_path("Assets:Checking").unwrap().unwrap();
    let dining = reader.resolve_account_path("Expenses:Dining").unwrap().unwrap();
    assert_eq!(reader.account_balance(&checking.guid).unwrap(), cents(-total_cents));
    assert_eq!(reader.account_balance(&dining.guid).unwrap(), cents(total_cents));

    // Every transaction sums to exactly zero
    for tx in &tx_ids {
        let splits = reader.transaction_splits(tx).unwrap();
        let sum = RationalAmount::sum(splits.iter().map(|s| &s.value), 100).unwrap();
        assert!(sum.is_zero());
    }
}

#[tokio::test]
async fn test_idempotency_key_replay_is_rejected() {
    let ledger = Ledger::open(true);
    let tagged = record(dec!(-10.50), "Dining").with_idempotency_key("stmt-2024-12/row-7");

    let first = ledger.writer.commit(tagged.clone()).await.unwrap();
    let err = ledger.writer.commit(tagged).await.unwrap_err();

    match err {
        LedgerError::DuplicateTransaction { key, existing } => {
            assert_eq!(key, "stmt-2024-12/row-7");
            assert_eq!(existing, first.transaction_id);
        }
        other => panic!("expected DuplicateTransaction, got {:?}", other),
    }

    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 1);
    assert_eq!(
        ledger.reader().find_by_idempotency_key("stmt-2024-12/row-7").unwrap(),
        Some(first.transaction_id)
    );
}

#[tokio::test]
async fn test_expired_deadline_never_writes() {
    let ledger = Ledger::open(true);
    let already_passed = Instant::now() - Duration::from_millis(1);

    let err = ledger
        .writer
        .commit_with_deadline(record(dec!(-10.50), "Dining"), Some(already_passed))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Timeout));

    // Queue is FIFO: once this commit lands the expired one was already skipped
    ledger.writer.commit(record(dec!(-1.00), "Coffee")).await.unwrap();
    assert_eq!(ledger.reader().count(Table::Transactions).unwrap(), 1);
    assert!(ledger.account("Expenses:Dining").is_none());
}

// ============================================================================
// ON-DISK CONTRACT
// ============================================================================

#[tokio::test]
async fn test_rows_follow_gnucash_conventions() {
    let ledger = Ledger::open(true);
    let result = ledger
        .writer
        .commit(record(dec!(-10.50), "Dining").with_description("STARBUCKS #12345"))
        .await
        .unwrap();

    let conn = ledger.raw();
    let (post_date, num, description): (String, String, String) = conn
        .query_row(
            "SELECT post_date, num, description FROM transactions WHERE guid = ?1",
            params![result.transaction_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(post_date, "2024-12-31 10:59:00");
    assert_eq!(num, "");
    assert_eq!(description, "STARBUCKS #12345");

    let (slot_type, gdate): (i64, String) = conn
        .query_row(
            "SELECT slot_type, gdate_val FROM slots WHERE obj_guid = ?1 AND name = 'date-posted'",
            params![result.transaction_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(slot_type, 10);
    assert_eq!(gdate, "20241231");

    let states: Vec<String> = conn
        .prepare("SELECT reconcile_state FROM splits WHERE tx_guid = ?1")
        .unwrap()
        .query_map(params![result.transaction_id], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(states, vec!["n".to_string(), "n".to_string()]);
}

#[tokio::test]
async fn test_identifiers_are_unique_hex_across_tables() {
    let ledger = Ledger::open(true);
    for category in ["Dining", "Travel", "Salary"] {
        ledger.writer.commit(record(dec!(-3.00), category)).await.unwrap();
    }

    let conn = ledger.raw();
    let mut ids = Vec::new();
    for table in ["books", "commodities", "accounts", "transactions", "splits"] {
        let mut stmt = conn.prepare(&format!("SELECT guid FROM {}", table)).unwrap();
        let guids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        ids.extend(guids);
    }

    assert!(ids.iter().all(|id| is_guid(id)), "malformed id in {:?}", ids);
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test]
async fn test_reopening_keeps_book_and_accounts() {
    let dir = TempDir::new().unwrap();
    let config = LedgerConfig::default().with_db_path(dir.path().join("finance.gnucash"));

    let writer = LedgerWriter::open(&config).unwrap();
    writer.commit(record(dec!(-10.50), "Dining")).await.unwrap();
    writer.shutdown().await.unwrap();

    let reopened = LedgerWriter::open(&config).unwrap();
    let again = reopened.commit(record(dec!(-2.00), "Dining")).await.unwrap();
    assert!(again.created_accounts.is_empty());

    let reader = reopened.reader();
    assert_eq!(reader.count(Table::Books).unwrap(), 1);
    assert_eq!(reader.count(Table::Transactions).unwrap(), 2);
}
