// 🔎 Ledger Reader - read-only queries that bypass the write queue
//
// Each call opens its own SQLITE_OPEN_READ_ONLY connection; WAL mode lets it
// read a consistent snapshot while the worker keeps writing.

use crate::amount::RationalAmount;
use crate::db::{self, Table};
use crate::entities::account::{AccountPath, AccountRef};
use crate::entities::transaction::Split;
use crate::error::{LedgerError, LedgerResult};
use crate::guid::Guid;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub path: PathBuf,
    pub exists: bool,
    pub writable: bool,
    pub book_present: bool,
    pub accounts: i64,
    pub transactions: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.exists && self.writable && self.book_present
    }
}

pub struct LedgerReader {
    path: PathBuf,
}

impl LedgerReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LedgerReader { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> LedgerResult<Connection> {
        db::open_read_only(&self.path)
    }

    /// Is the ledger file present, writable and bootstrapped?
    pub fn health(&self) -> HealthReport {
        let mut report = HealthReport {
            path: self.path.clone(),
            exists: false,
            writable: false,
            book_present: false,
            accounts: 0,
            transactions: 0,
            error: None,
        };

        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.exists = metadata.is_file();
        report.writable = report.exists && !metadata.permissions().readonly();

        let counts = self.connect().and_then(|conn| {
            let book = db::load_book(&conn)?;
            let accounts = db::count_rows(&conn, Table::Accounts)?;
            let transactions = db::count_rows(&conn, Table::Transactions)?;
            Ok((book.is_some(), accounts, transactions))
        });

        match counts {
            Ok((book_present, accounts, transactions)) => {
                report.book_present = book_present;
                report.accounts = accounts;
                report.transactions = transactions;
            }
            Err(e) => report.error = Some(e.to_string()),
        }

        report
    }

    pub fn resolve_account_path(&self, path: &str) -> LedgerResult<Option<AccountRef>> {
        let path = AccountPath::parse(path)?;
        let conn = self.connect()?;
        let book = db::load_book(&conn)?.ok_or(LedgerError::BookMissing)?;

        let Some(guid) = db::lookup_account_path(&conn, &book.root_account_guid, &path)? else {
            return Ok(None);
        };

        let account = db::load_account(&conn, &guid)?
            .ok_or_else(|| LedgerError::Internal(format!("account {} vanished", guid)))?;

        Ok(Some(AccountRef {
            guid,
            path,
            account_type: account.account_type,
            commodity_guid: account.commodity_guid,
        }))
    }

    pub fn account_splits(&self, account: &Guid) -> LedgerResult<Vec<Split>> {
        db::account_splits(&self.connect()?, account)
    }

    pub fn transaction_splits(&self, transaction: &Guid) -> LedgerResult<Vec<Split>> {
        db::transaction_splits(&self.connect()?, transaction)
    }

    /// Sum of every split quantity posted to `account`, in its commodity unit
    pub fn account_balance(&self, account: &Guid) -> LedgerResult<RationalAmount> {
        let conn = self.connect()?;
        let scu = db::load_account(&conn, account)?
            .ok_or_else(|| LedgerError::UnmappedAccount(account.to_string()))?
            .commodity_scu;

        let splits = db::account_splits(&conn, account)?;
        RationalAmount::sum(splits.iter().map(|s| &s.quantity), scu)
    }

    pub fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Guid>> {
        db::find_by_idempotency_key(&self.connect()?, key)
    }

    pub fn count(&self, table: Table) -> LedgerResult<i64> {
        db::count_rows(&self.connect()?, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::account::AccountType;
    use crate::queue::LedgerStore;
    use tempfile::TempDir;

    fn bootstrapped() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.gnucash");
        LedgerStore::open(&path, "USD").unwrap();
        (dir, path)
    }

    #[test]
    fn test_health_of_missing_file() {
        let dir = TempDir::new().unwrap();
        let report = LedgerReader::new(dir.path().join("absent.gnucash")).health();

        assert!(!report.exists);
        assert!(!report.is_healthy());
        assert!(report.error.is_some());
    }

    #[test]
    fn test_health_of_bootstrapped_file() {
        let (_dir, path) = bootstrapped();
        let report = LedgerReader::new(&path).health();

        assert!(report.is_healthy(), "{:?}", report);
        assert_eq!(report.transactions, 0);
        assert!(report.accounts > 0);
    }

    #[test]
    fn test_resolve_account_path() {
        let (_dir, path) = bootstrapped();
        let reader = LedgerReader::new(&path);

        let card = reader
            .resolve_account_path("Liabilities:Credit Card")
            .unwrap()
            .unwrap();
        assert_eq!(card.account_type, AccountType::Credit);
        assert_eq!(card.path.to_string(), "Liabilities:Credit Card");

        assert!(reader.resolve_account_path("Assets:Brokerage").unwrap().is_none());
        assert!(reader.resolve_account_path("Assets::").is_err());
    }

    #[test]
    fn test_balance_of_empty_account_is_zero() {
        let (_dir, path) = bootstrapped();
        let reader = LedgerReader::new(&path);

        let checking = reader.resolve_account_path("Assets:Checking").unwrap().unwrap();
        let balance = reader.account_balance(&checking.guid).unwrap();

        assert!(balance.is_zero());
        assert_eq!(balance.denominator(), 100);
        assert_eq!(reader.count(Table::Splits).unwrap(), 0);
    }
}
