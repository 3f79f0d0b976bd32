// 📐 GnuCash Schema - tables, indexes and one-time book bootstrap
//
// Table layout and index names follow the GnuCash SQL backend so the desktop
// application can open the file directly. Amount columns are integer pairs
// (value_num/value_denom); there is no REAL column anywhere in the ledger.

use crate::db;
use crate::entities::account::{Account, AccountType};
use crate::entities::book::Book;
use crate::entities::commodity::{is_currency_code, Commodity};
use crate::error::{LedgerError, LedgerResult};
use crate::guid::new_id;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gnclock (
    hostname varchar(255),
    pid int
);

CREATE TABLE IF NOT EXISTS versions (
    table_name text(50) PRIMARY KEY NOT NULL,
    table_version integer NOT NULL
);

CREATE TABLE IF NOT EXISTS books (
    guid text(32) PRIMARY KEY NOT NULL,
    root_account_guid text(32) NOT NULL,
    root_template_guid text(32) NOT NULL
);

CREATE TABLE IF NOT EXISTS commodities (
    guid text(32) PRIMARY KEY NOT NULL,
    namespace text(2048) NOT NULL,
    mnemonic text(2048) NOT NULL,
    fullname text(2048),
    cusip text(2048),
    fraction integer NOT NULL,
    quote_flag integer NOT NULL,
    quote_source text(2048),
    quote_tz text(2048)
);

CREATE TABLE IF NOT EXISTS accounts (
    guid text(32) PRIMARY KEY NOT NULL,
    name text(2048) NOT NULL,
    account_type text(2048) NOT NULL,
    commodity_guid text(32),
    commodity_scu integer NOT NULL,
    non_std_scu integer NOT NULL,
    parent_guid text(32),
    code text(2048),
    description text(2048),
    hidden integer,
    placeholder integer
);

CREATE TABLE IF NOT EXISTS transactions (
    guid text(32) PRIMARY KEY NOT NULL,
    currency_guid text(32) NOT NULL,
    num text(2048) NOT NULL,
    post_date text(19),
    enter_date text(19),
    description text(2048)
);

CREATE INDEX IF NOT EXISTS tx_post_date_index ON transactions(post_date);

CREATE TABLE IF NOT EXISTS splits (
    guid text(32) PRIMARY KEY NOT NULL,
    tx_guid text(32) NOT NULL,
    account_guid text(32) NOT NULL,
    memo text(2048) NOT NULL,
    action text(2048) NOT NULL,
    reconcile_state text(1) NOT NULL,
    reconcile_date text(19),
    value_num bigint NOT NULL,
    value_denom bigint NOT NULL,
    quantity_num bigint NOT NULL,
    quantity_denom bigint NOT NULL,
    lot_guid text(32)
);

CREATE INDEX IF NOT EXISTS splits_tx_guid_index ON splits(tx_guid);
CREATE INDEX IF NOT EXISTS splits_account_guid_index ON splits(account_guid);

CREATE TABLE IF NOT EXISTS slots (
    id integer PRIMARY KEY AUTOINCREMENT NOT NULL,
    obj_guid text(32) NOT NULL,
    name text(4096) NOT NULL,
    slot_type integer NOT NULL,
    int64_val bigint,
    string_val text(4096),
    double_val float8,
    timespec_val text(19),
    guid_val text(32),
    numeric_val_num bigint,
    numeric_val_denom bigint,
    gdate_val text(8)
);

CREATE INDEX IF NOT EXISTS slots_guid_index ON slots(obj_guid);

CREATE TABLE IF NOT EXISTS lots (
    guid text(32) PRIMARY KEY NOT NULL,
    account_guid text(32),
    is_closed integer NOT NULL
);
";

/// Table versions the GnuCash SQL backend checks on open
const TABLE_VERSIONS: [(&str, i64); 9] = [
    ("Gnucash", 4_000_000),
    ("Gnucash-Resave", 19_920),
    ("books", 1),
    ("commodities", 1),
    ("accounts", 1),
    ("transactions", 4),
    ("splits", 5),
    ("slots", 4),
    ("lots", 2),
];

/// Chart created with a new book: (path, type, placeholder)
pub const DEFAULT_CHART: [(&str, AccountType, bool); 10] = [
    ("Assets", AccountType::Asset, true),
    ("Assets:Checking", AccountType::Bank, false),
    ("Liabilities", AccountType::Liability, true),
    ("Liabilities:Credit Card", AccountType::Credit, false),
    ("Income", AccountType::Income, true),
    ("Income:Uncategorized", AccountType::Income, false),
    ("Expenses", AccountType::Expense, true),
    ("Expenses:Uncategorized", AccountType::Expense, false),
    ("Equity", AccountType::Equity, true),
    ("Equity:Opening Balances", AccountType::Equity, false),
];

pub fn create_schema(conn: &Connection) -> LedgerResult<()> {
    conn.execute_batch(SCHEMA)?;

    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO versions (table_name, table_version) VALUES (?1, ?2)")?;
    for (table, version) in TABLE_VERSIONS {
        stmt.execute(rusqlite::params![table, version])?;
    }

    Ok(())
}

/// Create schema, book, default currency, roots and default chart exactly once
///
/// Returns the existing book untouched when the file was already bootstrapped.
pub fn bootstrap(conn: &mut Connection, default_currency: &str) -> LedgerResult<Book> {
    if !is_currency_code(default_currency) {
        return Err(LedgerError::InvalidRecord(format!(
            "'{}' is not an ISO 4217 currency code",
            default_currency
        )));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    create_schema(&tx)?;

    if let Some(book) = db::load_book(&tx)? {
        tx.commit()?;
        return Ok(book);
    }

    let commodity = Commodity::currency(default_currency);
    let root = Account::root(&commodity);
    let template_root = Account::template_root();
    let book = Book {
        guid: new_id(),
        root_account_guid: root.guid.clone(),
        root_template_guid: template_root.guid.clone(),
    };

    db::insert_commodity(&tx, &commodity)?;
    db::insert_account(&tx, &root)?;
    db::insert_account(&tx, &template_root)?;
    db::insert_book(&tx, &book)?;

    // Parents precede children in DEFAULT_CHART
    let mut created: Vec<(String, Account)> = Vec::new();
    for (path, account_type, placeholder) in DEFAULT_CHART {
        let (parent_path, name) = match path.rsplit_once(':') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, path),
        };

        let parent_guid = match parent_path {
            None => root.guid.clone(),
            Some(parent) => created
                .iter()
                .find(|(p, _)| p == parent)
                .map(|(_, account)| account.guid.clone())
                .ok_or_else(|| LedgerError::Internal(format!("chart parent '{}' missing", parent)))?,
        };

        let account = Account::child(&parent_guid, name, account_type, &commodity)
            .with_placeholder(placeholder);
        db::insert_account(&tx, &account)?;
        created.push((path.to_string(), account));
    }

    tx.commit()?;

    info!(
        book = %book.guid,
        currency = %commodity.mnemonic,
        accounts = created.len(),
        "bootstrapped new ledger book"
    );

    Ok(book)
}
