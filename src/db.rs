// 🗄️ Ledger Database - row-level reads and writes against the GnuCash schema
//
// Every function takes a plain &Connection. Writers pass the open
// rusqlite::Transaction (it derefs to Connection), so the caller decides the
// atomic boundary; nothing here commits on its own.

use crate::amount::RationalAmount;
use crate::entities::account::{Account, AccountPath, AccountTree, AccountType};
use crate::entities::book::Book;
use crate::entities::commodity::Commodity;
use crate::entities::transaction::{LedgerTransaction, Split};
use crate::error::{LedgerError, LedgerResult};
use crate::guid::Guid;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// Slot holding the caller-supplied idempotency key of a transaction
pub const IDEMPOTENCY_SLOT: &str = "ledger-writer/idempotency-key";
pub const DATE_POSTED_SLOT: &str = "date-posted";

const SLOT_TYPE_STRING: i64 = 4;
const SLOT_TYPE_GDATE: i64 = 10;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables that can be counted through `count_rows`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Books,
    Commodities,
    Accounts,
    Transactions,
    Splits,
    Slots,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Books => "books",
            Table::Commodities => "commodities",
            Table::Accounts => "accounts",
            Table::Transactions => "transactions",
            Table::Splits => "splits",
            Table::Slots => "slots",
        }
    }
}

// ============================================================================
// CONNECTIONS
// ============================================================================

/// Open (creating if needed) the ledger file for writing
pub fn open_ledger(path: &Path) -> LedgerResult<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    let conn = Connection::open(path)?;
    // WAL lets readers proceed while the single writer holds its lock
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Open an existing ledger file for queries only
pub fn open_read_only(path: &Path) -> LedgerResult<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

// ============================================================================
// INSERTS
// ============================================================================

pub fn insert_book(conn: &Connection, book: &Book) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO books (guid, root_account_guid, root_template_guid) VALUES (?1, ?2, ?3)",
        params![book.guid, book.root_account_guid, book.root_template_guid],
    )?;
    Ok(())
}

pub fn insert_commodity(conn: &Connection, commodity: &Commodity) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO commodities (
            guid, namespace, mnemonic, fullname, cusip, fraction, quote_flag, quote_source, quote_tz
        ) VALUES (?1, ?2, ?3, ?4, '', ?5, 1, 'currency', '')",
        params![
            commodity.guid,
            commodity.namespace,
            commodity.mnemonic,
            commodity.fullname,
            commodity.fraction,
        ],
    )?;
    Ok(())
}

pub fn insert_account(conn: &Connection, account: &Account) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO accounts (
            guid, name, account_type, commodity_guid, commodity_scu, non_std_scu,
            parent_guid, code, description, hidden, placeholder
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            account.guid,
            account.name,
            account.account_type.as_str(),
            account.commodity_guid,
            account.commodity_scu,
            account.non_std_scu,
            account.parent_guid,
            account.code,
            account.description,
            account.hidden,
            account.placeholder,
        ],
    )?;
    Ok(())
}

/// Insert the transaction row, every split row and the date-posted slot
///
/// The transaction is validated first so an unbalanced set never reaches SQL.
pub fn insert_transaction(conn: &Connection, tx: &LedgerTransaction) -> LedgerResult<()> {
    tx.validate()?;

    conn.execute(
        "INSERT INTO transactions (guid, currency_guid, num, post_date, enter_date, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tx.guid,
            tx.currency_guid,
            tx.num,
            tx.post_timestamp(),
            tx.enter_timestamp(),
            tx.description,
        ],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO splits (
            guid, tx_guid, account_guid, memo, action, reconcile_state, reconcile_date,
            value_num, value_denom, quantity_num, quantity_denom, lot_guid
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, NULL)",
    )?;

    for split in &tx.splits {
        stmt.execute(params![
            split.guid,
            split.tx_guid,
            split.account_guid,
            split.memo,
            split.action,
            split.reconcile_state.to_string(),
            split.value.numerator(),
            split.value.denominator(),
            split.quantity.numerator(),
            split.quantity.denominator(),
        ])?;
    }

    conn.execute(
        "INSERT INTO slots (obj_guid, name, slot_type, gdate_val) VALUES (?1, ?2, ?3, ?4)",
        params![tx.guid, DATE_POSTED_SLOT, SLOT_TYPE_GDATE, tx.gdate()],
    )?;

    Ok(())
}

pub fn insert_string_slot(
    conn: &Connection,
    obj_guid: &Guid,
    name: &str,
    value: &str,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO slots (obj_guid, name, slot_type, string_val) VALUES (?1, ?2, ?3, ?4)",
        params![obj_guid, name, SLOT_TYPE_STRING, value],
    )?;
    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn load_book(conn: &Connection) -> LedgerResult<Option<Book>> {
    let book = conn
        .query_row(
            "SELECT guid, root_account_guid, root_template_guid FROM books LIMIT 1",
            [],
            |row| {
                Ok(Book {
                    guid: row.get(0)?,
                    root_account_guid: row.get(1)?,
                    root_template_guid: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(book)
}

pub fn load_commodities(conn: &Connection) -> LedgerResult<Vec<Commodity>> {
    let mut stmt = conn.prepare(
        "SELECT guid, namespace, mnemonic, COALESCE(fullname, ''), fraction
         FROM commodities
         ORDER BY mnemonic",
    )?;

    let commodities = stmt
        .query_map([], |row| {
            Ok(Commodity {
                guid: row.get(0)?,
                namespace: row.get(1)?,
                mnemonic: row.get(2)?,
                fullname: row.get(3)?,
                fraction: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(commodities)
}

/// Build the in-memory arena for the book's account tree
pub fn load_account_tree(conn: &Connection, book: &Book) -> LedgerResult<AccountTree> {
    let mut stmt = conn.prepare(
        "SELECT guid, name, account_type, commodity_guid, commodity_scu, non_std_scu,
                parent_guid, COALESCE(code, ''), COALESCE(description, ''),
                COALESCE(hidden, 0), COALESCE(placeholder, 0)
         FROM accounts",
    )?;

    let accounts = stmt
        .query_map([], account_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let root = accounts
        .iter()
        .find(|a| a.guid == book.root_account_guid)
        .cloned()
        .ok_or(LedgerError::BookMissing)?;

    let mut tree = AccountTree::new(root);
    for account in accounts {
        if account.guid == book.root_account_guid || account.guid == book.root_template_guid {
            continue;
        }
        tree.insert(account);
    }

    Ok(tree)
}

pub fn load_account(conn: &Connection, guid: &Guid) -> LedgerResult<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT guid, name, account_type, commodity_guid, commodity_scu, non_std_scu,
                    parent_guid, COALESCE(code, ''), COALESCE(description, ''),
                    COALESCE(hidden, 0), COALESCE(placeholder, 0)
             FROM accounts
             WHERE guid = ?1",
            params![guid],
            account_from_row,
        )
        .optional()?;

    Ok(account)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    let type_name: String = row.get(2)?;
    let account_type = type_name
        .parse::<AccountType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Account {
        guid: row.get(0)?,
        name: row.get(1)?,
        account_type,
        commodity_guid: row.get(3)?,
        commodity_scu: row.get(4)?,
        non_std_scu: row.get(5)?,
        parent_guid: row.get(6)?,
        code: row.get(7)?,
        description: row.get(8)?,
        hidden: row.get(9)?,
        placeholder: row.get(10)?,
    })
}

/// Walk `path` from `root` with one query per segment
pub fn lookup_account_path(
    conn: &Connection,
    root: &Guid,
    path: &AccountPath,
) -> LedgerResult<Option<Guid>> {
    let mut stmt =
        conn.prepare_cached("SELECT guid FROM accounts WHERE parent_guid = ?1 AND name = ?2")?;

    let mut current = root.clone();
    for segment in path.segments() {
        let next: Option<Guid> = stmt
            .query_row(params![current, segment], |row| row.get(0))
            .optional()?;

        match next {
            Some(guid) => current = guid,
            None => return Ok(None),
        }
    }

    Ok(Some(current))
}

pub fn find_by_idempotency_key(conn: &Connection, key: &str) -> LedgerResult<Option<Guid>> {
    let guid = conn
        .query_row(
            "SELECT obj_guid FROM slots WHERE name = ?1 AND string_val = ?2 LIMIT 1",
            params![IDEMPOTENCY_SLOT, key],
            |row| row.get(0),
        )
        .optional()?;

    Ok(guid)
}

const SPLIT_COLUMNS: &str = "s.guid, s.tx_guid, s.account_guid, s.memo, s.action, s.reconcile_state,
     s.value_num, s.value_denom, s.quantity_num, s.quantity_denom";

/// Splits posted to an account, oldest transaction first
pub fn account_splits(conn: &Connection, account_guid: &Guid) -> LedgerResult<Vec<Split>> {
    let sql = format!(
        "SELECT {} FROM splits s
         JOIN transactions t ON t.guid = s.tx_guid
         WHERE s.account_guid = ?1
         ORDER BY t.post_date, t.enter_date, s.rowid",
        SPLIT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let splits = stmt
        .query_map(params![account_guid], split_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(splits)
}

/// Splits of one transaction in insertion order
pub fn transaction_splits(conn: &Connection, tx_guid: &Guid) -> LedgerResult<Vec<Split>> {
    let sql = format!(
        "SELECT {} FROM splits s WHERE s.tx_guid = ?1 ORDER BY s.rowid",
        SPLIT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let splits = stmt
        .query_map(params![tx_guid], split_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(splits)
}

fn split_from_row(row: &Row<'_>) -> rusqlite::Result<Split> {
    let reconcile: String = row.get(5)?;

    Ok(Split {
        guid: row.get(0)?,
        tx_guid: row.get(1)?,
        account_guid: row.get(2)?,
        memo: row.get(3)?,
        action: row.get(4)?,
        reconcile_state: reconcile.chars().next().unwrap_or('n'),
        value: amount_from_row(row, 6, 7)?,
        quantity: amount_from_row(row, 8, 9)?,
    })
}

fn amount_from_row(row: &Row<'_>, num: usize, denom: usize) -> rusqlite::Result<RationalAmount> {
    RationalAmount::new(row.get(num)?, row.get(denom)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(denom, Type::Integer, Box::new(e)))
}

pub fn count_rows(conn: &Connection, table: Table) -> LedgerResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}
