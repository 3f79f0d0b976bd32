// 🧭 Account Resolver - semantic path → account, creating missing nodes
//
// Runs only inside the write worker: the tree it mutates and the SQL
// transaction it inserts into both belong to the request being applied.
// Created nodes are STAGED in the arena; the worker commits or drops them
// together with the SQL transaction, so a split can never point at an account
// that was rolled back.

use crate::db;
use crate::entities::account::{Account, AccountPath, AccountRef, AccountTree, AccountType};
use crate::entities::commodity::Commodity;
use crate::error::{LedgerError, LedgerResult};
use rusqlite::Connection;
use tracing::debug;

pub struct AccountResolver<'a> {
    tree: &'a mut AccountTree,
    conn: &'a Connection,
}

impl<'a> AccountResolver<'a> {
    pub fn new(tree: &'a mut AccountTree, conn: &'a Connection) -> Self {
        AccountResolver { tree, conn }
    }

    /// Walk `path` from the root, creating missing segments when `auto_create`
    ///
    /// Missing segments get `account_type` and `commodity`. Resolving the same
    /// path again returns the same guid and never adds a sibling.
    pub fn resolve(
        &mut self,
        path: &AccountPath,
        account_type: AccountType,
        commodity: &Commodity,
        auto_create: bool,
    ) -> LedgerResult<AccountRef> {
        if let Some(existing) = self.tree.find(path) {
            return Ok(existing);
        }

        if !auto_create {
            return Err(LedgerError::UnmappedAccount(path.to_string()));
        }

        let mut current = self.tree.root().clone();
        for segment in path.segments() {
            let next = match self.tree.child(&current, segment) {
                Some(existing) => existing.guid.clone(),
                None => {
                    let account = Account::child(&current, segment, account_type, commodity);
                    db::insert_account(self.conn, &account)?;
                    debug!(
                        account = %account.guid,
                        name = %account.name,
                        account_type = account.account_type.as_str(),
                        "created account"
                    );
                    self.tree.stage(account)
                }
            };
            current = next;
        }

        self.tree.reference(&current).ok_or_else(|| {
            LedgerError::Internal(format!("account '{}' vanished after creation", path))
        })
    }

    /// Paths of the accounts created since the tree last committed
    pub fn created(&self) -> Vec<AccountPath> {
        self.tree
            .staged()
            .iter()
            .filter_map(|guid| self.tree.path_of(guid))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, load_account_tree, load_commodities, Table};
    use crate::schema::bootstrap;

    fn ledger() -> (Connection, AccountTree, Commodity) {
        let mut conn = Connection::open_in_memory().unwrap();
        let book = bootstrap(&mut conn, "USD").unwrap();
        let tree = load_account_tree(&conn, &book).unwrap();
        let usd = load_commodities(&conn).unwrap().remove(0);
        (conn, tree, usd)
    }

    fn path(raw: &str) -> AccountPath {
        AccountPath::parse(raw).unwrap()
    }

    #[test]
    fn test_resolve_existing_account() {
        let (conn, mut tree, usd) = ledger();
        let before = count_rows(&conn, Table::Accounts).unwrap();

        let mut resolver = AccountResolver::new(&mut tree, &conn);
        let checking = resolver
            .resolve(&path("Assets:Checking"), AccountType::Asset, &usd, false)
            .unwrap();

        assert_eq!(checking.account_type, AccountType::Bank);
        assert!(resolver.created().is_empty());
        assert_eq!(count_rows(&conn, Table::Accounts).unwrap(), before);
    }

    #[test]
    fn test_resolve_creates_missing_segments() {
        let (conn, mut tree, usd) = ledger();
        let before = count_rows(&conn, Table::Accounts).unwrap();

        let mut resolver = AccountResolver::new(&mut tree, &conn);
        let dining = resolver
            .resolve(&path("Expenses:Food:Dining"), AccountType::Expense, &usd, true)
            .unwrap();

        assert_eq!(dining.path.to_string(), "Expenses:Food:Dining");
        assert_eq!(dining.commodity_guid.as_ref(), Some(&usd.guid));
        assert_eq!(resolver.created().len(), 2);
        assert_eq!(count_rows(&conn, Table::Accounts).unwrap(), before + 2);
    }

    #[test]
    fn test_resolve_twice_never_duplicates_siblings() {
        let (conn, mut tree, usd) = ledger();

        let first = AccountResolver::new(&mut tree, &conn)
            .resolve(&path("Expenses:Dining"), AccountType::Expense, &usd, true)
            .unwrap();
        tree.commit_staged();

        let second = AccountResolver::new(&mut tree, &conn)
            .resolve(&path("Expenses:Dining"), AccountType::Expense, &usd, true)
            .unwrap();

        assert_eq!(first.guid, second.guid);

        let siblings: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM accounts WHERE name = 'Dining'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(siblings, 1);
    }

    #[test]
    fn test_unmapped_without_auto_create() {
        let (conn, mut tree, usd) = ledger();
        let before = count_rows(&conn, Table::Accounts).unwrap();

        let err = AccountResolver::new(&mut tree, &conn)
            .resolve(&path("Expenses:Unmapped:Category"), AccountType::Expense, &usd, false)
            .unwrap_err();

        assert!(matches!(err, LedgerError::UnmappedAccount(p) if p == "Expenses:Unmapped:Category"));
        assert_eq!(count_rows(&conn, Table::Accounts).unwrap(), before);
    }

    #[test]
    fn test_created_accounts_vanish_on_rollback() {
        let (mut conn, mut tree, usd) = ledger();
        let before = count_rows(&conn, Table::Accounts).unwrap();

        {
            let tx = conn.transaction().unwrap();
            AccountResolver::new(&mut tree, &tx)
                .resolve(&path("Expenses:Travel"), AccountType::Expense, &usd, true)
                .unwrap();
            tx.rollback().unwrap();
        }
        tree.rollback_staged();

        assert!(tree.find(&path("Expenses:Travel")).is_none());
        assert_eq!(count_rows(&conn, Table::Accounts).unwrap(), before);
    }
}
