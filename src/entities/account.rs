// 🌳 Account Entity - chart of accounts as an arena-backed tree
//
// "An account is IDENTIFIED by its guid and ADDRESSED by its path"
//
// - Accounts live in a HashMap keyed by guid; parents are referenced by guid,
//   so the tree never owns its nodes through pointers
// - A (parent, name) index makes path lookups O(depth) and guarantees that a
//   parent never gets two children with the same name
// - Nodes created during an open write are STAGED until that write commits,
//   and dropped again if it rolls back

use crate::entities::commodity::Commodity;
use crate::error::{LedgerError, LedgerResult};
use crate::guid::{new_id, Guid};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const PATH_SEPARATOR: char = ':';
pub const ROOT_ACCOUNT_NAME: &str = "Root Account";
pub const TEMPLATE_ROOT_NAME: &str = "Template Root";

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AccountType {
    Root,
    Asset,
    Bank,
    Cash,
    Credit,
    Liability,
    Income,
    Expense,
    Equity,
}

/// Top-level chart names and the type of everything created beneath them
pub const TOP_LEVEL: [(&str, AccountType); 5] = [
    ("Assets", AccountType::Asset),
    ("Liabilities", AccountType::Liability),
    ("Income", AccountType::Income),
    ("Expenses", AccountType::Expense),
    ("Equity", AccountType::Equity),
];

impl AccountType {
    /// Spelling used in the GnuCash `accounts.account_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Root => "ROOT",
            AccountType::Asset => "ASSET",
            AccountType::Bank => "BANK",
            AccountType::Cash => "CASH",
            AccountType::Credit => "CREDIT",
            AccountType::Liability => "LIABILITY",
            AccountType::Income => "INCOME",
            AccountType::Expense => "EXPENSE",
            AccountType::Equity => "EQUITY",
        }
    }

    pub fn for_top_level(name: &str) -> Option<AccountType> {
        TOP_LEVEL
            .iter()
            .find(|(top, _)| *top == name)
            .map(|(_, account_type)| *account_type)
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROOT" => Ok(AccountType::Root),
            "ASSET" => Ok(AccountType::Asset),
            "BANK" => Ok(AccountType::Bank),
            "CASH" => Ok(AccountType::Cash),
            "CREDIT" => Ok(AccountType::Credit),
            "LIABILITY" => Ok(AccountType::Liability),
            "INCOME" => Ok(AccountType::Income),
            "EXPENSE" => Ok(AccountType::Expense),
            "EQUITY" => Ok(AccountType::Equity),
            other => Err(LedgerError::InvalidRecord(format!(
                "unknown account type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// ACCOUNT PATH
// ============================================================================

/// Sequence of account names from (but excluding) the root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct AccountPath(Vec<String>);

impl AccountPath {
    /// Parse "Assets:Checking" into ["Assets", "Checking"]
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let segments: Vec<String> = raw
            .split(PATH_SEPARATOR)
            .map(|s| s.trim().to_string())
            .collect();

        if segments.iter().any(|s| s.is_empty()) {
            return Err(LedgerError::InvalidRecord(format!(
                "account path '{}' has an empty segment",
                raw
            )));
        }

        Ok(AccountPath(segments))
    }

    pub fn from_segments<I, S>(segments: I) -> LedgerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let joined: Vec<String> = segments.into_iter().map(Into::into).collect();
        Self::parse(&joined.join(":"))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn top_level(&self) -> &str {
        &self.0[0]
    }

    /// Type implied by the top-level segment, if it is a known chart root
    pub fn implied_type(&self) -> Option<AccountType> {
        AccountType::for_top_level(self.top_level())
    }

    /// Same path with `prefix` in front
    pub fn under(&self, prefix: &str) -> AccountPath {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(prefix.to_string());
        segments.extend(self.0.iter().cloned());
        AccountPath(segments)
    }
}

impl fmt::Display for AccountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

impl From<AccountPath> for String {
    fn from(path: AccountPath) -> Self {
        path.to_string()
    }
}

// ============================================================================
// ACCOUNT ENTITY
// ============================================================================

/// One row of the GnuCash `accounts` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub guid: Guid,
    pub name: String,
    pub account_type: AccountType,
    pub commodity_guid: Option<Guid>,

    /// Smallest unit, copied from the commodity fraction
    pub commodity_scu: i64,
    pub non_std_scu: bool,

    /// None only for the root and template root
    pub parent_guid: Option<Guid>,
    pub code: String,
    pub description: String,
    pub hidden: bool,
    pub placeholder: bool,
}

impl Account {
    pub fn root(commodity: &Commodity) -> Self {
        Account {
            guid: new_id(),
            name: ROOT_ACCOUNT_NAME.to_string(),
            account_type: AccountType::Root,
            commodity_guid: Some(commodity.guid.clone()),
            commodity_scu: commodity.fraction,
            non_std_scu: false,
            parent_guid: None,
            code: String::new(),
            description: String::new(),
            hidden: false,
            placeholder: false,
        }
    }

    /// Root of the scheduled-transaction templates; GnuCash expects one per book
    pub fn template_root() -> Self {
        Account {
            guid: new_id(),
            name: TEMPLATE_ROOT_NAME.to_string(),
            account_type: AccountType::Root,
            commodity_guid: None,
            commodity_scu: 0,
            non_std_scu: false,
            parent_guid: None,
            code: String::new(),
            description: String::new(),
            hidden: false,
            placeholder: false,
        }
    }

    pub fn child(
        parent: &Guid,
        name: &str,
        account_type: AccountType,
        commodity: &Commodity,
    ) -> Self {
        Account {
            guid: new_id(),
            name: name.to_string(),
            account_type,
            commodity_guid: Some(commodity.guid.clone()),
            commodity_scu: commodity.fraction,
            non_std_scu: false,
            parent_guid: Some(parent.clone()),
            code: String::new(),
            description: String::new(),
            hidden: false,
            placeholder: false,
        }
    }

    pub fn with_placeholder(mut self, placeholder: bool) -> Self {
        self.placeholder = placeholder;
        self
    }
}

/// Resolved account handed to the split balancer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountRef {
    pub guid: Guid,
    pub path: AccountPath,
    pub account_type: AccountType,
    pub commodity_guid: Option<Guid>,
}

// ============================================================================
// ACCOUNT TREE (arena)
// ============================================================================

pub struct AccountTree {
    root: Guid,
    accounts: HashMap<Guid, Account>,
    children: HashMap<(Guid, String), Guid>,
    staged: Vec<Guid>,
}

impl AccountTree {
    pub fn new(root: Account) -> Self {
        let root_guid = root.guid.clone();
        let mut accounts = HashMap::new();
        accounts.insert(root_guid.clone(), root);

        AccountTree {
            root: root_guid,
            accounts,
            children: HashMap::new(),
            staged: Vec::new(),
        }
    }

    pub fn root(&self) -> &Guid {
        &self.root
    }

    /// Add an already-persisted account (used when loading the book)
    pub fn insert(&mut self, account: Account) {
        if let Some(parent) = &account.parent_guid {
            self.children
                .insert((parent.clone(), account.name.clone()), account.guid.clone());
        }
        self.accounts.insert(account.guid.clone(), account);
    }

    /// Add an account created inside the current write
    pub fn stage(&mut self, account: Account) -> Guid {
        let guid = account.guid.clone();
        self.insert(account);
        self.staged.push(guid.clone());
        guid
    }

    pub fn staged(&self) -> &[Guid] {
        &self.staged
    }

    pub fn commit_staged(&mut self) {
        self.staged.clear();
    }

    /// Forget every node staged since the last commit; returns how many
    pub fn rollback_staged(&mut self) -> usize {
        let staged = std::mem::take(&mut self.staged);
        for guid in &staged {
            if let Some(account) = self.accounts.remove(guid) {
                if let Some(parent) = account.parent_guid {
                    self.children.remove(&(parent, account.name));
                }
            }
        }
        staged.len()
    }

    pub fn get(&self, guid: &Guid) -> Option<&Account> {
        self.accounts.get(guid)
    }

    pub fn child(&self, parent: &Guid, name: &str) -> Option<&Account> {
        self.children
            .get(&(parent.clone(), name.to_string()))
            .and_then(|guid| self.accounts.get(guid))
    }

    /// Walk from the root; None as soon as a segment is missing
    pub fn find(&self, path: &AccountPath) -> Option<AccountRef> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = &self.child(current, segment)?.guid;
        }
        self.reference(current)
    }

    pub fn reference(&self, guid: &Guid) -> Option<AccountRef> {
        let account = self.get(guid)?;
        Some(AccountRef {
            guid: account.guid.clone(),
            path: self.path_of(guid)?,
            account_type: account.account_type,
            commodity_guid: account.commodity_guid.clone(),
        })
    }

    pub fn path_of(&self, guid: &Guid) -> Option<AccountPath> {
        let mut names = Vec::new();
        let mut current = self.get(guid)?;

        while current.guid != self.root {
            names.push(current.name.clone());
            current = self.get(current.parent_guid.as_ref()?)?;
        }

        names.reverse();
        AccountPath::from_segments(names).ok()
    }

    /// Number of accounts including the root
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
