// 🔑 Identifier Generator - GnuCash style GUIDs
//
// Every entity in a book (commodities, accounts, transactions, splits, the
// book itself) shares one identifier namespace: 32 lowercase hex characters.
// Ids carry 128 random bits and need no counter or coordination.

use crate::error::LedgerError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const GUID_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(String);

/// Fresh identifier from 128 bits of entropy
pub fn new_id() -> Guid {
    let bits: u128 = rand::random();
    Guid(Uuid::from_u128(bits).simple().to_string())
}

impl Guid {
    /// Validate an identifier read from outside the ledger
    pub fn parse(raw: &str) -> Result<Guid, LedgerError> {
        if is_valid(raw) {
            Ok(Guid(raw.to_string()))
        } else {
            Err(LedgerError::InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(raw: &str) -> bool {
    raw.len() == GUID_LEN && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Guid {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid(&value) {
            Ok(Guid(value))
        } else {
            Err(LedgerError::InvalidIdentifier(value))
        }
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToSql for Guid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for Guid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        Guid::parse(raw).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
