// 📥 Normalized Transaction - the typed record the ledger accepts
//
// Upstream extraction hands over loosely-typed key/value documents. They are
// converted HERE, at the boundary, into NormalizedTransaction; the writer and
// everything behind it only ever see the typed record.

use crate::entities::commodity::is_currency_code;
use crate::error::{LedgerError, LedgerResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// One posting from a statement, already categorized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub date: NaiveDate,

    /// Signed amount as seen by the source account (negative = money out)
    pub amount: Decimal,

    /// ISO 4217 code
    pub currency: String,

    #[serde(default)]
    pub description: String,

    /// Category path, e.g. "Dining" or "Expenses:Travel:Hotels"
    #[serde(default)]
    pub category: String,

    /// Account path of the statement's account, e.g. "Assets:Checking"
    pub source_account: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,

    /// Caller-chosen token; a second commit with the same key is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Optional decomposition of the counter side (fees, taxes, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocations: Vec<Allocation>,
}

/// One counter-side leg; amounts are signed as posted to that category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub category: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl NormalizedTransaction {
    pub fn new(
        date: NaiveDate,
        amount: Decimal,
        currency: &str,
        source_account: &str,
        category: &str,
    ) -> Self {
        NormalizedTransaction {
            date,
            amount,
            currency: currency.to_string(),
            description: String::new(),
            category: category.to_string(),
            source_account: source_account.to_string(),
            memo: None,
            idempotency_key: None,
            allocations: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    pub fn with_allocation(mut self, category: &str, amount: Decimal, memo: Option<&str>) -> Self {
        self.allocations.push(Allocation {
            category: category.to_string(),
            amount,
            memo: memo.map(str::to_string),
        });
        self
    }

    /// Field-level checks that need no ledger state
    pub fn validate(&self) -> LedgerResult<()> {
        if !is_currency_code(&self.currency) {
            return Err(LedgerError::InvalidRecord(format!(
                "currency '{}' is not an ISO 4217 code",
                self.currency
            )));
        }

        if self.source_account.trim().is_empty() {
            return Err(LedgerError::InvalidRecord(
                "source_account is required".to_string(),
            ));
        }

        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(LedgerError::InvalidRecord(
                    "idempotency_key must not be blank".to_string(),
                ));
            }
        }

        if self.allocations.iter().any(|a| a.category.trim().is_empty()) {
            return Err(LedgerError::InvalidRecord(
                "every allocation needs a category".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// UNTYPED BOUNDARY
// ============================================================================

impl TryFrom<&Map<String, Value>> for NormalizedTransaction {
    type Error = LedgerError;

    fn try_from(doc: &Map<String, Value>) -> Result<Self, Self::Error> {
        let allocations = match doc.get("allocations") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Ok(Allocation {
                        category: required_str(obj, "category")?,
                        amount: decimal_field(obj, "amount")?,
                        memo: optional_str(obj, "memo")?,
                    }),
                    _ => Err(invalid("allocations entries must be objects")),
                })
                .collect::<LedgerResult<Vec<_>>>()?,
            Some(_) => return Err(invalid("allocations must be an array")),
        };

        let tx = NormalizedTransaction {
            date: parse_date(&required_str(doc, "date")?)?,
            amount: decimal_field(doc, "amount")?,
            currency: required_str(doc, "currency")?.to_ascii_uppercase(),
            description: optional_str(doc, "description")?.unwrap_or_default(),
            category: optional_str(doc, "category")?.unwrap_or_default(),
            source_account: required_str(doc, "source_account")?,
            memo: optional_str(doc, "memo")?,
            idempotency_key: optional_str(doc, "idempotency_key")?,
            allocations,
        };

        tx.validate()?;
        Ok(tx)
    }
}

impl TryFrom<Value> for NormalizedTransaction {
    type Error = LedgerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(doc) => NormalizedTransaction::try_from(&doc),
            _ => Err(invalid("expected a JSON object")),
        }
    }
}

pub fn parse_date(raw: &str) -> LedgerResult<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .ok_or_else(|| invalid(&format!("unrecognized date '{}'", raw)))
}

/// Parse a decimal without ever going through f64
pub fn parse_decimal(raw: &str) -> LedgerResult<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| invalid(&format!("unrecognized amount '{}'", raw)))
}

fn decimal_field(doc: &Map<String, Value>, key: &str) -> LedgerResult<Decimal> {
    match doc.get(key) {
        Some(Value::String(s)) => parse_decimal(s),
        // Number keeps the literal text it was parsed from
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(_) => Err(invalid(&format!("'{}' must be a decimal", key))),
        None => Err(invalid(&format!("'{}' is required", key))),
    }
}

fn required_str(doc: &Map<String, Value>, key: &str) -> LedgerResult<String> {
    optional_str(doc, key)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| invalid(&format!("'{}' is required", key)))
}

fn optional_str(doc: &Map<String, Value>, key: &str) -> LedgerResult<Option<String>> {
    match doc.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(&format!("'{}' must be a string", key))),
    }
}

fn invalid(message: &str) -> LedgerError {
    LedgerError::InvalidRecord(message.to_string())
}
