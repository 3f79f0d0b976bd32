// ⚠️ Ledger Errors - typed failures returned by every ledger operation
//
// Every variant is recoverable at the LedgerWriter boundary. None of them
// stops the write worker.

use crate::guid::Guid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    // ========================================================================
    // AMOUNT ERRORS
    // ========================================================================
    #[error("PrecisionError: {value} cannot be represented with denominator {denominator}")]
    PrecisionError { value: String, denominator: i64 },

    #[error("DenominatorMismatch: cannot combine /{left} with /{right}")]
    DenominatorMismatch { left: i64, right: i64 },

    #[error("InvalidDenominator: {0} (must be positive)")]
    InvalidDenominator(i64),

    #[error("AmountOverflow: {0}")]
    AmountOverflow(String),

    // ========================================================================
    // ACCOUNT / COMMODITY ERRORS
    // ========================================================================
    #[error("UnmappedAccount: no account at '{0}' and auto-creation is disabled")]
    UnmappedAccount(String),

    #[error("UnknownCommodity: {0} is not defined in this book")]
    UnknownCommodity(String),

    #[error("CommodityMismatch: account '{account}' is not denominated in {expected}")]
    CommodityMismatch { account: String, expected: String },

    // ========================================================================
    // TRANSACTION ERRORS
    // ========================================================================
    #[error("ImbalancedTransactionError: {0}")]
    ImbalancedTransaction(String),

    #[error("DuplicateTransaction: idempotency key '{key}' already committed as {existing}")]
    DuplicateTransaction { key: String, existing: Guid },

    #[error("InvalidRecord: {0}")]
    InvalidRecord(String),

    #[error("InvalidIdentifier: '{0}' is not a 32 character lowercase hex id")]
    InvalidIdentifier(String),

    // ========================================================================
    // STORAGE / QUEUE ERRORS
    // ========================================================================
    #[error("Timeout: write request exceeded its deadline")]
    Timeout,

    #[error("StorageError: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Io: {0}")]
    Io(#[from] std::io::Error),

    #[error("BookMissing: the ledger file has no book, run bootstrap first")]
    BookMissing,

    #[error("QueueClosed: the write worker is not running")]
    QueueClosed,

    #[error("Internal: {0}")]
    Internal(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn precision(value: impl ToString, denominator: i64) -> Self {
        Self::PrecisionError {
            value: value.to_string(),
            denominator,
        }
    }

    /// Callers may resubmit the same request after these.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Timeout | Self::QueueClosed)
    }

    /// Short machine-readable code, used by the HTTP surface and the CLI summary
    pub fn code(&self) -> &'static str {
        match self {
            Self::PrecisionError { .. } => "precision_error",
            Self::DenominatorMismatch { .. } => "denominator_mismatch",
            Self::InvalidDenominator(_) => "invalid_denominator",
            Self::AmountOverflow(_) => "amount_overflow",
            Self::UnmappedAccount(_) => "unmapped_account",
            Self::UnknownCommodity(_) => "unknown_commodity",
            Self::CommodityMismatch { .. } => "commodity_mismatch",
            Self::ImbalancedTransaction(_) => "imbalanced_transaction",
            Self::DuplicateTransaction { .. } => "duplicate_transaction",
            Self::InvalidRecord(_) => "invalid_record",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::Timeout => "timeout",
            Self::Storage(_) => "storage_error",
            Self::Io(_) => "io_error",
            Self::BookMissing => "book_missing",
            Self::QueueClosed => "queue_closed",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::Timeout.is_retryable());
        assert!(LedgerError::QueueClosed.is_retryable());
        assert!(LedgerError::Storage(rusqlite::Error::InvalidQuery).is_retryable());

        assert!(!LedgerError::UnmappedAccount("Expenses:Dining".into()).is_retryable());
        assert!(!LedgerError::precision("10.505", 100).is_retryable());
    }

    #[test]
    fn test_precision_message_names_value_and_denominator() {
        let err = LedgerError::precision("10.505", 100);
        let message = err.to_string();

        assert!(message.contains("10.505"));
        assert!(message.contains("100"));
        assert_eq!(err.code(), "precision_error");
    }
}
