// ⚙️ Configuration - where the ledger lives and how writes behave
//
// Values come from command-line flags or their environment variables
// (GNUCASH_DB_PATH, GNUCASH_DEFAULT_CURRENCY, ...). LedgerConfig is also
// serde-friendly so embedders can load it from their own config files.

use crate::entities::commodity::is_currency_code;
use crate::error::{LedgerError, LedgerResult};
use crate::logging::LogFormat;
use clap::{ArgAction, Args};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "./data/finance.gnucash";
pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub default_currency: String,
    pub auto_create_accounts: bool,

    /// Inbox slots before submitters start waiting
    pub queue_capacity: usize,

    /// Per-commit deadline; 0 disables it
    pub write_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            default_currency: DEFAULT_CURRENCY.to_string(),
            auto_create_accounts: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
        }
    }
}

impl LedgerConfig {
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_secs > 0).then(|| Duration::from_secs(self.write_timeout_secs))
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(LedgerError::InvalidRecord("db_path must not be empty".to_string()));
        }

        if !is_currency_code(&self.default_currency) {
            return Err(LedgerError::InvalidRecord(format!(
                "default_currency '{}' is not an ISO 4217 code",
                self.default_currency
            )));
        }

        if self.queue_capacity == 0 {
            return Err(LedgerError::InvalidRecord(
                "queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Flags shared by the CLI and the server
#[derive(Debug, Clone, Args)]
pub struct LedgerArgs {
    /// GnuCash SQLite file to write to
    #[arg(long, global = true, env = "GNUCASH_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Currency of a newly bootstrapped book
    #[arg(long, global = true, env = "GNUCASH_DEFAULT_CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub default_currency: String,

    #[arg(
        long,
        global = true,
        env = "GNUCASH_AUTO_CREATE_ACCOUNTS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub auto_create_accounts: bool,

    #[arg(long, global = true, env = "LEDGER_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    #[arg(long, global = true, env = "LEDGER_WRITE_TIMEOUT_SECS", default_value_t = DEFAULT_WRITE_TIMEOUT_SECS)]
    pub write_timeout_secs: u64,

    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl LedgerArgs {
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig {
            db_path: self.db_path.clone(),
            default_currency: self.default_currency.to_ascii_uppercase(),
            auto_create_accounts: self.auto_create_accounts,
            queue_capacity: self.queue_capacity,
            write_timeout_secs: self.write_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        ledger: LedgerArgs,
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.write_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = LedgerConfig {
            write_timeout_secs: 0,
            ..LedgerConfig::default()
        };
        assert_eq!(config.write_timeout(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_currency = LedgerConfig {
            default_currency: "usd".to_string(),
            ..LedgerConfig::default()
        };
        assert!(bad_currency.validate().is_err());

        let no_capacity = LedgerConfig {
            queue_capacity: 0,
            ..LedgerConfig::default()
        };
        assert!(no_capacity.validate().is_err());

        assert!(LedgerConfig::default().with_db_path("").validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{"db_path": "/tmp/books.gnucash", "auto_create_accounts": false}"#)
                .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/books.gnucash"));
        assert!(!config.auto_create_accounts);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_flags_map_onto_config() {
        let cli = TestCli::try_parse_from([
            "ledger-writer",
            "--db-path",
            "/tmp/books.gnucash",
            "--default-currency",
            "eur",
            "--auto-create-accounts",
            "false",
            "--write-timeout-secs",
            "0",
        ])
        .unwrap();

        let config = cli.ledger.config();
        assert_eq!(config.db_path, PathBuf::from("/tmp/books.gnucash"));
        assert_eq!(config.default_currency, "EUR");
        assert!(!config.auto_create_accounts);
        assert_eq!(config.write_timeout(), None);
    }
}
