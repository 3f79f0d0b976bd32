// GnuCash Ledger Writer - CLI
//
// ledger-writer init                      bootstrap the book (idempotent)
// ledger-writer import statements.csv     commit every row, skip replays
// ledger-writer health                    file present / writable / book
// ledger-writer resolve "Assets:Checking" look up one account path

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_writer::{
    init_tracing, LedgerArgs, LedgerConfig, LedgerError, LedgerReader, LedgerStore, LedgerWriter,
    NormalizedTransaction,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Post normalized statement transactions into a GnuCash SQLite book
#[derive(Parser)]
#[command(name = "ledger-writer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    ledger: LedgerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create schema, book, default currency and chart of accounts
    Init,

    /// Commit every row of a CSV of normalized transactions
    ///
    /// Columns: date, amount, currency, description, category, source_account
    /// and optionally memo / idempotency_key. Rows without a key are keyed by
    /// the SHA-256 of their contents plus their occurrence among identical
    /// rows, so re-importing a file skips old rows while repeated purchases
    /// within one file are all kept.
    Import {
        csv: PathBuf,
    },

    /// Report whether the ledger file is present, writable and bootstrapped
    Health,

    /// Resolve an account path such as "Expenses:Dining"
    Resolve {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.ledger.log_level, cli.ledger.log_format)?;

    let config = cli.ledger.config();
    config.validate().context("invalid ledger configuration")?;

    match cli.command {
        Commands::Init => run_init(&config),
        Commands::Import { csv } => run_import(&config, &csv).await,
        Commands::Health => run_health(&config),
        Commands::Resolve { path } => run_resolve(&config, &path),
    }
}

fn run_init(config: &LedgerConfig) -> Result<()> {
    let store = LedgerStore::open(&config.db_path, &config.default_currency)
        .with_context(|| format!("Failed to open ledger {}", config.db_path.display()))?;

    println!("📒 Ledger ready: {}", config.db_path.display());
    println!("   Book:     {}", store.book().guid);
    println!("   Accounts: {}", store.accounts().len());
    Ok(())
}

#[derive(Debug, Default)]
struct ImportSummary {
    rows: usize,
    committed: usize,
    duplicates: usize,
    failed: usize,
    created_accounts: Vec<String>,
}

async fn run_import(config: &LedgerConfig, csv_path: &Path) -> Result<()> {
    println!("🗄️  Importing {}", csv_path.display());

    let records = load_csv(csv_path)?;
    let writer = LedgerWriter::open(config)
        .with_context(|| format!("Failed to open ledger {}", config.db_path.display()))?;

    let mut summary = ImportSummary::default();
    for (line, record) in records {
        summary.rows += 1;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                eprintln!("   ✗ row {}: {}", line, e);
                summary.failed += 1;
                continue;
            }
        };

        match writer.commit(record).await {
            Ok(result) => {
                summary.committed += 1;
                summary.created_accounts.extend(result.created_accounts);
            }
            Err(LedgerError::DuplicateTransaction { .. }) => summary.duplicates += 1,
            Err(e) => {
                eprintln!("   ✗ row {}: {}", line, e);
                summary.failed += 1;
            }
        }
    }

    writer.shutdown().await?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Rows read:         {}", summary.rows);
    println!("✓ Committed:         {}", summary.committed);
    println!("✓ Duplicates skipped: {}", summary.duplicates);
    if !summary.created_accounts.is_empty() {
        println!("✓ Accounts created:  {}", summary.created_accounts.join(", "));
    }
    if summary.failed > 0 {
        anyhow::bail!("{} of {} rows failed", summary.failed, summary.rows);
    }

    Ok(())
}

/// Parse every CSV row into a record, keeping per-row failures
fn load_csv(path: &Path) -> Result<Vec<(usize, Result<NormalizedTransaction, LedgerError>)>> {
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;
    let headers = reader.headers().context("Failed to read CSV header")?.clone();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut rows = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.context("Failed to read CSV row")?;

        let mut doc: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| (name.trim().to_string(), Value::String(value.to_string())))
            .collect();

        if !doc.contains_key("idempotency_key") {
            let key = occurrence_key(&mut seen, row_hash(&row));
            doc.insert("idempotency_key".to_string(), Value::String(key));
        }

        // Header is line 1
        rows.push((index + 2, NormalizedTransaction::try_from(&doc)));
    }

    Ok(rows)
}

fn row_hash(row: &csv::StringRecord) -> String {
    let mut hasher = Sha256::new();
    for field in row.iter() {
        hasher.update(field.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// First copy of a row keeps the bare hash; the nth identical copy gets "#n"
fn occurrence_key(seen: &mut HashMap<String, usize>, hash: String) -> String {
    let count = seen.entry(hash.clone()).or_insert(0);
    *count += 1;

    match *count {
        1 => hash,
        n => format!("{}#{}", hash, n),
    }
}

fn run_health(config: &LedgerConfig) -> Result<()> {
    let report = LedgerReader::new(&config.db_path).health();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_healthy() {
        anyhow::bail!("ledger at {} is not healthy", config.db_path.display());
    }
    Ok(())
}

fn run_resolve(config: &LedgerConfig, path: &str) -> Result<()> {
    let reader = LedgerReader::new(&config.db_path);

    match reader.resolve_account_path(path)? {
        Some(account) => {
            println!("{}", serde_json::to_string_pretty(&account)?);
            Ok(())
        }
        None => anyhow::bail!("no account at '{}'", path),
    }
}
