// GnuCash Ledger Writer - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod amount;     // Exact numerator/denominator money
pub mod balancer;   // Split Balancer - zero-sum split sets
pub mod config;     // LedgerConfig + clap/env flags
pub mod db;         // Row-level reads/writes on the GnuCash schema
pub mod entities;   // Book, Commodity, Account tree, Transaction, Split
pub mod error;      // LedgerError taxonomy
pub mod guid;       // 32 char hex identifiers
pub mod logging;    // tracing-subscriber setup for binaries
pub mod normalize;  // Typed record accepted by the writer
pub mod queue;      // Write-Serialization Queue (single writer thread)
pub mod reader;     // Read-only queries, bypass the queue
pub mod resolver;   // Account Resolver - path → account, auto-create
pub mod schema;     // GnuCash DDL + book bootstrap
pub mod writer;     // Ledger Writer - orchestrates one commit

// Re-export commonly used types
pub use amount::RationalAmount;
pub use balancer::{CounterLeg, Posting, SplitBalancer, SplitLeg};
pub use config::{LedgerArgs, LedgerConfig};
pub use db::Table;
pub use entities::{
    Account, AccountPath, AccountRef, AccountTree, AccountType,
    Book, Commodity, LedgerTransaction, Split,
};
pub use error::{LedgerError, LedgerResult};
pub use guid::{new_id, Guid};
pub use logging::{init_tracing, LogFormat};
pub use normalize::{Allocation, NormalizedTransaction};
pub use queue::{LedgerStore, WorkerHandle, WriteContext, WriteQueue, WriteTicket};
pub use reader::{HealthReport, LedgerReader};
pub use resolver::AccountResolver;
pub use writer::{category_path, CommitResult, LedgerWriter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
