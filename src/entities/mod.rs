// Ledger Entities - the rows of a GnuCash book
//
// Each entity has:
// - A 32 character hex guid shared across one namespace per book
// - A write-once lifecycle (nothing here is updated or deleted)

pub mod account;
pub mod book;
pub mod commodity;
pub mod transaction;

pub use account::{Account, AccountPath, AccountRef, AccountTree, AccountType};
pub use book::Book;
pub use commodity::Commodity;
pub use transaction::{LedgerTransaction, Split};
