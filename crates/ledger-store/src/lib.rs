//! Versioned document persistence for the order ledger.
//!
//! Documents are JSON bodies addressed by `(kind, id)`. Every write names the
//! version it was read at, and a [`WriteBatch`] commits several writes
//! all-or-nothing, which is what keeps orders, invoices and transactions in
//! step with each other.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use document::{StoredDocument, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use query::{DocumentQuery, SortOrder};
pub use store::{DocumentWrite, LedgerStore, LedgerStoreExt, WriteBatch};
