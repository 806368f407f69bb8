//! Storage traits and error types
//!
//! This module defines the trait interface for the frontier store and
//! associated error types.

use crate::storage::{Insertion, Level, Lineage, Node, NodeDraft, Record, RecordDraft};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Invalid {level} node: {reason}")]
    InvalidNode { level: Level, reason: String },

    #[error("Listing not found: {0}")]
    ListingNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted cache of discovered nodes, per level
///
/// This is the resumability mechanism: a restarted run asks [`populated`]
/// for each level before crawling it again. Implementations must be safe to
/// share between the discoverer and every worker; the insert operations are
/// the only synchronization point between concurrent writers and must be
/// atomic per dedup key.
///
/// [`populated`]: FrontierStore::populated
pub trait FrontierStore: Send + Sync {
    // ===== Resume checks =====

    /// Returns true if at least one node of `level` is persisted
    ///
    /// Consistent with [`load_all`](FrontierStore::load_all): when this is
    /// true, `load_all` returns at least one node.
    fn populated(&self, level: Level) -> StorageResult<bool>;

    /// Loads every persisted node of `level`, in insertion order
    fn load_all(&self, level: Level) -> StorageResult<Vec<Node>>;

    // ===== Write path =====

    /// Persists a node unless its dedup key already exists
    ///
    /// A conflict on the dedup key is absorbed and reported as
    /// `inserted: false` with the existing row id. Any other failure is an
    /// error.
    fn insert_if_absent(&self, draft: &NodeDraft) -> StorageResult<Insertion>;

    /// Persists a record unless `(listing_id, detail_url)` already exists
    fn insert_record_if_absent(&self, draft: &RecordDraft) -> StorageResult<Insertion>;

    // ===== Lookups =====

    /// Resolves the category and subcategory above a listing
    fn lineage(&self, listing_id: i64) -> StorageResult<Lineage>;

    /// Loads every persisted record, in insertion order
    fn load_records(&self) -> StorageResult<Vec<Record>>;

    // ===== Statistics =====

    /// Counts nodes of `level`
    fn count(&self, level: Level) -> StorageResult<u64>;

    /// Counts persisted records
    fn count_records(&self) -> StorageResult<u64>;
}
