//! Storage module for persisting the discovered catalog
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite schema provisioning
//! - A bounded connection pool shared by the discoverer and the workers
//! - Idempotent insert-if-absent persistence for every tree level
//! - Per-level resume checks

mod pool;
mod schema;
mod sqlite;
mod traits;

pub use pool::{open_pool, ConnectionPool, PooledConnection};
pub use schema::initialize_schema;
pub use sqlite::SqliteFrontier;
pub use traits::{FrontierStore, StorageError, StorageResult};

use crate::CrawlError;
use std::fmt;
use std::sync::Arc;

/// Runs a store call on the blocking thread pool
///
/// Store calls check a pooled connection out and may wait for one, so async
/// code never calls the store directly.
pub async fn with_store<T, F>(store: &Arc<dyn FrontierStore>, op: F) -> Result<T, CrawlError>
where
    T: Send + 'static,
    F: FnOnce(&dyn FrontierStore) -> StorageResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || op(store.as_ref())).await?;
    Ok(result?)
}

/// A node level of the catalog tree
///
/// Records hang below `Listing` but have their own shape, see [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Category,
    Subcategory,
    Listing,
}

impl Level {
    /// Table holding this level
    pub fn table(&self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Subcategory => "subcategories",
            Self::Listing => "listings",
        }
    }

    /// Column referencing the parent row, if the level has a parent
    pub fn parent_column(&self) -> Option<&'static str> {
        match self {
            Self::Category => None,
            Self::Subcategory => Some("category_id"),
            Self::Listing => Some("subcategory_id"),
        }
    }

    /// The level whose nodes are the parents of this one
    pub fn parent(&self) -> Option<Level> {
        match self {
            Self::Category => None,
            Self::Subcategory => Some(Self::Category),
            Self::Listing => Some(Self::Subcategory),
        }
    }

    /// Returns all levels, root first
    pub fn all() -> [Level; 3] {
        [Self::Category, Self::Subcategory, Self::Listing]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A persisted catalog node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: i64,
    pub level: Level,
    pub name: String,
    pub url: String,
    pub code: Option<String>,
    pub parent_id: Option<i64>,
}

/// A node that has been discovered but not yet persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub level: Level,
    pub name: String,
    pub url: String,
    pub code: Option<String>,
    pub parent_id: Option<i64>,
}

impl NodeDraft {
    /// A root-level category
    pub fn category(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            level: Level::Category,
            name: name.into(),
            url: url.into(),
            code: None,
            parent_id: None,
        }
    }

    /// A subcategory or listing below `parent_id`
    pub fn child(
        level: Level,
        name: impl Into<String>,
        url: impl Into<String>,
        code: impl Into<String>,
        parent_id: i64,
    ) -> Self {
        Self {
            level,
            name: name.into(),
            url: url.into(),
            code: Some(code.into()),
            parent_id: Some(parent_id),
        }
    }

    /// Attaches the row id assigned by the store
    pub fn into_node(self, id: i64) -> Node {
        Node {
            id,
            level: self.level,
            name: self.name,
            url: self.url,
            code: self.code,
            parent_id: self.parent_id,
        }
    }
}

/// A persisted leaf record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i64,
    pub listing_id: i64,
    pub name: String,
    pub speciality: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub detail_url: String,
}

/// A record ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub listing_id: i64,
    pub name: String,
    pub speciality: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub detail_url: String,
}

/// Outcome of an insert-if-absent call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Row id of the (new or existing) entity
    pub id: i64,
    /// False when the dedup key already existed
    pub inserted: bool,
}

/// Ancestors of a listing, used to fill in record fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub category_name: String,
    pub subcategory_name: String,
    pub subcategory_code: String,
    pub listing_name: String,
}
