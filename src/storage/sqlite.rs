//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the FrontierStore trait.

use crate::storage::pool::{open_pool, ConnectionPool};
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use crate::storage::{Insertion, Level, Lineage, Node, NodeDraft, Record, RecordDraft};
use crate::CrawlError;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;

/// SQLite-backed frontier store
pub struct SqliteFrontier {
    pool: ConnectionPool,
}

impl SqliteFrontier {
    /// Opens (or creates) the database and provisions the schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `max_open` - Connection pool ceiling
    /// * `max_idle` - Connections kept open between calls
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteFrontier)` - Successfully opened/created database
    /// * `Err(CrawlError)` - Failed to open database
    pub fn open(path: &Path, max_open: usize, max_idle: usize) -> Result<Self, CrawlError> {
        let pool = open_pool(path, max_open, max_idle)?;
        Ok(Self { pool })
    }

    /// Opens the database described by a storage configuration
    pub fn from_config(config: &crate::config::StorageConfig) -> Result<Self, CrawlError> {
        Self::open(
            Path::new(&config.database_path),
            config.max_open_connections,
            config.max_idle_connections,
        )
    }
}

fn node_from_row(level: Level, row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        level,
        name: row.get(1)?,
        url: row.get(2)?,
        code: row.get(3)?,
        parent_id: row.get(4)?,
    })
}

fn select_nodes_sql(level: Level) -> String {
    match level.parent_column() {
        Some(parent) => format!(
            "SELECT id, name, url, code, {} FROM {} ORDER BY id",
            parent,
            level.table()
        ),
        None => format!(
            "SELECT id, name, url, NULL, NULL FROM {} ORDER BY id",
            level.table()
        ),
    }
}

impl FrontierStore for SqliteFrontier {
    // ===== Resume checks =====

    fn populated(&self, level: Level) -> StorageResult<bool> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {})", level.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn load_all(&self, level: Level) -> StorageResult<Vec<Node>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&select_nodes_sql(level))?;

        let nodes = stmt
            .query_map([], |row| node_from_row(level, row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(nodes)
    }

    // ===== Write path =====

    fn insert_if_absent(&self, draft: &NodeDraft) -> StorageResult<Insertion> {
        let now = Utc::now().to_rfc3339();
        let conn = self.pool.get()?;

        let (inserted, id) = match draft.level {
            Level::Category => {
                let changed = conn.execute(
                    "INSERT INTO categories (name, url, discovered_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name, url) DO NOTHING",
                    params![draft.name, draft.url, now],
                )?;
                let id: i64 = conn.query_row(
                    "SELECT id FROM categories WHERE name = ?1 AND url = ?2",
                    params![draft.name, draft.url],
                    |row| row.get(0),
                )?;
                (changed > 0, id)
            }
            level => {
                let (code, parent_id) = match (&draft.code, draft.parent_id) {
                    (Some(code), Some(parent_id)) => (code, parent_id),
                    _ => {
                        return Err(StorageError::InvalidNode {
                            level,
                            reason: "code and parent id are required".to_string(),
                        })
                    }
                };
                // Both child levels share the (parent, code) dedup key
                let parent_column = level.parent_column().unwrap_or("parent_id");
                let changed = conn.execute(
                    &format!(
                        "INSERT INTO {table} (name, url, code, {parent}, discovered_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT({parent}, code) DO NOTHING",
                        table = level.table(),
                        parent = parent_column,
                    ),
                    params![draft.name, draft.url, code, parent_id, now],
                )?;
                let id: i64 = conn.query_row(
                    &format!(
                        "SELECT id FROM {} WHERE {} = ?1 AND code = ?2",
                        level.table(),
                        parent_column
                    ),
                    params![parent_id, code],
                    |row| row.get(0),
                )?;
                (changed > 0, id)
            }
        };

        Ok(Insertion { id, inserted })
    }

    fn insert_record_if_absent(&self, draft: &RecordDraft) -> StorageResult<Insertion> {
        let now = Utc::now().to_rfc3339();
        let conn = self.pool.get()?;

        let changed = conn.execute(
            "INSERT INTO records
             (name, speciality, address, postal_code, city, phone, detail_url, listing_id, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(listing_id, detail_url) DO NOTHING",
            params![
                draft.name,
                draft.speciality,
                draft.address,
                draft.postal_code,
                draft.city,
                draft.phone,
                draft.detail_url,
                draft.listing_id,
                now,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM records WHERE listing_id = ?1 AND detail_url = ?2",
            params![draft.listing_id, draft.detail_url],
            |row| row.get(0),
        )?;

        Ok(Insertion {
            id,
            inserted: changed > 0,
        })
    }

    // ===== Lookups =====

    fn lineage(&self, listing_id: i64) -> StorageResult<Lineage> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT c.name, s.name, s.code, l.name
             FROM listings l
             JOIN subcategories s ON l.subcategory_id = s.id
             JOIN categories c ON s.category_id = c.id
             WHERE l.id = ?1",
            params![listing_id],
            |row| {
                Ok(Lineage {
                    category_name: row.get(0)?,
                    subcategory_name: row.get(1)?,
                    subcategory_code: row.get(2)?,
                    listing_name: row.get(3)?,
                })
            },
        )
        .optional()?
        .ok_or(StorageError::ListingNotFound(listing_id))
    }

    fn load_records(&self) -> StorageResult<Vec<Record>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, listing_id, name, speciality, address, postal_code, city, phone, detail_url
             FROM records ORDER BY id",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(Record {
                    id: row.get(0)?,
                    listing_id: row.get(1)?,
                    name: row.get(2)?,
                    speciality: row.get(3)?,
                    address: row.get(4)?,
                    postal_code: row.get(5)?,
                    city: row.get(6)?,
                    phone: row.get(7)?,
                    detail_url: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Statistics =====

    fn count(&self, level: Level) -> StorageResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", level.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_records(&self) -> StorageResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
