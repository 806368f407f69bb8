//! Database schema definitions
//!
//! Every table carries a unique index on its dedup key; the insert path
//! relies on those indexes to absorb re-discoveries.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Root catalog entries
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    UNIQUE(name, url)
);

-- Second level, scoped by category
CREATE TABLE IF NOT EXISTS subcategories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    code TEXT NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    discovered_at TEXT NOT NULL,
    UNIQUE(category_id, code)
);

CREATE INDEX IF NOT EXISTS idx_subcategories_category ON subcategories(category_id);

-- Leaf listings, scoped by subcategory
CREATE TABLE IF NOT EXISTS listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    code TEXT NOT NULL,
    subcategory_id INTEGER NOT NULL REFERENCES subcategories(id),
    discovered_at TEXT NOT NULL,
    UNIQUE(subcategory_id, code)
);

CREATE INDEX IF NOT EXISTS idx_listings_subcategory ON listings(subcategory_id);

-- Sampled detail records
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    speciality TEXT NOT NULL,
    address TEXT,
    postal_code TEXT,
    city TEXT,
    phone TEXT,
    detail_url TEXT NOT NULL,
    listing_id INTEGER NOT NULL REFERENCES listings(id),
    fetched_at TEXT NOT NULL,
    UNIQUE(listing_id, detail_url)
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
