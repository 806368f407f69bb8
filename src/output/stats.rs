//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! per-level row counts from the frontier store.

use crate::storage::{FrontierStore, Level};
use crate::CrawlError;

/// Row counts of every persisted level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    pub categories: u64,
    pub subcategories: u64,
    pub listings: u64,
    pub records: u64,
}

impl CrawlStatistics {
    /// Share of listings that have a record, assuming one record per listing
    pub fn listing_coverage(&self) -> f64 {
        if self.listings == 0 {
            0.0
        } else {
            (self.records.min(self.listings) as f64 / self.listings as f64) * 100.0
        }
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The frontier store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(store: &dyn FrontierStore) -> Result<CrawlStatistics, CrawlError> {
    Ok(CrawlStatistics {
        categories: store.count(Level::Category)?,
        subcategories: store.count(Level::Subcategory)?,
        listings: store.count(Level::Listing)?,
        records: store.count_records()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Catalog:");
    println!("  Categories: {}", stats.categories);
    println!("  Subcategories: {}", stats.subcategories);
    println!("  Listings: {}", stats.listings);
    println!();

    println!("Records: {}", stats.records);
    println!("Listing coverage: {:.1}%", stats.listing_coverage());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NodeDraft, SqliteFrontier};
    use tempfile::TempDir;

    #[test]
    fn test_statistics_of_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = SqliteFrontier::open(&dir.path().join("s.db"), 1, 1).unwrap();

        let stats = load_statistics(&store).unwrap();
        assert_eq!(stats, CrawlStatistics::default());
        assert_eq!(stats.listing_coverage(), 0.0);
    }

    #[test]
    fn test_statistics_count_levels() {
        let dir = TempDir::new().unwrap();
        let store = SqliteFrontier::open(&dir.path().join("s.db"), 1, 1).unwrap();

        let category = store
            .insert_if_absent(&NodeDraft::category("Cardiologue", "https://x/c"))
            .unwrap();
        for code in ["75", "69"] {
            store
                .insert_if_absent(&NodeDraft::child(
                    Level::Subcategory,
                    code,
                    format!("https://x/c/{}", code),
                    code,
                    category.id,
                ))
                .unwrap();
        }

        let stats = load_statistics(&store).unwrap();
        assert_eq!(stats.categories, 1);
        assert_eq!(stats.subcategories, 2);
        assert_eq!(stats.listings, 0);
        assert_eq!(stats.records, 0);
    }

    #[test]
    fn test_listing_coverage() {
        let stats = CrawlStatistics {
            listings: 4,
            records: 3,
            ..Default::default()
        };
        assert_eq!(stats.listing_coverage(), 75.0);
    }
}
