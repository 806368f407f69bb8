//! Output module for crawl statistics
//!
//! This module handles reading per-level counts back out of the store and
//! printing them for the `--stats` mode.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
