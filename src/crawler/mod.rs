//! Crawler module for catalog discovery and record sampling
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - Page extraction for every level of the directory
//! - Level-by-level discovery with resume from the store
//! - Bounded dispatch of listing jobs to a worker pool
//! - Overall crawl coordination

mod coordinator;
mod discoverer;
mod dispatcher;
mod extractor;
mod fetcher;

pub use coordinator::{run_crawl, Coordinator, CrawlReport};
pub use discoverer::{node_code, Discoverer};
pub use dispatcher::{Job, JobQueue, SamplingPolicy, WorkerContext, WorkerPool};
pub use extractor::{ChildLink, Extractor, PageKind, RecordDetails, SiteExtractor};
pub use fetcher::{build_http_client, canonicalize_html, PageFetcher};

use crate::config::Config;
use crate::CrawlError;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl pass
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the store and provision its schema
/// 2. Resolve categories, subcategories and listings (or load them)
/// 3. Sample records for every listing with the worker pool
/// 4. Wait until every listing job has completed
///
/// Cancelling `cancel` stops discovery and enqueueing; jobs already queued
/// are drained without fetching.
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl pass finished (possibly cancelled)
/// * `Err(CrawlError)` - Store could not be opened or read
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<CrawlReport, CrawlError> {
    run_crawl(config, cancel).await
}
