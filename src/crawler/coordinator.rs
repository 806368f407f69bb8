//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives a complete crawl pass:
//! - Resolving categories, subcategories and listings, one level at a time
//! - Spawning the worker pool and enqueueing one job per listing
//! - Closing the queue and waiting on the completion barrier
//! - Reporting what the pass did

use crate::config::Config;
use crate::crawler::discoverer::Discoverer;
use crate::crawler::dispatcher::{JobQueue, SamplingPolicy, WorkerContext, WorkerPool};
use crate::crawler::extractor::{Extractor, SiteExtractor};
use crate::crawler::fetcher::PageFetcher;
use crate::state::CompletionTracker;
use crate::storage::{FrontierStore, Level, SqliteFrontier};
use crate::CrawlError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Summary of one crawl pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub categories: usize,
    pub subcategories: usize,
    pub listings: usize,
    pub jobs_admitted: usize,
    pub jobs_done: usize,
    pub jobs_dropped: usize,
    pub records_inserted: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} categories, {} subcategories, {} listings; {} jobs ({} done, {} dropped); {} new records in {:?}",
            self.categories,
            self.subcategories,
            self.listings,
            self.jobs_admitted,
            self.jobs_done,
            self.jobs_dropped,
            self.records_inserted,
            self.elapsed
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    store: Arc<dyn FrontierStore>,
    extractor: Arc<dyn Extractor>,
    fetcher: PageFetcher,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator over the SQLite store named in the configuration
    ///
    /// Opening the store provisions the schema.
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Failed to open the store or build the client
    pub fn new(config: Config, cancel: CancellationToken) -> Result<Self, CrawlError> {
        let store = SqliteFrontier::from_config(&config.storage)?;
        Self::with_store(config, Arc::new(store), cancel)
    }

    /// Creates a coordinator over an existing store
    pub fn with_store(
        config: Config,
        store: Arc<dyn FrontierStore>,
        cancel: CancellationToken,
    ) -> Result<Self, CrawlError> {
        let extractor = SiteExtractor::new(config.site.base()?);
        let fetcher = PageFetcher::new(&config.fetch, cancel.clone())?;

        Ok(Self {
            config: Arc::new(config),
            store,
            extractor: Arc::new(extractor),
            fetcher,
            cancel,
        })
    }

    /// Replaces the page extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Runs one crawl pass
    ///
    /// Levels are resolved strictly in order, so every enqueued listing and
    /// its ancestors are already persisted. Returns once every admitted job
    /// has completed and every worker has exited.
    ///
    /// # Errors
    ///
    /// Only a resume check that keeps failing aborts the pass. Fetch,
    /// extraction and per-entity storage failures are logged and skipped.
    pub async fn run(&self) -> Result<CrawlReport, CrawlError> {
        let start_time = Instant::now();
        let catalog_url = self.config.site.catalog_url()?;
        tracing::info!("Starting crawl from {}", catalog_url);

        let discoverer = Discoverer::new(
            Arc::clone(&self.store),
            self.fetcher.clone(),
            Arc::clone(&self.extractor),
            catalog_url.as_str(),
            &self.config.fetch,
            self.cancel.clone(),
        );

        let categories = discoverer.discover_categories().await?;
        let subcategories = discoverer
            .discover_level(&categories, Level::Subcategory)
            .await?;
        let listings = discoverer
            .discover_level(&subcategories, Level::Listing)
            .await?;

        let tracker = CompletionTracker::new();
        let (queue, receiver) = JobQueue::channel(
            self.config.crawler.queue_capacity,
            tracker.clone(),
            self.cancel.clone(),
        );

        let ctx = Arc::new(WorkerContext::new(
            Arc::clone(&self.store),
            self.fetcher.clone(),
            Arc::clone(&self.extractor),
            SamplingPolicy::from_config(&self.config.sampling),
            self.cancel.clone(),
        ));
        let pool = WorkerPool::spawn(self.config.crawler.workers, receiver, Arc::clone(&ctx));
        tracing::info!(
            "Dispatching {} listings to {} workers",
            listings.len(),
            pool.size()
        );

        for listing in &listings {
            if let Err(e) = queue.enqueue(listing.clone()).await {
                tracing::warn!("Stopped enqueueing listings: {}", e);
                break;
            }
        }

        // Closing the queue lets workers exit once it is drained
        drop(queue);
        tracker.wait().await;
        pool.join().await;

        let report = CrawlReport {
            categories: categories.len(),
            subcategories: subcategories.len(),
            listings: listings.len(),
            jobs_admitted: tracker.admitted(),
            jobs_done: tracker.done(),
            jobs_dropped: tracker.dropped(),
            records_inserted: ctx.records_inserted(),
            cancelled: self.cancel.is_cancelled(),
            elapsed: start_time.elapsed(),
        };

        tracing::info!("Crawl completed: {}", report);
        Ok(report)
    }
}

/// Runs a complete crawl pass against the configured store
pub async fn run_crawl(config: Config, cancel: CancellationToken) -> Result<CrawlReport, CrawlError> {
    let coordinator = Coordinator::new(config, cancel)?;
    coordinator.run().await
}
