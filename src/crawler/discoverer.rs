//! Level-by-level discovery of the catalog tree
//!
//! The discoverer resolves one level of the tree from the persisted nodes of
//! the level above it. A level that already has rows in the store is not
//! crawled again: its nodes are loaded and returned as-is. Otherwise every
//! parent page is fetched, its children are extracted and persisted with
//! insert-if-absent, and the persisted nodes are returned.
//!
//! Failures are contained: a parent whose page can't be fetched contributes
//! no children, and a child that can't be persisted is skipped. Only the
//! initial resume check propagates an error, after its retries are spent or
//! when the crawl is cancelled while it backs off.

use crate::config::FetchConfig;
use crate::crawler::extractor::{last_segment, ChildLink, Extractor, PageKind};
use crate::crawler::fetcher::PageFetcher;
use crate::storage::{with_store, FrontierStore, Level, Node, NodeDraft, StorageResult};
use crate::CrawlError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Derives the code of a subcategory or listing from its URL
///
/// Subcategories keep the segment up to the first `-` (`75-paris` -> `75`),
/// listings keep the whole last segment. Categories have no code.
pub fn node_code(level: Level, url: &str) -> Option<String> {
    let segment = last_segment(url)?;
    match level {
        Level::Category => None,
        Level::Subcategory => segment
            .split('-')
            .next()
            .filter(|code| !code.is_empty())
            .map(str::to_string),
        Level::Listing => Some(segment),
    }
}

/// Backoff applied to the resume checks
#[derive(Debug, Clone, Copy)]
struct StoreRetry {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl From<&FetchConfig> for StoreRetry {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Resolves catalog levels against the store and the site
pub struct Discoverer {
    store: Arc<dyn FrontierStore>,
    fetcher: PageFetcher,
    extractor: Arc<dyn Extractor>,
    catalog_url: String,
    retry: StoreRetry,
    cancel: CancellationToken,
}

impl Discoverer {
    pub fn new(
        store: Arc<dyn FrontierStore>,
        fetcher: PageFetcher,
        extractor: Arc<dyn Extractor>,
        catalog_url: impl Into<String>,
        fetch_config: &FetchConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            catalog_url: catalog_url.into(),
            retry: StoreRetry::from(fetch_config),
            cancel,
        }
    }

    /// Resolves the category level from the catalog page
    pub async fn discover_categories(&self) -> Result<Vec<Node>, CrawlError> {
        self.discover_level(&[], Level::Category).await
    }

    /// Resolves `level` from the nodes of the level above it
    ///
    /// `parents` is ignored for the category level, whose only parent is the
    /// catalog page. The returned nodes carry store ids and contain no
    /// duplicates.
    ///
    /// # Errors
    ///
    /// `CrawlError::Storage` when the resume check still fails after
    /// `max_retries` attempts, `CrawlError::Cancelled` when the crawl is
    /// cancelled between attempts. Every other failure is logged and skipped.
    pub async fn discover_level(
        &self,
        parents: &[Node],
        level: Level,
    ) -> Result<Vec<Node>, CrawlError> {
        if let Some(nodes) = self.resume(level).await? {
            tracing::info!(
                "Resuming {} from store: {} nodes already discovered",
                level,
                nodes.len()
            );
            return Ok(nodes);
        }

        let kind = PageKind::parent_of(level);
        let mut discovered = Discovered::default();

        if level.parent().is_none() {
            self.expand(&self.catalog_url, None, level, kind, &mut discovered)
                .await;
        } else {
            for parent in parents {
                if self.cancel.is_cancelled() {
                    tracing::info!("Discovery of {} cancelled", level);
                    break;
                }
                self.expand(&parent.url, Some(parent.id), level, kind, &mut discovered)
                    .await;
            }
        }

        tracing::info!(
            "Discovered {} {} ({} new)",
            discovered.nodes.len(),
            level,
            discovered.inserted
        );

        Ok(discovered.nodes)
    }

    /// Returns the persisted nodes of `level` if the level is populated
    async fn resume(&self, level: Level) -> Result<Option<Vec<Node>>, CrawlError> {
        let populated = self
            .with_retry("populated", move |store| store.populated(level))
            .await?;
        if !populated {
            return Ok(None);
        }

        let nodes = self
            .with_retry("load", move |store| store.load_all(level))
            .await?;
        Ok(Some(nodes))
    }

    async fn with_retry<T, F>(&self, what: &str, op: F) -> Result<T, CrawlError>
    where
        T: Send + 'static,
        F: Fn(&dyn FrontierStore) -> StorageResult<T> + Clone + Send + 'static,
    {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;

        loop {
            match with_store(&self.store, op.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Resume check ({}) failed: {}, retry {}/{} in {:?}",
                        what,
                        e,
                        attempt,
                        self.retry.max_retries,
                        backoff
                    );

                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            tracing::info!("Resume check ({}) cancelled", what);
                            return Err(CrawlError::Cancelled);
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }

                    backoff = (backoff * 2).min(self.retry.max_backoff);
                }
                Err(e) => {
                    tracing::error!("Resume check ({}) failed: {}", what, e);
                    return Err(e);
                }
            }
        }
    }

    /// Fetches one parent page and persists its children
    async fn expand(
        &self,
        url: &str,
        parent_id: Option<i64>,
        level: Level,
        kind: PageKind,
        discovered: &mut Discovered,
    ) {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Skipping {} of {}: {}", level, url, e);
                return;
            }
        };

        let children = self.extractor.extract_children(&page, kind);
        if children.is_empty() {
            tracing::debug!("No {} found on {}", level, url);
            return;
        }

        for child in children {
            let Some(draft) = build_draft(level, parent_id, &child) else {
                tracing::warn!("Skipping {} without a code: {}", level, child.url);
                continue;
            };

            let pending = draft.clone();
            let insertion =
                with_store(&self.store, move |store| store.insert_if_absent(&pending)).await;
            match insertion {
                Ok(insertion) => {
                    if insertion.inserted {
                        discovered.inserted += 1;
                    }
                    discovered.push(draft.into_node(insertion.id));
                }
                Err(e) => {
                    tracing::warn!("Failed to persist {} {}: {}", level, child.url, e);
                }
            }
        }
    }
}

fn build_draft(level: Level, parent_id: Option<i64>, child: &ChildLink) -> Option<NodeDraft> {
    match parent_id {
        None => Some(NodeDraft::category(&child.name, &child.url)),
        Some(parent_id) => {
            let code = node_code(level, &child.url)?;
            Some(NodeDraft::child(
                level,
                &child.name,
                &child.url,
                code,
                parent_id,
            ))
        }
    }
}

/// Nodes collected for one level, unique by id
#[derive(Debug, Default)]
struct Discovered {
    nodes: Vec<Node>,
    seen: HashSet<i64>,
    inserted: usize,
}

impl Discovered {
    fn push(&mut self, node: Node) {
        if self.seen.insert(node.id) {
            self.nodes.push(node);
        }
    }
}
