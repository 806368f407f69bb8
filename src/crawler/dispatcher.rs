//! Listing dispatch: bounded job queue and worker pool
//!
//! The coordinator enqueues one [`Job`] per listing on a bounded channel;
//! `enqueue` waits when the channel is full. A fixed number of worker tasks
//! share the receiving end and exit once it is closed and drained.
//!
//! Each job owns the [`CompletionGuard`] it was admitted with, so the
//! completion barrier is released exactly once whichever way the job ends.

use crate::config::{SamplingConfig, Selection};
use crate::crawler::extractor::{ChildLink, Extractor, PageKind};
use crate::crawler::fetcher::PageFetcher;
use crate::state::{CompletionGuard, CompletionTracker, JobState};
use crate::storage::{with_store, FrontierStore, Lineage, Node, RecordDraft};
use crate::CrawlError;
use rand::seq::IndexedRandom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One listing waiting to be sampled
#[derive(Debug)]
pub struct Job {
    listing: Node,
    state: JobState,
    guard: CompletionGuard,
}

impl Job {
    fn new(listing: Node, guard: CompletionGuard) -> Self {
        Self {
            listing,
            state: JobState::Queued,
            guard,
        }
    }

    pub fn listing(&self) -> &Node {
        &self.listing
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, next: JobState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Moves the job to a terminal state and releases its guard
    ///
    /// On an illegal transition the guard is still released (as dropped).
    fn finish(mut self, outcome: JobState) -> Result<(), CrawlError> {
        self.transition(outcome)?;
        self.guard.complete(outcome);
        Ok(())
    }
}

/// Producer side of the bounded job queue
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    tracker: CompletionTracker,
    cancel: CancellationToken,
}

impl JobQueue {
    /// Creates a queue of `capacity` jobs and its receiving end
    pub fn channel(
        capacity: usize,
        tracker: CompletionTracker,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                tracker,
                cancel,
            },
            receiver,
        )
    }

    /// Admits a job for `listing` and sends it, waiting while the queue is full
    ///
    /// The job is admitted before it is sent. If the send can't complete
    /// (cancellation, or every receiver gone) the job is dropped, which
    /// releases its admission.
    pub async fn enqueue(&self, listing: Node) -> Result<(), CrawlError> {
        if self.cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }

        let listing_id = listing.id;
        let job = Job::new(listing, self.tracker.admit());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            sent = self.sender.send(job) => {
                sent.map_err(|_| CrawlError::Cancelled)?;
                tracing::debug!("Enqueued listing {}", listing_id);
                Ok(())
            }
        }
    }
}

/// How many candidates to keep from a listing, and which
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub count: usize,
    pub selection: Selection,
}

impl SamplingPolicy {
    pub fn from_config(config: &SamplingConfig) -> Self {
        Self {
            count: config.count,
            selection: config.selection,
        }
    }

    /// Picks up to `count` candidates; fewer candidates means all of them
    pub fn sample<T: Clone>(&self, candidates: &[T]) -> Vec<T> {
        match self.selection {
            Selection::First => candidates.iter().take(self.count).cloned().collect(),
            Selection::UniformRandom => {
                let mut rng = rand::rng();
                candidates
                    .choose_multiple(&mut rng, self.count)
                    .cloned()
                    .collect()
            }
        }
    }
}

/// Everything a worker needs to process a job
pub struct WorkerContext {
    store: Arc<dyn FrontierStore>,
    fetcher: PageFetcher,
    extractor: Arc<dyn Extractor>,
    sampling: SamplingPolicy,
    cancel: CancellationToken,
    records_inserted: AtomicUsize,
}

impl WorkerContext {
    pub fn new(
        store: Arc<dyn FrontierStore>,
        fetcher: PageFetcher,
        extractor: Arc<dyn Extractor>,
        sampling: SamplingPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            fetcher,
            extractor,
            sampling,
            cancel,
            records_inserted: AtomicUsize::new(0),
        }
    }

    /// Records newly inserted by every worker so far
    pub fn records_inserted(&self) -> usize {
        self.records_inserted.load(Ordering::SeqCst)
    }

    /// Runs a job and returns its terminal state
    async fn process(&self, job: &mut Job) -> Result<JobState, CrawlError> {
        job.transition(JobState::InFlight)?;
        let listing = &job.listing;

        let listing_id = listing.id;
        let lineage = with_store(&self.store, move |store| store.lineage(listing_id)).await?;
        let page = self.fetcher.fetch(&listing.url).await?;

        let candidates = self.extractor.extract_children(&page, PageKind::Listing);
        if candidates.is_empty() {
            return Err(CrawlError::NoCandidates {
                url: listing.url.clone(),
            });
        }

        let sampled = self.sampling.sample(&candidates);
        let mut persisted = 0;

        for candidate in &sampled {
            match self.persist(listing, &lineage, candidate).await {
                Ok(()) => persisted += 1,
                Err(e) => tracing::warn!("Skipping record {}: {}", candidate.url, e),
            }
        }

        Ok(if persisted > 0 {
            JobState::Done
        } else {
            JobState::Dropped
        })
    }

    /// Fetches a candidate's detail page and stores its record
    async fn persist(
        &self,
        listing: &Node,
        lineage: &Lineage,
        candidate: &ChildLink,
    ) -> Result<(), CrawlError> {
        let page = self.fetcher.fetch(&candidate.url).await?;
        let details = self.extractor.extract_record(&page);

        let draft = RecordDraft {
            listing_id: listing.id,
            name: candidate.name.clone(),
            speciality: lineage.category_name.clone(),
            address: details.address,
            postal_code: details
                .postal_code
                .or_else(|| Some(lineage.subcategory_code.clone())),
            city: details.city.or_else(|| Some(lineage.listing_name.clone())),
            phone: details.phone,
            detail_url: candidate.url.clone(),
        };

        let insertion =
            with_store(&self.store, move |store| store.insert_record_if_absent(&draft)).await?;
        if insertion.inserted {
            self.records_inserted.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Fixed set of worker tasks sharing one receiver
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks pulling jobs from `receiver`
    pub fn spawn(workers: usize, receiver: mpsc::Receiver<Job>, ctx: Arc<WorkerContext>) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move { run_worker(worker_id, receiver, ctx).await })
            })
            .collect();

        Self { handles }
    }

    /// Number of spawned workers
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }
    }
}

async fn run_worker(worker_id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, ctx: Arc<WorkerContext>) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };

        let Some(mut job) = job else {
            break;
        };

        // Queued jobs are drained without fetching once the crawl is cancelled
        if ctx.cancel.is_cancelled() {
            tracing::debug!("Dropping listing {} (cancelled)", job.listing.id);
            continue;
        }

        let listing_id = job.listing.id;
        let outcome = match ctx.process(&mut job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Listing {} dropped: {}", listing_id, e);
                JobState::Dropped
            }
        };

        tracing::debug!("Worker {} finished listing {}: {}", worker_id, listing_id, outcome);
        if let Err(e) = job.finish(outcome) {
            tracing::error!("Listing {}: {}", listing_id, e);
        }
    }

    tracing::debug!("Worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Level;
    use std::time::Duration;

    fn listing(id: i64) -> Node {
        Node {
            id,
            level: Level::Listing,
            name: format!("listing {}", id),
            url: format!("https://x.fr/l/{}", id),
            code: Some(id.to_string()),
            parent_id: Some(1),
        }
    }

    #[test]
    fn test_job_transitions() {
        let tracker = CompletionTracker::new();
        let mut job = Job::new(listing(1), tracker.admit());
        assert_eq!(job.state(), JobState::Queued);

        let err = job.transition(JobState::Done).unwrap_err();
        assert!(matches!(
            err,
            CrawlError::InvalidTransition {
                from: JobState::Queued,
                to: JobState::Done
            }
        ));

        job.transition(JobState::InFlight).unwrap();
        job.finish(JobState::Done).unwrap();
        assert_eq!(tracker.done(), 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_illegal_finish_still_releases() {
        let tracker = CompletionTracker::new();
        let job = Job::new(listing(1), tracker.admit());

        assert!(job.finish(JobState::Done).is_err());
        assert_eq!(tracker.dropped(), 1);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_applies_backpressure() {
        let tracker = CompletionTracker::new();
        let (queue, mut rx) = JobQueue::channel(2, tracker.clone(), CancellationToken::new());

        queue.enqueue(listing(1)).await.unwrap();
        queue.enqueue(listing(2)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(listing(3))).await;
        assert!(blocked.is_err(), "third enqueue should wait for capacity");
        // The abandoned send released its admission
        assert_eq!(tracker.dropped(), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.listing().id, 1);

        tokio::time::timeout(Duration::from_secs(1), queue.enqueue(listing(3)))
            .await
            .expect("capacity was freed")
            .unwrap();
        assert_eq!(tracker.admitted(), 4);
        assert_eq!(tracker.outstanding(), 3);
    }

    #[tokio::test]
    async fn test_enqueue_cancelled_while_full() {
        let tracker = CompletionTracker::new();
        let cancel = CancellationToken::new();
        let (queue, _rx) = JobQueue::channel(1, tracker.clone(), cancel.clone());

        queue.enqueue(listing(1)).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), queue.enqueue(listing(2)))
            .await
            .expect("cancellation unblocks the send");
        assert!(matches!(result, Err(CrawlError::Cancelled)));
        assert_eq!(tracker.outstanding(), 1);
        assert_eq!(tracker.dropped(), 1);

        assert!(matches!(
            queue.enqueue(listing(3)).await,
            Err(CrawlError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_after_receiver_dropped() {
        let tracker = CompletionTracker::new();
        let (queue, rx) = JobQueue::channel(4, tracker.clone(), CancellationToken::new());
        drop(rx);

        assert!(queue.enqueue(listing(1)).await.is_err());
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_sampling_first() {
        let policy = SamplingPolicy {
            count: 2,
            selection: Selection::First,
        };
        assert_eq!(policy.sample(&[1, 2, 3]), vec![1, 2]);
        assert_eq!(policy.sample(&[7]), vec![7]);
        assert!(policy.sample::<i32>(&[]).is_empty());
    }

    #[test]
    fn test_sampling_uniform_random() {
        let policy = SamplingPolicy {
            count: 1,
            selection: Selection::UniformRandom,
        };
        let candidates = [10, 20, 30];
        for _ in 0..20 {
            let picked = policy.sample(&candidates);
            assert_eq!(picked.len(), 1);
            assert!(candidates.contains(&picked[0]));
        }

        let all = SamplingPolicy {
            count: 5,
            selection: Selection::UniformRandom,
        };
        let mut picked = all.sample(&candidates);
        picked.sort();
        assert_eq!(picked, vec![10, 20, 30]);
    }

    #[test]
    fn test_sampling_from_config() {
        let policy = SamplingPolicy::from_config(&SamplingConfig::default());
        assert_eq!(policy.count, 1);
        assert_eq!(policy.selection, Selection::UniformRandom);
    }
}
