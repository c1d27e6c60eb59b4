//! Run coordinator - main crawl orchestration logic
//!
//! This module drives one run through its phases:
//! - Resolving the run (resume an interrupted one or start fresh)
//! - Seeding the frontier from the run mode
//! - Dispatching fetches to a bounded pool of worker tasks
//! - Applying handler output to the frontier, ledger, sink and stats
//! - Checkpointing, draining and writing the run summary

use crate::config::{Config, RunConfig, RunMode};
use crate::crawler::fetcher::{Fetcher, FetchedPage, HttpFetcher};
use crate::crawler::frontier::{Frontier, FrontierRecord};
use crate::crawler::parser::parse_document;
use crate::crawler::request::{Label, Request};
use crate::crawler::router::{HandlerOutput, PageContext, Router};
use crate::output::{generate_markdown_summary, ProductSink, RunSummary, SqliteProductSink};
use crate::site::{SelectorSite, SiteExtractor};
use crate::state::{Counter, DedupLedger, RunPhase, Stats};
use crate::storage::{open_storage, RunStatus, SharedStorage, Storage, StorageResult};
use crate::{ConfigError, PricewatchError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why the dispatch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// Frontier empty and nothing in flight
    Exhausted,
    Cancelled,
    Deadline,
}

/// Run-scoped state shared with every worker
///
/// Created when the run is resolved and dropped after draining; nothing here
/// outlives the run.
struct RunContext {
    run_id: i64,
    frontier: Frontier,
    ledger: DedupLedger,
    stats: Stats,
    /// Held shared while a page's results are applied, exclusively while a
    /// checkpoint is captured
    apply_gate: RwLock<()>,
    router: Arc<Router>,
    site: Arc<dyn SiteExtractor>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn ProductSink>,
}

impl RunContext {
    fn applying(&self) -> RwLockReadGuard<'_, ()> {
        self.apply_gate
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Captures a consistent view of frontier, stats and ledger
    fn capture_checkpoint(&self) -> Checkpoint {
        let _exclusive = self
            .apply_gate
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Checkpoint::capture(&self.frontier, &self.stats, &self.ledger)
    }

    /// Adds requests to one tier
    ///
    /// Returns how many were new, in total and among listing pages.
    fn enqueue(&self, requests: Vec<Request>, forefront: bool) -> (usize, usize) {
        if requests.is_empty() {
            return (0, 0);
        }

        let (listing, other): (Vec<_>, Vec<_>) =
            requests.into_iter().partition(|r| r.label().is_listing());

        let listing_added = self.frontier.enqueue(listing, forefront);
        let added = listing_added + self.frontier.enqueue(other, forefront);

        self.stats.add(Counter::Urls, added as u64);
        (added, listing_added)
    }

    /// Parses, routes and applies one fetched page
    ///
    /// Runs synchronously: the parsed document never crosses an await point.
    fn handle_page(&self, request: &Request, page: &FetchedPage) -> Result<(), PricewatchError> {
        let document = parse_document(&page.body);
        let ctx = PageContext {
            site: self.site.as_ref(),
            document: &document,
            page_url: &page.url,
            request,
        };

        let output = self.router.route(&ctx)?;
        self.apply(request, output);
        Ok(())
    }

    /// Applies a handler's output in one step
    fn apply(&self, request: &Request, output: HandlerOutput) {
        let (forefront_added, forefront_pages) = self.enqueue(output.forefront, true);
        let (normal_added, normal_pages) = self.enqueue(output.normal, false);
        self.stats
            .add(Counter::Pages, (forefront_pages + normal_pages) as u64);

        self.stats.inc(Counter::Requests);
        self.stats.add(Counter::ItemsNoPrice, output.skipped_no_price);
        if output.pagination_unparsed {
            self.stats.inc(Counter::PaginationUnparsed);
        }

        let found = output.products.len();
        let (accepted, duplicates) = self
            .ledger
            .accept_batch(output.products, |p| p.ledger_key());
        self.stats.add(Counter::ItemsDuplicate, duplicates);

        if !accepted.is_empty() {
            if let Err(e) = self.sink.record_products(self.run_id, &accepted) {
                error!(
                    "Failed to record {} products from {}: {}",
                    accepted.len(),
                    request.url(),
                    e
                );
                self.stats.inc(Counter::SinkFailed);
            }
            self.stats.add(Counter::Items, accepted.len() as u64);
        }

        debug!(
            "Handled {} [{}]: {} new requests, {} products ({} new, {} duplicate, {} without price)",
            request.url(),
            request.label(),
            forefront_added + normal_added,
            found,
            accepted.len(),
            duplicates,
            output.skipped_no_price
        );
    }
}

/// Fetches one request and applies the result
///
/// A fetch failure is counted and the request dropped. Only routing errors
/// are returned, and those end the run.
async fn process_request(ctx: Arc<RunContext>, request: Request) -> Result<(), PricewatchError> {
    let fetched = ctx.fetcher.fetch(request.url()).await;

    let _applying = ctx.applying();
    let result = match fetched {
        Ok(page) => ctx.handle_page(&request, &page),
        Err(e) => {
            warn!(
                "Dropping {} [{}] after retries: {}",
                request.url(),
                request.label(),
                e
            );
            ctx.stats.inc(Counter::Failed);
            Ok(())
        }
    };

    ctx.frontier.complete(&request);
    result
}

/// Frontier, stats and ledger state persisted by one checkpoint
///
/// Captured in that order: a request the frontier snapshot still holds as
/// pending is re-run after a resume, and the ledger taken last holds every
/// key its earlier processing accepted.
struct Checkpoint {
    records: Vec<FrontierRecord>,
    counters: BTreeMap<String, u64>,
    keys: Vec<String>,
}

impl Checkpoint {
    fn capture(frontier: &Frontier, stats: &Stats, ledger: &DedupLedger) -> Self {
        Self::after_frontier(frontier.snapshot(), stats, ledger)
    }

    fn after_frontier(records: Vec<FrontierRecord>, stats: &Stats, ledger: &DedupLedger) -> Self {
        let counters = stats.snapshot();
        let keys = ledger.take_unflushed();
        Self {
            records,
            counters,
            keys,
        }
    }

    fn save(&self, storage: &mut dyn Storage, run_id: i64) -> StorageResult<()> {
        storage.save_ledger_keys(run_id, &self.keys)?;
        storage.save_stats(run_id, &self.counters)?;
        storage.save_frontier(run_id, &self.records)
    }
}

/// Builds the mode's initial requests
///
/// Explicit seeds replace the mode default: they are category pages in
/// promotional mode and product pages otherwise.
pub fn seed_requests(run: &RunConfig) -> Result<Vec<Request>, PricewatchError> {
    if !run.seeds.is_empty() {
        let label = match run.mode {
            RunMode::Promotional => Label::Category,
            RunMode::Full | RunMode::Test => Label::ProductDetail,
        };
        return run
            .seeds
            .iter()
            .map(|seed| Request::parse(seed, label).map_err(PricewatchError::from))
            .collect();
    }

    let missing = |key: &str| {
        PricewatchError::Config(ConfigError::Validation(format!(
            "run.{} is required in {} mode",
            key,
            run.mode.as_str()
        )))
    };

    let request = match run.mode {
        RunMode::Full => Request::parse(&run.root_url, Label::Root)?,
        RunMode::Test => {
            let url = run.test_url.as_deref().ok_or_else(|| missing("test-url"))?;
            Request::parse(url, Label::Category)?
        }
        RunMode::Promotional => {
            let url = run
                .promotional_url
                .as_deref()
                .ok_or_else(|| missing("promotional-url"))?;
            Request::parse(url, Label::Category)?
        }
    };

    Ok(vec![request])
}

/// Main run coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    fresh: bool,
    storage: SharedStorage,
    fetcher: Arc<dyn Fetcher>,
    site: Arc<dyn SiteExtractor>,
    router: Arc<Router>,
    sink: Arc<dyn ProductSink>,
    cancel: CancellationToken,
    phase: RunPhase,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `fresh` - Start a new run even if an interrupted one exists
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage opened, HTTP client and site rules built
    /// * `Err(PricewatchError)` - Failed to initialize
    pub fn new(config: Config, config_hash: String, fresh: bool) -> Result<Self, PricewatchError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let storage: SharedStorage = Arc::new(Mutex::new(storage));

        let fetcher = HttpFetcher::from_config(&config.crawler, &config.user_agent)?;
        let site = SelectorSite::from_config(&config.site)?;
        let sink = SqliteProductSink::new(storage.clone());

        Ok(Self {
            config: Arc::new(config),
            config_hash,
            fresh,
            storage,
            fetcher: Arc::new(fetcher),
            site: Arc::new(site),
            router: Arc::new(Router::standard()),
            sink: Arc::new(sink),
            cancel: CancellationToken::new(),
            phase: RunPhase::Seeding,
        })
    }

    /// Replaces the HTTP fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the product sink
    pub fn with_sink(mut self, sink: Arc<dyn ProductSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the label router
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Token that stops dispatching when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The storage backend, shared with the default sink
    pub fn storage(&self) -> SharedStorage {
        self.storage.clone()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn transition(&mut self, next: RunPhase) -> Result<(), PricewatchError> {
        if !self.phase.can_transition_to(next) {
            return Err(PricewatchError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn lock_storage(&self) -> MutexGuard<'_, dyn Storage + Send + 'static> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the crawl to completion, cancellation or deadline
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished or was interrupted
    /// * `Err(PricewatchError)` - A fatal error; the run is marked failed
    pub async fn run(&mut self) -> Result<RunSummary, PricewatchError> {
        let started = Instant::now();
        let ctx = Arc::new(self.open_run()?);

        let seeds = seed_requests(&self.config.run)?;
        let (added, _) = ctx.enqueue(seeds, false);
        info!(
            "Seeded {} new requests ({} pending)",
            added,
            ctx.frontier.pending_len()
        );

        let outcome = if ctx.frontier.is_idle() {
            info!("Nothing to crawl");
            Ok(StopReason::Exhausted)
        } else {
            self.transition(RunPhase::Running)?;
            self.dispatch(&ctx).await
        };

        self.transition(RunPhase::Draining)?;
        let status = match &outcome {
            Ok(StopReason::Exhausted) => RunStatus::Completed,
            Ok(StopReason::Cancelled) | Ok(StopReason::Deadline) => RunStatus::Interrupted,
            Err(_) => RunStatus::Failed,
        };
        let status = match self.checkpoint(&ctx) {
            Ok(()) => status,
            Err(e) => {
                error!("Final checkpoint failed: {}", e);
                RunStatus::Failed
            }
        };
        self.lock_storage().finish_run(ctx.run_id, status)?;

        self.transition(RunPhase::Finalized)?;
        let summary = self.summarize(&ctx)?;

        info!(
            "Run {} {} in {:.1?}: {} urls, {} pages, {} requests, {} items ({} duplicate, {} without price), {} failed",
            summary.run_id,
            summary.status,
            started.elapsed(),
            summary.urls_seen,
            summary.pages,
            summary.requests,
            summary.items_found,
            summary.items_duplicate,
            summary.items_no_price,
            summary.failed
        );

        let summary_path = Path::new(&self.config.output.summary_path);
        if let Err(e) = generate_markdown_summary(&summary, summary_path) {
            warn!(
                "Failed to write summary to {}: {}",
                summary_path.display(),
                e
            );
        }

        outcome?;
        Ok(summary)
    }

    /// Resumes the latest interrupted run with this key, or creates one
    fn open_run(&self) -> Result<RunContext, PricewatchError> {
        let run_key = &self.config.run.name;
        let mode = self.config.run.mode.as_str();
        let mut storage = self.lock_storage();

        let resumable = if self.fresh {
            None
        } else {
            storage
                .get_latest_run(run_key)?
                .filter(|run| run.status.is_resumable())
        };

        let (run_id, frontier, ledger, stats) = match resumable {
            Some(run) => {
                info!("Resuming {} run {} of '{}'", run.status.to_db_string(), run.id, run_key);
                if run.config_hash != self.config_hash {
                    warn!("Configuration changed since run {} started", run.id);
                }
                if run.mode != mode {
                    warn!(
                        "Run {} was started in {} mode, continuing in {} mode",
                        run.id, run.mode, mode
                    );
                }

                let records = storage
                    .load_frontier(run.id)
                    .map_err(|e| PricewatchError::FrontierCorrupted(e.to_string()))?;
                let frontier = Frontier::restore(records);
                let ledger = DedupLedger::restore(storage.load_ledger(run.id)?);
                let stats = Stats::restore(&storage.load_stats(run.id)?);
                storage.update_run_status(run.id, RunStatus::Running)?;

                info!(
                    "Restored {} pending requests, {} seen urls, {} ledger keys",
                    frontier.pending_len(),
                    frontier.seen_len(),
                    ledger.len()
                );
                (run.id, frontier, ledger, stats)
            }
            None => {
                let run_id = storage.create_run(run_key, mode, &self.config_hash)?;
                info!("Starting {} run {} of '{}'", mode, run_id, run_key);
                (run_id, Frontier::new(), DedupLedger::new(), Stats::new())
            }
        };

        Ok(RunContext {
            run_id,
            frontier,
            ledger,
            stats,
            apply_gate: RwLock::new(()),
            router: self.router.clone(),
            site: self.site.clone(),
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
        })
    }

    /// Runs workers until the frontier drains, the token is cancelled or the
    /// deadline passes
    async fn dispatch(&self, ctx: &Arc<RunContext>) -> Result<StopReason, PricewatchError> {
        let crawler = &self.config.crawler;
        let max_workers = crawler.max_concurrent_fetches.max(1) as usize;
        let checkpoint_interval = crawler.checkpoint_interval.max(1);
        let deadline = crawler
            .run_deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let mut throttle = crawler.max_requests_per_minute.map(|rpm| {
            let mut interval = tokio::time::interval(Duration::from_secs(60) / rpm.max(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let mut workers: JoinSet<Result<(), PricewatchError>> = JoinSet::new();
        let mut stop: Option<StopReason> = None;
        let mut fatal: Option<PricewatchError> = None;
        let mut handled: u64 = 0;

        loop {
            if stop.is_none() {
                if self.cancel.is_cancelled() {
                    stop = Some(StopReason::Cancelled);
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    stop = Some(StopReason::Deadline);
                }
                if let Some(reason) = stop {
                    info!(
                        "Stopping dispatch ({:?}), waiting for {} in-flight requests",
                        reason,
                        workers.len()
                    );
                }
            }

            while stop.is_none() && workers.len() < max_workers && ctx.frontier.pending_len() > 0
            {
                if let Some(interval) = throttle.as_mut() {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = self.cancel.cancelled() => break,
                        _ = sleep_until(deadline), if deadline.is_some() => break,
                    }
                }

                let Some(request) = ctx.frontier.dequeue() else {
                    break;
                };
                debug!("Dispatching {} [{}]", request.url(), request.label());
                workers.spawn(process_request(ctx.clone(), request));
            }

            if workers.is_empty() {
                if stop.is_none() && ctx.frontier.pending_len() > 0 {
                    if self.cancel.is_cancelled() {
                        stop = Some(StopReason::Cancelled);
                    } else if deadline.is_some_and(|d| Instant::now() >= d) {
                        stop = Some(StopReason::Deadline);
                    }
                }
                break;
            }

            // Cancellation and deadline only wake the loop; the check above
            // records the reason.
            let stopping = stop.is_some();
            tokio::select! {
                _ = self.cancel.cancelled(), if !stopping => {}
                _ = sleep_until(deadline), if !stopping && deadline.is_some() => {}
                joined = workers.join_next() => match joined {
                    Some(Ok(Ok(()))) => {
                        handled += 1;
                        if handled % checkpoint_interval == 0 {
                            if let Err(e) = self.checkpoint(ctx) {
                                error!("Checkpoint failed: {}", e);
                                fatal = Some(e);
                                break;
                            }
                            info!(
                                "Progress: {} requests handled, {} pending, {} in flight, {} items",
                                ctx.stats.get(Counter::Requests),
                                ctx.frontier.pending_len(),
                                ctx.frontier.in_flight_len(),
                                ctx.stats.get(Counter::Items)
                            );
                        }
                    }
                    Some(Ok(Err(e))) => {
                        error!("Fatal error, stopping run: {}", e);
                        fatal = Some(e);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("Worker task failed: {}", e);
                        ctx.stats.inc(Counter::Failed);
                    }
                    None => {}
                }
            }
        }

        if let Some(e) = fatal {
            workers.abort_all();
            while workers.join_next().await.is_some() {}
            return Err(e);
        }

        Ok(stop.unwrap_or(StopReason::Exhausted))
    }

    /// Persists stats, new ledger keys and the frontier snapshot
    fn checkpoint(&self, ctx: &RunContext) -> Result<(), PricewatchError> {
        let checkpoint = ctx.capture_checkpoint();

        let result = checkpoint.save(&mut *self.lock_storage(), ctx.run_id);
        if let Err(e) = result {
            ctx.ledger.return_unflushed(checkpoint.keys);
            return Err(e.into());
        }

        debug!(
            "Checkpoint: {} ledger keys, {} frontier entries",
            checkpoint.keys.len(),
            checkpoint.records.len()
        );
        Ok(())
    }

    fn summarize(&self, ctx: &RunContext) -> Result<RunSummary, PricewatchError> {
        let run = self.lock_storage().get_run(ctx.run_id)?;

        let mut summary = RunSummary::from_run(&run, &ctx.stats.snapshot());
        summary.phase = self.phase.as_str().to_string();
        summary.ledger_size = ctx.ledger.len() as u64;
        summary.frontier_pending = (ctx.frontier.pending_len() + ctx.frontier.in_flight_len()) as u64;
        Ok(summary)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
