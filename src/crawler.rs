//! Recursive concurrent site traversal.
//!
//! A crawl run owns one [`Scheduler`] and one visited set shared by every
//! site crawled in the run. Each page is a tokio task: it waits for a
//! permit, sleeps the politeness delay, fetches, stores the page, parses
//! and lemmatizes it on a blocking thread, releases the permit, then spawns
//! one child task per new same-site link and joins them all before it
//! returns. The root task therefore completes only after the whole
//! reachable subtree has.
//!
//! A link is reserved in the visited set before its task is spawned, so two
//! pages linking to the same URL never schedule it twice.
//!
//! Cancellation is cooperative. After [`Scheduler::shutdown`], waiting on a
//! permit, sleeping and fetching all return early, and tasks stop writing
//! and return `Ok(())` without spawning children. The site-level result of
//! a cancelled run is [`CrawlError::Cancelled`].

use dashmap::DashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::fetch::{FetchError, Fetcher};
use crate::html;
use crate::indexer::{Indexer, SiteAccumulator};
use crate::models::{Site, SiteStatus};
use crate::store::Store;
use crate::urls;

type CrawlFuture = Pin<Box<dyn Future<Output = Result<(), CrawlError>> + Send>>;

/// Bounds concurrent page work and broadcasts shutdown.
pub struct Scheduler {
    permits: Semaphore,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            permits: Semaphore::new(max_concurrency.max(1)),
            shutdown,
        }
    }

    /// Asks every task of the run to stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.permits.close();
    }

    pub fn is_terminating(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// `None` when the scheduler shut down while waiting.
    async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        tokio::select! {
            permit = self.permits.acquire() => permit.ok(),
            _ = self.cancelled() => None,
        }
    }

    /// Sleeps for `delay`. Returns false when interrupted by shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_terminating();
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_terminating(),
            _ = self.cancelled() => false,
        }
    }
}

/// Everything the tasks of one indexing run share.
pub struct CrawlRun {
    scheduler: Arc<Scheduler>,
    visited: DashSet<String>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    indexer: Arc<Indexer>,
    config: CrawlConfig,
}

/// Result of crawling one site. The accumulator holds whatever was indexed
/// before the crawl ended, successful or not.
pub struct CrawlOutcome {
    pub accumulator: Arc<SiteAccumulator>,
    pub pages: usize,
    pub result: Result<(), CrawlError>,
}

impl CrawlRun {
    pub fn new(
        scheduler: Arc<Scheduler>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn Store>,
        indexer: Arc<Indexer>,
        config: CrawlConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            visited: DashSet::new(),
            fetcher,
            store,
            indexer,
            config,
        })
    }

    /// Crawls `site` from its root URL and waits for the whole subtree.
    pub async fn crawl_site(self: &Arc<Self>, site: &Site) -> CrawlOutcome {
        let crawl = Arc::new(SiteCrawl {
            run: Arc::clone(self),
            site_id: site.id,
            root: site.url.clone(),
            accumulator: Arc::new(SiteAccumulator::new(site.id)),
            halted: AtomicBool::new(false),
            pages: AtomicUsize::new(0),
        });

        info!(site = %site.url, "crawl started");
        self.visited.insert(site.url.clone());
        let mut result = SiteCrawl::visit(Arc::clone(&crawl), site.url.clone()).await;
        if self.scheduler.is_terminating() {
            result = Err(CrawlError::Cancelled);
        }

        let pages = crawl.pages.load(Ordering::SeqCst);
        match &result {
            Ok(()) => info!(site = %site.url, pages, "crawl finished"),
            Err(e) => warn!(site = %site.url, pages, error = %e, "crawl ended with error"),
        }

        CrawlOutcome {
            accumulator: Arc::clone(&crawl.accumulator),
            pages,
            result,
        }
    }
}

/// Per-site context handed down the task tree.
struct SiteCrawl {
    run: Arc<CrawlRun>,
    site_id: i64,
    root: String,
    accumulator: Arc<SiteAccumulator>,
    /// Set when a task of this site failed; siblings stop scheduling work.
    halted: AtomicBool,
    pages: AtomicUsize,
}

impl SiteCrawl {
    fn visit(self: Arc<Self>, url: String) -> CrawlFuture {
        Box::pin(async move { self.visit_page(url).await })
    }

    async fn visit_page(self: Arc<Self>, url: String) -> Result<(), CrawlError> {
        let Some(links) = self.fetch_and_index(&url).await? else {
            return Ok(());
        };
        if !self.may_fork().await? {
            return Ok(());
        }

        let mut children = JoinSet::new();
        for link in links {
            let href = urls::normalize_href(&link);
            if !urls::is_href_valid(&self.root, &href, &self.run.config.excluded_extensions) {
                continue;
            }
            if !self.run.visited.insert(href.clone()) {
                continue;
            }
            debug!(parent = %url, href = %href, "scheduling page");
            children.spawn(Self::visit(Arc::clone(&self), href));
        }

        self.join_children(children).await
    }

    fn stopped(&self) -> bool {
        self.halted.load(Ordering::SeqCst) || self.run.scheduler.is_terminating()
    }

    /// Fetches and stores one page. Returns the page's outbound links when
    /// it was a 200 that should be followed, `None` when the branch ends here.
    async fn fetch_and_index(&self, url: &str) -> Result<Option<Vec<String>>, CrawlError> {
        if self.stopped() {
            return Ok(None);
        }
        let scheduler = &self.run.scheduler;
        let Some(_permit) = scheduler.acquire().await else {
            return Ok(None);
        };
        if !scheduler.pause(Duration::from_millis(self.run.config.delay_ms)).await {
            return Ok(None);
        }

        let fetched = tokio::select! {
            fetched = self.run.fetcher.fetch(url) => fetched,
            _ = scheduler.cancelled() => return Ok(None),
        };
        let page = match fetched {
            Ok(page) => page,
            Err(err @ FetchError::Certificate { .. }) => return Err(err.into()),
            Err(err) => {
                warn!(url, error = %err, "page skipped");
                return Ok(None);
            }
        };

        if self.stopped() {
            return Ok(None);
        }

        let path = urls::page_path(url);
        let page_id = self
            .run
            .store
            .save_page(self.site_id, &path, page.status, &page.html)
            .await?;
        self.run.store.touch_site(self.site_id).await?;
        self.pages.fetch_add(1, Ordering::SeqCst);
        debug!(url, status = page.status, page_id, "page stored");

        if page.status != 200 {
            return Ok(None);
        }

        let indexer = Arc::clone(&self.run.indexer);
        let base = url.to_string();
        let body = page.html;
        let (links, lemmas) = tokio::task::spawn_blocking(move || {
            let base = Url::parse(&base).ok();
            let parsed = html::parse_page(&body, base.as_ref());
            let lemmas = indexer.page_lemmas(&parsed.title, &parsed.body_text);
            (parsed.links, lemmas)
        })
        .await
        .map_err(|e| CrawlError::Unknown(format!("page analysis failed for {}: {}", url, e)))?;

        self.run.indexer.accumulate(&self.accumulator, page_id, &lemmas);
        Ok(Some(links))
    }

    /// False once the run is shutting down or the site left `INDEXING`.
    async fn may_fork(&self) -> Result<bool, CrawlError> {
        if self.stopped() {
            return Ok(false);
        }
        let site = self.run.store.find_site(self.site_id).await?;
        Ok(matches!(site, Some(s) if s.status == SiteStatus::Indexing))
    }

    /// Waits for every child. The first failure halts the site and is returned
    /// after the remaining children have unwound.
    async fn join_children(
        &self,
        mut children: JoinSet<Result<(), CrawlError>>,
    ) -> Result<(), CrawlError> {
        let mut first: Option<CrawlError> = None;
        while let Some(joined) = children.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => CrawlError::Unknown(format!("crawl task failed: {}", join_err)),
            };
            if first.is_none() {
                self.halted.store(true, Ordering::SeqCst);
                first = Some(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
