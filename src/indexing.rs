//! Site orchestration: full indexing runs, stop requests and single-page
//! refreshes.
//!
//! A full run resets every configured site to a fresh `INDEXING` row and
//! crawls all of them concurrently under one [`Scheduler`]. When a site's
//! crawl returns, its accumulated lemmas are flushed (or, after a failure,
//! flushed or discarded per [`FailurePolicy`]) and the row moves to
//! `INDEXED` or `FAILED` with the classified message.

use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::app::App;
use crate::config::{Config, FailurePolicy, SiteConfig};
use crate::crawler::{CrawlRun, Scheduler};
use crate::error::CrawlError;
use crate::fetch::{FetchedPage, Fetcher};
use crate::indexer::Indexer;
use crate::models::{Site, SiteStatus};
use crate::store::Store;
use crate::urls::{self, UrlError};

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("Indexing already started")]
    AlreadyStarted,
    #[error("Indexing is not started")]
    NotStarted,
    #[error("Page is located outside the sites specified in the configuration file")]
    OutsideConfiguredSites,
    #[error("Path incorrect")]
    InvalidUrl(#[source] UrlError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Final state of one site after a run or a single-page refresh.
#[derive(Debug, Clone)]
pub struct SiteOutcome {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub error: Option<String>,
    pub pages: usize,
}

pub struct IndexingService {
    config: Arc<Config>,
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    indexer: Arc<Indexer>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
    active: Arc<AtomicUsize>,
}

/// Counts a running site crawl for as long as it lives.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl IndexingService {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        indexer: Arc<Indexer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            fetcher,
            indexer,
            scheduler: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// True while any site crawl of the current run is outstanding.
    pub fn is_indexing_now(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Resets every configured site and starts crawling them in the
    /// background. The handle resolves when all sites are done.
    pub async fn start_indexing(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Vec<SiteOutcome>>, IndexingError> {
        let mut current = self.scheduler.lock().await;
        if self.is_indexing_now() {
            return Err(IndexingError::AlreadyStarted);
        }

        let mut sites = Vec::with_capacity(self.config.sites.len());
        for site in &self.config.sites {
            let root = site.root_url()?;
            sites.push(self.store.reset_site(&root, &site.name).await?);
        }

        let scheduler = Arc::new(Scheduler::new(self.config.crawl.max_concurrency));
        *current = Some(Arc::clone(&scheduler));
        let run = CrawlRun::new(
            scheduler,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.store),
            Arc::clone(&self.indexer),
            self.config.crawl.clone(),
        );

        info!(sites = sites.len(), "indexing started");
        let mut tasks = JoinSet::new();
        for site in sites {
            let guard = ActiveGuard::new(&self.active);
            let service = Arc::clone(self);
            let run = Arc::clone(&run);
            tasks.spawn(async move {
                let _guard = guard;
                service.index_site(run, site).await
            });
        }

        Ok(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => error!(error = %e, "site indexing task failed"),
                }
            }
            info!(sites = outcomes.len(), "indexing finished");
            outcomes
        }))
    }

    /// Shuts the current run's scheduler down. Sites still crawling end as
    /// `FAILED` with the interruption message.
    pub async fn stop_indexing(&self) -> Result<(), IndexingError> {
        if !self.is_indexing_now() {
            return Err(IndexingError::NotStarted);
        }
        if let Some(scheduler) = self.scheduler.lock().await.as_ref() {
            scheduler.shutdown();
        }
        info!("indexing stop requested");
        Ok(())
    }

    async fn index_site(&self, run: Arc<CrawlRun>, site: Site) -> SiteOutcome {
        let outcome = run.crawl_site(&site).await;
        let store = self.store.as_ref();

        let (status, error) = match outcome.result {
            Ok(()) => match outcome.accumulator.flush(store).await {
                Ok(summary) => {
                    info!(
                        site = %site.url,
                        lemmas = summary.lemmas,
                        entries = summary.entries,
                        "site indexed"
                    );
                    (SiteStatus::Indexed, None)
                }
                Err(e) => {
                    let err = CrawlError::Storage(e);
                    error!(site = %site.url, error = %err, "flush failed");
                    (SiteStatus::Failed, Some(err.message(&self.config.messages)))
                }
            },
            Err(err) => {
                match self.config.indexing.on_failure {
                    FailurePolicy::Flush => match outcome.accumulator.flush(store).await {
                        Ok(summary) => info!(
                            site = %site.url,
                            lemmas = summary.lemmas,
                            entries = summary.entries,
                            "partial index flushed"
                        ),
                        Err(e) => error!(site = %site.url, error = %e, "partial flush failed"),
                    },
                    FailurePolicy::Discard => {
                        let dropped = outcome.accumulator.discard();
                        info!(
                            site = %site.url,
                            lemmas = dropped.lemmas,
                            entries = dropped.entries,
                            "partial index discarded"
                        );
                    }
                }
                (SiteStatus::Failed, Some(err.message(&self.config.messages)))
            }
        };

        if let Err(e) = store
            .set_site_status(site.id, status, error.as_deref())
            .await
        {
            error!(site = %site.url, error = %e, "failed to record site status");
        }

        SiteOutcome {
            url: site.url,
            name: site.name,
            status,
            error,
            pages: outcome.pages,
        }
    }

    /// Checks `url` against the configured sites and refreshes it in the
    /// background.
    pub fn index_page(
        self: &Arc<Self>,
        url: &str,
    ) -> Result<JoinHandle<Result<SiteOutcome, IndexingError>>, IndexingError> {
        self.resolve(url)?;
        let service = Arc::clone(self);
        let url = url.trim().to_string();
        Ok(tokio::spawn(async move {
            let outcome = service.index_single_page(&url).await;
            if let Err(e) = &outcome {
                error!(url = %url, error = %e, "single page indexing failed");
            }
            outcome
        }))
    }

    /// Fetches one page without following links and replaces its index.
    ///
    /// An existing site is `INDEXING` for the duration and ends `INDEXED`
    /// whatever the HTTP status of the page. A failed fetch or page swap
    /// marks it `FAILED`.
    pub async fn index_single_page(&self, url: &str) -> Result<SiteOutcome, IndexingError> {
        let url = url.trim();
        let (root, site_config) = self.resolve(url)?;
        let store = self.store.as_ref();

        // The site stays out of search until its page is replaced.
        let site = match store.find_site_by_url(&root).await? {
            Some(site) => {
                store
                    .set_site_status(site.id, SiteStatus::Indexing, None)
                    .await?;
                site
            }
            None => {
                store
                    .create_site(&root, &site_config.name, SiteStatus::Indexing)
                    .await?
            }
        };

        let fetched = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                let err = CrawlError::from(e);
                let message = err.message(&self.config.messages);
                warn!(url, error = %err, "single page fetch failed");
                store
                    .set_site_status(site.id, SiteStatus::Failed, Some(&message))
                    .await?;
                return Ok(SiteOutcome {
                    url: site.url,
                    name: site.name,
                    status: SiteStatus::Failed,
                    error: Some(message),
                    pages: 0,
                });
            }
        };

        if let Err(e) = self.replace_page(site.id, url, fetched).await {
            warn!(url, error = %e, "single page refresh failed");
            store
                .set_site_status(
                    site.id,
                    SiteStatus::Failed,
                    Some(&self.config.messages.unknown),
                )
                .await?;
            return Err(e.into());
        }

        store
            .set_site_status(site.id, SiteStatus::Indexed, None)
            .await?;

        Ok(SiteOutcome {
            url: site.url,
            name: site.name,
            status: SiteStatus::Indexed,
            error: None,
            pages: 1,
        })
    }

    /// Swaps the stored copy of `url` for `fetched`, correcting lemma frequencies.
    async fn replace_page(
        &self,
        site_id: i64,
        url: &str,
        fetched: FetchedPage,
    ) -> anyhow::Result<()> {
        let store = self.store.as_ref();
        let path = urls::page_path(&urls::normalize_href(url));
        if let Some(old) = store.find_page(site_id, &path).await? {
            self.indexer
                .correct_frequencies_on_reindex(store, site_id, &old.content)
                .await?;
            store.delete_page(old.id).await?;
        }

        let page_id = store
            .save_page(site_id, &path, fetched.status, &fetched.html)
            .await?;

        if fetched.status == 200 {
            let indexer = Arc::clone(&self.indexer);
            let body = fetched.html;
            let lemmas = tokio::task::spawn_blocking(move || indexer.page_lemmas_from_html(&body))
                .await
                .map_err(|e| anyhow!("page analysis failed: {}", e))?;
            let entries = self
                .indexer
                .accumulate_single_page(store, site_id, page_id, &lemmas)
                .await?;
            info!(url, entries, "page indexed");
        } else {
            info!(url, status = fetched.status, "page stored without index");
        }
        Ok(())
    }

    /// Canonical root and configuration of the site owning `url`.
    fn resolve(&self, url: &str) -> Result<(String, SiteConfig), IndexingError> {
        let root = urls::root_url(url).map_err(IndexingError::InvalidUrl)?;
        let site = self
            .config
            .site_for_root(&root)
            .ok_or(IndexingError::OutsideConfiguredSites)?;
        Ok((site.root_url()?, site.clone()))
    }
}

/// Run the index command: crawl every configured site and print the outcome.
pub async fn run_index(app: &App) -> anyhow::Result<()> {
    let mut handle = app.indexing.start_indexing().await?;
    let outcomes = tokio::select! {
        joined = &mut handle => joined?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, stopping indexing");
            if let Err(e) = app.indexing.stop_indexing().await {
                warn!(error = %e, "stop request ignored");
            }
            handle.await?
        }
    };

    print_outcomes(&outcomes);
    Ok(())
}

/// Run the index-page command: refresh one URL and print the outcome.
pub async fn run_index_page(app: &App, url: &str) -> anyhow::Result<()> {
    let outcome = app.indexing.index_single_page(url).await?;
    print_outcomes(std::slice::from_ref(&outcome));
    Ok(())
}

fn print_outcomes(outcomes: &[SiteOutcome]) {
    for outcome in outcomes {
        println!(
            "{:<10} {} ({}), {} page(s)",
            outcome.status.as_str(),
            urls::display_url(&outcome.url),
            outcome.name,
            outcome.pages
        );
        if let Some(error) = &outcome.error {
            println!("           {}", error);
        }
    }
}
