//! Lemma and index accumulation.
//!
//! During a full-site crawl every page adds to a [`SiteAccumulator`] owned by
//! that site's crawl. Frequencies are counted per page (a lemma seen ten
//! times on a page still adds one), index entries are held as
//! `(page, lemma string, rank)` until [`SiteAccumulator::flush`] writes the
//! lemmas, learns their ids and then writes the entries.
//!
//! The single-page path skips the accumulator and writes straight to the
//! store, after first undoing the previous version of the page through
//! [`Indexer::correct_frequencies_on_reindex`].

use anyhow::Result;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::config::RankingConfig;
use crate::html;
use crate::lemmatizer::Lemmatizer;
use crate::models::IndexEntry;
use crate::store::Store;

/// Lemma counts of one page, split by where they occur.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLemmas {
    pub title: HashMap<String, usize>,
    pub body: HashMap<String, usize>,
}

impl PageLemmas {
    /// Every lemma present in title or body, sorted.
    pub fn lemmas(&self) -> BTreeSet<&str> {
        self.title
            .keys()
            .chain(self.body.keys())
            .map(|s| s.as_str())
            .collect()
    }

    pub fn rank(&self, lemma: &str, weights: RankingConfig) -> f64 {
        let title = self.title.get(lemma).copied().unwrap_or(0) as f64;
        let body = self.body.get(lemma).copied().unwrap_or(0) as f64;
        title * weights.title_weight + body * weights.body_weight
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.body.is_empty()
    }
}

#[derive(Clone)]
pub struct Indexer {
    lemmatizer: Lemmatizer,
    weights: RankingConfig,
}

impl Indexer {
    pub fn new(lemmatizer: Lemmatizer, weights: RankingConfig) -> Self {
        Self {
            lemmatizer,
            weights,
        }
    }

    pub fn weights(&self) -> RankingConfig {
        self.weights
    }

    /// Lemma counts of an already parsed page. CPU-bound; crawl tasks call
    /// it from a blocking thread.
    pub fn page_lemmas(&self, title: &str, body_text: &str) -> PageLemmas {
        PageLemmas {
            title: self.lemmatizer.count_lemmas(title),
            body: self.lemmatizer.count_lemmas(body_text),
        }
    }

    pub fn page_lemmas_from_html(&self, html_text: &str) -> PageLemmas {
        let parsed = html::parse_page(html_text, None);
        self.page_lemmas(&parsed.title, &parsed.body_text)
    }

    /// Adds one crawled page to the site's in-memory tables.
    pub fn accumulate(&self, accumulator: &SiteAccumulator, page_id: i64, lemmas: &PageLemmas) {
        accumulator.add_page(page_id, lemmas, self.weights);
    }

    /// Writes one page's lemmas and index entries directly to the store.
    pub async fn accumulate_single_page(
        &self,
        store: &dyn Store,
        site_id: i64,
        page_id: i64,
        lemmas: &PageLemmas,
    ) -> Result<usize> {
        let deltas: Vec<(String, i64)> = lemmas
            .lemmas()
            .into_iter()
            .map(|lemma| (lemma.to_string(), 1))
            .collect();
        let ids = store.upsert_lemmas(site_id, &deltas).await?;

        let entries: Vec<IndexEntry> = deltas
            .iter()
            .filter_map(|(lemma, _)| {
                ids.get(lemma).map(|&lemma_id| IndexEntry {
                    page_id,
                    lemma_id,
                    rank: lemmas.rank(lemma, self.weights),
                })
            })
            .collect();
        store.insert_index(&entries).await?;

        Ok(entries.len())
    }

    /// Withdraws one page's worth of frequency from every lemma of `old_html`.
    ///
    /// Must run before the new version of the page is accumulated.
    pub async fn correct_frequencies_on_reindex(
        &self,
        store: &dyn Store,
        site_id: i64,
        old_html: &str,
    ) -> Result<usize> {
        let old = self.page_lemmas_from_html(old_html);
        let lemmas: Vec<String> = old.lemmas().into_iter().map(str::to_string).collect();
        store.decrement_lemmas(site_id, &lemmas).await?;
        tracing::debug!(site_id, lemmas = lemmas.len(), "withdrew frequencies of previous page version");
        Ok(lemmas.len())
    }
}

#[derive(Debug, Clone)]
struct PendingEntry {
    page_id: i64,
    lemma: String,
    rank: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub lemmas: usize,
    pub entries: usize,
}

/// Per-site lemma frequencies and pending index entries of one crawl.
///
/// Shared by every task crawling the site.
#[derive(Debug)]
pub struct SiteAccumulator {
    site_id: i64,
    frequencies: DashMap<String, i64>,
    entries: Mutex<Vec<PendingEntry>>,
}

impl SiteAccumulator {
    pub fn new(site_id: i64) -> Self {
        Self {
            site_id,
            frequencies: DashMap::new(),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn add_page(&self, page_id: i64, lemmas: &PageLemmas, weights: RankingConfig) {
        let mut pending = Vec::new();
        for lemma in lemmas.lemmas() {
            *self.frequencies.entry(lemma.to_string()).or_insert(0) += 1;
            pending.push(PendingEntry {
                page_id,
                lemma: lemma.to_string(),
                rank: lemmas.rank(lemma, weights),
            });
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(pending);
    }

    pub fn frequency(&self, lemma: &str) -> i64 {
        self.frequencies.get(lemma).map(|f| *f).unwrap_or(0)
    }

    pub fn pending_entries(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Drains both tables into the store. Safe to call more than once; later
    /// calls only write what was added since.
    pub async fn flush(&self, store: &dyn Store) -> Result<FlushSummary> {
        let (deltas, entries) = self.drain();
        if deltas.is_empty() && entries.is_empty() {
            return Ok(FlushSummary::default());
        }

        let ids = store.upsert_lemmas(self.site_id, &deltas).await?;
        let rows: Vec<IndexEntry> = entries
            .into_iter()
            .filter_map(|e| {
                ids.get(&e.lemma).map(|&lemma_id| IndexEntry {
                    page_id: e.page_id,
                    lemma_id,
                    rank: e.rank,
                })
            })
            .collect();
        store.insert_index(&rows).await?;

        Ok(FlushSummary {
            lemmas: deltas.len(),
            entries: rows.len(),
        })
    }

    /// Drops everything accumulated so far.
    pub fn discard(&self) -> FlushSummary {
        let (deltas, entries) = self.drain();
        FlushSummary {
            lemmas: deltas.len(),
            entries: entries.len(),
        }
    }

    fn drain(&self) -> (Vec<(String, i64)>, Vec<PendingEntry>) {
        let keys: Vec<String> = self.frequencies.iter().map(|e| e.key().clone()).collect();
        let deltas: Vec<(String, i64)> = keys
            .into_iter()
            .filter_map(|k| self.frequencies.remove(&k))
            .collect();
        let entries = std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        (deltas, entries)
    }
}
