//! Storage abstraction for the search index.
//!
//! The [`Store`] trait lists every query shape the crawler, the indexer,
//! search and statistics need. [`sqlite::SqliteStore`] is the shipped
//! backend; tests use it over a temporary database.
//!
//! Implementations must be `Send + Sync`: one store is shared by every crawl
//! task. Conflicting writes to the same row are serialized by the backend.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_site`](Store::create_site) | Insert a site row |
//! | [`delete_site_by_url`](Store::delete_site_by_url) | Drop a site and everything it owns |
//! | [`reset_site`](Store::reset_site) | Replace a site row with a fresh `INDEXING` one |
//! | [`save_page`](Store::save_page) | Insert or overwrite a page |
//! | [`upsert_lemmas`](Store::upsert_lemmas) | Add frequency deltas, creating missing lemmas |
//! | [`decrement_lemmas`](Store::decrement_lemmas) | Undo one page's contribution to frequencies |
//! | [`relevance`](Store::relevance) | Sum of ranks of a page for a set of lemmas |
//! | [`frequency_threshold`](Store::frequency_threshold) | Stop-lemma cutoff of a site |

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{IndexEntry, Lemma, Page, Site, SiteStatus};

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site>;

    /// Deletes the site stored under `url` together with its pages, lemmas and index.
    async fn delete_site_by_url(&self, url: &str) -> Result<()>;

    async fn reset_site(&self, url: &str, name: &str) -> Result<Site> {
        self.delete_site_by_url(url).await?;
        self.create_site(url, name, SiteStatus::Indexing).await
    }

    async fn find_site_by_url(&self, url: &str) -> Result<Option<Site>>;

    async fn find_site(&self, site_id: i64) -> Result<Option<Site>>;

    async fn list_sites(&self) -> Result<Vec<Site>>;

    /// Sets status and last error, refreshing the status time.
    async fn set_site_status(
        &self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> Result<()>;

    /// Refreshes the status time only.
    async fn touch_site(&self, site_id: i64) -> Result<()>;

    /// Stores a page, overwriting code and content when `(site, path)` exists.
    /// Returns the page id.
    async fn save_page(&self, site_id: i64, path: &str, code: u16, content: &str)
        -> Result<i64>;

    async fn find_page(&self, site_id: i64, path: &str) -> Result<Option<Page>>;

    /// Deletes a page and its index entries. Lemma frequencies are untouched.
    async fn delete_page(&self, page_id: i64) -> Result<()>;

    async fn pages_by_ids(&self, page_ids: &[i64]) -> Result<Vec<Page>>;

    /// Page count of one site, or of all sites.
    async fn count_pages(&self, site_id: Option<i64>) -> Result<i64>;

    async fn count_lemmas(&self, site_id: Option<i64>) -> Result<i64>;

    /// Adds each `(lemma, delta)` to the site's frequency table, creating
    /// rows as needed. Returns the id of every lemma passed in.
    async fn upsert_lemmas(
        &self,
        site_id: i64,
        deltas: &[(String, i64)],
    ) -> Result<HashMap<String, i64>>;

    async fn insert_index(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Lowers the frequency of each lemma by one and deletes rows that reach zero.
    async fn decrement_lemmas(&self, site_id: i64, lemmas: &[String]) -> Result<()>;

    /// Lemma rows matching any of `lemmas`, within one site or across all.
    async fn find_lemmas(&self, lemmas: &[String], site_id: Option<i64>) -> Result<Vec<Lemma>>;

    /// Distinct ids of pages indexed under any of `lemma_ids`.
    async fn page_ids_for_lemmas(&self, lemma_ids: &[i64]) -> Result<Vec<i64>>;

    /// Sum of the page's ranks over `lemma_ids`.
    async fn relevance(&self, page_id: i64, lemma_ids: &[i64]) -> Result<f64>;

    /// `percentile`% of the site's page count. Lemmas above it are stop lemmas.
    async fn frequency_threshold(&self, site_id: i64, percentile: f64) -> Result<f64> {
        let pages = self.count_pages(Some(site_id)).await?;
        Ok(pages as f64 * percentile / 100.0)
    }
}
