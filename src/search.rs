//! Ranked full-text search over the lemma index.
//!
//! # Pipeline
//!
//! 1. Reject empty queries, and searches while a site in scope is not `INDEXED`.
//! 2. Lemmatize the query and load the matching lemma rows, rarest first.
//! 3. Split off stop lemmas: rows whose frequency exceeds
//!    `stop_lemma_percentile`% of their site's page count. They are reported
//!    back as `frequent_lemmas` but take no part in matching.
//! 4. Per site, intersect the page sets of the remaining lemmas. A query
//!    lemma indexed on any site in scope is required on every site, so a
//!    site lacking it contributes nothing. So does a site whose matched
//!    lemmas are all stop lemmas.
//! 5. Score each page by the sum of its ranks for those lemmas, build a
//!    snippet highlighting every query lemma, sort by score then title, and
//!    divide by the top score.
//! 6. Apply `offset` / `limit`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::app::App;
use crate::config::SearchConfig;
use crate::html;
use crate::lemmatizer::Lemmatizer;
use crate::models::{Lemma, Page, Site, SiteStatus};
use crate::snippet;
use crate::store::Store;
use crate::urls;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Empty search query")]
    EmptyQuery,
    #[error("Indexing not finished yet successfully")]
    IndexingIncomplete,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    /// Site root without trailing slash.
    pub site: String,
    pub site_name: String,
    /// Page path relative to the site root.
    pub uri: String,
    pub title: String,
    pub snippet: String,
    /// Relative relevance in `[0, 1]`.
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequentLemma {
    pub lemma: String,
    /// Display name of the site the lemma is frequent on.
    pub site: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Number of results before pagination.
    pub count: usize,
    pub data: Vec<SearchResultItem>,
    pub frequent_lemmas: Vec<FrequentLemma>,
}

pub struct SearchEngine {
    store: Arc<dyn Store>,
    lemmatizer: Lemmatizer,
    config: SearchConfig,
}

struct Candidate {
    page: Page,
    site_url: String,
    site_name: String,
    lemmas: HashSet<String>,
    relevance: f64,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn Store>, lemmatizer: Lemmatizer, config: SearchConfig) -> Self {
        Self {
            store,
            lemmatizer,
            config,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        site: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<SearchResults, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let site_filter = site.map(str::trim).filter(|s| !s.is_empty());
        let scope = self.sites_in_scope(site_filter).await?;

        let mut query_lemmas: Vec<String> =
            self.lemmatizer.count_lemmas(query).into_keys().collect();
        query_lemmas.sort();
        if query_lemmas.is_empty() {
            return Ok(SearchResults::default());
        }

        let scope_filter = match site_filter {
            Some(_) => scope.first().map(|s| s.id),
            None => None,
        };
        let sites_by_id: HashMap<i64, &Site> = scope.iter().map(|s| (s.id, s)).collect();
        let mut lemmas: Vec<Lemma> = self
            .store
            .find_lemmas(&query_lemmas, scope_filter)
            .await?
            .into_iter()
            .filter(|l| sites_by_id.contains_key(&l.site_id))
            .collect();
        lemmas.sort_by(|a, b| {
            a.frequency
                .cmp(&b.frequency)
                .then_with(|| a.lemma.cmp(&b.lemma))
        });

        let mut thresholds: HashMap<i64, f64> = HashMap::new();
        for site in &scope {
            let threshold = self
                .store
                .frequency_threshold(site.id, self.config.stop_lemma_percentile)
                .await?;
            thresholds.insert(site.id, threshold);
        }

        let complete_sites: HashSet<i64> = {
            let required: BTreeSet<&str> = lemmas.iter().map(|l| l.lemma.as_str()).collect();
            let mut present: HashMap<i64, BTreeSet<&str>> = HashMap::new();
            for lemma in &lemmas {
                present
                    .entry(lemma.site_id)
                    .or_default()
                    .insert(lemma.lemma.as_str());
            }
            scope
                .iter()
                .filter(|s| present.get(&s.id).is_some_and(|p| *p == required))
                .map(|s| s.id)
                .collect()
        };

        let (stop, surviving): (Vec<Lemma>, Vec<Lemma>) = lemmas.into_iter().partition(|l| {
            let threshold = thresholds.get(&l.site_id).copied().unwrap_or(f64::INFINITY);
            l.frequency as f64 > threshold
        });

        let frequent_lemmas: Vec<FrequentLemma> = stop
            .iter()
            .map(|l| FrequentLemma {
                lemma: l.lemma.clone(),
                site: sites_by_id
                    .get(&l.site_id)
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
            })
            .collect();

        let snippet_lemmas: HashSet<String> = query_lemmas.iter().cloned().collect();
        let mut candidates = Vec::new();
        for site in &scope {
            if !complete_sites.contains(&site.id) {
                debug!(site = %site.url, "site lacks a query lemma");
                continue;
            }
            let site_lemmas: Vec<&Lemma> =
                surviving.iter().filter(|l| l.site_id == site.id).collect();
            if site_lemmas.is_empty() {
                continue;
            }

            let page_ids = self.intersect_pages(&site_lemmas).await?;
            if page_ids.is_empty() {
                continue;
            }

            let lemma_ids: Vec<i64> = site_lemmas.iter().map(|l| l.id).collect();
            let page_ids: Vec<i64> = page_ids.into_iter().collect();
            for page in self.store.pages_by_ids(&page_ids).await? {
                let relevance = self.store.relevance(page.id, &lemma_ids).await?;
                candidates.push(Candidate {
                    page,
                    site_url: urls::display_url(&site.url).to_string(),
                    site_name: site.name.clone(),
                    lemmas: snippet_lemmas.clone(),
                    relevance,
                });
            }
        }

        let mut data = self.render(candidates).await?;
        rank(&mut data);

        let count = data.len();
        let data: Vec<SearchResultItem> = data.into_iter().skip(offset).take(limit).collect();
        debug!(query, count, returned = data.len(), "search finished");

        Ok(SearchResults {
            count,
            data,
            frequent_lemmas,
        })
    }

    /// Sites the query runs against. Every one of them must be `INDEXED`.
    async fn sites_in_scope(&self, site_filter: Option<&str>) -> Result<Vec<Site>, SearchError> {
        let sites = self.store.list_sites().await?;
        match site_filter {
            Some(filter) => {
                let root = urls::root_url(filter).map_err(|_| SearchError::IndexingIncomplete)?;
                let site = sites
                    .into_iter()
                    .find(|s| s.url.eq_ignore_ascii_case(&root))
                    .ok_or(SearchError::IndexingIncomplete)?;
                if site.status != SiteStatus::Indexed {
                    return Err(SearchError::IndexingIncomplete);
                }
                Ok(vec![site])
            }
            None => {
                if sites.is_empty() || sites.iter().any(|s| s.status != SiteStatus::Indexed) {
                    return Err(SearchError::IndexingIncomplete);
                }
                Ok(sites)
            }
        }
    }

    /// Pages carrying every lemma in `lemmas`, which are sorted rarest first.
    async fn intersect_pages(&self, lemmas: &[&Lemma]) -> Result<BTreeSet<i64>> {
        let mut pages: Option<BTreeSet<i64>> = None;
        for lemma in lemmas {
            let found: BTreeSet<i64> = self
                .store
                .page_ids_for_lemmas(&[lemma.id])
                .await?
                .into_iter()
                .collect();
            let next = match pages {
                None => found,
                Some(current) => current.intersection(&found).copied().collect(),
            };
            if next.is_empty() {
                return Ok(next);
            }
            pages = Some(next);
        }
        Ok(pages.unwrap_or_default())
    }

    /// Titles and snippets, built off the async runtime.
    async fn render(&self, candidates: Vec<Candidate>) -> Result<Vec<SearchResultItem>> {
        let lemmatizer = self.lemmatizer.clone();
        let border = self.config.snippet_border;
        let drop_empty = self.config.drop_empty_snippets;

        tokio::task::spawn_blocking(move || {
            candidates
                .into_iter()
                .filter_map(|c| {
                    let parsed = html::parse_page(&c.page.content, None);
                    let snippet =
                        snippet::snippet_for(&lemmatizer, &parsed.body_text, &c.lemmas, border);
                    if drop_empty && !snippet.highlighted {
                        return None;
                    }
                    Some(SearchResultItem {
                        site: c.site_url,
                        site_name: c.site_name,
                        uri: c.page.path,
                        title: parsed.title,
                        snippet: snippet.text,
                        relevance: c.relevance,
                    })
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| anyhow!("snippet rendering failed: {}", e))
    }
}

/// Run the search command: query the index and print ranked results.
pub async fn run_search(
    app: &App,
    query: &str,
    site: Option<&str>,
    offset: usize,
    limit: Option<usize>,
) -> Result<()> {
    let limit = limit.unwrap_or(app.config.search.default_limit);
    let results = app.search.search(query, site, offset, limit).await?;

    if !results.frequent_lemmas.is_empty() {
        let frequent: Vec<String> = results
            .frequent_lemmas
            .iter()
            .map(|f| format!("{} ({})", f.lemma, f.site))
            .collect();
        println!("Ignored frequent lemmas: {}", frequent.join(", "));
    }

    if results.data.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("{} result(s), showing {}:", results.count, results.data.len());
    for (i, item) in results.data.iter().enumerate() {
        println!();
        println!(
            "{}. [{:.2}] {}",
            offset + i + 1,
            item.relevance,
            if item.title.is_empty() { "(untitled)" } else { item.title.as_str() }
        );
        println!("    {}{}  ({})", item.site, item.uri, item.site_name);
        println!("    {}", item.snippet);
    }

    Ok(())
}

/// Sorts by absolute relevance (descending) then title, and rescales so the
/// best result has relevance 1.0.
fn rank(items: &mut [SearchResultItem]) {
    items.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
    });

    let max = items.iter().map(|i| i.relevance).fold(0.0_f64, f64::max);
    for item in items.iter_mut() {
        item.relevance = if max > 0.0 { item.relevance / max } else { 1.0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, relevance: f64) -> SearchResultItem {
        SearchResultItem {
            site: "https://lenta.ru".into(),
            site_name: "Lenta".into(),
            uri: format!("/{}/", title),
            title: title.into(),
            snippet: String::new(),
            relevance,
        }
    }

    #[test]
    fn test_rank_orders_and_normalizes() {
        let mut items = vec![item("b", 1.3), item("c", 2.6), item("a", 1.3)];
        rank(&mut items);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
        assert_eq!(items[0].relevance, 1.0);
        assert!((items[1].relevance - 0.5).abs() < 1e-9);
        assert!(items.iter().all(|i| (0.0..=1.0).contains(&i.relevance)));
    }

    #[test]
    fn test_rank_handles_zero_scores() {
        let mut items = vec![item("a", 0.0), item("b", 0.0)];
        rank(&mut items);
        assert!(items.iter().all(|i| i.relevance == 1.0));
    }

    #[test]
    fn test_results_serialize_camel_case() {
        let results = SearchResults {
            count: 1,
            data: vec![item("a", 1.0)],
            frequent_lemmas: vec![FrequentLemma {
                lemma: "страница".into(),
                site: "Lenta".into(),
            }],
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["data"][0]["siteName"], "Lenta");
        assert_eq!(json["frequentLemmas"][0]["lemma"], "страница");
    }
}
