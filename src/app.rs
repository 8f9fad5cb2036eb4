//! Wiring of the long-lived services shared by the CLI and the HTTP server.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::indexer::Indexer;
use crate::indexing::IndexingService;
use crate::lemmatizer::Lemmatizer;
use crate::migrate;
use crate::morphology::{DictionaryMorphology, Morphology};
use crate::search::SearchEngine;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub indexing: Arc<IndexingService>,
    pub search: Arc<SearchEngine>,
}

impl App {
    /// Opens the configured database (creating the schema if needed), loads
    /// the morphology dictionary and builds an HTTP fetcher.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::migrate(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.crawl)?);
        let morphology = DictionaryMorphology::load(config.morphology.dictionary.as_deref())?;
        Ok(Self::from_parts(
            Arc::new(config),
            store,
            fetcher,
            Arc::new(morphology),
        ))
    }

    pub fn from_parts(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        morphology: Arc<dyn Morphology>,
    ) -> Self {
        let lemmatizer = Lemmatizer::new(morphology);
        let indexer = Arc::new(Indexer::new(lemmatizer.clone(), config.ranking));
        let indexing = IndexingService::new(
            Arc::clone(&config),
            Arc::clone(&store),
            fetcher,
            indexer,
        );
        let search = Arc::new(SearchEngine::new(
            Arc::clone(&store),
            lemmatizer,
            config.search.clone(),
        ));

        Self {
            config,
            store,
            indexing,
            search,
        }
    }
}
