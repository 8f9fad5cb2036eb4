use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::urls;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub morphology: MorphologyConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Crawl behaviour: HTTP identity, throttling and link filtering.
#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_referrer")]
    pub referrer: String,
    /// Politeness delay before every page fetch.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on pages fetched and parsed at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            referrer: default_referrer(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            excluded_extensions: default_excluded_extensions(),
        }
    }
}

fn default_user_agent() -> String {
    format!("SiteSearchBot/{}", env!("CARGO_PKG_VERSION"))
}
fn default_referrer() -> String {
    "http://www.google.com".to_string()
}
fn default_delay_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_excluded_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico", "pdf", "eps", "doc", "docx",
        "xls", "xlsx", "ppt", "pptx", "zip", "rar", "gz", "7z", "mp3", "mp4", "avi", "mov",
        "css", "js", "json", "xml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Weights applied to title and body occurrences when ranking a lemma on a page.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RankingConfig {
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    #[serde(default = "default_body_weight")]
    pub body_weight: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            body_weight: default_body_weight(),
        }
    }
}

fn default_title_weight() -> f64 {
    1.0
}
fn default_body_weight() -> f64 {
    0.8
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Number of words shown on each side of a highlighted hit.
    #[serde(default = "default_snippet_border")]
    pub snippet_border: usize,
    /// Lemmas found on more than this percentage of a site's pages are stop lemmas.
    #[serde(default = "default_stop_lemma_percentile")]
    pub stop_lemma_percentile: f64,
    #[serde(default)]
    pub drop_empty_snippets: bool,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            snippet_border: default_snippet_border(),
            stop_lemma_percentile: default_stop_lemma_percentile(),
            drop_empty_snippets: false,
            default_limit: default_limit(),
        }
    }
}

fn default_snippet_border() -> usize {
    5
}
fn default_stop_lemma_percentile() -> f64 {
    95.0
}
fn default_limit() -> usize {
    20
}

/// What happens to lemmas and index entries accumulated by a crawl that failed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Persist whatever was accumulated before the failure.
    #[default]
    Flush,
    /// Drop the accumulated lemmas; pages stay stored without an index.
    Discard,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexingConfig {
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MorphologyConfig {
    /// Tab-separated `form	lemma	POS` dictionary. Optional.
    #[serde(default)]
    pub dictionary: Option<PathBuf>,
}

/// Texts stored on a site row when its indexing fails.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_interrupted")]
    pub interrupted: String,
    #[serde(default = "default_certificate")]
    pub certificate: String,
    #[serde(default = "default_unknown")]
    pub unknown: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            interrupted: default_interrupted(),
            certificate: default_certificate(),
            unknown: default_unknown(),
        }
    }
}

fn default_interrupted() -> String {
    "Indexing stopped by user".to_string()
}
fn default_certificate() -> String {
    "Site certificate is not trusted".to_string()
}
fn default_unknown() -> String {
    "Unknown error".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
}

impl SiteConfig {
    /// Canonical root URL of the site (scheme + host, `www.` stripped, trailing slash).
    pub fn root_url(&self) -> Result<String> {
        urls::root_url(&self.url)
            .with_context(|| format!("Invalid url for site '{}': {}", self.name, self.url))
    }
}

impl Config {
    /// Finds the configured site whose canonical root matches `root` (case-insensitive).
    pub fn site_for_root(&self, root: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| {
            s.root_url()
                .map(|r| r.eq_ignore_ascii_case(root))
                .unwrap_or(false)
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.crawl.max_concurrency == 0 {
        anyhow::bail!("crawl.max_concurrency must be >= 1");
    }

    if config.ranking.title_weight < 0.0 || config.ranking.body_weight < 0.0 {
        anyhow::bail!("ranking weights must be >= 0");
    }

    let pct = config.search.stop_lemma_percentile;
    if !(pct > 0.0 && pct <= 100.0) {
        anyhow::bail!("search.stop_lemma_percentile must be in (0, 100]");
    }

    if config.search.default_limit == 0 {
        anyhow::bail!("search.default_limit must be >= 1");
    }

    let mut roots = HashSet::new();
    for site in &config.sites {
        let root = site.root_url()?;
        if !roots.insert(root.to_lowercase()) {
            anyhow::bail!("Site '{}' duplicates another configured root: {}", site.name, root);
        }
    }

    Ok(config)
}
