//! Rows of the search index.
//!
//! A [`Site`] owns its [`Page`]s and [`Lemma`]s; an [`IndexEntry`] ties a
//! page to a lemma of the same site with a weighted rank.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INDEXING" => Some(SiteStatus::Indexing),
            "INDEXED" => Some(SiteStatus::Indexed),
            "FAILED" => Some(SiteStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    /// Canonical root URL with trailing slash.
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Unix epoch milliseconds of the last status change or page save.
    pub status_time: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub id: i64,
    pub site_id: i64,
    /// Path relative to the site root, starting with `/`.
    pub path: String,
    pub code: u16,
    /// Raw HTML; empty for non-200 responses.
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Lemma {
    pub id: i64,
    pub site_id: i64,
    pub lemma: String,
    /// Number of the site's pages containing the lemma.
    pub frequency: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub page_id: i64,
    pub lemma_id: i64,
    pub rank: f64,
}
