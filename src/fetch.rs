//! Page download.
//!
//! [`Fetcher`] is the seam the crawler and the single-page path talk to. HTTP
//! error statuses are data, not errors: a 404 comes back as a
//! [`FetchedPage`] with `status = 404` and an empty body. Only transport
//! failures, certificate failures and non-HTML responses are errors.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

use crate::config::CrawlConfig;

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    /// Response body for status 200, empty otherwise.
    pub html: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("unsupported content type '{content_type}' at {url}")]
    UnsupportedContentType { url: String, content_type: String },
    #[error("certificate of {url} is not trusted: {message}")]
    Certificate { url: String, message: String },
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// [`Fetcher`] over a shared `reqwest` client carrying the crawl identity.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_str(&config.referrer)?);

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, &e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(FetchedPage {
                status,
                html: String::new(),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_markup(content_type) {
                return Err(FetchError::UnsupportedContentType {
                    url: url.to_string(),
                    content_type: content_type.to_string(),
                });
            }
        }

        let html = response.text().await.map_err(|e| classify(url, &e))?;
        Ok(FetchedPage { status, html })
    }
}

/// Content types the HTML parser can make sense of. A missing header is accepted.
pub fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/")
        || mime == "application/xml"
        || mime == "application/xhtml+xml"
        || mime.ends_with("+xml")
}

fn classify(url: &str, err: &reqwest::Error) -> FetchError {
    let mut message = err.to_string();
    let mut source: Option<&dyn StdError> = err.source();
    let mut certificate = false;
    while let Some(cause) = source {
        let text = cause.to_string();
        if text.to_ascii_lowercase().contains("certificate") {
            certificate = true;
        }
        message = text;
        source = cause.source();
    }

    if certificate {
        FetchError::Certificate {
            url: url.to_string(),
            message,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_types() {
        assert!(is_markup("text/html; charset=utf-8"));
        assert!(is_markup("TEXT/HTML"));
        assert!(is_markup("application/xhtml+xml"));
        assert!(is_markup("application/rss+xml"));
        assert!(!is_markup("image/png"));
        assert!(!is_markup("application/pdf"));
        assert!(!is_markup("application/json"));
    }

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(HttpFetcher::new(&CrawlConfig::default()).is_ok());
    }
}
