//! URL helpers shared by the crawler, the orchestrator and search.
//!
//! Every site is identified by its canonical root: scheme and host with a
//! leading `www.` removed, an explicit port kept, and a trailing slash.
//! Discovered links are brought to the same shape before they are compared
//! against the visited set.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("malformed url '{0}': {1}")]
    Malformed(String, url::ParseError),
    #[error("url '{0}' has no host")]
    NoHost(String),
}

/// Canonical root of the site that `url` belongs to, e.g. `https://lenta.ru/`.
pub fn root_url(url: &str) -> Result<String, UrlError> {
    let parsed = Url::parse(url.trim()).map_err(|e| UrlError::Malformed(url.to_string(), e))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError::NoHost(url.to_string()))?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Ok(format!("{}://{}{}/", parsed.scheme(), host, port))
}

/// Brings an absolute link to crawl form: trailing slash enforced and the
/// `www.` host prefix dropped.
pub fn normalize_href(href: &str) -> String {
    let mut href = href.replacen("//www.", "//", 1);
    if !href.ends_with('/') {
        href.push('/');
    }
    href
}

/// Path of a page relative to its site root, always starting with `/`.
///
/// Directory-like paths keep the trailing slash added by [`normalize_href`];
/// file-like paths (`/news/item.html/`) lose it again.
pub fn page_path(page_url: &str) -> String {
    let raw = match Url::parse(page_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => page_url
            .find("://")
            .and_then(|i| page_url[i + 3..].find('/').map(|j| page_url[i + 3 + j..].to_string()))
            .unwrap_or_else(|| "/".to_string()),
    };
    let mut path = if raw.starts_with('/') { raw } else { format!("/{}", raw) };
    if path.len() > 1 && last_segment(&path).contains('.') && path.ends_with('/') {
        path.pop();
    }
    path
}

/// True when `href` should be scheduled for crawling under `root`.
///
/// The visited-set check is not part of this; the crawler does it atomically
/// while reserving the link.
pub fn is_href_valid(root: &str, href: &str, excluded_extensions: &[String]) -> bool {
    href.starts_with(root)
        && !href.contains('#')
        && !href.contains('?')
        && !has_excluded_extension(href, excluded_extensions)
        && href != root
        && href != format!("{}/", root)
}

fn has_excluded_extension(href: &str, excluded_extensions: &[String]) -> bool {
    let segment = last_segment(href);
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => excluded_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

fn last_segment(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Site URL as shown to users: the root without its trailing slash.
pub fn display_url(root: &str) -> &str {
    root.strip_suffix('/').unwrap_or(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["jpg".to_string(), "pdf".to_string(), "png".to_string()]
    }

    #[test]
    fn test_root_url_strips_www_and_path() {
        assert_eq!(root_url("https://www.lenta.ru/news/1").unwrap(), "https://lenta.ru/");
        assert_eq!(root_url("http://Example.COM").unwrap(), "http://example.com/");
    }

    #[test]
    fn test_root_url_keeps_explicit_port() {
        assert_eq!(
            root_url("http://127.0.0.1:8081/a/").unwrap(),
            "http://127.0.0.1:8081/"
        );
    }

    #[test]
    fn test_root_url_rejects_garbage() {
        assert!(matches!(root_url("lenta.ru"), Err(UrlError::Malformed(..))));
        assert!(root_url("").is_err());
    }

    #[test]
    fn test_normalize_href() {
        assert_eq!(normalize_href("https://www.lenta.ru/news"), "https://lenta.ru/news/");
        assert_eq!(normalize_href("https://lenta.ru/news/"), "https://lenta.ru/news/");
    }

    #[test]
    fn test_page_path() {
        assert_eq!(page_path("https://lenta.ru/"), "/");
        assert_eq!(page_path("https://lenta.ru/news/sport/"), "/news/sport/");
        assert_eq!(page_path("https://lenta.ru/news/item.html/"), "/news/item.html");
        assert_eq!(page_path("https://lenta.ru/news/item.html"), "/news/item.html");
    }

    #[test]
    fn test_href_validity() {
        let root = "https://lenta.ru/";
        assert!(is_href_valid(root, "https://lenta.ru/news/", &exts()));
        assert!(!is_href_valid(root, "https://other.ru/news/", &exts()));
        assert!(!is_href_valid(root, "https://lenta.ru/news/?page=2/", &exts()));
        assert!(!is_href_valid(root, "https://lenta.ru/news/#top/", &exts()));
        assert!(!is_href_valid(root, "https://lenta.ru/img/photo.JPG/", &exts()));
        assert!(!is_href_valid(root, "https://lenta.ru/", &exts()));
        assert!(!is_href_valid(root, "https://lenta.ru//", &exts()));
        assert!(is_href_valid(root, "https://lenta.ru/page.html/", &exts()));
    }

    #[test]
    fn test_display_url() {
        assert_eq!(display_url("https://lenta.ru/"), "https://lenta.ru");
    }
}
