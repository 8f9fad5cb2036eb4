//! HTML extraction for crawled pages.
//!
//! `scraper::Html` is not `Send`, so every function here parses, extracts
//! owned strings and drops the tree before returning. Callers on the async
//! side never hold a parsed document across an `.await`.

use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use url::Url;

/// Elements whose text never reaches the reader.
const HIDDEN: [&str; 8] = [
    "script", "style", "noscript", "template", "iframe", "object", "embed", "svg",
];

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("static selector"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("static selector"));
static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body a[href]").expect("static selector"));

/// Everything the crawler and indexer need from one page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub body_text: String,
    /// Absolute hrefs of all body anchors, resolved against the page URL.
    pub links: Vec<String>,
}

pub fn parse_page(html: &str, base: Option<&Url>) -> ParsedPage {
    let document = Html::parse_document(html);
    let links = match base {
        Some(base) => document
            .select(&ANCHORS)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href.trim()).ok())
            .map(|url| url.to_string())
            .collect(),
        None => Vec::new(),
    };
    ParsedPage {
        title: title_of(&document),
        body_text: document
            .select(&BODY)
            .next()
            .map(visible_text_of)
            .unwrap_or_default(),
        links,
    }
}

/// Document title, whitespace-collapsed. Empty when the page has none.
fn title_of(document: &Html) -> String {
    document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default()
}

fn visible_text_of(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map(|e| HIDDEN.contains(&e.name()))
                .unwrap_or(false)
        });
        if !hidden {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
