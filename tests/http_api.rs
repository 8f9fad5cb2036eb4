//! HTTP API over a live axum server on an ephemeral port.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use site_search::app::App;
use site_search::config::parse_config;
use site_search::fetch::{FetchError, FetchedPage, Fetcher};
use site_search::morphology::DictionaryMorphology;
use site_search::server;
use site_search::store::sqlite::SqliteStore;
use site_search::store::Store;
use site_search::{db, migrate};

// ─── Helpers ────────────────────────────────────────────────────────

/// Serves a two-page site.
struct TwoPageSite;

#[async_trait]
impl Fetcher for TwoPageSite {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let html = match url.trim_end_matches('/') {
            "http://site.test" => {
                r#"<html><head><title>Главная</title></head>
                <body><a href="/leopard">Хищники</a></body></html>"#
            }
            "http://site.test/leopard" => {
                r#"<html><head><title>Леопард</title></head>
                <body><p>Дальневосточный леопард живет в лесу.</p></body></html>"#
            }
            _ => {
                return Ok(FetchedPage {
                    status: 404,
                    html: String::new(),
                })
            }
        };
        Ok(FetchedPage {
            status: 200,
            html: html.to_string(),
        })
    }
}

async fn test_app(tmp: &TempDir) -> App {
    let db_path = tmp.path().join("search.sqlite");
    let text = format!(
        r#"
[db]
path = "{}"

[server]
bind = "127.0.0.1:0"

[crawl]
delay_ms = 0

[[sites]]
name = "Заповедник"
url = "http://site.test"
"#,
        db_path.display()
    );
    let cfg = parse_config(&text).unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    App::from_parts(
        Arc::new(cfg),
        store,
        Arc::new(TwoPageSite),
        Arc::new(DictionaryMorphology::builtin()),
    )
}

/// Serves `app` on an ephemeral port and returns its base URL.
async fn spawn_server(app: App) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(app)).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn get_json(client: &reqwest::Client, url: &str) -> (u16, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn wait_until_idle(client: &reqwest::Client, base: &str) -> Value {
    for _ in 0..100 {
        let (_, body) = get_json(client, &format!("{}/api/statistics", base)).await;
        if body["statistics"]["total"]["indexing"] == false {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("indexing did not finish within 5 seconds");
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health() {
    let tmp = TempDir::new().unwrap();
    let base = spawn_server(test_app(&tmp).await).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{}/health", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_user_errors_are_bad_requests() {
    let tmp = TempDir::new().unwrap();
    let base = spawn_server(test_app(&tmp).await).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{}/api/search?query=", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["result"], false);
    assert_eq!(body["error"], "Empty search query");

    let (status, body) = get_json(&client, &format!("{}/api/search?query=леопард", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Indexing not finished yet successfully");

    let (status, body) = get_json(&client, &format!("{}/api/stopIndexing", base)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Indexing is not started");

    let resp = client
        .post(format!("{}/api/indexPage", base))
        .query(&[("url", "http://elsewhere.test/page")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"],
        "Page is located outside the sites specified in the configuration file"
    );

    let resp = client
        .post(format!("{}/api/indexPage", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Path incorrect");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_index_then_search_over_http() {
    let tmp = TempDir::new().unwrap();
    let base = spawn_server(test_app(&tmp).await).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, &format!("{}/api/startIndexing", base)).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"], true);

    let body = wait_until_idle(&client, &base).await;
    let statistics = &body["statistics"];
    assert_eq!(body["result"], true);
    assert_eq!(statistics["total"]["sites"], 1);
    assert_eq!(statistics["total"]["pages"], 2);
    let site = &statistics["detailed"][0];
    assert_eq!(site["url"], "http://site.test");
    assert_eq!(site["name"], "Заповедник");
    assert_eq!(site["status"], "INDEXED");
    assert!(site["statusTime"].as_i64().unwrap() > 0);

    let (status, body) = get_json(
        &client,
        &format!("{}/api/search?query=леопард&site=http://site.test&limit=5", base),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"], true);
    assert_eq!(body["count"], 1);
    let hit = &body["data"][0];
    assert_eq!(hit["uri"], "/leopard/");
    assert_eq!(hit["siteName"], "Заповедник");
    assert_eq!(hit["title"], "Леопард");
    assert_eq!(hit["relevance"], 1.0);
    assert!(hit["snippet"].as_str().unwrap().contains("<b>леопард</b>"));
    assert_eq!(body["frequentLemmas"], Value::Array(Vec::new()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_index_page_runs_in_background() {
    let tmp = TempDir::new().unwrap();
    let app = test_app(&tmp).await;
    let store = Arc::clone(&app.store);
    let base = spawn_server(app).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/indexPage", base))
        .query(&[("url", "http://site.test/leopard")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], true);

    for _ in 0..100 {
        if let Some(site) = store.find_site_by_url("http://site.test/").await.unwrap() {
            if store.count_lemmas(Some(site.id)).await.unwrap() > 0 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("page was not indexed within 5 seconds");
}
