//! Index statistics.
//!
//! [`statistics`] backs `GET /api/statistics`; [`run_stats`] prints the same
//! data for `sitesearch stats`.

use anyhow::Result;
use serde::Serialize;

use crate::app::App;
use crate::config::Config;
use crate::models::SiteStatus;
use crate::store::Store;
use crate::urls;

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<DetailedStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalStatistics {
    /// Number of configured sites.
    pub sites: usize,
    pub pages: i64,
    pub lemmas: i64,
    pub indexing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Epoch milliseconds.
    pub status_time: i64,
    pub error: Option<String>,
    pub pages: i64,
    pub lemmas: i64,
}

/// Totals plus one entry per configured site that has a stored row.
pub async fn statistics(config: &Config, store: &dyn Store, indexing: bool) -> Result<Statistics> {
    let mut detailed = Vec::with_capacity(config.sites.len());
    for site_config in &config.sites {
        let root = site_config.root_url()?;
        let Some(site) = store.find_site_by_url(&root).await? else {
            continue;
        };
        detailed.push(DetailedStatistics {
            url: urls::display_url(&site.url).to_string(),
            name: site.name,
            status: site.status,
            status_time: site.status_time,
            error: site.last_error,
            pages: store.count_pages(Some(site.id)).await?,
            lemmas: store.count_lemmas(Some(site.id)).await?,
        });
    }

    Ok(Statistics {
        total: TotalStatistics {
            sites: config.sites.len(),
            pages: store.count_pages(None).await?,
            lemmas: store.count_lemmas(None).await?,
            indexing,
        },
        detailed,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(app: &App) -> Result<()> {
    let stats = statistics(&app.config, app.store.as_ref(), app.indexing.is_indexing_now()).await?;

    println!("Site Search Index Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", app.config.db.path.display());
    println!("  Sites:       {}", stats.total.sites);
    println!("  Pages:       {}", stats.total.pages);
    println!("  Lemmas:      {}", stats.total.lemmas);

    if !stats.detailed.is_empty() {
        println!();
        println!(
            "  {:<32} {:<10} {:>8} {:>8}   {}",
            "SITE", "STATUS", "PAGES", "LEMMAS", "UPDATED"
        );
        println!("  {}", "-".repeat(84));
        for site in &stats.detailed {
            println!(
                "  {:<32} {:<10} {:>8} {:>8}   {}",
                site.url,
                site.status.as_str(),
                site.pages,
                site.lemmas,
                format_ts_millis(site.status_time)
            );
            if let Some(error) = &site.error {
                println!("    error: {}", error);
            }
        }
    }

    println!();
    Ok(())
}

fn format_ts_millis(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ts_millis() {
        assert_eq!(format_ts_millis(0), "1970-01-01 00:00");
        assert_eq!(format_ts_millis(86_400_000), "1970-01-02 00:00");
    }

    #[test]
    fn test_detailed_serializes_camel_case() {
        let entry = DetailedStatistics {
            url: "https://lenta.ru".into(),
            name: "Lenta".into(),
            status: SiteStatus::Failed,
            status_time: 1,
            error: Some("Unknown error".into()),
            pages: 2,
            lemmas: 3,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["statusTime"], 1);
        assert_eq!(json["status"], "FAILED");
    }
}
