//! SQLite-backed [`Store`] implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::{BTreeSet, HashMap};

use super::Store;
use crate::models::{IndexEntry, Lemma, Page, Site, SiteStatus};

/// Rows per multi-row INSERT. Three or four binds each stays well under
/// SQLite's host parameter limit.
const ROWS_PER_STATEMENT: usize = 200;
/// Values per `IN (...)` list.
const IN_LIST_CHUNK: usize = 800;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn site_from_row(row: &SqliteRow) -> Result<Site> {
    let status: String = row.get("status");
    Ok(Site {
        id: row.get("id"),
        url: row.get("url"),
        name: row.get("name"),
        status: SiteStatus::parse(&status)
            .ok_or_else(|| anyhow!("Unknown site status in database: {}", status))?,
        status_time: row.get("status_time"),
        last_error: row.get("last_error"),
    })
}

fn page_from_row(row: &SqliteRow) -> Page {
    let code: i64 = row.get("code");
    Page {
        id: row.get("id"),
        site_id: row.get("site_id"),
        path: row.get("path"),
        code: u16::try_from(code).unwrap_or(0),
        content: row.get("content"),
    }
}

const SITE_COLUMNS: &str = "id, url, name, status, status_time, last_error";

#[async_trait]
impl Store for SqliteStore {
    async fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let status_time = now_millis();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sites (url, name, status, status_time) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(url)
        .bind(name)
        .bind(status.as_str())
        .bind(status_time)
        .fetch_one(&self.pool)
        .await?;

        Ok(Site {
            id,
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time,
            last_error: None,
        })
    }

    async fn delete_site_by_url(&self, url: &str) -> Result<()> {
        sqlx::query("DELETE FROM sites WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_site_by_url(&self, url: &str) -> Result<Option<Site>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sites WHERE url = ? ORDER BY id DESC LIMIT 1",
            SITE_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    async fn find_site(&self, site_id: i64) -> Result<Option<Site>> {
        let row = sqlx::query(&format!("SELECT {} FROM sites WHERE id = ?", SITE_COLUMNS))
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(site_from_row).transpose()
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query(&format!("SELECT {} FROM sites ORDER BY id", SITE_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(site_from_row).collect()
    }

    async fn set_site_status(
        &self,
        site_id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE sites SET status = ?, last_error = ?, status_time = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(last_error)
            .bind(now_millis())
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_site(&self, site_id: i64) -> Result<()> {
        sqlx::query("UPDATE sites SET status_time = ? WHERE id = ?")
            .bind(now_millis())
            .bind(site_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_page(
        &self,
        site_id: i64,
        path: &str,
        code: u16,
        content: &str,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pages (site_id, path, code, content)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(site_id, path) DO UPDATE SET
                code = excluded.code,
                content = excluded.content
            RETURNING id
            "#,
        )
        .bind(site_id)
        .bind(path)
        .bind(i64::from(code))
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_page(&self, site_id: i64, path: &str) -> Result<Option<Page>> {
        let row = sqlx::query(
            "SELECT id, site_id, path, code, content FROM pages WHERE site_id = ? AND path = ?",
        )
        .bind(site_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(page_from_row))
    }

    async fn delete_page(&self, page_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pages WHERE id = ?")
            .bind(page_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pages_by_ids(&self, page_ids: &[i64]) -> Result<Vec<Page>> {
        let mut pages = Vec::with_capacity(page_ids.len());
        for chunk in page_ids.chunks(IN_LIST_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT id, site_id, path, code, content FROM pages WHERE id IN (",
            );
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.pool).await?;
            pages.extend(rows.iter().map(page_from_row));
        }
        Ok(pages)
    }

    async fn count_pages(&self, site_id: Option<i64>) -> Result<i64> {
        let count: i64 = match site_id {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE site_id = ?")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM pages")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn count_lemmas(&self, site_id: Option<i64>) -> Result<i64> {
        let count: i64 = match site_id {
            Some(id) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lemmas WHERE site_id = ?")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM lemmas")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    async fn upsert_lemmas(
        &self,
        site_id: i64,
        deltas: &[(String, i64)],
    ) -> Result<HashMap<String, i64>> {
        let mut ids = HashMap::with_capacity(deltas.len());
        if deltas.is_empty() {
            return Ok(ids);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in deltas.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO lemmas (site_id, lemma, frequency) ");
            qb.push_values(chunk, |mut row, (lemma, delta)| {
                row.push_bind(site_id)
                    .push_bind(lemma.as_str())
                    .push_bind(*delta);
            });
            qb.push(
                " ON CONFLICT(site_id, lemma) DO UPDATE SET \
                 frequency = frequency + excluded.frequency \
                 RETURNING id, lemma",
            );

            for row in qb.build().fetch_all(&mut *tx).await? {
                ids.insert(row.get("lemma"), row.get("id"));
            }
        }
        tx.commit().await?;

        Ok(ids)
    }

    async fn insert_index(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in entries.chunks(ROWS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("INSERT INTO search_index (page_id, lemma_id, rank) ");
            qb.push_values(chunk, |mut row, entry| {
                row.push_bind(entry.page_id)
                    .push_bind(entry.lemma_id)
                    .push_bind(entry.rank);
            });
            qb.push(" ON CONFLICT(page_id, lemma_id) DO UPDATE SET rank = excluded.rank");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn decrement_lemmas(&self, site_id: i64, lemmas: &[String]) -> Result<()> {
        if lemmas.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in lemmas.chunks(IN_LIST_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "UPDATE lemmas SET frequency = frequency - 1 WHERE site_id = ",
            );
            qb.push_bind(site_id);
            qb.push(" AND lemma IN (");
            let mut values = qb.separated(", ");
            for lemma in chunk {
                values.push_bind(lemma.as_str());
            }
            values.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM lemmas WHERE site_id = ? AND frequency < 1")
            .bind(site_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find_lemmas(&self, lemmas: &[String], site_id: Option<i64>) -> Result<Vec<Lemma>> {
        let mut found = Vec::new();
        for chunk in lemmas.chunks(IN_LIST_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT id, site_id, lemma, frequency FROM lemmas WHERE ");
            if let Some(id) = site_id {
                qb.push("site_id = ");
                qb.push_bind(id);
                qb.push(" AND ");
            }
            qb.push("lemma IN (");
            let mut values = qb.separated(", ");
            for lemma in chunk {
                values.push_bind(lemma.as_str());
            }
            values.push_unseparated(")");

            let rows = qb.build().fetch_all(&self.pool).await?;
            found.extend(rows.iter().map(|row| Lemma {
                id: row.get("id"),
                site_id: row.get("site_id"),
                lemma: row.get("lemma"),
                frequency: row.get("frequency"),
            }));
        }
        Ok(found)
    }

    async fn page_ids_for_lemmas(&self, lemma_ids: &[i64]) -> Result<Vec<i64>> {
        let mut page_ids = BTreeSet::new();
        for chunk in lemma_ids.chunks(IN_LIST_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT DISTINCT page_id FROM search_index WHERE lemma_id IN (");
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");

            for row in qb.build().fetch_all(&self.pool).await? {
                page_ids.insert(row.get::<i64, _>("page_id"));
            }
        }
        Ok(page_ids.into_iter().collect())
    }

    async fn relevance(&self, page_id: i64, lemma_ids: &[i64]) -> Result<f64> {
        let mut total = 0.0;
        for chunk in lemma_ids.chunks(IN_LIST_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT COALESCE(SUM(rank), 0.0) AS total FROM search_index WHERE page_id = ",
            );
            qb.push_bind(page_id);
            qb.push(" AND lemma_id IN (");
            let mut ids = qb.separated(", ");
            for id in chunk {
                ids.push_bind(*id);
            }
            ids.push_unseparated(")");

            let row = qb.build().fetch_one(&self.pool).await?;
            total += row.get::<f64, _>("total");
        }
        Ok(total)
    }
}
