//! SQL-backed [`ContentSource`].
//!
//! Reads documents through the sqlx `Any` driver so the same adapter works
//! against the production MySQL blog database and against SQLite in tests.
//! Which posts are eligible is decided entirely by the configured query.
//!
//! # Query contract
//!
//! The eligible query returns one row per document with the columns:
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `id` | text | cast numeric ids to text in SQL |
//! | `body` | text, nullable | raw HTML content |
//! | `published_at` | integer | Unix seconds |
//!
//! The text query takes the document id as its only bound parameter and
//! returns a `body` column.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::Row;

use related_index_core::models::Document;
use related_index_core::source::ContentSource;

use crate::config::ContentConfig;

/// Evergreen-tagged posts, recent commerce posts, popular posts and the last
/// week's posts, excluding syndicated authors.
pub const DEFAULT_ELIGIBLE_QUERY: &str = r#"
SELECT DISTINCT
    CAST(combined.ID AS CHAR) AS id,
    combined.post_content AS body,
    CAST(UNIX_TIMESTAMP(combined.post_date) AS SIGNED) AS published_at
FROM (
    SELECT wp1.ID, wp1.post_content, wp1.post_date
    FROM wp_posts wp1
    WHERE wp1.ID IN (
        SELECT object_id FROM wp_term_relationships
        WHERE term_taxonomy_id IN (
            SELECT term_taxonomy_id FROM wp_term_taxonomy
            WHERE term_id IN (SELECT term_id FROM wp_terms WHERE name = '_evergreen')
            AND taxonomy = 'post_tag'
        )
    )
    AND wp1.post_status = 'publish'
    AND wp1.post_type = 'post'
    AND wp1.post_modified > DATE_SUB(NOW(), INTERVAL 6 MONTH)
    AND wp1.post_author NOT IN (6301, 5873, 5947, 6430, 6524, 6554, 5684)

    UNION ALL

    SELECT wp2.ID, wp2.post_content, wp2.post_date
    FROM wp_posts wp2
    WHERE wp2.ID IN (
        SELECT object_id FROM wp_term_relationships
        WHERE term_taxonomy_id IN (
            SELECT term_taxonomy_id FROM wp_term_taxonomy
            WHERE term_id IN (SELECT term_id FROM wp_terms WHERE name = 'commerce')
            AND taxonomy = 'category'
        )
    )
    AND wp2.post_status = 'publish'
    AND wp2.post_type = 'post'
    AND wp2.post_modified > DATE_SUB(NOW(), INTERVAL 1 MONTH)
    AND wp2.post_author NOT IN (6301, 5873, 5947, 6430, 6524, 6554, 5684)

    UNION ALL

    SELECT wpp.ID, wpp.post_content, wpp.post_date
    FROM wp_posts wpp
    JOIN popular_posts wppp ON wpp.ID = wppp.post_id
    WHERE wpp.post_author NOT IN (6301, 5873, 5947, 6430, 6524, 6554, 5684)
    AND wpp.post_modified > DATE_SUB(NOW(), INTERVAL 1 YEAR)

    UNION ALL

    SELECT wp3.ID, wp3.post_content, wp3.post_date
    FROM wp_posts wp3
    WHERE wp3.post_status = 'publish'
    AND wp3.post_type = 'post'
    AND wp3.post_date > DATE_SUB(NOW(), INTERVAL 1 WEEK)
    AND wp3.post_author NOT IN (6301, 5873, 5947, 6430, 6524, 6554, 5684)
) AS combined
ORDER BY published_at
"#;

pub const DEFAULT_TEXT_QUERY: &str = "SELECT post_content AS body FROM wp_posts WHERE ID = ?";

pub struct SqlContentSource {
    pool: AnyPool,
    eligible_query: String,
    text_query: String,
}

impl SqlContentSource {
    /// Connect to the backing store described by `config`.
    pub async fn connect(config: &ContentConfig) -> Result<Self> {
        if config.url.is_empty() {
            anyhow::bail!("content.url is not set (or RELIDX_CONTENT_URL)");
        }
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.url)
            .await
            .context("Failed to connect to the content database")?;

        Ok(Self::with_pool(
            pool,
            &config.eligible_query,
            &config.text_query,
        ))
    }

    pub fn with_pool(pool: AnyPool, eligible_query: &str, text_query: &str) -> Self {
        Self {
            pool,
            eligible_query: eligible_query.to_string(),
            text_query: text_query.to_string(),
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

#[async_trait]
impl ContentSource for SqlContentSource {
    async fn list_eligible_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&self.eligible_query)
            .fetch_all(&self.pool)
            .await
            .context("Eligible-documents query failed")?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let body: Option<String> = row.try_get("body")?;
            let published_at: i64 = row.try_get("published_at")?;
            let published_at = DateTime::from_timestamp(published_at, 0).with_context(|| {
                format!("document {} has an out-of-range publish date", id)
            })?;

            documents.push(Document {
                id,
                raw_text: body.unwrap_or_default(),
                published_at,
            });
        }

        tracing::debug!(rows = documents.len(), "read eligible documents");
        Ok(documents)
    }

    async fn get_document_text(&self, id: &str) -> Result<Option<String>> {
        let row = sqlx::query(&self.text_query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read document {}", id))?;

        match row {
            Some(row) => {
                let body: Option<String> = row.try_get("body")?;
                Ok(Some(body.unwrap_or_default()))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ELIGIBLE: &str = "SELECT CAST(ID AS TEXT) AS id, post_content AS body, published_at \
                            FROM wp_posts WHERE post_status = 'publish'";

    async fn source(tmp: &TempDir) -> SqlContentSource {
        let config = ContentConfig {
            url: format!("sqlite://{}?mode=rwc", tmp.path().join("blog.db").display()),
            eligible_query: ELIGIBLE.to_string(),
            max_connections: 1,
            ..Default::default()
        };
        let source = SqlContentSource::connect(&config).await.unwrap();

        sqlx::query(
            "CREATE TABLE wp_posts (ID INTEGER PRIMARY KEY, post_content TEXT, \
             post_status TEXT NOT NULL, published_at INTEGER NOT NULL)",
        )
        .execute(source.pool())
        .await
        .unwrap();
        for (id, body, status, ts) in [
            (1_i64, Some("<p>First post</p>"), "publish", 1_700_000_000_i64),
            (2, None, "publish", 1_700_000_100),
            (3, Some("Draft"), "draft", 1_700_000_200),
        ] {
            sqlx::query(
                "INSERT INTO wp_posts (ID, post_content, post_status, published_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(body)
            .bind(status)
            .bind(ts)
            .execute(source.pool())
            .await
            .unwrap();
        }
        source
    }

    #[tokio::test]
    async fn lists_eligible_rows_as_documents() {
        let tmp = TempDir::new().unwrap();
        let source = source(&tmp).await;

        let mut docs = source.list_eligible_documents().await.unwrap();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "1");
        assert_eq!(docs[0].raw_text, "<p>First post</p>");
        assert_eq!(docs[0].published_at.timestamp(), 1_700_000_000);
        assert_eq!(docs[1].raw_text, "");
    }

    #[tokio::test]
    async fn text_lookup_distinguishes_missing_from_empty() {
        let tmp = TempDir::new().unwrap();
        let source = source(&tmp).await;

        assert_eq!(
            source.get_document_text("3").await.unwrap().as_deref(),
            Some("Draft")
        );
        assert_eq!(source.get_document_text("2").await.unwrap().as_deref(), Some(""));
        assert_eq!(source.get_document_text("999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_url_is_rejected() {
        assert!(SqlContentSource::connect(&ContentConfig::default()).await.is_err());
    }
}
