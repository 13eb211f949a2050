/// Report images
///
/// Image rows point either at an uploaded file (served from `/uploads`) or at
/// an external URL. Files whose name starts with `default_` are category
/// placeholders and are never treated as user content.

pub mod storage;

pub use storage::{DiskUploadBackend, ImageStore, UploadBackend};

use crate::{
    db::{now_timestamp, parse_timestamp},
    error::{ApiError, ApiResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Prefix that marks placeholder images
pub const DEFAULT_IMAGE_PREFIX: &str = "default_";

const IMAGE_COLUMNS: &str = "i.id, i.image_url, i.report_id, i.is_default, i.uploaded_at";

/// True when the file part of `url` carries the placeholder prefix
pub fn is_default_image(url: &str) -> bool {
    let file_name = url.rsplit(['/', '\\']).next().unwrap_or(url);
    file_name.starts_with(DEFAULT_IMAGE_PREFIX)
}

/// True for URLs that refer to a file in the upload directory
pub fn is_local_image(url: &str) -> bool {
    !(url.starts_with("http://") || url.starts_with("https://"))
}

/// Image record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub image_url: String,
    pub report_id: i64,
    pub is_default: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// Image manager
#[derive(Clone)]
pub struct ImageManager {
    db: SqlitePool,
}

impl ImageManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Link an image to a report
    pub async fn insert(&self, report_id: i64, image_url: &str) -> ApiResult<i64> {
        let result = sqlx::query(
            "INSERT INTO images (image_url, report_id, is_default, uploaded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(image_url)
        .bind(report_id)
        .bind(is_default_image(image_url))
        .bind(now_timestamp())
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get(&self, id: i64) -> ApiResult<Image> {
        let sql = format!("SELECT {} FROM images i WHERE i.id = ?", IMAGE_COLUMNS);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Image {} not found", id)))?;

        parse_image(&row)
    }

    /// Every image row linked to a report, placeholders included
    pub async fn list_for_report(&self, report_id: i64) -> ApiResult<Vec<Image>> {
        let sql = format!(
            "SELECT {} FROM images i WHERE i.report_id = ? ORDER BY i.id",
            IMAGE_COLUMNS
        );

        let rows = sqlx::query(&sql).bind(report_id).fetch_all(&self.db).await?;
        rows.iter().map(parse_image).collect()
    }

    /// Images to display for a report.
    ///
    /// Returns the first non-empty list of: the report's uploaded images,
    /// placeholders linked to the report, one placeholder from a report in the
    /// same category, one placeholder from anywhere. Empty when none exist.
    pub async fn resolve_for_report(&self, report_id: i64) -> ApiResult<Vec<Image>> {
        let category_id: i64 = sqlx::query_scalar("SELECT category_id FROM reports WHERE id = ?")
            .bind(report_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", report_id)))?;

        for is_default in [false, true] {
            let sql = format!(
                "SELECT {} FROM images i WHERE i.report_id = ? AND i.is_default = ? ORDER BY i.id",
                IMAGE_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(report_id)
                .bind(is_default)
                .fetch_all(&self.db)
                .await?;

            if !rows.is_empty() {
                return rows.iter().map(parse_image).collect();
            }
        }

        let sql = format!(
            r#"
            SELECT {} FROM images i
            JOIN reports r ON r.id = i.report_id
            WHERE i.is_default = 1 AND r.category_id = ?
            ORDER BY i.id LIMIT 1
            "#,
            IMAGE_COLUMNS
        );
        let category_default = sqlx::query(&sql)
            .bind(category_id)
            .fetch_optional(&self.db)
            .await?;

        if let Some(row) = category_default {
            return Ok(vec![parse_image(&row)?]);
        }

        let sql = format!(
            "SELECT {} FROM images i WHERE i.is_default = 1 ORDER BY i.id LIMIT 1",
            IMAGE_COLUMNS
        );
        let fallback = sqlx::query(&sql).fetch_optional(&self.db).await?;

        match fallback {
            Some(row) => Ok(vec![parse_image(&row)?]),
            None => {
                tracing::debug!("No image available for report {}", report_id);
                Ok(Vec::new())
            }
        }
    }

    /// Delete an image row, returning it so the caller can remove the file
    pub async fn delete(&self, id: i64) -> ApiResult<Image> {
        let image = self.get(id).await?;

        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(image)
    }
}

pub(crate) fn parse_image(row: &SqliteRow) -> ApiResult<Image> {
    let uploaded_at: String = row.get("uploaded_at");

    Ok(Image {
        id: row.get("id"),
        image_url: row.get("image_url"),
        report_id: row.get("report_id"),
        is_default: row.get("is_default"),
        uploaded_at: parse_timestamp(&uploaded_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, fixtures};

    struct World {
        pool: SqlitePool,
        images: ImageManager,
        user: i64,
        location: i64,
        traffic: i64,
        environment: i64,
    }

    async fn world() -> World {
        let pool = create_memory_pool().await.unwrap();
        let user = fixtures::user(&pool, "reporter").await;
        let location = fixtures::location(&pool, "Cebu City", "Cebu").await;
        let traffic = fixtures::category(&pool, "Traffic").await;
        let environment = fixtures::category(&pool, "Environment").await;

        World {
            images: ImageManager::new(pool.clone()),
            pool,
            user,
            location,
            traffic,
            environment,
        }
    }

    impl World {
        async fn report(&self, category: i64) -> i64 {
            fixtures::report(&self.pool, self.user, category, self.location, "2024-01-10 09:00:00")
                .await
        }
    }

    #[test]
    fn test_default_label_detection() {
        assert!(is_default_image("default_traffic.jpg"));
        assert!(is_default_image("uploads/default_traffic.jpg"));
        assert!(!is_default_image("3f2a_photo.jpg"));
        assert!(!is_default_image("my_default_photo.jpg"));
        assert!(is_local_image("3f2a_photo.jpg"));
        assert!(!is_local_image("https://cdn.example.com/a.png"));
    }

    #[tokio::test]
    async fn test_user_images_win_over_placeholders() {
        let w = world().await;
        let report = w.report(w.traffic).await;
        w.images.insert(report, "default_traffic.jpg").await.unwrap();
        let upload = w.images.insert(report, "a1b2_pothole.jpg").await.unwrap();

        let resolved = w.images.resolve_for_report(report).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, upload);
        assert!(resolved.iter().all(|image| !image.is_default));
    }

    #[tokio::test]
    async fn test_report_placeholder_then_category_then_global() {
        let w = world().await;
        let seeded = w.report(w.traffic).await;
        let placeholder = w.images.insert(seeded, "default_traffic.jpg").await.unwrap();

        // Placeholder linked to the report itself
        let own = w.images.resolve_for_report(seeded).await.unwrap();
        assert_eq!(own.iter().map(|i| i.id).collect::<Vec<_>>(), vec![placeholder]);

        // Same category, no images of its own
        let sibling = w.report(w.traffic).await;
        let resolved = w.images.resolve_for_report(sibling).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].image_url, "default_traffic.jpg");

        // Different category falls through to any placeholder
        let unrelated = w.report(w.environment).await;
        let resolved = w.images.resolve_for_report(unrelated).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, placeholder);
    }

    #[tokio::test]
    async fn test_no_images_anywhere_is_empty() {
        let w = world().await;
        let report = w.report(w.traffic).await;
        assert!(w.images.resolve_for_report(report).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_report_is_not_found() {
        let w = world().await;
        assert!(matches!(
            w.images.resolve_for_report(404).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_returns_row() {
        let w = world().await;
        let report = w.report(w.traffic).await;
        let id = w.images.insert(report, "a1b2_pothole.jpg").await.unwrap();

        let deleted = w.images.delete(id).await.unwrap();
        assert_eq!(deleted.image_url, "a1b2_pothole.jpg");
        assert!(w.images.list_for_report(report).await.unwrap().is_empty());
        assert!(matches!(w.images.delete(id).await, Err(ApiError::NotFound(_))));
    }
}
