/// Incident reports
///
/// Creation, detail views, owner updates, moderation status changes, deletion
/// and the paginated search in [`search`].

pub mod search;

pub use search::{SearchPage, SearchQuery, SortOrder};

use crate::{
    db::{now_timestamp, parse_timestamp, UpdateBuilder},
    error::{ApiError, ApiResult},
    images::{parse_image, Image, ImageManager},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use validator::Validate;

/// Report lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Rejected,
    Accepted,
    InProgress,
    Resolved,
    Closed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::UnderReview => "under_review",
            ReportStatus::Rejected => "rejected",
            ReportStatus::Accepted => "accepted",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> ApiResult<Self> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "under_review" => Ok(ReportStatus::UnderReview),
            "rejected" => Ok(ReportStatus::Rejected),
            "accepted" => Ok(ReportStatus::Accepted),
            "in_progress" => Ok(ReportStatus::InProgress),
            "resolved" => Ok(ReportStatus::Resolved),
            "closed" => Ok(ReportStatus::Closed),
            _ => Err(ApiError::Validation(format!("Invalid report status: {}", s))),
        }
    }
}

/// Report record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category_id: i64,
    pub location_id: i64,
    pub user_id: i64,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create report request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub description: String,
    pub category_id: i64,
    pub location_id: i64,
}

/// Partial report update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportUpdate {
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub location_id: Option<i64>,
}

/// Status change request
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// Location fields shown with a report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub street: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub landmark: Option<String>,
}

/// Report joined with everything a detail page shows
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetails {
    #[serde(flatten)]
    pub report: Report,
    pub category_name: String,
    pub username: String,
    pub location: ReportLocation,
    pub upvotes: i64,
    pub downvotes: i64,
    pub image_count: i64,
    pub images: Vec<Image>,
}

/// Report manager
#[derive(Clone)]
pub struct ReportManager {
    db: SqlitePool,
    images: ImageManager,
}

impl ReportManager {
    pub fn new(db: SqlitePool, images: ImageManager) -> Self {
        Self { db, images }
    }

    /// Create a report for `user_id`, checking the referenced rows first
    pub async fn create(&self, user_id: i64, report: NewReport) -> ApiResult<i64> {
        report.validate()?;

        let mut tx = crate::db::begin_write(&self.db).await?;

        ensure_referenced(&mut tx, "users", "User", user_id).await?;
        ensure_referenced(&mut tx, "categories", "Category", report.category_id).await?;
        ensure_referenced(&mut tx, "locations", "Location", report.location_id).await?;

        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO reports (title, description, category_id, location_id, user_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.title)
        .bind(&report.description)
        .bind(report.category_id)
        .bind(report.location_id)
        .bind(user_id)
        .bind(ReportStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let id = result.last_insert_rowid();
        tracing::info!("User {} created report {}", user_id, id);

        Ok(id)
    }

    pub async fn get(&self, id: i64) -> ApiResult<Report> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, category_id, location_id, user_id, status, created_at, updated_at
            FROM reports WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", id)))?;

        parse_report(&row)
    }

    /// Report with category, author, location, vote counts and resolved images
    pub async fn details(&self, id: i64) -> ApiResult<ReportDetails> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.title, r.description, r.category_id, r.location_id, r.user_id,
                   r.status, r.created_at, r.updated_at,
                   c.name AS category_name, u.username,
                   l.latitude, l.longitude, l.street, l.district, l.city, l.state,
                   l.country, l.postal_code, l.landmark,
                   (SELECT COUNT(*) FROM images i WHERE i.report_id = r.id) AS image_count,
                   (SELECT COUNT(*) FROM votes v WHERE v.report_id = r.id AND v.vote_type = 'upvote') AS upvotes,
                   (SELECT COUNT(*) FROM votes v WHERE v.report_id = r.id AND v.vote_type = 'downvote') AS downvotes
            FROM reports r
            JOIN categories c ON c.id = r.category_id
            JOIN locations l ON l.id = r.location_id
            JOIN users u ON u.id = r.user_id
            WHERE r.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Report {} not found", id)))?;

        let images = self.images.resolve_for_report(id).await?;

        Ok(ReportDetails {
            report: parse_report(&row)?,
            category_name: row.get("category_name"),
            username: row.get("username"),
            location: ReportLocation {
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
                street: row.get("street"),
                district: row.get("district"),
                city: row.get("city"),
                state: row.get("state"),
                country: row.get("country"),
                postal_code: row.get("postal_code"),
                landmark: row.get("landmark"),
            },
            upvotes: row.get("upvotes"),
            downvotes: row.get("downvotes"),
            image_count: row.get("image_count"),
            images,
        })
    }

    /// Apply a partial update. An empty patch changes nothing, not even `updated_at`.
    pub async fn update(&self, id: i64, update: ReportUpdate) -> ApiResult<Report> {
        update.validate()?;

        let mut tx = crate::db::begin_write(&self.db).await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::NotFound(format!("Report {} not found", id)));
        }

        if let Some(category_id) = update.category_id {
            ensure_referenced(&mut tx, "categories", "Category", category_id).await?;
        }
        if let Some(location_id) = update.location_id {
            ensure_referenced(&mut tx, "locations", "Location", location_id).await?;
        }

        let mut builder = UpdateBuilder::new("reports");
        builder
            .set("title", update.title)
            .set("description", update.description)
            .set("category_id", update.category_id)
            .set("location_id", update.location_id);

        if !builder.is_empty() {
            builder.set("updated_at", Some(now_timestamp()));
            builder.execute_for_id(id, &mut *tx).await?;
        }

        tx.commit().await?;

        self.get(id).await
    }

    /// Moderation status change
    pub async fn update_status(&self, id: i64, status: ReportStatus) -> ApiResult<Report> {
        let result = sqlx::query("UPDATE reports SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Report {} not found", id)));
        }

        tracing::info!("Report {} moved to {}", id, status.as_str());

        self.get(id).await
    }

    /// Delete a report with its votes and image rows.
    ///
    /// Returns the deleted image rows; their files are the caller's to remove.
    pub async fn delete(&self, id: i64) -> ApiResult<Vec<Image>> {
        let mut tx = crate::db::begin_write(&self.db).await?;

        let rows = sqlx::query(
            "SELECT id, image_url, report_id, is_default, uploaded_at FROM images WHERE report_id = ?",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let images = rows.iter().map(parse_image).collect::<ApiResult<Vec<_>>>()?;

        sqlx::query("DELETE FROM votes WHERE report_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM images WHERE report_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back
            return Err(ApiError::NotFound(format!("Report {} not found", id)));
        }

        tx.commit().await?;

        tracing::info!("Deleted report {} with {} images", id, images.len());

        Ok(images)
    }
}

/// Reject references to rows that do not exist with a validation error
async fn ensure_referenced(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    label: &str,
    id: i64,
) -> ApiResult<()> {
    let sql = format!("SELECT id FROM {} WHERE id = ?", table);
    let found: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| ApiError::Validation(format!("{} {} does not exist", label, id)))
}

fn parse_report(row: &SqliteRow) -> ApiResult<Report> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Report {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        category_id: row.get("category_id"),
        location_id: row.get("location_id"),
        user_id: row.get("user_id"),
        status: ReportStatus::from_str(&status)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, fixtures};

    struct World {
        pool: SqlitePool,
        reports: ReportManager,
        user: i64,
        category: i64,
        location: i64,
    }

    async fn world() -> World {
        let pool = create_memory_pool().await.unwrap();
        let user = fixtures::user(&pool, "reporter").await;
        let category = fixtures::category(&pool, "Infrastructure").await;
        let location = fixtures::location(&pool, "Davao City", "Davao del Sur").await;

        World {
            reports: ReportManager::new(pool.clone(), ImageManager::new(pool.clone())),
            pool,
            user,
            category,
            location,
        }
    }

    fn new_report(category_id: i64, location_id: i64) -> NewReport {
        NewReport {
            title: "Collapsed drainage".to_string(),
            description: "Drain cover missing on the corner".to_string(),
            category_id,
            location_id,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ReportStatus::Pending,
            ReportStatus::UnderReview,
            ReportStatus::InProgress,
            ReportStatus::Closed,
        ] {
            assert_eq!(ReportStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(ReportStatus::from_str("archived").is_err());
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let w = world().await;
        let id = w
            .reports
            .create(w.user, new_report(w.category, w.location))
            .await
            .unwrap();

        let report = w.reports.get(id).await.unwrap();
        assert_eq!(report.user_id, w.user);
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.created_at, report.updated_at);
    }

    #[tokio::test]
    async fn test_create_rejects_missing_references() {
        let w = world().await;

        let bad_category = w.reports.create(w.user, new_report(99, w.location)).await;
        assert!(matches!(bad_category, Err(ApiError::Validation(_))));

        let bad_location = w.reports.create(w.user, new_report(w.category, 99)).await;
        assert!(matches!(bad_location, Err(ApiError::Validation(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reports")
            .fetch_one(&w.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_details_joins_everything() {
        let w = world().await;
        let id = w
            .reports
            .create(w.user, new_report(w.category, w.location))
            .await
            .unwrap();
        fixtures::vote(&w.pool, id, w.user, "upvote").await;
        fixtures::image(&w.pool, id, "c0ffee_drain.jpg").await;

        let details = w.reports.details(id).await.unwrap();
        assert_eq!(details.category_name, "Infrastructure");
        assert_eq!(details.username, "reporter");
        assert_eq!(details.location.city, "Davao City");
        assert_eq!((details.upvotes, details.downvotes), (1, 0));
        assert_eq!(details.image_count, 1);
        assert_eq!(details.images.len(), 1);

        assert!(matches!(w.reports.details(404).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_partial_update() {
        let w = world().await;
        let id = w
            .reports
            .create(w.user, new_report(w.category, w.location))
            .await
            .unwrap();

        let updated = w
            .reports
            .update(
                id,
                ReportUpdate {
                    title: Some("Drainage fixed?".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Drainage fixed?");
        assert_eq!(updated.description, "Drain cover missing on the corner");

        let bad = ReportUpdate {
            category_id: Some(77),
            ..Default::default()
        };
        assert!(matches!(w.reports.update(id, bad).await, Err(ApiError::Validation(_))));

        assert!(matches!(
            w.reports.update(404, ReportUpdate::default()).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status() {
        let w = world().await;
        let id = w
            .reports
            .create(w.user, new_report(w.category, w.location))
            .await
            .unwrap();

        let report = w.reports.update_status(id, ReportStatus::Resolved).await.unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
        assert!(matches!(
            w.reports.update_status(404, ReportStatus::Closed).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let w = world().await;
        let id = w
            .reports
            .create(w.user, new_report(w.category, w.location))
            .await
            .unwrap();
        fixtures::vote(&w.pool, id, w.user, "downvote").await;
        fixtures::image(&w.pool, id, "c0ffee_drain.jpg").await;

        let images = w.reports.delete(id).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].image_url, "c0ffee_drain.jpg");

        let leftovers: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM votes) + (SELECT COUNT(*) FROM images) + (SELECT COUNT(*) FROM reports)",
        )
        .fetch_one(&w.pool)
        .await
        .unwrap();
        assert_eq!(leftovers, 0);

        assert!(matches!(w.reports.delete(id).await, Err(ApiError::NotFound(_))));
    }
}
