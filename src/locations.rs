/// Geographic locations that reports are filed against
use crate::{
    db::{constraint_violation, ConstraintViolation, UpdateBuilder},
    error::{ApiError, ApiResult},
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

const LOCATION_COLUMNS: &str =
    "id, latitude, longitude, street, district, city, state, country, postal_code, landmark";

/// Location record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: i64,
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

/// Create location request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    #[validate(range(min = -90.0, max = 90.0, message = "must be between -90 and 90"))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0, message = "must be between -180 and 180"))]
    pub longitude: f64,
    pub street: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    pub landmark: Option<String>,
}

/// Partial location update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[validate(range(min = -90.0, max = 90.0, message = "must be between -90 and 90"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "must be between -180 and 180"))]
    pub longitude: Option<f64>,
    pub street: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub landmark: Option<String>,
}

/// Location manager
#[derive(Clone)]
pub struct LocationManager {
    db: SqlitePool,
}

impl LocationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> ApiResult<Vec<Location>> {
        let sql = format!("SELECT {} FROM locations ORDER BY id", LOCATION_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;

        Ok(rows.iter().map(parse_location).collect())
    }

    pub async fn get(&self, id: i64) -> ApiResult<Location> {
        let sql = format!("SELECT {} FROM locations WHERE id = ?", LOCATION_COLUMNS);

        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(|row| parse_location(&row))
            .ok_or_else(|| ApiError::NotFound(format!("Location {} not found", id)))
    }

    pub async fn create(&self, location: NewLocation) -> ApiResult<i64> {
        location.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO locations
                (latitude, longitude, street, district, city, state, country, postal_code, landmark)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(&location.street)
        .bind(&location.district)
        .bind(&location.city)
        .bind(&location.state)
        .bind(&location.country)
        .bind(&location.postal_code)
        .bind(&location.landmark)
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!("Created location {} in {}, {}", id, location.city, location.state);

        Ok(id)
    }

    pub async fn update(&self, id: i64, update: LocationUpdate) -> ApiResult<Location> {
        update.validate()?;
        self.get(id).await?;

        let mut builder = UpdateBuilder::new("locations");
        builder
            .set("latitude", update.latitude)
            .set("longitude", update.longitude)
            .set("street", update.street)
            .set("district", update.district)
            .set("city", update.city)
            .set("state", update.state)
            .set("country", update.country)
            .set("postal_code", update.postal_code)
            .set("landmark", update.landmark);
        builder.execute_for_id(id, &self.db).await?;

        self.get(id).await
    }

    /// Delete a location; locations still used by reports cannot be removed
    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM locations WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| match constraint_violation(&e) {
                Some(ConstraintViolation::ForeignKey) => ApiError::Conflict(format!(
                    "Location {} is still referenced by reports",
                    id
                )),
                _ => ApiError::Database(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Location {} not found", id)));
        }

        Ok(())
    }
}

fn parse_location(row: &SqliteRow) -> Location {
    Location {
        id: row.get("id"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        street: row.get("street"),
        district: row.get("district"),
        city: row.get("city"),
        state: row.get("state"),
        country: row.get("country"),
        postal_code: row.get("postal_code"),
        landmark: row.get("landmark"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn sample() -> NewLocation {
        NewLocation {
            latitude: 14.5995,
            longitude: 120.9842,
            street: "Rizal Avenue".to_string(),
            district: "Santa Cruz".to_string(),
            city: "Manila".to_string(),
            state: "Metro Manila".to_string(),
            country: "Philippines".to_string(),
            postal_code: "1003".to_string(),
            landmark: None,
        }
    }

    #[tokio::test]
    async fn test_location_roundtrip() {
        let locations = LocationManager::new(create_memory_pool().await.unwrap());

        let id = locations.create(sample()).await.unwrap();
        let stored = locations.get(id).await.unwrap();
        assert_eq!(stored.city, "Manila");
        assert_eq!(stored.latitude, 14.5995);
        assert_eq!(stored.landmark, None);

        let updated = locations
            .update(
                id,
                LocationUpdate {
                    landmark: Some("Near the church".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.landmark.as_deref(), Some("Near the church"));
        assert_eq!(updated.street, "Rizal Avenue");
        assert_eq!(updated.longitude, 120.9842);

        locations.delete(id).await.unwrap();
        assert!(matches!(locations.get(id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_coordinates_out_of_range() {
        let locations = LocationManager::new(create_memory_pool().await.unwrap());

        let mut bad = sample();
        bad.latitude = 91.0;
        assert!(matches!(
            locations.create(bad).await,
            Err(ApiError::Validation(_))
        ));

        let id = locations.create(sample()).await.unwrap();
        let update = LocationUpdate {
            longitude: Some(-181.0),
            ..Default::default()
        };
        assert!(matches!(
            locations.update(id, update).await,
            Err(ApiError::Validation(_))
        ));
    }
}
