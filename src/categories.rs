/// Report categories
use crate::{
    db::{constraint_violation, ConstraintViolation, UpdateBuilder},
    error::{ApiError, ApiResult},
};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

/// Category record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Create category request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial category update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CategoryUpdate {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Category manager
#[derive(Clone)]
pub struct CategoryManager {
    db: SqlitePool,
}

impl CategoryManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> ApiResult<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, description FROM categories ORDER BY id")
            .fetch_all(&self.db)
            .await?;

        Ok(rows.iter().map(parse_category).collect())
    }

    pub async fn get(&self, id: i64) -> ApiResult<Category> {
        sqlx::query("SELECT id, name, description FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(|row| parse_category(&row))
            .ok_or_else(|| ApiError::NotFound(format!("Category {} not found", id)))
    }

    pub async fn create(&self, category: NewCategory) -> ApiResult<i64> {
        category.validate()?;

        let result = sqlx::query("INSERT INTO categories (name, description) VALUES (?, ?)")
            .bind(&category.name)
            .bind(&category.description)
            .execute(&self.db)
            .await
            .map_err(|e| duplicate_name(e, &category.name))?;

        tracing::info!("Created category {}", category.name);

        Ok(result.last_insert_rowid())
    }

    pub async fn update(&self, id: i64, update: CategoryUpdate) -> ApiResult<Category> {
        update.validate()?;
        self.get(id).await?;

        let name = update.name.clone().unwrap_or_default();

        let mut builder = UpdateBuilder::new("categories");
        builder
            .set("name", update.name)
            .set("description", update.description);

        builder
            .execute_for_id(id, &self.db)
            .await
            .map_err(|e| match e {
                ApiError::Database(db_err) => duplicate_name(db_err, &name),
                other => other,
            })?;

        self.get(id).await
    }

    /// Delete a category; categories still used by reports cannot be removed
    pub async fn delete(&self, id: i64) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| match constraint_violation(&e) {
                Some(ConstraintViolation::ForeignKey) => ApiError::Conflict(format!(
                    "Category {} is still referenced by reports",
                    id
                )),
                _ => ApiError::Database(e),
            })?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Category {} not found", id)));
        }

        tracing::info!("Deleted category {}", id);

        Ok(())
    }
}

fn duplicate_name(err: sqlx::Error, name: &str) -> ApiError {
    match constraint_violation(&err) {
        Some(ConstraintViolation::Unique) => {
            ApiError::Conflict(format!("Category '{}' already exists", name))
        }
        _ => ApiError::Database(err),
    }
}

fn parse_category(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;

    fn new_category(name: &str) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: format!("{} issues", name),
        }
    }

    #[tokio::test]
    async fn test_category_roundtrip() {
        let categories = CategoryManager::new(create_memory_pool().await.unwrap());

        let id = categories.create(new_category("Traffic")).await.unwrap();
        let category = categories.get(id).await.unwrap();
        assert_eq!(
            category,
            Category {
                id,
                name: "Traffic".to_string(),
                description: "Traffic issues".to_string(),
            }
        );

        let updated = categories
            .update(
                id,
                CategoryUpdate {
                    description: Some("Road congestion".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Traffic");
        assert_eq!(updated.description, "Road congestion");

        categories.delete(id).await.unwrap();
        assert!(matches!(categories.get(id).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let categories = CategoryManager::new(create_memory_pool().await.unwrap());
        categories.create(new_category("Traffic")).await.unwrap();
        let other = categories.create(new_category("Environment")).await.unwrap();

        assert!(matches!(
            categories.create(new_category("Traffic")).await,
            Err(ApiError::Conflict(_))
        ));

        let rename = CategoryUpdate {
            name: Some("Traffic".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            categories.update(other, rename).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_category() {
        let categories = CategoryManager::new(create_memory_pool().await.unwrap());

        assert!(matches!(
            categories.update(42, CategoryUpdate::default()).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(categories.delete(42).await, Err(ApiError::NotFound(_))));
    }
}
